use crate::errors::Error;
use crate::is_boolean_op;
use crate::tuple::schema::{Field, Schema};
use crate::tuple::Tuple;
use crate::types::{Types, Value};
use anyhow::{bail, Result};
use sqlparser::ast::BinaryOperator;
use std::collections::HashSet;

/// Expression trees: column references and literals at the leaves,
/// comparisons, logical connectives and arithmetic inside. Evaluation is a
/// recursive walk against one tuple at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalExpr {
    Column(String),
    Literal(Value),
    BinaryExpr(Box<BinaryExpr>),
}

impl LogicalExpr {
    pub fn evaluate(&self, tuple: &Tuple, schema: &Schema) -> Result<Value> {
        match self {
            LogicalExpr::Column(name) => tuple.value_of(name, schema),
            LogicalExpr::Literal(value) => Ok(value.clone()),
            LogicalExpr::BinaryExpr(expr) => expr.evaluate(tuple, schema),
        }
    }

    /// The output column this expression contributes to a projection.
    pub fn to_field(&self, schema: &Schema) -> Result<Field> {
        match self {
            LogicalExpr::Column(name) => match schema.field(name) {
                Some(field) => Ok(field.clone()),
                None => bail!(Error::NotFound(format!("Column {name}"))),
            },
            LogicalExpr::Literal(value) => {
                let ty = match value {
                    Value::Int(_) => Types::Int,
                    Value::BigInt(_) => Types::BigInt,
                    Value::UInt(_) => Types::UInt,
                    Value::Bool(_) => Types::Bool,
                    Value::Double(_) => Types::Double,
                    Value::Char(s) => Types::Char(s.len() as u16),
                    Value::Date(_) => Types::Date,
                    Value::Null => bail!(Error::SchemaMismatch(
                        "a bare NULL literal has no column type".into()
                    )),
                };
                Ok(Field::new(&value.to_string(), ty, false))
            }
            LogicalExpr::BinaryExpr(expr) => {
                let op = &expr.op;
                if is_boolean_op!(op) {
                    Ok(Field::new(&self.to_string(), Types::Bool, false))
                } else {
                    let left = expr.left.to_field(schema)?;
                    Ok(Field::new(&self.to_string(), left.ty, true))
                }
            }
        }
    }

    /// Collects every column name referenced in the tree.
    pub fn columns(&self, out: &mut HashSet<String>) {
        match self {
            LogicalExpr::Column(name) => {
                out.insert(name.clone());
            }
            LogicalExpr::Literal(_) => {}
            LogicalExpr::BinaryExpr(expr) => {
                expr.left.columns(out);
                expr.right.columns(out);
            }
        }
    }
}

impl std::fmt::Display for LogicalExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalExpr::Column(name) => write!(f, "#{name}"),
            LogicalExpr::Literal(value) => write!(f, "{value}"),
            LogicalExpr::BinaryExpr(expr) => write!(f, "{} {} {}", expr.left, expr.op, expr.right),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub left: LogicalExpr,
    pub op: BinaryOperator,
    pub right: LogicalExpr,
}

impl BinaryExpr {
    pub fn new(left: LogicalExpr, op: BinaryOperator, right: LogicalExpr) -> Self {
        Self { left, op, right }
    }

    pub fn evaluate(&self, tuple: &Tuple, schema: &Schema) -> Result<Value> {
        eval_binary(&self.left, &self.op, &self.right, tuple, schema)
    }
}

fn eval_binary(
    left: &LogicalExpr,
    op: &BinaryOperator,
    right: &LogicalExpr,
    tuple: &Tuple,
    schema: &Schema,
) -> Result<Value> {
    match op {
        // short-circuit: the right side only runs when the left side has
        // not already decided the outcome
        BinaryOperator::And => {
            if !left.evaluate(tuple, schema)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(right.evaluate(tuple, schema)?.is_truthy()))
        }
        BinaryOperator::Or => {
            if left.evaluate(tuple, schema)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(right.evaluate(tuple, schema)?.is_truthy()))
        }
        op if is_comparison(op) => {
            let left = left.evaluate(tuple, schema)?;
            let right = right.evaluate(tuple, schema)?;
            if left.is_null() || right.is_null() {
                return Ok(Value::Bool(false));
            }
            let ordering = left.compare(&right)?;
            Ok(Value::Bool(match op {
                BinaryOperator::Eq => ordering.is_eq(),
                BinaryOperator::NotEq => ordering.is_ne(),
                BinaryOperator::Lt => ordering.is_lt(),
                BinaryOperator::Gt => ordering.is_gt(),
                BinaryOperator::LtEq => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOperator::Plus
        | BinaryOperator::Minus
        | BinaryOperator::Multiply
        | BinaryOperator::Divide => {
            let left = left.evaluate(tuple, schema)?;
            let right = right.evaluate(tuple, schema)?;
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            match op {
                BinaryOperator::Plus => left.add(&right),
                BinaryOperator::Minus => left.sub(&right),
                BinaryOperator::Multiply => left.mul(&right),
                _ => left.div(&right),
            }
        }
        op => bail!(Error::Internal(
            "expr".into(),
            format!("unsupported operator {op}")
        )),
    }
}

/// A predicate: the boolean-rooted expression filters and joins carry.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanBinaryExpr {
    pub left: LogicalExpr,
    pub op: BinaryOperator,
    pub right: LogicalExpr,
}

impl BooleanBinaryExpr {
    pub fn new(left: LogicalExpr, op: BinaryOperator, right: LogicalExpr) -> Self {
        debug_assert!(is_boolean_op!(&op));
        Self { left, op, right }
    }

    pub fn evaluate(&self, tuple: &Tuple, schema: &Schema) -> Result<bool> {
        Ok(eval_binary(&self.left, &self.op, &self.right, tuple, schema)?.is_truthy())
    }

    pub fn columns(&self, out: &mut HashSet<String>) {
        self.left.columns(out);
        self.right.columns(out);
    }

    /// Mirrors `literal OP column` into the canonical `column OP literal`
    /// form, flipping the comparison direction where needed.
    pub fn swapped(&self) -> Self {
        Self {
            left: self.right.clone(),
            op: mirror(&self.op),
            right: self.left.clone(),
        }
    }
}

impl std::fmt::Display for BooleanBinaryExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

pub fn is_comparison(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::Gt
            | BinaryOperator::LtEq
            | BinaryOperator::GtEq
    )
}

fn mirror(op: &BinaryOperator) -> BinaryOperator {
    match op {
        BinaryOperator::Lt => BinaryOperator::Gt,
        BinaryOperator::Gt => BinaryOperator::Lt,
        BinaryOperator::LtEq => BinaryOperator::GtEq,
        BinaryOperator::GtEq => BinaryOperator::LtEq,
        other => other.clone(),
    }
}
