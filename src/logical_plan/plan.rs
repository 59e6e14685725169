use super::expr::{BooleanBinaryExpr, LogicalExpr};
use crate::catalog::Catalog;
use crate::tuple::schema::Schema;
use crate::types::Value;
use anyhow::Result;

/// Logical query plans, built by the external front end and rewritten by
/// the optimizer before compilation into physical operators. Parents own
/// their children; the only back-edges live in the optimizer's plan view.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    TableScan(TableScan),
    IndexScan(IndexScan),
    Filter(Filter),
    Projection(Projection),
    Limit(Limit),
    Insert(Insert),
    Delete(Delete),
    BuildIndex(BuildIndex),
    Values(Values),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableScan {
    pub table_name: String,
    /// Set by projection pushdown to narrow the scanned row.
    pub projection: Option<Vec<String>>,
}

impl TableScan {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            projection: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexScan {
    pub table_name: String,
    pub index_name: String,
    pub from: Option<Value>,
    pub include_from: bool,
    pub to: Option<Value>,
    pub include_to: bool,
}

impl IndexScan {
    /// Equality probe: both bounds closed on the same key.
    pub fn key(table_name: &str, index_name: &str, key: Value) -> Self {
        Self {
            table_name: table_name.to_string(),
            index_name: index_name.to_string(),
            from: Some(key.clone()),
            include_from: true,
            to: Some(key),
            include_to: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub input: Box<LogicalPlan>,
    pub predicate: BooleanBinaryExpr,
}

impl Filter {
    pub fn new(input: LogicalPlan, predicate: BooleanBinaryExpr) -> Self {
        Self {
            input: Box::new(input),
            predicate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub input: Box<LogicalPlan>,
    pub projections: Vec<LogicalExpr>,
}

impl Projection {
    pub fn new(input: LogicalPlan, projections: Vec<LogicalExpr>) -> Self {
        Self {
            input: Box::new(input),
            projections,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub input: Box<LogicalPlan>,
    pub limit: usize,
    pub offset: usize,
}

impl Limit {
    pub fn new(input: LogicalPlan, limit: usize, offset: usize) -> Self {
        Self {
            input: Box::new(input),
            limit,
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub input: Box<LogicalPlan>,
    pub table_name: String,
}

impl Insert {
    pub fn new(input: LogicalPlan, table_name: &str) -> Self {
        Self {
            input: Box::new(input),
            table_name: table_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub input: Box<LogicalPlan>,
    pub table_name: String,
}

impl Delete {
    pub fn new(input: LogicalPlan, table_name: &str) -> Self {
        Self {
            input: Box::new(input),
            table_name: table_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildIndex {
    pub table_name: String,
    pub column: String,
    pub index_name: String,
    pub ordered: bool,
}

impl BuildIndex {
    pub fn new(table_name: &str, column: &str, index_name: &str, ordered: bool) -> Self {
        Self {
            table_name: table_name.to_string(),
            column: column.to_string(),
            index_name: index_name.to_string(),
            ordered,
        }
    }
}

/// Literal row source, the canonical child of `Insert`.
#[derive(Debug, Clone, PartialEq)]
pub struct Values {
    pub rows: Vec<Vec<LogicalExpr>>,
    pub schema: Schema,
}

impl Values {
    pub fn new(rows: Vec<Vec<LogicalExpr>>, schema: Schema) -> Self {
        Self { rows, schema }
    }
}

impl LogicalPlan {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalPlan::TableScan(_) => "TableScan",
            LogicalPlan::IndexScan(_) => "IndexScan",
            LogicalPlan::Filter(_) => "Filter",
            LogicalPlan::Projection(_) => "Projection",
            LogicalPlan::Limit(_) => "Limit",
            LogicalPlan::Insert(_) => "Insert",
            LogicalPlan::Delete(_) => "Delete",
            LogicalPlan::BuildIndex(_) => "BuildIndex",
            LogicalPlan::Values(_) => "Values",
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Filter(f) => vec![&f.input],
            LogicalPlan::Projection(p) => vec![&p.input],
            LogicalPlan::Limit(l) => vec![&l.input],
            LogicalPlan::Insert(i) => vec![&i.input],
            LogicalPlan::Delete(d) => vec![&d.input],
            LogicalPlan::TableScan(_)
            | LogicalPlan::IndexScan(_)
            | LogicalPlan::BuildIndex(_)
            | LogicalPlan::Values(_) => vec![],
        }
    }

    pub fn num_nodes(&self) -> usize {
        1 + self.children().iter().map(|c| c.num_nodes()).sum::<usize>()
    }

    /// The schema of the rows this node produces. Non-yielding nodes
    /// (insert, delete, build-index) produce the empty schema.
    pub fn schema(&self, catalog: &Catalog) -> Result<Schema> {
        match self {
            LogicalPlan::TableScan(scan) => {
                let table = catalog.table(&scan.table_name)?;
                let schema = table.read().schema().clone();
                match &scan.projection {
                    Some(columns) => schema.project(columns),
                    None => Ok(schema),
                }
            }
            LogicalPlan::IndexScan(scan) => {
                let table = catalog.table(&scan.table_name)?;
                let schema = table.read().schema().clone();
                Ok(schema)
            }
            LogicalPlan::Filter(f) => f.input.schema(catalog),
            LogicalPlan::Limit(l) => l.input.schema(catalog),
            LogicalPlan::Projection(p) => {
                let input = p.input.schema(catalog)?;
                let fields = p
                    .projections
                    .iter()
                    .map(|e| e.to_field(&input))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Schema::new(fields))
            }
            LogicalPlan::Values(v) => Ok(v.schema.clone()),
            LogicalPlan::Insert(_) | LogicalPlan::Delete(_) | LogicalPlan::BuildIndex(_) => {
                Ok(Schema::default())
            }
        }
    }

    pub fn print(&self) -> String {
        let mut out = String::new();
        self.print_into(0, &mut out);
        out
    }

    fn print_into(&self, indent: usize, out: &mut String) {
        out.push_str(&" ".repeat(indent));
        match self {
            LogicalPlan::TableScan(s) => {
                out.push_str(&format!("TableScan: {}", s.table_name));
                if let Some(columns) = &s.projection {
                    out.push_str(&format!(" [{}]", columns.join(", ")));
                }
            }
            LogicalPlan::IndexScan(s) => {
                out.push_str(&format!("IndexScan: {} via {}", s.table_name, s.index_name));
            }
            LogicalPlan::Filter(f) => out.push_str(&format!("Filter: {}", f.predicate)),
            LogicalPlan::Projection(p) => {
                let exprs: Vec<String> = p.projections.iter().map(|e| e.to_string()).collect();
                out.push_str(&format!("Projection: {}", exprs.join(", ")));
            }
            LogicalPlan::Limit(l) => {
                out.push_str(&format!("Limit: {} offset {}", l.limit, l.offset))
            }
            LogicalPlan::Insert(i) => out.push_str(&format!("Insert: {}", i.table_name)),
            LogicalPlan::Delete(d) => out.push_str(&format!("Delete: {}", d.table_name)),
            LogicalPlan::BuildIndex(b) => out.push_str(&format!(
                "BuildIndex: {} on {}.{}",
                b.index_name, b.table_name, b.column
            )),
            LogicalPlan::Values(v) => out.push_str(&format!("Values: {} rows", v.rows.len())),
        }
        out.push('\n');
        for child in self.children() {
            child.print_into(indent + 2, out);
        }
    }
}
