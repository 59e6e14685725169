use crate::errors::Error;
use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;

/// The fixed type set. Rows are packed column-order with the width of each
/// column fully determined by its type, so tuple size is a property of the
/// schema alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Types {
    Int,
    BigInt,
    UInt,
    Bool,
    Double,
    /// Fixed-length string; the length lives in the schema.
    Char(u16),
    Date,
}

impl Types {
    pub fn size(&self) -> usize {
        match self {
            Types::Int | Types::UInt | Types::Date => 4,
            Types::BigInt | Types::Double => 8,
            Types::Bool => 1,
            Types::Char(len) => *len as usize,
        }
    }
}

impl std::fmt::Display for Types {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Types::Int => write!(f, "Int"),
            Types::BigInt => write!(f, "BigInt"),
            Types::UInt => write!(f, "UInt"),
            Types::Bool => write!(f, "Bool"),
            Types::Double => write!(f, "Double"),
            Types::Char(len) => write!(f, "Char({len})"),
            Types::Date => write!(f, "Date"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    BigInt(i64),
    UInt(u32),
    Bool(bool),
    Double(f64),
    Char(String),
    Date(NaiveDate),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Whether this value can be stored in a column of the given type.
    pub fn fits(&self, ty: &Types) -> bool {
        match (self, ty) {
            (Value::Null, _) => true,
            (Value::Int(_), Types::Int) => true,
            (Value::BigInt(_), Types::BigInt) => true,
            (Value::UInt(_), Types::UInt) => true,
            (Value::Bool(_), Types::Bool) => true,
            (Value::Double(_), Types::Double) => true,
            (Value::Char(s), Types::Char(len)) => s.len() <= *len as usize,
            (Value::Date(_), Types::Date) => true,
            _ => false,
        }
    }

    fn type_name(&self) -> String {
        match self {
            Value::Int(_) => "Int".into(),
            Value::BigInt(_) => "BigInt".into(),
            Value::UInt(_) => "UInt".into(),
            Value::Bool(_) => "Bool".into(),
            Value::Double(_) => "Double".into(),
            Value::Char(s) => format!("Char({})", s.len()),
            Value::Date(_) => "Date".into(),
            Value::Null => "Null".into(),
        }
    }

    /// Type-wise ordering. Comparing across types, or against NULL, is a
    /// type error; predicate evaluation treats NULL comparisons as false
    /// before getting here.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Int(l), Value::Int(r)) => Ok(l.cmp(r)),
            (Value::BigInt(l), Value::BigInt(r)) => Ok(l.cmp(r)),
            (Value::UInt(l), Value::UInt(r)) => Ok(l.cmp(r)),
            (Value::Bool(l), Value::Bool(r)) => Ok(l.cmp(r)),
            (Value::Double(l), Value::Double(r)) => Ok(l.total_cmp(r)),
            (Value::Char(l), Value::Char(r)) => Ok(l.cmp(r)),
            (Value::Date(l), Value::Date(r)) => Ok(l.cmp(r)),
            (l, r) => bail!(Error::TypeMismatch(l.type_name(), r.type_name())),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "+")
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "-")
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "*")
    }

    pub fn div(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "/")
    }

    fn arithmetic(&self, other: &Value, op: &str) -> Result<Value> {
        macro_rules! apply {
            ($variant:ident, $l:expr, $r:expr) => {{
                if matches!(op, "/") && $r == &Default::default() {
                    bail!(Error::Internal("types".into(), "division by zero".into()));
                }
                Ok(Value::$variant(match op {
                    "+" => $l.wrapping_add(*$r),
                    "-" => $l.wrapping_sub(*$r),
                    "*" => $l.wrapping_mul(*$r),
                    _ => $l.wrapping_div(*$r),
                }))
            }};
        }

        match (self, other) {
            (Value::Int(l), Value::Int(r)) => apply!(Int, l, r),
            (Value::BigInt(l), Value::BigInt(r)) => apply!(BigInt, l, r),
            (Value::UInt(l), Value::UInt(r)) => apply!(UInt, l, r),
            (Value::Double(l), Value::Double(r)) => Ok(Value::Double(match op {
                "+" => l + r,
                "-" => l - r,
                "*" => l * r,
                _ => l / r,
            })),
            (l, r) => bail!(Error::TypeMismatch(l.type_name(), r.type_name())),
        }
    }

    /// Serializes into the fixed on-page width of `ty`. NULLs write the
    /// type's zero value; the caller records them in the null bitmap.
    pub fn write_to(&self, buf: &mut Vec<u8>, ty: &Types) -> Result<()> {
        if !self.fits(ty) {
            bail!(Error::TypeMismatch(self.type_name(), ty.to_string()));
        }
        match (self, ty) {
            (Value::Null, _) => buf.extend(std::iter::repeat(0).take(ty.size())),
            (Value::Int(v), _) => buf.extend_from_slice(&v.to_le_bytes()),
            (Value::BigInt(v), _) => buf.extend_from_slice(&v.to_le_bytes()),
            (Value::UInt(v), _) => buf.extend_from_slice(&v.to_le_bytes()),
            (Value::Bool(v), _) => buf.push(*v as u8),
            (Value::Double(v), _) => buf.extend_from_slice(&v.to_le_bytes()),
            (Value::Char(s), Types::Char(len)) => {
                buf.extend_from_slice(s.as_bytes());
                buf.extend(std::iter::repeat(0).take(*len as usize - s.len()));
            }
            (Value::Date(d), _) => buf.extend_from_slice(&d.num_days_from_ce().to_le_bytes()),
            _ => unreachable!("fits() covers the remaining combinations"),
        }
        Ok(())
    }

    /// The `u32` payload of engine-generated columns (page ids, slot ids).
    pub fn u32(&self) -> u32 {
        match self {
            Value::UInt(v) => *v,
            other => panic!("expected a UInt, found {other:?}"),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "'{v}'"),
            Value::Date(v) => write!(f, "{v}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

pub struct ValueFactory;

impl ValueFactory {
    pub fn from_string(ty: &Types, value: impl AsRef<str>) -> Result<Value> {
        let value = value.as_ref();
        let parsed = match ty {
            Types::Int => value.parse().map(Value::Int).ok(),
            Types::BigInt => value.parse().map(Value::BigInt).ok(),
            Types::UInt => value.parse().map(Value::UInt).ok(),
            Types::Bool => value.parse().map(Value::Bool).ok(),
            Types::Double => value.parse().map(Value::Double).ok(),
            Types::Char(len) => {
                (value.len() <= *len as usize).then(|| Value::Char(value.to_string()))
            }
            Types::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(Value::Date)
                .ok(),
        };
        match parsed {
            Some(value) => Ok(value),
            None => bail!(Error::TypeMismatch(format!("{value:?}"), ty.to_string())),
        }
    }

    /// Deserializes trusted page bytes of the type's exact width.
    pub fn from_bytes(ty: &Types, bytes: &[u8]) -> Value {
        debug_assert_eq!(bytes.len(), ty.size());
        match ty {
            Types::Int => Value::Int(i32::from_le_bytes(bytes.try_into().unwrap())),
            Types::BigInt => Value::BigInt(i64::from_le_bytes(bytes.try_into().unwrap())),
            Types::UInt => Value::UInt(u32::from_le_bytes(bytes.try_into().unwrap())),
            Types::Bool => Value::Bool(bytes[0] != 0),
            Types::Double => Value::Double(f64::from_le_bytes(bytes.try_into().unwrap())),
            Types::Char(_) => {
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                Value::Char(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            Types::Date => {
                let days = i32::from_le_bytes(bytes.try_into().unwrap());
                Value::Date(NaiveDate::from_num_days_from_ce_opt(days).unwrap_or_default())
            }
        }
    }
}

/// `lit!(UInt, "42")`: shorthand for building literal values in plans and
/// tests.
#[macro_export]
macro_rules! lit {
    ($ty:ident($len:expr), $value:expr) => {
        $crate::types::ValueFactory::from_string(&$crate::types::Types::$ty($len), $value)
    };
    ($ty:ident, $value:expr) => {
        $crate::types::ValueFactory::from_string(&$crate::types::Types::$ty, $value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_bytes() -> Result<()> {
        let cases = [
            (Types::Int, Value::Int(-42)),
            (Types::BigInt, Value::BigInt(1 << 40)),
            (Types::UInt, Value::UInt(7)),
            (Types::Bool, Value::Bool(true)),
            (Types::Double, Value::Double(2.5)),
            (Types::Char(8), Value::Char("ab".into())),
            (
                Types::Date,
                Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            ),
        ];

        for (ty, value) in cases {
            let mut buf = Vec::new();
            value.write_to(&mut buf, &ty)?;
            assert_eq!(buf.len(), ty.size());
            assert_eq!(ValueFactory::from_bytes(&ty, &buf), value);
        }
        Ok(())
    }

    #[test]
    fn test_cross_type_comparison_fails() {
        assert!(Value::Int(1).compare(&Value::UInt(1)).is_err());
        assert!(Value::Null.compare(&Value::Int(1)).is_err());
        assert!(Value::Int(1).compare(&Value::Int(2)).is_ok());
    }

    #[test]
    fn test_char_length_enforced() {
        assert!(lit!(Char(3), "abc").is_ok());
        assert!(lit!(Char(3), "abcd").is_err());
    }

    #[test]
    fn test_arithmetic() -> Result<()> {
        assert_eq!(Value::Int(2).add(&Value::Int(3))?, Value::Int(5));
        assert_eq!(Value::Double(1.0).div(&Value::Double(4.0))?, Value::Double(0.25));
        assert!(Value::Int(1).div(&Value::Int(0)).is_err());
        assert!(Value::Int(1).add(&Value::Double(1.0)).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_strings() -> Result<()> {
        assert_eq!(lit!(UInt, "42")?, Value::UInt(42));
        assert_eq!(
            lit!(Date, "2020-01-31")?,
            Value::Date(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap())
        );
        assert!(lit!(UInt, "-1").is_err());
        assert!(lit!(Date, "01/31/2020").is_err());
        Ok(())
    }
}
