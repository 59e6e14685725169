pub mod schema;

use crate::errors::Error;
use crate::pages::{PageId, SlotId};
use crate::types::{Value, ValueFactory};
use anyhow::{bail, Result};
use schema::Schema;

/// Record id: (page id, slot index). Stable under erasure within a page.
pub type Rid = (PageId, SlotId);

/// A packed row. The bytes are exactly what sits in a page: optional null
/// bitmap first, then one fixed-width cell per column. Column access
/// computes its offset from the schema on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    data: Box<[u8]>,
}

impl Tuple {
    pub fn new(values: Vec<Value>, schema: &Schema) -> Result<Self> {
        if values.len() != schema.fields.len() {
            bail!(Error::SchemaMismatch(format!(
                "expected {} values, got {}",
                schema.fields.len(),
                values.len()
            )));
        }

        let bitmap_size = schema.null_bitmap_size();
        let mut data = Vec::with_capacity(schema.row_size());
        data.resize(bitmap_size, 0);

        for (index, (value, field)) in values.iter().zip(&schema.fields).enumerate() {
            if value.is_null() {
                if bitmap_size == 0 {
                    bail!(Error::SchemaMismatch(format!(
                        "NULL for column {} of a schema without nullable columns",
                        field.name
                    )));
                }
                data[index / 8] |= 1 << (index % 8);
            }
            value.write_to(&mut data, &field.ty)?;
        }

        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec().into_boxed_slice(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_null(&self, index: usize, schema: &Schema) -> bool {
        schema.null_bitmap_size() > 0 && self.data[index / 8] >> (index % 8) & 1 == 1
    }

    pub fn value_at(&self, index: usize, schema: &Schema) -> Result<Value> {
        if index >= schema.fields.len() {
            bail!(Error::Internal(
                "tuple".into(),
                format!("column index {index} out of bounds")
            ));
        }
        if self.is_null(index, schema) {
            return Ok(Value::Null);
        }
        let ty = &schema.fields[index].ty;
        let offset = schema.offset_of(index);
        Ok(ValueFactory::from_bytes(ty, &self.data[offset..offset + ty.size()]))
    }

    pub fn value_of(&self, column: &str, schema: &Schema) -> Result<Value> {
        match schema.field_index(column) {
            Some(index) => self.value_at(index, schema),
            None => bail!(Error::NotFound(format!("Column {column}"))),
        }
    }

    pub fn values(&self, schema: &Schema) -> Result<Vec<Value>> {
        (0..schema.fields.len())
            .map(|index| self.value_at(index, schema))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::schema::{Field, Schema};
    use super::*;
    use crate::lit;
    use crate::types::Types;

    fn people() -> Schema {
        Schema::new(vec![
            Field::new("id", Types::UInt, false),
            Field::new("name", Types::Char(8), true),
            Field::new("score", Types::Double, true),
        ])
    }

    #[test]
    fn test_roundtrip() -> Result<()> {
        let schema = people();
        let tuple = Tuple::new(
            vec![lit!(UInt, "7")?, lit!(Char(8), "alice")?, lit!(Double, "9.5")?],
            &schema,
        )?;

        assert_eq!(tuple.size(), schema.row_size());
        assert_eq!(tuple.value_of("id", &schema)?, Value::UInt(7));
        assert_eq!(tuple.value_of("name", &schema)?, Value::Char("alice".into()));
        assert_eq!(tuple.value_of("score", &schema)?, Value::Double(9.5));

        let reread = Tuple::from_bytes(tuple.data());
        assert_eq!(reread.values(&schema)?, tuple.values(&schema)?);
        Ok(())
    }

    #[test]
    fn test_null_bitmap() -> Result<()> {
        let schema = people();
        let tuple = Tuple::new(
            vec![lit!(UInt, "1")?, Value::Null, Value::Null],
            &schema,
        )?;

        assert!(!tuple.is_null(0, &schema));
        assert!(tuple.is_null(1, &schema));
        assert!(tuple.is_null(2, &schema));
        assert_eq!(tuple.value_at(1, &schema)?, Value::Null);
        Ok(())
    }

    #[test]
    fn test_arity_and_type_checked() -> Result<()> {
        let schema = people();
        assert!(Tuple::new(vec![lit!(UInt, "1")?], &schema).is_err());
        assert!(Tuple::new(
            vec![lit!(Int, "1")?, Value::Null, Value::Null],
            &schema
        )
        .is_err());

        let strict = Schema::new(vec![Field::new("id", Types::UInt, false)]);
        assert!(Tuple::new(vec![Value::Null], &strict).is_err());
        Ok(())
    }
}
