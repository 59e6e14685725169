use crate::errors::Error;
use crate::types::Types;
use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Types,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: &str, ty: Types, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            ty,
            nullable,
        }
    }
}

/// An ordered list of columns. Fixes the packed row width: an optional
/// leading null bitmap (present as soon as any column is nullable)
/// followed by one fixed-width cell per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn null_bitmap_size(&self) -> usize {
        if self.fields.iter().any(|f| f.nullable) {
            self.fields.len().div_ceil(8)
        } else {
            0
        }
    }

    pub fn row_size(&self) -> usize {
        self.null_bitmap_size() + self.fields.iter().map(|f| f.ty.size()).sum::<usize>()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Byte offset of a column inside the packed row.
    pub fn offset_of(&self, index: usize) -> usize {
        self.null_bitmap_size()
            + self
                .fields
                .iter()
                .take(index)
                .map(|f| f.ty.size())
                .sum::<usize>()
    }

    /// The narrowed schema over the named columns, in the given order.
    pub fn project(&self, columns: &[String]) -> Result<Schema> {
        let fields = columns
            .iter()
            .map(|name| match self.field(name) {
                Some(field) => Ok(field.clone()),
                None => bail!(Error::NotFound(format!("Column {name}"))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::new(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Schema {
        Schema::new(vec![
            Field::new("id", Types::UInt, false),
            Field::new("name", Types::Char(16), true),
            Field::new("age", Types::Int, false),
        ])
    }

    #[test]
    fn test_row_size_includes_bitmap() {
        let schema = people();
        assert_eq!(schema.null_bitmap_size(), 1);
        assert_eq!(schema.row_size(), 1 + 4 + 16 + 4);

        let no_nulls = Schema::new(vec![Field::new("id", Types::UInt, false)]);
        assert_eq!(no_nulls.null_bitmap_size(), 0);
        assert_eq!(no_nulls.row_size(), 4);
    }

    #[test]
    fn test_offsets() {
        let schema = people();
        assert_eq!(schema.offset_of(0), 1);
        assert_eq!(schema.offset_of(1), 5);
        assert_eq!(schema.offset_of(2), 21);
    }

    #[test]
    fn test_project() -> Result<()> {
        let schema = people();
        let narrowed = schema.project(&["age".into(), "id".into()])?;
        assert_eq!(narrowed.fields.len(), 2);
        assert_eq!(narrowed.fields[0].name, "age");
        assert!(schema.project(&["salary".into()]).is_err());
        Ok(())
    }
}
