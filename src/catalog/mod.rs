use crate::buffer_pool::ArcBufferPool;
use crate::errors::Error;
use crate::index::{HashIndex, Index, OrderedIndex};
use crate::table::Table;
use crate::tuple::schema::Schema;
use anyhow::{bail, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub type ArcCatalog = Arc<RwLock<Catalog>>;

/// A registered secondary index: which table/column it covers plus the
/// index itself.
#[derive(Debug)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub column: String,
    pub index: Box<dyn Index>,
}

/// In-memory registry of tables and indexes. Loading the registry from the
/// system tables at startup is the catalog bootstrap's job, which lives
/// outside this crate; everything here operates on the running process.
pub struct Catalog {
    tables: HashMap<String, Arc<RwLock<Table>>>,
    indexes: HashMap<String, IndexInfo>,
    bpm: ArcBufferPool,
}

impl Catalog {
    pub fn new(bpm: ArcBufferPool) -> Self {
        Self {
            tables: HashMap::new(),
            indexes: HashMap::new(),
            bpm,
        }
    }

    pub fn shared(bpm: ArcBufferPool) -> ArcCatalog {
        Arc::new(RwLock::new(Self::new(bpm)))
    }

    pub fn create_table(&mut self, name: &str, schema: &Schema) -> Result<Arc<RwLock<Table>>> {
        if self.tables.contains_key(name) {
            bail!(Error::DuplicateKey(name.into(), "table registry".into()));
        }

        let table = Arc::new(RwLock::new(Table::new(self.bpm.clone(), name, schema)?));
        self.tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    pub fn table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        match self.tables.get(name) {
            Some(table) => Ok(table.clone()),
            None => bail!(Error::NotFound(format!("Table {name}"))),
        }
    }

    /// Registers an empty index over `table.column` and reserves its
    /// backing file. Populating it is the build-index operator's job.
    pub fn create_index(
        &mut self,
        index_name: &str,
        table_name: &str,
        column: &str,
        ordered: bool,
    ) -> Result<()> {
        if self.indexes.contains_key(index_name) {
            bail!(Error::DuplicateKey(index_name.into(), "index registry".into()));
        }

        let table = self.table(table_name)?;
        let table = table.read();
        match table.schema().field(column) {
            Some(_) => {}
            None => bail!(Error::NotFound(format!(
                "Column {column} of table {table_name}"
            ))),
        }

        self.bpm.lock().create_file(&format!("{index_name}.idx"))?;

        let index: Box<dyn Index> = if ordered {
            Box::new(OrderedIndex::new(index_name))
        } else {
            Box::new(HashIndex::new(index_name))
        };

        debug!(index = index_name, table = table_name, column, "created index");
        self.indexes.insert(
            index_name.to_string(),
            IndexInfo {
                name: index_name.to_string(),
                table: table_name.to_string(),
                column: column.to_string(),
                index,
            },
        );
        Ok(())
    }

    pub fn index(&self, name: &str) -> Result<&IndexInfo> {
        match self.indexes.get(name) {
            Some(info) => Ok(info),
            None => bail!(Error::NotFound(format!("Index {name}"))),
        }
    }

    pub fn index_mut(&mut self, name: &str) -> Result<&mut IndexInfo> {
        match self.indexes.get_mut(name) {
            Some(info) => Ok(info),
            None => bail!(Error::NotFound(format!("Index {name}"))),
        }
    }

    /// The index covering `table.column`, if one is registered.
    pub fn index_on(&self, table: &str, column: &str) -> Option<&IndexInfo> {
        self.indexes
            .values()
            .find(|info| info.table == table && info.column == column)
    }

    /// Names of every index over the given table, for maintenance on
    /// insert and delete.
    pub fn indexes_on(&self, table: &str) -> Vec<String> {
        self.indexes
            .values()
            .filter(|info| info.table == table)
            .map(|info| info.name.clone())
            .collect()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::buffer_pool::tests::test_arc_bpm;
    use crate::tuple::schema::Field;
    use crate::types::Types;
    use tempfile::TempDir;

    pub fn test_catalog(frames: usize) -> Result<(TempDir, ArcCatalog)> {
        let (dir, bpm) = test_arc_bpm(frames)?;
        Ok((dir, Catalog::shared(bpm)))
    }

    fn users_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", Types::UInt, false),
            Field::new("name", Types::Char(8), true),
        ])
    }

    #[test]
    fn test_table_registry() -> Result<()> {
        let (_dir, catalog) = test_catalog(4)?;
        catalog.write().create_table("users", &users_schema())?;

        assert!(catalog.read().table("users").is_ok());
        assert!(catalog.read().table("ghosts").is_err());
        assert!(catalog
            .write()
            .create_table("users", &users_schema())
            .is_err());
        Ok(())
    }

    #[test]
    fn test_index_registry() -> Result<()> {
        let (_dir, catalog) = test_catalog(4)?;
        catalog.write().create_table("users", &users_schema())?;
        catalog
            .write()
            .create_index("users_id", "users", "id", true)?;

        assert!(catalog.read().index_on("users", "id").is_some());
        assert!(catalog.read().index_on("users", "name").is_none());
        assert_eq!(catalog.read().indexes_on("users"), vec!["users_id"]);

        // duplicate name, missing table, missing column
        assert!(catalog
            .write()
            .create_index("users_id", "users", "id", true)
            .is_err());
        assert!(catalog
            .write()
            .create_index("x", "ghosts", "id", true)
            .is_err());
        assert!(catalog
            .write()
            .create_index("y", "users", "salary", true)
            .is_err());
        Ok(())
    }
}
