use crate::buffer_pool::{ArcBufferPool, BufferPoolManager};
use crate::catalog::{ArcCatalog, Catalog};
use crate::config::Config;
use crate::errors::Error;
use crate::execution::{run, QueryCallbacks};
use crate::logical_plan::optimizer::Optimizer;
use crate::logical_plan::plan::LogicalPlan;
use crate::txn::TransactionContext;
use anyhow::{bail, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// The engine context: owns the configuration, the process-wide buffer
/// pool, the catalog and the optimizer, and issues transaction ids.
/// External callers (server, front end) hold one of these and borrow a
/// [`TransactionContext`] into every statement they execute.
pub struct Database {
    config: Config,
    bpm: ArcBufferPool,
    catalog: ArcCatalog,
    optimizer: Optimizer,
    next_txn_id: AtomicU64,
}

impl Database {
    pub fn open(config: Config, path: impl AsRef<Path>) -> Result<Self> {
        config.validate()?;

        let bpm = BufferPoolManager::shared(&config, path.as_ref())?;
        let catalog = Catalog::shared(bpm.clone());
        let optimizer = Optimizer::new(catalog.clone());

        debug!(
            frames = config.buffer_pool_frames,
            strategy = ?config.replacement_strategy,
            "opened database"
        );

        Ok(Self {
            config,
            bpm,
            catalog,
            optimizer,
            next_txn_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn buffer_pool(&self) -> ArcBufferPool {
        self.bpm.clone()
    }

    pub fn catalog(&self) -> ArcCatalog {
        self.catalog.clone()
    }

    pub fn begin(&self) -> TransactionContext {
        TransactionContext::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Optimizes, compiles and drains one statement, reporting the plan,
    /// schema and tuples through the callbacks. Returns the tuple count.
    pub fn execute(
        &self,
        plan: &LogicalPlan,
        txn: &TransactionContext,
        callbacks: &mut dyn QueryCallbacks,
    ) -> Result<u64> {
        if txn.is_aborted() {
            bail!(Error::Aborted);
        }

        let optimized = self.optimizer.optimize(plan)?;
        callbacks.on_plan(&optimized);

        let mut root = optimized.compile(&self.catalog, txn)?;
        run(root.as_mut(), callbacks)
    }

    /// Writes every dirty page through to disk.
    pub fn checkpoint(&self) -> Result<()> {
        self.bpm.lock().flush_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::NoCallbacks;
    use crate::lit;
    use crate::logical_plan::expr::LogicalExpr;
    use crate::logical_plan::plan::{Insert, TableScan, Values};
    use crate::tuple::schema::{Field, Schema};
    use crate::types::Types;
    use tempfile::tempdir;

    fn items_schema() -> Schema {
        Schema::new(vec![Field::new("id", Types::UInt, false)])
    }

    #[test]
    fn test_open_and_execute() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(Config::default(), dir.path())?;

        db.catalog().write().create_table("items", &items_schema())?;

        let rows = (0..5)
            .map(|i| Ok(vec![LogicalExpr::Literal(lit!(UInt, i.to_string())?)]))
            .collect::<Result<Vec<_>>>()?;
        let insert = LogicalPlan::Insert(Insert::new(
            LogicalPlan::Values(Values::new(rows, items_schema())),
            "items",
        ));

        let txn = db.begin();
        db.execute(&insert, &txn, &mut NoCallbacks)?;

        let txn = db.begin();
        let count = db.execute(
            &LogicalPlan::TableScan(TableScan::new("items")),
            &txn,
            &mut NoCallbacks,
        )?;
        assert_eq!(count, 5);

        db.checkpoint()?;
        Ok(())
    }

    #[test]
    fn test_txn_ids_are_monotone() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(Config::default(), dir.path())?;

        let a = db.begin();
        let b = db.begin();
        assert!(b.id() > a.id());
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let config = Config {
            buffer_pool_frames: 0,
            ..Config::default()
        };
        assert!(Database::open(config, dir.path()).is_err());
    }
}
