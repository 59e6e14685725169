//! Volcano-style execution: every physical operator is a tuple-at-a-time
//! iterator with `open`/`next`/`close`. `next` returns `None` at END and
//! keeps returning it; non-yielding operators (insert, delete, build-index)
//! perform their side effects by draining their source inside `next` and
//! then signal END. Every operator polls the transaction's abort flag on
//! each `next` and releases any held pins in `close`, on every path.

use crate::buffer_pool::{ArcBufferPool, PageHandle};
use crate::catalog::ArcCatalog;
use crate::errors::Error;
use crate::index::key_of;
use crate::logical_plan::expr::{BooleanBinaryExpr, LogicalExpr};
use crate::logical_plan::plan::{IndexScan, LogicalPlan};
use crate::table::table_iterator::TableIterator;
use crate::table::Table;
use crate::tuple::schema::{Field, Schema};
use crate::tuple::{Rid, Tuple};
use crate::txn::TransactionContext;
use crate::types::{Types, Value};
use anyhow::{bail, Result};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

/// Leading columns carrying the record id when a consumer (delete,
/// build-index) needs to address rows physically.
pub const RID_PAGE_COLUMN: &str = "__page_id";
pub const RID_SLOT_COLUMN: &str = "__slot";

fn rid_fields() -> Vec<Field> {
    vec![
        Field::new(RID_PAGE_COLUMN, Types::UInt, false),
        Field::new(RID_SLOT_COLUMN, Types::UInt, false),
    ]
}

fn rid_of(tuple: &Tuple, schema: &Schema) -> Result<Rid> {
    let page = tuple.value_at(0, schema)?.u32();
    let slot = tuple.value_at(1, schema)?.u32();
    Ok((page, slot as u16))
}

pub trait Operator {
    /// Called exactly once before any `next`; opens all children.
    fn open(&mut self) -> Result<()>;
    /// `None` signals END, idempotently.
    fn next(&mut self) -> Result<Option<Tuple>>;
    /// Called exactly once; closes all children and releases held pins.
    fn close(&mut self) -> Result<()>;
    fn schema(&self) -> Schema;
    fn yields_data(&self) -> bool;
}

/// Observer hooks consumed by external executors.
pub trait QueryCallbacks {
    fn on_plan(&mut self, _plan: &LogicalPlan) {}
    fn on_schema(&mut self, _schema: &Schema) {}
    fn on_tuple(&mut self, _tuple: &Tuple) {}
}

/// A callback sink that ignores everything.
#[derive(Debug, Default)]
pub struct NoCallbacks;

impl QueryCallbacks for NoCallbacks {}

/// Drains a compiled operator tree. `open` is paired with `close` on every
/// path, including failures mid-stream. Returns the tuple count.
pub fn run(root: &mut (dyn Operator + '_), callbacks: &mut dyn QueryCallbacks) -> Result<u64> {
    if let Err(e) = root.open() {
        let _ = root.close();
        return Err(e);
    }

    let drained = drain(root, callbacks);
    let closed = root.close();
    let count = drained?;
    closed?;
    Ok(count)
}

fn drain(root: &mut (dyn Operator + '_), callbacks: &mut dyn QueryCallbacks) -> Result<u64> {
    callbacks.on_schema(&root.schema());
    let mut count = 0;
    while let Some(tuple) = root.next()? {
        callbacks.on_tuple(&tuple);
        count += 1;
    }
    Ok(count)
}

impl LogicalPlan {
    /// Compiles the (optimized) logical plan into a physical operator
    /// tree. Operators borrow the transaction context for their lifetime.
    pub fn compile<'t>(
        &self,
        catalog: &ArcCatalog,
        txn: &'t TransactionContext,
    ) -> Result<Box<dyn Operator + 't>> {
        compile_node(self, catalog, txn, false)
    }
}

fn compile_node<'t>(
    plan: &LogicalPlan,
    catalog: &ArcCatalog,
    txn: &'t TransactionContext,
    emit_rid: bool,
) -> Result<Box<dyn Operator + 't>> {
    Ok(match plan {
        LogicalPlan::TableScan(scan) => {
            let table = catalog.read().table(&scan.table_name)?;
            Box::new(TableScanExec::new(
                table,
                scan.projection.as_deref(),
                emit_rid,
                txn,
            )?)
        }
        LogicalPlan::IndexScan(scan) => {
            let table = catalog.read().table(&scan.table_name)?;
            Box::new(IndexScanExec::new(
                catalog.clone(),
                table,
                scan.clone(),
                emit_rid,
                txn,
            ))
        }
        LogicalPlan::Filter(filter) => {
            let child = compile_node(&filter.input, catalog, txn, emit_rid)?;
            Box::new(FilterExec::new(child, filter.predicate.clone(), txn))
        }
        LogicalPlan::Projection(projection) => {
            if emit_rid {
                bail!(Error::Internal(
                    "execution".into(),
                    "a projection cannot supply record ids".into()
                ));
            }
            let child = compile_node(&projection.input, catalog, txn, false)?;
            Box::new(ProjectionExec::new(child, projection.projections.clone(), txn)?)
        }
        LogicalPlan::Limit(limit) => {
            let child = compile_node(&limit.input, catalog, txn, emit_rid)?;
            Box::new(LimitExec::new(child, limit.limit, limit.offset, txn))
        }
        LogicalPlan::Values(values) => {
            if emit_rid {
                bail!(Error::Internal(
                    "execution".into(),
                    "a literal row source cannot supply record ids".into()
                ));
            }
            Box::new(ValuesExec::new(
                values.rows.clone(),
                values.schema.clone(),
                txn,
            ))
        }
        LogicalPlan::Insert(insert) => {
            let child = compile_node(&insert.input, catalog, txn, false)?;
            let table = catalog.read().table(&insert.table_name)?;
            Box::new(InsertExec::new(child, catalog.clone(), table, txn))
        }
        LogicalPlan::Delete(delete) => {
            let child = compile_node(&delete.input, catalog, txn, true)?;
            let table = catalog.read().table(&delete.table_name)?;
            Box::new(DeleteExec::new(child, catalog.clone(), table, txn))
        }
        LogicalPlan::BuildIndex(build) => {
            let create = Box::new(CreateIndexExec {
                catalog: catalog.clone(),
                table_name: build.table_name.clone(),
                column: build.column.clone(),
                index_name: build.index_name.clone(),
                ordered: build.ordered,
                done: false,
            });
            let table = catalog.read().table(&build.table_name)?;
            let source = Box::new(TableScanExec::new(table, None, true, txn)?);
            Box::new(BuildIndexExec::new(
                create,
                source,
                catalog.clone(),
                build.index_name.clone(),
                build.column.clone(),
                txn,
            ))
        }
    })
}

/// Streams the table heap in record-id order.
pub struct TableScanExec<'t> {
    table: Arc<RwLock<Table>>,
    table_schema: Schema,
    schema: Schema,
    columns: Option<Vec<usize>>,
    emit_rid: bool,
    iter: Option<TableIterator>,
    txn: &'t TransactionContext,
}

impl<'t> TableScanExec<'t> {
    fn new(
        table: Arc<RwLock<Table>>,
        projection: Option<&[String]>,
        emit_rid: bool,
        txn: &'t TransactionContext,
    ) -> Result<Self> {
        let table_schema = table.read().schema().clone();

        let columns = match projection {
            Some(names) => Some(
                names
                    .iter()
                    .map(|name| match table_schema.field_index(name) {
                        Some(index) => Ok(index),
                        None => bail!(Error::NotFound(format!("Column {name}"))),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        let mut fields = if emit_rid { rid_fields() } else { vec![] };
        match &columns {
            Some(indices) => {
                fields.extend(indices.iter().map(|i| table_schema.fields[*i].clone()))
            }
            None => fields.extend(table_schema.fields.iter().cloned()),
        }

        Ok(Self {
            table,
            table_schema,
            schema: Schema::new(fields),
            columns,
            emit_rid,
            iter: None,
            txn,
        })
    }
}

impl Operator for TableScanExec<'_> {
    fn open(&mut self) -> Result<()> {
        self.iter = Some(self.table.read().iter()?);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.txn.is_aborted() {
            return Ok(None);
        }
        let iter = match self.iter.as_mut() {
            Some(iter) => iter,
            None => return Ok(None),
        };

        let ((page_id, slot), tuple) = match iter.next() {
            Some(entry) => entry?,
            None => {
                self.iter = None;
                return Ok(None);
            }
        };

        if !self.emit_rid && self.columns.is_none() {
            return Ok(Some(tuple));
        }

        let mut values = Vec::with_capacity(self.schema.fields.len());
        if self.emit_rid {
            values.push(Value::UInt(page_id));
            values.push(Value::UInt(slot as u32));
        }
        match &self.columns {
            Some(indices) => {
                for index in indices {
                    values.push(tuple.value_at(*index, &self.table_schema)?);
                }
            }
            None => values.extend(tuple.values(&self.table_schema)?),
        }
        Ok(Some(Tuple::new(values, &self.schema)?))
    }

    fn close(&mut self) -> Result<()> {
        self.iter = None;
        Ok(())
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn yields_data(&self) -> bool {
        true
    }
}

/// Probes an index for a key or range and fetches the matching tuples.
pub struct IndexScanExec<'t> {
    catalog: ArcCatalog,
    table: Arc<RwLock<Table>>,
    plan: IndexScan,
    schema: Schema,
    table_schema: Schema,
    emit_rid: bool,
    rids: VecDeque<Rid>,
    txn: &'t TransactionContext,
}

impl<'t> IndexScanExec<'t> {
    fn new(
        catalog: ArcCatalog,
        table: Arc<RwLock<Table>>,
        plan: IndexScan,
        emit_rid: bool,
        txn: &'t TransactionContext,
    ) -> Self {
        let table_schema = table.read().schema().clone();
        let mut fields = if emit_rid { rid_fields() } else { vec![] };
        fields.extend(table_schema.fields.iter().cloned());

        Self {
            catalog,
            table,
            plan,
            schema: Schema::new(fields),
            table_schema,
            emit_rid,
            rids: VecDeque::new(),
            txn,
        }
    }

    fn bounds(&self) -> Result<(Bound<i64>, Bound<i64>)> {
        let from = match &self.plan.from {
            Some(value) if self.plan.include_from => Bound::Included(key_of(value)?),
            Some(value) => Bound::Excluded(key_of(value)?),
            None => Bound::Unbounded,
        };
        let to = match &self.plan.to {
            Some(value) if self.plan.include_to => Bound::Included(key_of(value)?),
            Some(value) => Bound::Excluded(key_of(value)?),
            None => Bound::Unbounded,
        };
        Ok((from, to))
    }
}

impl Operator for IndexScanExec<'_> {
    fn open(&mut self) -> Result<()> {
        let catalog = self.catalog.read();
        let info = catalog.index(&self.plan.index_name)?;

        // an equality probe works on hash indexes too; ranges need order
        let equality = self.plan.from == self.plan.to
            && self.plan.from.is_some()
            && self.plan.include_from
            && self.plan.include_to;

        self.rids = if equality {
            let key = match &self.plan.from {
                Some(value) => key_of(value)?,
                None => unreachable!("equality implies a key"),
            };
            info.index.get(key).into_iter().collect()
        } else {
            let (from, to) = self.bounds()?;
            info.index.range(from, to)?.into()
        };
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.txn.is_aborted() {
            return Ok(None);
        }
        while let Some(rid) = self.rids.pop_front() {
            // a probe that races an erasure simply has no matching tuple
            let tuple = match self.table.read().lookup(rid)? {
                Some(tuple) => tuple,
                None => continue,
            };
            if !self.emit_rid {
                return Ok(Some(tuple));
            }

            let mut values = vec![Value::UInt(rid.0), Value::UInt(rid.1 as u32)];
            values.extend(tuple.values(&self.table_schema)?);
            return Ok(Some(Tuple::new(values, &self.schema)?));
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.rids.clear();
        Ok(())
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn yields_data(&self) -> bool {
        true
    }
}

/// Passes child tuples satisfying the predicate.
pub struct FilterExec<'t> {
    child: Box<dyn Operator + 't>,
    predicate: BooleanBinaryExpr,
    schema: Schema,
    txn: &'t TransactionContext,
}

impl<'t> FilterExec<'t> {
    fn new(
        child: Box<dyn Operator + 't>,
        predicate: BooleanBinaryExpr,
        txn: &'t TransactionContext,
    ) -> Self {
        let schema = child.schema();
        Self {
            child,
            predicate,
            schema,
            txn,
        }
    }
}

impl Operator for FilterExec<'_> {
    fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.txn.is_aborted() {
            return Ok(None);
        }
        while let Some(tuple) = self.child.next()? {
            if self.predicate.evaluate(&tuple, &self.schema)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn yields_data(&self) -> bool {
        true
    }
}

/// Emits one narrowed tuple per input tuple.
pub struct ProjectionExec<'t> {
    child: Box<dyn Operator + 't>,
    projections: Vec<LogicalExpr>,
    input_schema: Schema,
    schema: Schema,
    txn: &'t TransactionContext,
}

impl<'t> ProjectionExec<'t> {
    fn new(
        child: Box<dyn Operator + 't>,
        projections: Vec<LogicalExpr>,
        txn: &'t TransactionContext,
    ) -> Result<Self> {
        let input_schema = child.schema();
        let fields = projections
            .iter()
            .map(|expr| expr.to_field(&input_schema))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            child,
            projections,
            input_schema,
            schema: Schema::new(fields),
            txn,
        })
    }
}

impl Operator for ProjectionExec<'_> {
    fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.txn.is_aborted() {
            return Ok(None);
        }
        match self.child.next()? {
            Some(tuple) => {
                let values = self
                    .projections
                    .iter()
                    .map(|expr| expr.evaluate(&tuple, &self.input_schema))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Tuple::new(values, &self.schema)?))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn yields_data(&self) -> bool {
        true
    }
}

/// Drops `offset` tuples, then emits up to `limit`.
pub struct LimitExec<'t> {
    child: Box<dyn Operator + 't>,
    limit: usize,
    offset: usize,
    skipped: usize,
    emitted: usize,
    schema: Schema,
    txn: &'t TransactionContext,
}

impl<'t> LimitExec<'t> {
    fn new(
        child: Box<dyn Operator + 't>,
        limit: usize,
        offset: usize,
        txn: &'t TransactionContext,
    ) -> Self {
        let schema = child.schema();
        Self {
            child,
            limit,
            offset,
            skipped: 0,
            emitted: 0,
            schema,
            txn,
        }
    }
}

impl Operator for LimitExec<'_> {
    fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.txn.is_aborted() || self.emitted >= self.limit {
            return Ok(None);
        }
        while self.skipped < self.offset {
            match self.child.next()? {
                Some(_) => self.skipped += 1,
                None => {
                    self.emitted = self.limit;
                    return Ok(None);
                }
            }
        }
        match self.child.next()? {
            Some(tuple) => {
                self.emitted += 1;
                Ok(Some(tuple))
            }
            None => {
                self.emitted = self.limit;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn yields_data(&self) -> bool {
        true
    }
}

/// Literal row source.
pub struct ValuesExec<'t> {
    rows: Vec<Vec<LogicalExpr>>,
    schema: Schema,
    cursor: usize,
    txn: &'t TransactionContext,
}

impl<'t> ValuesExec<'t> {
    fn new(rows: Vec<Vec<LogicalExpr>>, schema: Schema, txn: &'t TransactionContext) -> Self {
        Self {
            rows,
            schema,
            cursor: 0,
            txn,
        }
    }
}

impl Operator for ValuesExec<'_> {
    fn open(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.txn.is_aborted() || self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let row = &self.rows[self.cursor];
        self.cursor += 1;

        let empty = Tuple::from_bytes(&[]);
        let values = row
            .iter()
            .map(|expr| expr.evaluate(&empty, &Schema::default()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Tuple::new(values, &self.schema)?))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn yields_data(&self) -> bool {
        true
    }
}

/// Drains its child and appends every tuple to the table, maintaining any
/// indexes over it. The target page stays pinned between consecutive
/// inserts that land on it; the pin moves on page switch and is released
/// in `close` on all paths.
pub struct InsertExec<'t> {
    child: Box<dyn Operator + 't>,
    catalog: ArcCatalog,
    table: Arc<RwLock<Table>>,
    bpm: ArcBufferPool,
    table_schema: Schema,
    child_schema: Schema,
    /// (index name, column position) pairs resolved at `open`.
    indexed_columns: Vec<(String, usize)>,
    pinned: Option<PageHandle>,
    done: bool,
    txn: &'t TransactionContext,
}

impl<'t> InsertExec<'t> {
    fn new(
        child: Box<dyn Operator + 't>,
        catalog: ArcCatalog,
        table: Arc<RwLock<Table>>,
        txn: &'t TransactionContext,
    ) -> Self {
        let guard = table.read();
        let table_schema = guard.schema().clone();
        let bpm = guard.buffer_pool().clone();
        drop(guard);

        let child_schema = child.schema();
        Self {
            child,
            catalog,
            table,
            bpm,
            table_schema,
            child_schema,
            indexed_columns: Vec::new(),
            pinned: None,
            done: false,
            txn,
        }
    }

    fn insert_one(&mut self, values: Vec<Value>) -> Result<Rid> {
        for (index, field) in self.table_schema.fields.iter().enumerate() {
            if !field.nullable && values[index].is_null() {
                bail!(Error::SchemaMismatch(format!(
                    "NULL for non-nullable column {}",
                    field.name
                )));
            }
        }

        // uniqueness first, so a rejected tuple leaves no trace in the heap
        let mut keys = Vec::with_capacity(self.indexed_columns.len());
        {
            let catalog = self.catalog.read();
            for (name, column) in &self.indexed_columns {
                if values[*column].is_null() {
                    keys.push(None);
                    continue;
                }
                let key = key_of(&values[*column])?;
                if catalog.index(name)?.index.get(key).is_some() {
                    bail!(Error::DuplicateKey(
                        values[*column].to_string(),
                        format!("index {name}")
                    ));
                }
                keys.push(Some(key));
            }
        }

        let tuple = Tuple::new(values, &self.table_schema)?;
        let rid = self
            .table
            .write()
            .insert_with_pin(&tuple, &mut self.pinned)?;

        let mut catalog = self.catalog.write();
        for ((name, _), key) in self.indexed_columns.iter().zip(keys) {
            if let Some(key) = key {
                catalog.index_mut(name)?.index.insert(key, rid)?;
            }
        }
        Ok(rid)
    }
}

impl Operator for InsertExec<'_> {
    fn open(&mut self) -> Result<()> {
        if self.child_schema.fields.len() != self.table_schema.fields.len() {
            bail!(Error::SchemaMismatch(format!(
                "expected {} columns, got {}",
                self.table_schema.fields.len(),
                self.child_schema.fields.len()
            )));
        }

        let table_name = self.table.read().name.clone();
        let catalog = self.catalog.read();
        self.indexed_columns = catalog
            .indexes_on(&table_name)
            .into_iter()
            .map(|name| {
                let column = catalog.index(&name)?.column.clone();
                match self.table_schema.field_index(&column) {
                    Some(position) => Ok((name, position)),
                    None => bail!(Error::Internal(
                        "execution".into(),
                        format!("index {name} covers unknown column {column}")
                    )),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        drop(catalog);

        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }

        let mut inserted = 0u64;
        while !self.txn.is_aborted() {
            let tuple = match self.child.next()? {
                Some(tuple) => tuple,
                None => break,
            };
            // re-encode against the table schema: the child's layout may
            // differ in null-bitmap width
            let values = tuple.values(&self.child_schema)?;
            self.insert_one(values)?;
            inserted += 1;
        }

        debug!(rows = inserted, "insert drained its source");
        self.done = true;
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.pinned.take() {
            self.bpm.lock().unfix(handle, true);
        }
        self.child.close()
    }

    fn schema(&self) -> Schema {
        Schema::default()
    }

    fn yields_data(&self) -> bool {
        false
    }
}

/// Drains a record-id-bearing child and tombstones every addressed row,
/// removing index entries alongside. Pin handling mirrors [`InsertExec`].
pub struct DeleteExec<'t> {
    child: Box<dyn Operator + 't>,
    catalog: ArcCatalog,
    table: Arc<RwLock<Table>>,
    bpm: ArcBufferPool,
    child_schema: Schema,
    indexed_columns: Vec<(String, usize)>,
    pinned: Option<PageHandle>,
    done: bool,
    txn: &'t TransactionContext,
}

impl<'t> DeleteExec<'t> {
    fn new(
        child: Box<dyn Operator + 't>,
        catalog: ArcCatalog,
        table: Arc<RwLock<Table>>,
        txn: &'t TransactionContext,
    ) -> Self {
        let bpm = table.read().buffer_pool().clone();
        let child_schema = child.schema();
        Self {
            child,
            catalog,
            table,
            bpm,
            child_schema,
            indexed_columns: Vec::new(),
            pinned: None,
            done: false,
            txn,
        }
    }
}

impl Operator for DeleteExec<'_> {
    fn open(&mut self) -> Result<()> {
        let table_name = self.table.read().name.clone();
        let catalog = self.catalog.read();
        self.indexed_columns = catalog
            .indexes_on(&table_name)
            .into_iter()
            .map(|name| {
                let column = catalog.index(&name)?.column.clone();
                match self.child_schema.field_index(&column) {
                    Some(position) => Ok((name, position)),
                    None => bail!(Error::Internal(
                        "execution".into(),
                        format!("delete source does not carry indexed column {column}")
                    )),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        drop(catalog);

        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }

        let mut deleted = 0u64;
        while !self.txn.is_aborted() {
            let row = match self.child.next()? {
                Some(row) => row,
                None => break,
            };
            let rid = rid_of(&row, &self.child_schema)?;
            self.table.write().erase_with_pin(rid, &mut self.pinned)?;

            let mut catalog = self.catalog.write();
            for (name, column) in &self.indexed_columns {
                let value = row.value_at(*column, &self.child_schema)?;
                if !value.is_null() {
                    catalog.index_mut(name)?.index.remove(key_of(&value)?);
                }
            }
            deleted += 1;
        }

        debug!(rows = deleted, "delete drained its source");
        self.done = true;
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.pinned.take() {
            self.bpm.lock().unfix(handle, true);
        }
        self.child.close()
    }

    fn schema(&self) -> Schema {
        Schema::default()
    }

    fn yields_data(&self) -> bool {
        false
    }
}

/// Registers an empty index in the catalog. Used as the left child of
/// [`BuildIndexExec`]; the registration happens on the first `next`.
pub struct CreateIndexExec {
    catalog: ArcCatalog,
    table_name: String,
    column: String,
    index_name: String,
    ordered: bool,
    done: bool,
}

impl Operator for CreateIndexExec {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.done {
            self.catalog.write().create_index(
                &self.index_name,
                &self.table_name,
                &self.column,
                self.ordered,
            )?;
            self.done = true;
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn schema(&self) -> Schema {
        Schema::default()
    }

    fn yields_data(&self) -> bool {
        false
    }
}

/// Binary operator: the left child registers the index and is fully
/// drained during `open`; the right child streams the table's rows during
/// `next`, inserting (key, record id) pairs.
pub struct BuildIndexExec<'t> {
    create: Box<dyn Operator + 't>,
    source: Box<dyn Operator + 't>,
    source_schema: Schema,
    catalog: ArcCatalog,
    index_name: String,
    column: String,
    create_closed: bool,
    done: bool,
    txn: &'t TransactionContext,
}

impl<'t> BuildIndexExec<'t> {
    fn new(
        create: Box<dyn Operator + 't>,
        source: Box<dyn Operator + 't>,
        catalog: ArcCatalog,
        index_name: String,
        column: String,
        txn: &'t TransactionContext,
    ) -> Self {
        let source_schema = source.schema();
        Self {
            create,
            source,
            source_schema,
            catalog,
            index_name,
            column,
            create_closed: false,
            done: false,
            txn,
        }
    }
}

impl Operator for BuildIndexExec<'_> {
    fn open(&mut self) -> Result<()> {
        self.create.open()?;
        let drained = (|| -> Result<()> {
            while self.create.next()?.is_some() {}
            Ok(())
        })();
        let closed = self.create.close();
        self.create_closed = true;
        drained?;
        closed?;

        self.source.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }

        let column = match self.source_schema.field_index(&self.column) {
            Some(position) => position,
            None => bail!(Error::NotFound(format!("Column {}", self.column))),
        };

        let mut indexed = 0u64;
        while !self.txn.is_aborted() {
            let row = match self.source.next()? {
                Some(row) => row,
                None => break,
            };
            let rid = rid_of(&row, &self.source_schema)?;
            let value = row.value_at(column, &self.source_schema)?;
            if value.is_null() {
                continue;
            }
            self.catalog
                .write()
                .index_mut(&self.index_name)?
                .index
                .insert(key_of(&value)?, rid)?;
            indexed += 1;
        }

        debug!(entries = indexed, index = %self.index_name, "built index");
        self.done = true;
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        if !self.create_closed {
            self.create_closed = true;
            self.create.close()?;
        }
        self.source.close()
    }

    fn schema(&self) -> Schema {
        Schema::default()
    }

    fn yields_data(&self) -> bool {
        false
    }
}
