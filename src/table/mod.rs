pub mod table_iterator;

use crate::buffer_pool::{AccessMode, ArcBufferPool, PageHandle, PageKey};
use crate::disk_manager::FileId;
use crate::errors::Error;
use crate::pages::table_page::{TablePage, TablePageRef, HEADER_SIZE, SLOT_SIZE};
use crate::pages::{PageId, PageType, INVALID_PAGE_ID, PAGE_SIZE};
use crate::tuple::schema::Schema;
use crate::tuple::{Rid, Tuple};
use anyhow::{bail, Result};
use table_iterator::TableIterator;
use tracing::debug;

/// The slotted heap of one table: a doubly-linked chain of data pages in
/// the table's backing file. Rows are fixed-width (schema-determined), so
/// erased slots can always be reused by later inserts.
pub struct Table {
    pub name: String,
    file: FileId,
    first_page: PageId,
    last_page: PageId,
    record_count: u64,
    schema: Schema,
    bpm: ArcBufferPool,
}

impl Table {
    pub fn new(bpm: ArcBufferPool, name: &str, schema: &Schema) -> Result<Self> {
        if schema.row_size() > PAGE_SIZE - HEADER_SIZE - SLOT_SIZE {
            bail!(Error::SchemaMismatch(format!(
                "rows of table {name} would not fit a page"
            )));
        }

        let file = bpm.lock().create_file(&format!("{name}.data"))?;

        let mut guard = bpm.lock();
        let mut handle = guard.new_page(file, PageType::Data)?;
        let page_id = handle.page_id();
        TablePage::new(handle.writer()).init(page_id, INVALID_PAGE_ID, INVALID_PAGE_ID);
        guard.unfix(handle, true);
        drop(guard);

        debug!(table = name, page_id, "created table heap");

        Ok(Self {
            name: name.to_string(),
            file,
            first_page: page_id,
            last_page: page_id,
            record_count: 0,
            schema: schema.clone(),
            bpm: bpm.clone(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn file_id(&self) -> FileId {
        self.file
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page
    }

    pub fn last_page_id(&self) -> PageId {
        self.last_page
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub(crate) fn buffer_pool(&self) -> &ArcBufferPool {
        &self.bpm
    }

    /// Appends a tuple, reusing a tombstoned slot when one fits. The page
    /// search starts at the tail of the chain; a full tail grows the chain
    /// by one page.
    pub fn insert(&mut self, tuple: &Tuple) -> Result<Rid> {
        let mut pin = None;
        let rid = self.insert_with_pin(tuple, &mut pin);
        if let Some(handle) = pin.take() {
            self.bpm.lock().unfix(handle, true);
        }
        rid
    }

    /// Insert through a caller-held pin on the target page. When the pin
    /// already covers the tail page the refix is skipped; on a page switch
    /// the old pin is released dirty. The caller owns the final pin and
    /// must unfix it (dirty) when done.
    pub fn insert_with_pin(&mut self, tuple: &Tuple, pin: &mut Option<PageHandle>) -> Result<Rid> {
        loop {
            if pin.as_ref().map(|handle| handle.page_id()) != Some(self.last_page) {
                if let Some(old) = pin.take() {
                    self.bpm.lock().unfix(old, true);
                }
                let key = PageKey::new(self.file, self.last_page);
                *pin = Some(self.bpm.lock().fix(key, AccessMode::Write)?);
            }

            let slot = {
                let handle = pin.as_mut().expect("pinned above");
                TablePage::new(handle.writer()).insert(tuple.data())
            };
            if let Some(slot) = slot {
                self.record_count += 1;
                return Ok((self.last_page, slot));
            }

            // tail page is full, extend the chain
            let mut guard = self.bpm.lock();
            let mut new_handle = guard.new_page(self.file, PageType::Data)?;
            let new_page_id = new_handle.page_id();
            TablePage::new(new_handle.writer()).init(new_page_id, self.last_page, INVALID_PAGE_ID);

            if let Some(mut old) = pin.take() {
                TablePage::new(old.writer()).set_next_page_id(new_page_id);
                guard.unfix(old, true);
            }
            drop(guard);

            self.last_page = new_page_id;
            *pin = Some(new_handle);
        }
    }

    /// Tombstones the slot. The space is not compacted; a later insert of
    /// this table's row width may reclaim it.
    pub fn erase(&mut self, rid: Rid) -> Result<()> {
        let mut pin = None;
        let result = self.erase_with_pin(rid, &mut pin);
        if let Some(handle) = pin.take() {
            self.bpm.lock().unfix(handle, true);
        }
        result
    }

    /// Erase through a caller-held pin, switching it to the target page
    /// when necessary. Same ownership contract as [`Self::insert_with_pin`].
    pub fn erase_with_pin(&mut self, rid: Rid, pin: &mut Option<PageHandle>) -> Result<()> {
        let (page_id, slot) = rid;

        if pin.as_ref().map(|handle| handle.page_id()) != Some(page_id) {
            if let Some(old) = pin.take() {
                self.bpm.lock().unfix(old, true);
            }
            let key = PageKey::new(self.file, page_id);
            *pin = Some(self.bpm.lock().fix(key, AccessMode::Write)?);
        }

        let handle = pin.as_mut().expect("pinned above");
        if TablePage::new(handle.writer()).erase(slot) {
            self.record_count -= 1;
            Ok(())
        } else {
            bail!(Error::NotFound(format!("Record ({page_id}, {slot})")))
        }
    }

    /// Direct fetch by record id; `None` for tombstoned slots.
    pub fn lookup(&self, rid: Rid) -> Result<Option<Tuple>> {
        let (page_id, slot) = rid;
        let key = PageKey::new(self.file, page_id);

        let handle = self.bpm.lock().fix(key, AccessMode::Read)?;
        let tuple = TablePageRef::new(handle.reader())
            .read(slot)
            .map(Tuple::from_bytes);
        self.bpm.lock().unfix(handle, false);
        Ok(tuple)
    }

    /// Lazy scan over all live records in chain order, then slot order.
    pub fn iter(&self) -> Result<TableIterator> {
        TableIterator::new(self)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::buffer_pool::tests::test_arc_bpm;
    use crate::lit;
    use crate::tuple::schema::Field;
    use crate::types::{Types, Value};
    use tempfile::TempDir;

    pub fn test_table(frames: usize, schema: &Schema) -> Result<(TempDir, Table)> {
        let (dir, bpm) = test_arc_bpm(frames)?;
        let table = Table::new(bpm, "test", schema)?;
        Ok((dir, table))
    }

    fn two_column_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", Types::UInt, false),
            Field::new("tag", Types::Char(4), false),
        ])
    }

    fn row(table: &Table, id: u32, tag: &str) -> Result<Tuple> {
        Tuple::new(
            vec![lit!(UInt, id.to_string())?, lit!(Char(4), tag)?],
            table.schema(),
        )
    }

    #[test]
    fn test_erase_then_reuse_slot() -> Result<()> {
        let schema = two_column_schema();
        let (_dir, mut table) = test_table(3, &schema)?;

        let t1 = table.insert(&row(&table, 1, "a")?)?;
        let t2 = table.insert(&row(&table, 2, "b")?)?;
        table.erase(t1)?;
        let t3 = table.insert(&row(&table, 3, "c")?)?;

        // the erased slot is reclaimed
        assert_eq!(t3, t1);
        assert_eq!(table.record_count(), 2);

        let mut ids = vec![];
        for entry in table.iter()? {
            let (rid, tuple) = entry?;
            ids.push((rid, tuple.value_of("id", &schema)?));
        }
        assert_eq!(ids, vec![(t3, Value::UInt(3)), (t2, Value::UInt(2))]);
        Ok(())
    }

    #[test]
    fn test_lookup() -> Result<()> {
        let schema = two_column_schema();
        let (_dir, mut table) = test_table(3, &schema)?;

        let rid = table.insert(&row(&table, 9, "hi")?)?;
        let tuple = table.lookup(rid)?.expect("record is live");
        assert_eq!(tuple.value_of("tag", &schema)?, Value::Char("hi".into()));

        table.erase(rid)?;
        assert!(table.lookup(rid)?.is_none());
        Ok(())
    }

    #[test]
    fn test_chain_grows_and_scan_sees_all() -> Result<()> {
        let schema = two_column_schema();
        let (_dir, mut table) = test_table(4, &schema)?;

        let per_page = (PAGE_SIZE - HEADER_SIZE) / (schema.row_size() + SLOT_SIZE);
        let total = per_page * 2 + 3;

        for i in 0..total {
            table.insert(&row(&table, i as u32, "x")?)?;
        }
        assert_ne!(table.first_page_id(), table.last_page_id());
        assert_eq!(table.record_count(), total as u64);

        let mut seen = 0u32;
        for entry in table.iter()? {
            let (_, tuple) = entry?;
            assert_eq!(tuple.value_of("id", &schema)?, Value::UInt(seen));
            seen += 1;
        }
        assert_eq!(seen as usize, total);

        // no pins left behind by inserts or the scan
        let bpm = table.buffer_pool().clone();
        let key = PageKey::new(table.file_id(), table.first_page_id());
        assert_eq!(bpm.lock().pin_count(&key), Some(0));
        Ok(())
    }

    #[test]
    fn test_insert_with_pin_keeps_page_pinned() -> Result<()> {
        let schema = two_column_schema();
        let (_dir, mut table) = test_table(4, &schema)?;

        let mut pin = None;
        table.insert_with_pin(&row(&table, 1, "a")?, &mut pin)?;
        table.insert_with_pin(&row(&table, 2, "b")?, &mut pin)?;

        let key = PageKey::new(table.file_id(), table.last_page_id());
        assert_eq!(table.buffer_pool().lock().pin_count(&key), Some(1));

        let handle = pin.take().expect("held across inserts");
        table.buffer_pool().lock().unfix(handle, true);
        assert_eq!(table.buffer_pool().lock().pin_count(&key), Some(0));
        Ok(())
    }

    #[test]
    fn test_erase_missing_record() -> Result<()> {
        let schema = two_column_schema();
        let (_dir, mut table) = test_table(3, &schema)?;

        let rid = table.insert(&row(&table, 1, "a")?)?;
        table.erase(rid)?;
        assert!(table.erase(rid).is_err());
        Ok(())
    }
}
