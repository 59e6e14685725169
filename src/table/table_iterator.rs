use super::Table;
use crate::buffer_pool::{AccessMode, ArcBufferPool, PageHandle, PageKey};
use crate::disk_manager::FileId;
use crate::pages::table_page::TablePageRef;
use crate::pages::{PageId, SlotId, INVALID_PAGE_ID};
use crate::tuple::{Rid, Tuple};
use anyhow::Result;

/// Walks the page chain slot by slot, skipping tombstones. Holds a pin on
/// exactly one page at a time; the pin moves on page switch and is dropped
/// on exhaustion, on error, or when the iterator itself is dropped.
pub struct TableIterator {
    bpm: ArcBufferPool,
    file: FileId,
    handle: Option<PageHandle>,
    next_page: PageId,
    slot_count: u16,
    current_slot: SlotId,
}

impl TableIterator {
    pub(crate) fn new(table: &Table) -> Result<Self> {
        let key = PageKey::new(table.file_id(), table.first_page_id());
        let handle = table.buffer_pool().lock().fix(key, AccessMode::Read)?;

        let page = TablePageRef::new(handle.reader());
        let next_page = page.next_page_id();
        let slot_count = page.slot_count();

        Ok(Self {
            bpm: table.buffer_pool().clone(),
            file: table.file_id(),
            handle: Some(handle),
            next_page,
            slot_count,
            current_slot: 0,
        })
    }

    fn advance_page(&mut self) -> Result<bool> {
        if let Some(handle) = self.handle.take() {
            self.bpm.lock().unfix(handle, false);
        }
        if self.next_page == INVALID_PAGE_ID {
            return Ok(false);
        }

        let key = PageKey::new(self.file, self.next_page);
        let handle = self.bpm.lock().fix(key, AccessMode::Read)?;

        let page = TablePageRef::new(handle.reader());
        self.next_page = page.next_page_id();
        self.slot_count = page.slot_count();
        self.current_slot = 0;
        self.handle = Some(handle);
        Ok(true)
    }
}

impl Iterator for TableIterator {
    type Item = Result<(Rid, Tuple)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.handle.as_ref()?;

            if self.current_slot >= self.slot_count {
                match self.advance_page() {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }

            let slot = self.current_slot;
            self.current_slot += 1;

            let handle = self.handle.as_ref()?;
            if let Some(bytes) = TablePageRef::new(handle.reader()).read(slot) {
                return Some(Ok(((handle.page_id(), slot), Tuple::from_bytes(bytes))));
            }
        }
    }
}

impl Drop for TableIterator {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.bpm.lock().unfix(handle, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lit;
    use crate::table::tests::test_table;
    use crate::tuple::schema::{Field, Schema};
    use crate::types::{Types, Value};

    #[test]
    fn test_skips_tombstones() -> Result<()> {
        let schema = Schema::new(vec![Field::new("id", Types::UInt, false)]);
        let (_dir, mut table) = test_table(3, &schema)?;

        table.insert(&Tuple::new(vec![lit!(UInt, "1")?], &schema)?)?;
        let dead = table.insert(&Tuple::new(vec![lit!(UInt, "2")?], &schema)?)?;
        table.insert(&Tuple::new(vec![lit!(UInt, "3")?], &schema)?)?;
        table.erase(dead)?;

        let ids = table
            .iter()?
            .map(|entry| entry.and_then(|(_, t)| t.value_of("id", &schema)))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(ids, vec![Value::UInt(1), Value::UInt(3)]);
        Ok(())
    }

    #[test]
    fn test_dropping_midway_releases_pin() -> Result<()> {
        let schema = Schema::new(vec![Field::new("id", Types::UInt, false)]);
        let (_dir, mut table) = test_table(3, &schema)?;

        for i in 0..10 {
            table.insert(&Tuple::new(vec![lit!(UInt, i.to_string())?], &schema)?)?;
        }

        let mut iter = table.iter()?;
        let _ = iter.next();
        drop(iter);

        let key = PageKey::new(table.file_id(), table.first_page_id());
        assert_eq!(table.buffer_pool().lock().pin_count(&key), Some(0));
        Ok(())
    }

    #[test]
    fn test_restartable() -> Result<()> {
        let schema = Schema::new(vec![Field::new("id", Types::UInt, false)]);
        let (_dir, mut table) = test_table(3, &schema)?;

        for i in 0..5 {
            table.insert(&Tuple::new(vec![lit!(UInt, i.to_string())?], &schema)?)?;
        }

        assert_eq!(table.iter()?.count(), 5);
        assert_eq!(table.iter()?.count(), 5);
        Ok(())
    }
}
