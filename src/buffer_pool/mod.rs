mod frame;
mod replacer;

use crate::config::Config;
use crate::disk_manager::{DiskManager, FileId};
use crate::errors::Error;
use crate::pages::{Page, PageId, PageType};
use anyhow::{bail, Result};
use frame::Frame;
use parking_lot::FairMutex;
use replacer::ReplacementStrategy;
use std::collections::{HashMap, LinkedList};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, trace};

pub type FrameId = usize;
pub type ArcBufferPool = Arc<FairMutex<BufferPoolManager>>;

/// Identifies a page across the per-table/per-index backing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub file: FileId,
    pub page: PageId,
}

impl PageKey {
    pub fn new(file: FileId, page: PageId) -> Self {
        Self { file, page }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// A pinned page. The pin keeps the frame resident, so the pointer stays
/// valid without holding the pool latch; the frame vector itself is
/// allocated once and never moves. Handles are returned to
/// [`BufferPoolManager::unfix`] when done; concurrent writers to one page
/// coordinate through the owning table's latch.
#[derive(Debug)]
pub struct PageHandle {
    page: NonNull<Page>,
    key: PageKey,
    mode: AccessMode,
}

impl PageHandle {
    pub fn key(&self) -> PageKey {
        self.key
    }

    pub fn page_id(&self) -> PageId {
        self.key.page
    }

    pub fn reader(&self) -> &Page {
        unsafe { self.page.as_ref() }
    }

    pub fn writer(&mut self) -> &mut Page {
        debug_assert!(self.mode == AccessMode::Write, "write through a read pin");
        unsafe { self.page.as_mut() }
    }
}

pub struct BufferPoolManager {
    disk_manager: DiskManager,

    frames: Vec<Frame>,
    free_frames: LinkedList<FrameId>,
    page_table: HashMap<PageKey, FrameId>,

    strategy: Box<dyn ReplacementStrategy>,
    clock: u64,
}

impl BufferPoolManager {
    pub fn new(config: &Config, path: &Path) -> Result<Self> {
        let size = config.buffer_pool_frames;
        let frames = (0..size).map(|_| Frame::new()).collect::<Vec<_>>();

        Ok(Self {
            disk_manager: DiskManager::new(path)?,
            frames,
            free_frames: LinkedList::from_iter(0..size),
            page_table: HashMap::new(),
            strategy: replacer::build(config.replacement_strategy, size, config.lruk_k),
            clock: 0,
        })
    }

    pub fn shared(config: &Config, path: &Path) -> Result<ArcBufferPool> {
        Ok(Arc::new(FairMutex::new(Self::new(config, path)?)))
    }

    pub fn create_file(&mut self, name: &str) -> Result<FileId> {
        self.disk_manager.open_file(name)
    }

    /// Pins the page and returns a handle to its bytes. A miss evicts a
    /// victim (writing it back when dirty) and reads the page from disk.
    pub fn fix(&mut self, key: PageKey, mode: AccessMode) -> Result<PageHandle> {
        let frame_id = match self.page_table.get(&key) {
            Some(frame_id) => *frame_id,
            None => {
                let frame_id = self.find_free_frame()?;

                let frame = &mut self.frames[frame_id];
                frame.page_mut().reset(key.page, PageType::Data);
                if let Err(e) = self
                    .disk_manager
                    .read(key.file, key.page, frame.page_mut().data_mut())
                {
                    self.free_frames.push_back(frame_id);
                    return Err(e);
                }

                frame.set_key(key);
                self.page_table.insert(key, frame_id);
                frame_id
            }
        };

        Ok(self.grab(frame_id, key, mode))
    }

    /// Releases a pin, OR-ing the dirty flag into the page.
    pub fn unfix(&mut self, handle: PageHandle, dirty: bool) {
        let frame_id = self.page_table[&handle.key()];
        drop(handle);

        let frame = &mut self.frames[frame_id];
        assert!(
            frame.pin_count() > 0,
            "frame {frame_id} has pin count 0, but an unfix was attempted"
        );
        if dirty {
            frame.page_mut().mark_dirty();
        }
        frame.unpin();

        trace!(
            page = frame.page().get_page_id(),
            pins = frame.pin_count(),
            "unfixed page"
        );
    }

    /// Allocates a page in the given file and pins it, empty and dirty.
    pub fn new_page(&mut self, file: FileId, page_type: PageType) -> Result<PageHandle> {
        let frame_id = self.find_free_frame()?;

        let page_id = match self.disk_manager.allocate(file) {
            Ok(page_id) => page_id,
            Err(e) => {
                self.free_frames.push_back(frame_id);
                return Err(e);
            }
        };
        let key = PageKey::new(file, page_id);

        let frame = &mut self.frames[frame_id];
        frame.page_mut().reset(page_id, page_type);
        frame.page_mut().mark_dirty();
        frame.set_key(key);
        self.page_table.insert(key, frame_id);

        debug!(file, page_id, "created page");
        Ok(self.grab(frame_id, key, AccessMode::Write))
    }

    /// Writes the page through to disk and clears its dirty bit. A page
    /// that is not resident has already been written on eviction.
    pub fn flush(&mut self, key: PageKey) -> Result<()> {
        if let Some(frame_id) = self.page_table.get(&key) {
            let frame = &mut self.frames[*frame_id];
            if frame.page().is_dirty() {
                self.disk_manager.write(key.file, key.page, frame.page().data())?;
                frame.page_mut().mark_clean();
            }
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        let dirty: Vec<PageKey> = self
            .frames
            .iter()
            .filter(|frame| frame.page().is_dirty())
            .filter_map(|frame| frame.key())
            .collect();
        dirty.into_iter().try_for_each(|key| self.flush(key))
    }

    fn grab(&mut self, frame_id: FrameId, key: PageKey, mode: AccessMode) -> PageHandle {
        let clock = self.clock;
        self.clock += 1;
        self.strategy.on_pin(frame_id, clock);

        let frame = &mut self.frames[frame_id];
        frame.pin();

        trace!(
            page = key.page,
            frame = frame_id,
            pins = frame.pin_count(),
            "fixed page"
        );

        PageHandle {
            page: NonNull::from(frame.page_mut()),
            key,
            mode,
        }
    }

    fn find_free_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_frames.pop_front() {
            return Ok(frame_id);
        }
        match self.strategy.find_victim(&self.frames) {
            Some(frame_id) => {
                self.evict_frame(frame_id)?;
                Ok(frame_id)
            }
            None => bail!(Error::NoFreeFrame),
        }
    }

    fn evict_frame(&mut self, frame_id: FrameId) -> Result<()> {
        let frame = &mut self.frames[frame_id];
        assert!(frame.pin_count() == 0, "evicting a pinned frame");

        let key = match frame.take_key() {
            Some(key) => key,
            None => return Ok(()),
        };
        self.page_table.remove(&key);

        debug!(
            page = key.page,
            frame = frame_id,
            dirty = frame.page().is_dirty(),
            "evicting page"
        );

        if frame.page().is_dirty() {
            self.disk_manager.write(key.file, key.page, frame.page().data())?;
            frame.page_mut().mark_clean();
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pin_count(&self, key: &PageKey) -> Option<u16> {
        let frame_id = *self.page_table.get(key)?;
        Some(self.frames[frame_id].pin_count())
    }

    #[cfg(test)]
    pub(crate) fn is_resident(&self, key: &PageKey) -> bool {
        self.page_table.contains_key(key)
    }
}
