//! Block-addressed file I/O. Every table and index owns one backing file;
//! page 0 of each file is the meta page (magic, page size, allocation
//! state) and freed pages are threaded onto a free list rooted there.

use crate::errors::Error;
use crate::pages::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub type FileId = u32;

const MAGIC: &[u8; 8] = b"MINNOWDB";
const META_PAGE_ID: PageId = 0;

const META_OFFSET_MAGIC: usize = 0;
const META_OFFSET_PAGE_SIZE: usize = 8;
const META_OFFSET_NEXT_PAGE: usize = 12;
const META_OFFSET_FREE_HEAD: usize = 16;

struct DbFile {
    name: String,
    file: File,
    next_free_page_id: PageId,
    free_list_head: PageId,
}

pub struct DiskManager {
    base: PathBuf,
    files: Vec<DbFile>,
    names: HashMap<String, FileId>,
}

impl DiskManager {
    pub fn new(base: &Path) -> Result<Self> {
        std::fs::create_dir_all(base)
            .map_err(|e| Error::Io(format!("creating {}: {e}", base.display())))?;
        Ok(Self {
            base: base.to_path_buf(),
            files: Vec::new(),
            names: HashMap::new(),
        })
    }

    /// Opens an existing backing file or creates a fresh one with its meta
    /// page in place. Opening the same name twice yields the same id.
    pub fn open_file(&mut self, name: &str) -> Result<FileId> {
        if let Some(id) = self.names.get(name) {
            return Ok(*id);
        }

        let path = self.base.join(name);
        let exists = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::Io(format!("opening {}: {e}", path.display())))?;

        let mut db_file = DbFile {
            name: name.to_string(),
            file,
            next_free_page_id: 1,
            free_list_head: INVALID_PAGE_ID,
        };

        if exists {
            let mut meta = [0u8; PAGE_SIZE];
            read_block(&mut db_file.file, META_PAGE_ID, &mut meta)?;
            if &meta[META_OFFSET_MAGIC..META_OFFSET_MAGIC + 8] != MAGIC {
                bail!(Error::Io(format!("{name} is not a database file")));
            }
            let page_size = read_u32(&meta, META_OFFSET_PAGE_SIZE);
            if page_size as usize != PAGE_SIZE {
                bail!(Error::Io(format!(
                    "{name} was written with page size {page_size}"
                )));
            }
            db_file.next_free_page_id = read_u32(&meta, META_OFFSET_NEXT_PAGE);
            db_file.free_list_head = read_u32(&meta, META_OFFSET_FREE_HEAD);
        } else {
            write_meta(&mut db_file)?;
        }

        let id = self.files.len() as FileId;
        debug!(file = name, id, "opened backing file");
        self.files.push(db_file);
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn read(&mut self, file: FileId, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            bail!(Error::Io("read of the invalid page id".into()));
        }
        let db_file = self.file_mut(file)?;
        read_block(&mut db_file.file, page_id, buf)
    }

    pub fn write(&mut self, file: FileId, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            bail!(Error::Io("write to the invalid page id".into()));
        }
        let db_file = self.file_mut(file)?;
        write_block(&mut db_file.file, page_id, buf)
    }

    /// Hands out the next page id: the head of the free list when one
    /// exists, otherwise a fresh id extending the file. The page arrives
    /// zeroed on disk and the meta page is updated.
    pub fn allocate(&mut self, file: FileId) -> Result<PageId> {
        let db_file = self.file_mut(file)?;

        let page_id = if db_file.free_list_head != INVALID_PAGE_ID {
            let page_id = db_file.free_list_head;
            let mut buf = [0u8; PAGE_SIZE];
            read_block(&mut db_file.file, page_id, &mut buf)?;
            db_file.free_list_head = read_u32(&buf, 0);
            page_id
        } else {
            let page_id = db_file.next_free_page_id;
            db_file.next_free_page_id += 1;
            page_id
        };

        write_block(&mut db_file.file, page_id, &[0u8; PAGE_SIZE])?;
        write_meta(db_file)?;
        debug!(file = %db_file.name, page_id, "allocated page");
        Ok(page_id)
    }

    /// Pushes the page onto the file's free list. The freed page's first
    /// four bytes store the previous list head.
    pub fn free(&mut self, file: FileId, page_id: PageId) -> Result<()> {
        if page_id == META_PAGE_ID || page_id == INVALID_PAGE_ID {
            bail!(Error::Io(format!("cannot free page {page_id}")));
        }
        let db_file = self.file_mut(file)?;

        let mut buf = [0u8; PAGE_SIZE];
        buf[0..4].copy_from_slice(&db_file.free_list_head.to_le_bytes());
        write_block(&mut db_file.file, page_id, &buf)?;

        db_file.free_list_head = page_id;
        write_meta(db_file)
    }

    fn file_mut(&mut self, file: FileId) -> Result<&mut DbFile> {
        match self.files.get_mut(file as usize) {
            Some(db_file) => Ok(db_file),
            None => bail!(Error::Internal(
                "disk_manager".into(),
                format!("unknown file id {file}")
            )),
        }
    }
}

fn read_block(file: &mut File, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
    file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))
        .map_err(|e| Error::Io(format!("seeking to page {page_id}: {e}")))?;
    file.read_exact(buf)
        .map_err(|e| Error::Io(format!("reading page {page_id}: {e}")))?;
    Ok(())
}

fn write_block(file: &mut File, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
    file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))
        .map_err(|e| Error::Io(format!("seeking to page {page_id}: {e}")))?;
    file.write_all(buf)
        .map_err(|e| Error::Io(format!("writing page {page_id}: {e}")))?;
    Ok(())
}

fn write_meta(db_file: &mut DbFile) -> Result<()> {
    let mut meta = [0u8; PAGE_SIZE];
    meta[META_OFFSET_MAGIC..META_OFFSET_MAGIC + 8].copy_from_slice(MAGIC);
    meta[META_OFFSET_PAGE_SIZE..META_OFFSET_PAGE_SIZE + 4]
        .copy_from_slice(&(PAGE_SIZE as u32).to_le_bytes());
    meta[META_OFFSET_NEXT_PAGE..META_OFFSET_NEXT_PAGE + 4]
        .copy_from_slice(&db_file.next_free_page_id.to_le_bytes());
    meta[META_OFFSET_FREE_HEAD..META_OFFSET_FREE_HEAD + 4]
        .copy_from_slice(&db_file.free_list_head.to_le_bytes());
    write_block(&mut db_file.file, META_PAGE_ID, &meta)
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read() -> Result<()> {
        let dir = tempdir()?;
        let mut disk = DiskManager::new(dir.path())?;
        let file = disk.open_file("users.data")?;

        let page_id = disk.allocate(file)?;
        let mut buf = [0u8; PAGE_SIZE];
        buf[0..5].copy_from_slice(b"hello");
        disk.write(file, page_id, &buf)?;

        let mut read = [0u8; PAGE_SIZE];
        disk.read(file, page_id, &mut read)?;
        assert_eq!(&read[0..5], b"hello");
        Ok(())
    }

    #[test]
    fn test_allocation_is_dense() -> Result<()> {
        let dir = tempdir()?;
        let mut disk = DiskManager::new(dir.path())?;
        let file = disk.open_file("t.data")?;

        assert_eq!(disk.allocate(file)?, 1);
        assert_eq!(disk.allocate(file)?, 2);
        assert_eq!(disk.allocate(file)?, 3);
        Ok(())
    }

    #[test]
    fn test_free_list_reuse() -> Result<()> {
        let dir = tempdir()?;
        let mut disk = DiskManager::new(dir.path())?;
        let file = disk.open_file("t.data")?;

        let p1 = disk.allocate(file)?;
        let p2 = disk.allocate(file)?;
        disk.free(file, p1)?;
        disk.free(file, p2)?;

        // LIFO reuse off the free list, then back to extending the file
        assert_eq!(disk.allocate(file)?, p2);
        assert_eq!(disk.allocate(file)?, p1);
        assert_eq!(disk.allocate(file)?, 3);
        Ok(())
    }

    #[test]
    fn test_meta_survives_reopen() -> Result<()> {
        let dir = tempdir()?;
        {
            let mut disk = DiskManager::new(dir.path())?;
            let file = disk.open_file("t.data")?;
            disk.allocate(file)?;
            disk.allocate(file)?;
        }

        let mut disk = DiskManager::new(dir.path())?;
        let file = disk.open_file("t.data")?;
        assert_eq!(disk.allocate(file)?, 3);
        Ok(())
    }

    #[test]
    fn test_short_read_fails() -> Result<()> {
        let dir = tempdir()?;
        let mut disk = DiskManager::new(dir.path())?;
        let file = disk.open_file("t.data")?;

        let mut buf = [0u8; PAGE_SIZE];
        assert!(disk.read(file, 40, &mut buf).is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_foreign_file() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("junk.data"), vec![0u8; PAGE_SIZE])?;

        let mut disk = DiskManager::new(dir.path())?;
        assert!(disk.open_file("junk.data").is_err());
        Ok(())
    }
}
