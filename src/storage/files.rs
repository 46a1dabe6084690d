use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::buffer::{BufferPool, PageRef};
use crate::error::{Error, Result};
use crate::storage::base::{PageId, PageNumber, TableId};
use crate::storage::io::Disk;
use crate::storage::page::{empty_page_data, slots_per_page, HeapPage};
use crate::storage::scan::HeapFileIterator;
use crate::storage::{DbFile, DbFileIterator};
use crate::transaction::{Permissions, TransactionId};
use crate::types::{Tuple, TupleDesc};

/// One table stored as a sequence of fixed-size heap pages.
///
/// Page `n` lives at byte offset `n * page_size`. The file length is always a
/// whole number of pages.
pub struct HeapFile {
    disk: Disk,
    path: PathBuf,
    table_id: TableId,
    td: Arc<TupleDesc>,
    page_size: usize,
    /// Cached `ceil(len / page_size)`, refreshed after every append
    num_pages: AtomicUsize,
    /// Serializes appends so each one claims a distinct page number
    append_lock: Mutex<()>,
}

impl HeapFile {
    /// Open or create a heap file of `td` tuples
    pub fn open<P: AsRef<Path>>(path: P, td: TupleDesc, page_size: usize) -> Result<Self> {
        if slots_per_page(page_size, &td) == 0 {
            return Err(Error::Storage(format!(
                "tuple width {} does not fit in a {} byte page",
                td.byte_size(),
                page_size
            )));
        }

        let disk = Disk::open(&path)?;
        let path = std::fs::canonicalize(path.as_ref())?;
        let table_id = Self::table_id_for(&path);

        let len = disk.len()?;
        if len % page_size as u64 != 0 {
            warn!(path = %path.display(), len, page_size, "table file is not a whole number of pages");
        }

        let file = HeapFile {
            disk,
            path,
            table_id,
            td: Arc::new(td),
            page_size,
            num_pages: AtomicUsize::new(0),
            append_lock: Mutex::new(()),
        };
        file.refresh_num_pages()?;
        debug!(table_id = file.table_id, pages = file.num_pages(), "opened heap file");
        Ok(file)
    }

    /// Table ids hash the absolute path, so reopening the same file yields the same id
    fn table_id_for(path: &Path) -> TableId {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish()
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn refresh_num_pages(&self) -> Result<usize> {
        let len = self.disk.len()?;
        let pages = len.div_ceil(self.page_size as u64) as usize;
        self.num_pages.store(pages, Ordering::SeqCst);
        Ok(pages)
    }

    fn check_page_id(&self, pid: PageId) -> Result<()> {
        if pid.table_id != self.table_id {
            return Err(Error::Storage(format!(
                "page {} does not belong to table {:x}",
                pid, self.table_id
            )));
        }
        if pid.page_number as usize >= self.num_pages() {
            return Err(Error::Storage(format!(
                "page {} out of range ({} pages)",
                pid,
                self.num_pages()
            )));
        }
        Ok(())
    }

    /// Extend the file by exactly one zeroed page and return its id
    fn append_empty_page(&self) -> Result<PageId> {
        let _guard = self.append_lock.lock();
        let page_number = self.refresh_num_pages()?;
        let pid = PageId::new(self.table_id, page_number as PageNumber);
        self.disk
            .write_at(pid.offset(self.page_size), &empty_page_data(self.page_size))?;
        let pages = self.refresh_num_pages()?;
        debug!(page = %pid, pages, "appended empty page");
        Ok(pid)
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> TableId {
        self.table_id
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.td
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn num_pages(&self) -> usize {
        self.num_pages.load(Ordering::SeqCst)
    }

    fn read_page(&self, pid: PageId) -> Result<HeapPage> {
        self.check_page_id(pid)?;
        let mut buf = empty_page_data(self.page_size);
        self.disk.read_at(pid.offset(self.page_size), &mut buf)?;
        HeapPage::new(pid, buf, Arc::clone(&self.td))
    }

    fn write_page(&self, page: &HeapPage) -> Result<()> {
        let pid = page.id();
        self.check_page_id(pid)?;
        let data = page.page_data();
        if data.len() != self.page_size {
            return Err(Error::Storage(format!(
                "page {} is {} bytes, file pages are {}",
                pid,
                data.len(),
                self.page_size
            )));
        }
        self.disk.write_at(pid.offset(self.page_size), data)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.disk.sync()?;
        Ok(())
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tx: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        if !tuple.conforms_to(&self.td) {
            return Err(Error::Storage(format!(
                "tuple does not match table schema [{}]",
                self.td
            )));
        }

        let mut page_number = 0;
        loop {
            while page_number < self.num_pages() {
                let pid = PageId::new(self.table_id, page_number as PageNumber);
                let page = pool.get_page(tx, pid, Permissions::Exclusive)?;
                {
                    let mut guard = page.write();
                    if guard.num_empty_slots() > 0 {
                        let rid = guard.insert_tuple(tuple)?;
                        tuple.set_record_id(Some(rid));
                        drop(guard);
                        return Ok(vec![page]);
                    }
                }
                page_number += 1;
            }
            // Every page was full; the next pass picks up the appended page
            self.append_empty_page()?;
        }
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tx: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| Error::Storage("cannot delete a tuple without a record id".to_string()))?;
        self.check_page_id(rid.page_id)?;
        let page = pool.get_page(tx, rid.page_id, Permissions::Exclusive)?;
        page.write().delete_tuple(tuple)?;
        Ok(vec![page])
    }

    fn iterator(&self, pool: Arc<BufferPool>, tx: TransactionId) -> Box<dyn DbFileIterator> {
        Box::new(HeapFileIterator::new(pool, self.table_id, tx))
    }
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("path", &self.path)
            .field("table_id", &self.table_id)
            .field("page_size", &self.page_size)
            .field("num_pages", &self.num_pages())
            .finish()
    }
}
