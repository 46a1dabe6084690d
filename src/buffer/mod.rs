pub mod lock;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::{DbFile, HeapPage, PageId, RecordId, TableId};
use crate::transaction::{Permissions, TransactionId};
use crate::types::Tuple;

use self::lock::LockTable;

/// Shared handle to a resident page. Every caller asking for the same page
/// while it stays resident gets the same instance.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Bounded page cache and the only path from transactions to table files.
///
/// Every page access takes a page-level lock first (strict two-phase locking:
/// locks are only dropped by `transaction_complete`). Dirty pages are never
/// written before their transaction commits and never evicted; aborting
/// reloads them from disk.
pub struct BufferPool {
    config: Config,
    files: RwLock<HashMap<TableId, Arc<dyn DbFile>>>,
    /// Resident pages, least recently used at the front
    pages: Mutex<LinkedHashMap<PageId, PageRef>>,
    lock_table: LockTable,
}

impl BufferPool {
    pub fn new(config: Config) -> Self {
        let lock_table = LockTable::new(config.lock_timeout);
        BufferPool {
            pages: Mutex::new(LinkedHashMap::with_capacity(config.cache_pages)),
            files: RwLock::new(HashMap::new()),
            lock_table,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Maximum number of resident pages
    pub fn capacity(&self) -> usize {
        self.config.cache_pages
    }

    /// Make `file` reachable through its table id
    pub fn register_file(&self, file: Arc<dyn DbFile>) {
        let table_id = file.id();
        self.files.write().insert(table_id, file);
        debug!(table_id, "registered table file");
    }

    pub fn file(&self, table_id: TableId) -> Result<Arc<dyn DbFile>> {
        self.files
            .read()
            .get(&table_id)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("no file registered for table {:x}", table_id)))
    }

    /// Lock `pid` for `tx` in `perm` mode, then return the resident page,
    /// loading it (and evicting if full) when it is not cached
    pub fn get_page(&self, tx: TransactionId, pid: PageId, perm: Permissions) -> Result<PageRef> {
        let file = self.file(pid.table_id)?;
        self.lock_table.acquire(tx, pid, perm)?;

        let mut pages = self.pages.lock();
        if let Some(page) = pages.to_back(&pid) {
            return Ok(Arc::clone(page));
        }

        if pages.len() >= self.capacity() {
            self.evict_page(&mut pages)?;
        }
        let page = Arc::new(RwLock::new(file.read_page(pid)?));
        pages.insert(pid, Arc::clone(&page));
        debug!(tx = %tx, page = %pid, resident = pages.len(), "loaded page");
        Ok(page)
    }

    /// Remove one clean page, preferring unlocked pages over shared-locked
    /// ones and older pages over newer ones
    fn evict_page(&self, pages: &mut LinkedHashMap<PageId, PageRef>) -> Result<()> {
        let is_clean = |page: &PageRef| page.try_read().is_some_and(|p| !p.is_dirty());

        let victim = pages
            .iter()
            .find(|(pid, page)| !self.lock_table.is_locked(**pid) && is_clean(*page))
            .or_else(|| {
                pages.iter().find(|(pid, page)| {
                    !self.lock_table.is_exclusively_locked(**pid) && is_clean(*page)
                })
            })
            .map(|(pid, _)| *pid);

        match victim {
            Some(pid) => {
                pages.remove(&pid);
                debug!(page = %pid, "evicted page");
                Ok(())
            }
            None => {
                warn!(capacity = self.capacity(), "no evictable page");
                Err(Error::CacheExhausted {
                    capacity: self.capacity(),
                })
            }
        }
    }

    /// Add `tuple` to `table_id` on behalf of `tx`. The tuple's record id is
    /// set to where it was stored.
    pub fn insert_tuple(
        &self,
        tx: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<RecordId> {
        let file = self.file(table_id)?;
        let dirtied = file.insert_tuple(self, tx, tuple)?;
        self.mark_dirty(tx, &dirtied);
        tuple
            .record_id()
            .ok_or_else(|| Error::Storage("insert did not assign a record id".to_string()))
    }

    /// Remove `tuple` (located by its record id) on behalf of `tx`
    pub fn delete_tuple(&self, tx: TransactionId, tuple: &Tuple) -> Result<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| Error::Storage("cannot delete a tuple without a record id".to_string()))?;
        let file = self.file(rid.page_id.table_id)?;
        let dirtied = file.delete_tuple(self, tx, tuple)?;
        self.mark_dirty(tx, &dirtied);
        Ok(())
    }

    fn mark_dirty(&self, tx: TransactionId, dirtied: &[PageRef]) {
        for page in dirtied {
            page.write().mark_dirty(Some(tx));
        }
    }

    /// Commit writes every page `tx` dirtied; abort restores their on-disk
    /// contents. Either way all of `tx`'s locks are released.
    pub fn transaction_complete(&self, tx: TransactionId, commit: bool) -> Result<()> {
        let result = if commit {
            self.flush_pages(tx).or_else(|err| {
                warn!(tx = %tx, error = %err, "commit flush failed, rolling back");
                self.restore_pages(tx)?;
                Err(err)
            })
        } else {
            self.restore_pages(tx)
        };

        let released = self.lock_table.release_all(tx);
        info!(
            tx = %tx,
            commit,
            ok = result.is_ok(),
            locks_released = released.len(),
            "transaction complete"
        );
        result
    }

    /// Resident pages `tx` holds an exclusive lock on and has dirtied
    fn pages_dirtied_by(&self, tx: TransactionId) -> Vec<PageRef> {
        let held = self.lock_table.pages_held(tx);
        let pages = self.pages.lock();
        held.iter()
            .filter_map(|pid| pages.get(pid))
            .filter(|page| page.read().dirtier() == Some(tx))
            .cloned()
            .collect()
    }

    /// Write every page dirtied by `tx` and mark it clean
    pub fn flush_pages(&self, tx: TransactionId) -> Result<()> {
        let mut synced: HashSet<TableId> = HashSet::new();
        for page in self.pages_dirtied_by(tx) {
            let mut guard = page.write();
            let pid = guard.id();
            let file = self.file(pid.table_id)?;
            file.write_page(&guard)?;
            guard.mark_dirty(None);
            debug!(tx = %tx, page = %pid, "flushed page");
            if self.config.sync_on_commit {
                synced.insert(pid.table_id);
            }
        }
        for table_id in synced {
            self.file(table_id)?.sync()?;
        }
        Ok(())
    }

    /// Replace every page dirtied by `tx` with its on-disk contents. A page
    /// that cannot be re-read is dropped from the cache so the next access
    /// loads it afresh; the first such error is returned after all pages.
    fn restore_pages(&self, tx: TransactionId) -> Result<()> {
        let mut first_err = None;
        for page in self.pages_dirtied_by(tx) {
            let mut guard = page.write();
            let pid = guard.id();
            match self.file(pid.table_id).and_then(|file| file.read_page(pid)) {
                Ok(restored) => {
                    *guard = restored;
                    debug!(tx = %tx, page = %pid, "restored page from disk");
                }
                Err(err) => {
                    drop(guard);
                    self.discard_page(pid);
                    warn!(tx = %tx, page = %pid, error = %err, "restore failed, page discarded");
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Write every dirty resident page regardless of owner. Breaks no-steal if
    /// called while those transactions are still running.
    pub fn flush_all_pages(&self) -> Result<()> {
        let resident: Vec<PageRef> = self.pages.lock().values().cloned().collect();
        for page in resident {
            let mut guard = page.write();
            if !guard.is_dirty() {
                continue;
            }
            let pid = guard.id();
            let file = self.file(pid.table_id)?;
            file.write_page(&guard)?;
            guard.mark_dirty(None);
            debug!(page = %pid, "flushed page");
        }
        Ok(())
    }

    /// Drop `pid` from the cache without writing it
    pub fn discard_page(&self, pid: PageId) {
        if self.pages.lock().remove(&pid).is_some() {
            debug!(page = %pid, "discarded page");
        }
    }

    pub fn holds_lock(&self, tx: TransactionId, pid: PageId) -> bool {
        self.lock_table.holds(tx, pid).is_some()
    }

    /// Release one lock before the transaction ends. Only safe when `tx`
    /// neither read nor wrote anything on `pid` that its outcome depends on.
    pub fn release_page(&self, tx: TransactionId, pid: PageId) {
        self.lock_table.release(tx, pid);
    }

    pub fn num_resident(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_resident(&self, pid: PageId) -> bool {
        self.pages.lock().contains_key(&pid)
    }
}
