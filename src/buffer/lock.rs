use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{AbortReason, Error, Result};
use crate::storage::PageId;
use crate::transaction::{Permissions, TransactionId};

/// Holders of one page lock
#[derive(Debug, Default)]
struct LockState {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockState {
    /// `None` when `tx` may take the lock in `mode` now, otherwise the
    /// transactions it would be waiting on
    fn blockers(&self, tx: TransactionId, mode: Permissions) -> Option<HashSet<TransactionId>> {
        let exclusive_other = self.exclusive.filter(|&holder| holder != tx);
        let grantable = match mode {
            Permissions::Shared => exclusive_other.is_none(),
            Permissions::Exclusive => {
                exclusive_other.is_none() && self.shared.iter().all(|&holder| holder == tx)
            }
        };
        if grantable {
            return None;
        }

        let mut blockers: HashSet<TransactionId> = exclusive_other.into_iter().collect();
        if mode == Permissions::Exclusive {
            blockers.extend(self.shared.iter().copied().filter(|&holder| holder != tx));
        }
        Some(blockers)
    }

    fn grant(&mut self, tx: TransactionId, mode: Permissions) {
        match mode {
            Permissions::Shared => {
                if self.exclusive != Some(tx) {
                    self.shared.insert(tx);
                }
            }
            Permissions::Exclusive => {
                // Upgrade: the shared hold is subsumed
                self.shared.remove(&tx);
                self.exclusive = Some(tx);
            }
        }
    }

    fn release(&mut self, tx: TransactionId) {
        self.shared.remove(&tx);
        if self.exclusive == Some(tx) {
            self.exclusive = None;
        }
    }

    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    fn mode_of(&self, tx: TransactionId) -> Option<Permissions> {
        if self.exclusive == Some(tx) {
            Some(Permissions::Exclusive)
        } else if self.shared.contains(&tx) {
            Some(Permissions::Shared)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct LockTableInner {
    locks: HashMap<PageId, LockState>,
    /// Pages each transaction holds a lock on
    held: HashMap<TransactionId, HashSet<PageId>>,
    /// Wait-for graph: waiter -> transactions it is blocked on
    waits_for: HashMap<TransactionId, HashSet<TransactionId>>,
    /// Outstanding request of each waiter
    waiting: HashMap<TransactionId, (PageId, Permissions)>,
}

impl LockTableInner {
    /// DFS from `start`; true if some path leads back to it
    fn closes_cycle(&self, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<TransactionId> = self
            .waits_for
            .get(&start)
            .map(|edges| edges.iter().copied().collect())
            .unwrap_or_default();

        while let Some(node) = stack.pop() {
            if node == start {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(edges) = self.waits_for.get(&node) {
                stack.extend(edges.iter().copied());
            }
        }
        false
    }

    /// Recompute the edges of every transaction waiting on `pid` from its
    /// current holders
    fn refresh_waiters(&mut self, pid: PageId) {
        let free = LockState::default();
        let state = self.locks.get(&pid).unwrap_or(&free);
        for (&waiter, &(wanted, mode)) in &self.waiting {
            if wanted == pid {
                let blockers = state.blockers(waiter, mode).unwrap_or_default();
                self.waits_for.insert(waiter, blockers);
            }
        }
    }

    /// Undo the bookkeeping of a wait that ends without a grant
    fn abandon_wait(&mut self, tx: TransactionId, pid: PageId) {
        self.waits_for.remove(&tx);
        self.waiting.remove(&tx);
        if self.locks.get(&pid).is_some_and(LockState::is_free) {
            self.locks.remove(&pid);
        }
    }

    fn remove_wait_edges(&mut self, tx: TransactionId) {
        self.waits_for.remove(&tx);
        self.waiting.remove(&tx);
        for waiters in self.waits_for.values_mut() {
            waiters.remove(&tx);
        }
    }
}

/// Page-granularity shared/exclusive locks with blocking acquisition.
///
/// A waiter gives up with `TransactionAborted` when its request closes a cycle
/// in the wait-for graph, or when the wait bound elapses.
#[derive(Debug)]
pub struct LockTable {
    inner: Mutex<LockTableInner>,
    cond_var: Condvar,
    timeout: Duration,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        LockTable {
            inner: Mutex::new(LockTableInner::default()),
            cond_var: Condvar::new(),
            timeout,
        }
    }

    /// Block until `tx` holds `pid` in `mode` (or stronger)
    pub fn acquire(&self, tx: TransactionId, pid: PageId, mode: Permissions) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut inner = self.inner.lock();
        let mut waited = false;

        loop {
            let state = inner.locks.entry(pid).or_default();
            let blockers = match state.blockers(tx, mode) {
                None => {
                    state.grant(tx, mode);
                    inner.held.entry(tx).or_default().insert(pid);
                    inner.waits_for.remove(&tx);
                    inner.waiting.remove(&tx);
                    // A new holder is one more transaction the others wait on
                    inner.refresh_waiters(pid);
                    if waited {
                        debug!(tx = %tx, page = %pid, ?mode, "lock granted after wait");
                    }
                    return Ok(());
                }
                Some(blockers) => blockers,
            };

            inner.waits_for.insert(tx, blockers);
            inner.waiting.insert(tx, (pid, mode));
            if inner.closes_cycle(tx) {
                inner.abandon_wait(tx, pid);
                warn!(tx = %tx, page = %pid, ?mode, "deadlock detected, aborting requester");
                return Err(Error::TransactionAborted {
                    tx,
                    reason: AbortReason::Deadlock,
                });
            }

            if Instant::now() >= deadline {
                inner.abandon_wait(tx, pid);
                warn!(tx = %tx, page = %pid, ?mode, timeout = ?self.timeout, "lock wait timed out");
                return Err(Error::TransactionAborted {
                    tx,
                    reason: AbortReason::LockTimeout,
                });
            }

            if !waited {
                debug!(tx = %tx, page = %pid, ?mode, "waiting for lock");
                waited = true;
            }
            self.cond_var.wait_until(&mut inner, deadline);
        }
    }

    /// Drop whatever lock `tx` holds on `pid`
    pub fn release(&self, tx: TransactionId, pid: PageId) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.locks.get_mut(&pid) {
            state.release(tx);
            if state.is_free() {
                inner.locks.remove(&pid);
            }
        }
        if let Some(pages) = inner.held.get_mut(&tx) {
            pages.remove(&pid);
            if pages.is_empty() {
                inner.held.remove(&tx);
            }
        }
        inner.refresh_waiters(pid);
        drop(inner);
        self.cond_var.notify_all();
    }

    /// Drop every lock held by `tx` and forget its waits. Returns the pages released.
    pub fn release_all(&self, tx: TransactionId) -> Vec<PageId> {
        let mut inner = self.inner.lock();
        let pages: Vec<PageId> = inner
            .held
            .remove(&tx)
            .map(|pages| pages.into_iter().collect())
            .unwrap_or_default();
        for pid in &pages {
            if let Some(state) = inner.locks.get_mut(pid) {
                state.release(tx);
                if state.is_free() {
                    inner.locks.remove(pid);
                }
            }
        }
        inner.remove_wait_edges(tx);
        for pid in &pages {
            inner.refresh_waiters(*pid);
        }
        drop(inner);
        self.cond_var.notify_all();
        pages
    }

    /// Mode `tx` currently holds on `pid`, if any
    pub fn holds(&self, tx: TransactionId, pid: PageId) -> Option<Permissions> {
        self.with_state(pid, |state| state.mode_of(tx)).flatten()
    }

    /// True if any transaction holds any lock on `pid`
    pub fn is_locked(&self, pid: PageId) -> bool {
        self.with_state(pid, |state| !state.is_free()).unwrap_or(false)
    }

    pub fn is_exclusively_locked(&self, pid: PageId) -> bool {
        self.with_state(pid, |state| state.exclusive.is_some()).unwrap_or(false)
    }

    fn with_state<T>(&self, pid: PageId, f: impl FnOnce(&LockState) -> T) -> Option<T> {
        self.inner.lock().locks.get(&pid).map(f)
    }

    /// Pages `tx` holds locks on
    pub fn pages_held(&self, tx: TransactionId) -> Vec<PageId> {
        self.inner
            .lock()
            .held
            .get(&tx)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }
}
