use std::sync::Arc;

use tracing::trace;

use crate::buffer::{BufferPool, PageRef};
use crate::error::{Error, Result};
use crate::storage::base::{PageId, PageNumber, TableId};
use crate::storage::DbFileIterator;
use crate::transaction::{Permissions, TransactionId};
use crate::types::Tuple;

/// Position inside an open scan
#[derive(Default)]
struct Cursor {
    page_number: usize,
    page: Option<PageRef>,
    slot: usize,
    lookahead: Option<Tuple>,
}

/// Lazy scan over every live tuple of one heap file.
///
/// Pages are fetched one at a time through the page cache in shared mode, so a
/// scan never holds more than one page reference. The page count is re-read on
/// every step, which lets a scan see pages appended behind it.
pub struct HeapFileIterator {
    pool: Arc<BufferPool>,
    table_id: TableId,
    tx: TransactionId,
    cursor: Option<Cursor>,
}

impl HeapFileIterator {
    pub fn new(pool: Arc<BufferPool>, table_id: TableId, tx: TransactionId) -> Self {
        HeapFileIterator {
            pool,
            table_id,
            tx,
            cursor: None,
        }
    }
}

impl DbFileIterator for HeapFileIterator {
    fn open(&mut self) -> Result<()> {
        self.cursor = Some(Cursor::default());
        trace!(table_id = self.table_id, tx = %self.tx, "opened heap scan");
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or(Error::IteratorProtocol("has_next called on a closed scan"))?;
        if cursor.lookahead.is_some() {
            return Ok(true);
        }

        let num_pages = self.pool.file(self.table_id)?.num_pages();
        loop {
            if cursor.page_number >= num_pages {
                cursor.page = None;
                return Ok(false);
            }

            let page = match &cursor.page {
                Some(page) => Arc::clone(page),
                None => {
                    let pid = PageId::new(self.table_id, cursor.page_number as PageNumber);
                    let page = self.pool.get_page(self.tx, pid, Permissions::Shared)?;
                    cursor.page = Some(Arc::clone(&page));
                    cursor.slot = 0;
                    page
                }
            };

            let guard = page.read();
            if let Some(slot) = guard.next_used_slot(cursor.slot) {
                cursor.slot = slot + 1;
                cursor.lookahead = guard.tuple(slot)?;
                return Ok(true);
            }
            drop(guard);

            cursor.page = None;
            cursor.page_number += 1;
        }
    }

    fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(Error::IteratorProtocol("next called on an exhausted scan"));
        }
        self.cursor
            .as_mut()
            .and_then(|cursor| cursor.lookahead.take())
            .ok_or(Error::IteratorProtocol("next called on an exhausted scan"))
    }

    fn rewind(&mut self) -> Result<()> {
        match self.cursor.as_mut() {
            Some(cursor) => {
                *cursor = Cursor::default();
                Ok(())
            }
            None => Err(Error::IteratorProtocol("rewind called on a closed scan")),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.cursor.take() {
            Some(_) => Ok(()),
            None => Err(Error::IteratorProtocol("close called on a closed scan")),
        }
    }
}
