mod io;
pub mod base;
pub mod page;
pub mod files;
pub mod scan;
pub mod catalog;

pub use base::{PageId, RecordId, TableId};
pub use files::HeapFile;
pub use page::HeapPage;
pub use scan::HeapFileIterator;

use std::sync::Arc;

use crate::buffer::{BufferPool, PageRef};
use crate::error::Result;
use crate::transaction::TransactionId;
use crate::types::{Tuple, TupleDesc};

/// What the page cache needs from a table's backing file.
///
/// `read_page`/`write_page` touch durable storage directly and are reserved for
/// the cache. Everything else goes through the cache it is handed.
pub trait DbFile: Send + Sync {
    /// Stable table id for the lifetime of the file
    fn id(&self) -> TableId;

    fn tuple_desc(&self) -> &Arc<TupleDesc>;

    fn page_size(&self) -> usize;

    /// `ceil(file length / page size)`, never stale after an append
    fn num_pages(&self) -> usize;

    fn read_page(&self, pid: PageId) -> Result<HeapPage>;

    fn write_page(&self, page: &HeapPage) -> Result<()>;

    /// Make previously written pages durable
    fn sync(&self) -> Result<()>;

    /// Store `tuple` in the first free slot (appending a page if needed) and
    /// set its record id. Returns the pages mutated.
    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tx: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>>;

    /// Free the slot `tuple` was read from. Returns the pages mutated.
    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tx: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>>;

    /// Lazy scan of every live tuple, page by page, through the cache
    fn iterator(&self, pool: Arc<BufferPool>, tx: TransactionId) -> Box<dyn DbFileIterator>;
}

/// Forward-only tuple sequence.
///
/// Every method other than `open` fails with `Error::IteratorProtocol` while the
/// iterator is not open; `next` fails the same way once exhausted.
pub trait DbFileIterator: Send {
    fn open(&mut self) -> Result<()>;

    fn has_next(&mut self) -> Result<bool>;

    fn next(&mut self) -> Result<Tuple>;

    /// Restart from the first tuple
    fn rewind(&mut self) -> Result<()>;

    /// Drop the held page reference. Locks stay with the transaction.
    fn close(&mut self) -> Result<()>;
}
