//! Disk-resident heap tables behind a locking page cache, with histogram-based
//! selectivity estimates for planning.

pub mod buffer;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod optimizer;
pub mod storage;
pub mod transaction;
pub mod types;

pub use buffer::{BufferPool, PageRef};
pub use config::Config;
pub use db::Database;
pub use error::{AbortReason, Error, Result};
pub use storage::{DbFile, DbFileIterator, HeapFile, HeapPage, PageId, RecordId, TableId};
pub use transaction::{Permissions, TransactionId};
pub use types::{Field, Op, Tuple, TupleDesc, Type};
