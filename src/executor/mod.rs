pub mod aggregate;
pub mod dml;
pub mod filter;
pub mod seq_scan;

pub use aggregate::{Aggregate, AggregateOp, Aggregator, IntegerAggregator, StringAggregator};
pub use dml::{Delete, Insert};
pub use filter::{Filter, Predicate};
pub use seq_scan::SeqScan;

use crate::error::Result;
use crate::types::{Tuple, TupleDesc};

/// Pull-based operator over a tuple stream.
///
/// Same protocol as `DbFileIterator`: anything but `open` on an unopened
/// operator fails with `Error::IteratorProtocol`, as does `next` once exhausted.
pub trait OpIterator: Send {
    fn open(&mut self) -> Result<()>;

    fn has_next(&mut self) -> Result<bool>;

    fn next(&mut self) -> Result<Tuple>;

    fn rewind(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Shape of the tuples this operator yields
    fn tuple_desc(&self) -> &TupleDesc;
}

/// Drain an opened operator into a vector
pub fn collect(op: &mut dyn OpIterator) -> Result<Vec<Tuple>> {
    let mut tuples = Vec::new();
    while op.has_next()? {
        tuples.push(op.next()?);
    }
    Ok(tuples)
}
