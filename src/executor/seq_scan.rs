use std::sync::Arc;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::error::Result;
use crate::executor::OpIterator;
use crate::storage::{DbFileIterator, TableId};
use crate::transaction::TransactionId;
use crate::types::{Tuple, TupleDesc};

/// Full table scan. Column names are qualified as `alias.column`.
pub struct SeqScan {
    inner: Box<dyn DbFileIterator>,
    td: TupleDesc,
    table_id: TableId,
    alias: String,
}

impl SeqScan {
    pub fn new(
        pool: &Arc<BufferPool>,
        tx: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> Result<Self> {
        let file = pool.file(table_id)?;
        let td = file.tuple_desc().with_prefix(alias);
        debug!(table_id, alias, tx = %tx, "created sequential scan");
        Ok(SeqScan {
            inner: file.iterator(Arc::clone(pool), tx),
            td,
            table_id,
            alias: alias.to_string(),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl OpIterator for SeqScan {
    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.inner.has_next()
    }

    fn next(&mut self) -> Result<Tuple> {
        self.inner.next()
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner.rewind()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}
