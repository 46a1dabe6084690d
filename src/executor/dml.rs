use std::sync::Arc;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::error::{Error, Result};
use crate::executor::OpIterator;
use crate::storage::TableId;
use crate::transaction::TransactionId;
use crate::types::{Field, Tuple, TupleDesc, Type};

/// Single `INT` column holding the number of affected rows
fn count_desc() -> TupleDesc {
    TupleDesc::new(vec![Type::Int], vec!["count".to_string()])
}

fn count_tuple(count: usize) -> Result<Tuple> {
    let count = i32::try_from(count)
        .map_err(|_| Error::InvalidOperation(format!("row count {} overflows INT", count)))?;
    Ok(Tuple::new(vec![Field::Int(count)]))
}

/// Run-once state shared by the write operators: the count tuple is produced
/// on the first fetch and handed out exactly once per open/rewind.
#[derive(Default)]
struct CountState {
    opened: bool,
    result: Option<Tuple>,
    emitted: bool,
}

impl CountState {
    fn check_open(&self, what: &'static str) -> Result<()> {
        if self.opened {
            Ok(())
        } else {
            Err(Error::IteratorProtocol(what))
        }
    }

    fn take(&mut self) -> Result<Tuple> {
        match (&self.result, self.emitted) {
            (Some(tuple), false) => {
                self.emitted = true;
                Ok(tuple.clone())
            }
            _ => Err(Error::IteratorProtocol("next called on an exhausted operator")),
        }
    }
}

/// Inserts every child tuple into a table, then yields one count tuple.
/// The first storage error ends the operator with that error.
pub struct Insert {
    pool: Arc<BufferPool>,
    tx: TransactionId,
    child: Box<dyn OpIterator>,
    table_id: TableId,
    td: TupleDesc,
    state: CountState,
}

impl Insert {
    pub fn new(
        pool: Arc<BufferPool>,
        tx: TransactionId,
        child: Box<dyn OpIterator>,
        table_id: TableId,
    ) -> Result<Self> {
        let file = pool.file(table_id)?;
        if child.tuple_desc() != file.tuple_desc().as_ref() {
            return Err(Error::InvalidOperation(format!(
                "cannot insert [{}] into table with schema [{}]",
                child.tuple_desc(),
                file.tuple_desc()
            )));
        }
        Ok(Insert {
            pool,
            tx,
            child,
            table_id,
            td: count_desc(),
            state: CountState::default(),
        })
    }

    fn run(&mut self) -> Result<Tuple> {
        let mut count = 0;
        while self.child.has_next()? {
            let mut tuple = self.child.next()?;
            tuple.set_record_id(None);
            self.pool.insert_tuple(self.tx, self.table_id, &mut tuple)?;
            count += 1;
        }
        debug!(tx = %self.tx, table_id = self.table_id, count, "inserted tuples");
        count_tuple(count)
    }
}

impl OpIterator for Insert {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.state = CountState {
            opened: true,
            ..CountState::default()
        };
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.check_open("has_next called on a closed insert")?;
        if self.state.result.is_none() {
            self.state.result = Some(self.run()?);
        }
        Ok(!self.state.emitted)
    }

    fn next(&mut self) -> Result<Tuple> {
        self.has_next()?;
        self.state.take()
    }

    /// Replays the count; rows are not inserted a second time
    fn rewind(&mut self) -> Result<()> {
        self.state.check_open("rewind called on a closed insert")?;
        self.state.emitted = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.check_open("close called on a closed insert")?;
        self.state = CountState::default();
        self.child.close()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}

/// Deletes every child tuple (located by record id), then yields one count tuple
pub struct Delete {
    pool: Arc<BufferPool>,
    tx: TransactionId,
    child: Box<dyn OpIterator>,
    td: TupleDesc,
    state: CountState,
}

impl Delete {
    pub fn new(pool: Arc<BufferPool>, tx: TransactionId, child: Box<dyn OpIterator>) -> Self {
        Delete {
            pool,
            tx,
            child,
            td: count_desc(),
            state: CountState::default(),
        }
    }

    fn run(&mut self) -> Result<Tuple> {
        let mut count = 0;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            self.pool.delete_tuple(self.tx, &tuple)?;
            count += 1;
        }
        debug!(tx = %self.tx, count, "deleted tuples");
        count_tuple(count)
    }
}

impl OpIterator for Delete {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.state = CountState {
            opened: true,
            ..CountState::default()
        };
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.check_open("has_next called on a closed delete")?;
        if self.state.result.is_none() {
            self.state.result = Some(self.run()?);
        }
        Ok(!self.state.emitted)
    }

    fn next(&mut self) -> Result<Tuple> {
        self.has_next()?;
        self.state.take()
    }

    /// Replays the count; rows are not deleted a second time
    fn rewind(&mut self) -> Result<()> {
        self.state.check_open("rewind called on a closed delete")?;
        self.state.emitted = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.check_open("close called on a closed delete")?;
        self.state = CountState::default();
        self.child.close()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}
