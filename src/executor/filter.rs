use std::fmt;

use crate::error::{Error, Result};
use crate::executor::OpIterator;
use crate::types::{Field, Op, Tuple, TupleDesc};

/// `tuple[field] <op> operand`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: usize,
    pub op: Op,
    pub operand: Field,
}

impl Predicate {
    pub fn new(field: usize, op: Op, operand: Field) -> Self {
        Predicate { field, op, operand }
    }

    /// False when the tuple has no such field
    pub fn filter(&self, tuple: &Tuple) -> bool {
        tuple
            .field(self.field)
            .is_some_and(|value| value.compare(self.op, &self.operand))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{} {} {}", self.field, self.op, self.operand)
    }
}

/// Passes through the child tuples that satisfy a predicate
pub struct Filter {
    predicate: Predicate,
    child: Box<dyn OpIterator>,
    opened: bool,
    lookahead: Option<Tuple>,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn OpIterator>) -> Result<Self> {
        if predicate.field >= child.tuple_desc().num_fields() {
            return Err(Error::InvalidOperation(format!(
                "predicate field {} out of range ({} columns)",
                predicate.field,
                child.tuple_desc().num_fields()
            )));
        }
        Ok(Filter {
            predicate,
            child,
            opened: false,
            lookahead: None,
        })
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.opened = true;
        self.lookahead = None;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        if !self.opened {
            return Err(Error::IteratorProtocol("has_next called on a closed filter"));
        }
        if self.lookahead.is_some() {
            return Ok(true);
        }
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            if self.predicate.filter(&tuple) {
                self.lookahead = Some(tuple);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(Error::IteratorProtocol("next called on an exhausted filter"));
        }
        self.lookahead
            .take()
            .ok_or(Error::IteratorProtocol("next called on an exhausted filter"))
    }

    fn rewind(&mut self) -> Result<()> {
        if !self.opened {
            return Err(Error::IteratorProtocol("rewind called on a closed filter"));
        }
        self.lookahead = None;
        self.child.rewind()
    }

    fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Err(Error::IteratorProtocol("close called on a closed filter"));
        }
        self.opened = false;
        self.lookahead = None;
        self.child.close()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        self.child.tuple_desc()
    }
}
