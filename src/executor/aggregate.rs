use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::OpIterator;
use crate::types::{Field, Tuple, TupleDesc, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        };
        write!(f, "{}", name)
    }
}

/// Folds tuples into per-group accumulators.
///
/// Results come out one tuple per group in first-seen order: `(aggregate)`
/// without grouping, `(group, aggregate)` with it.
pub trait Aggregator: Send {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()>;

    fn results(&self) -> Result<Vec<Tuple>>;
}

/// Groups in first-seen order, keyed by the group value (`None` when ungrouped)
struct Groups<S> {
    order: Vec<Option<Field>>,
    state: HashMap<Option<Field>, S>,
}

impl<S: Default> Groups<S> {
    fn new() -> Self {
        Groups {
            order: Vec::new(),
            state: HashMap::new(),
        }
    }

    fn entry(&mut self, key: Option<Field>) -> &mut S {
        if !self.state.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.state.entry(key).or_default()
    }

    fn iter(&self) -> impl Iterator<Item = (&Option<Field>, &S)> + '_ {
        self.order
            .iter()
            .filter_map(move |key| self.state.get(key).map(|state| (key, state)))
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn group_key(group_field: Option<usize>, tuple: &Tuple) -> Result<Option<Field>> {
    match group_field {
        None => Ok(None),
        Some(idx) => tuple.field(idx).cloned().map(Some).ok_or_else(|| {
            Error::InvalidOperation(format!("group field {} missing from tuple", idx))
        }),
    }
}

fn result_tuple(key: &Option<Field>, value: Field) -> Tuple {
    match key {
        Some(group) => Tuple::new(vec![group.clone(), value]),
        None => Tuple::new(vec![value]),
    }
}

fn int_field(value: i64) -> Result<Field> {
    i32::try_from(value)
        .map(Field::Int)
        .map_err(|_| Error::InvalidOperation(format!("aggregate value {} overflows INT", value)))
}

/// Running state for one group. Sum and count are exact, so AVG does not
/// depend on merge order.
#[derive(Debug, Default)]
struct IntAccumulator {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl IntAccumulator {
    fn merge(&mut self, v: i32) {
        self.count += 1;
        self.sum += v as i64;
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    fn value(&self, op: AggregateOp) -> Result<Option<Field>> {
        let value = match op {
            AggregateOp::Count => Some(self.count),
            AggregateOp::Sum => Some(self.sum),
            AggregateOp::Min => self.min.map(i64::from),
            AggregateOp::Max => self.max.map(i64::from),
            // i64 division truncates toward zero
            AggregateOp::Avg => (self.count > 0).then(|| self.sum / self.count),
        };
        value.map(int_field).transpose()
    }
}

/// MIN/MAX/SUM/AVG/COUNT over an `INT` column
pub struct IntegerAggregator {
    group_field: Option<usize>,
    agg_field: usize,
    op: AggregateOp,
    groups: Groups<IntAccumulator>,
}

impl IntegerAggregator {
    pub fn new(group_field: Option<usize>, agg_field: usize, op: AggregateOp) -> Self {
        IntegerAggregator {
            group_field,
            agg_field,
            op,
            groups: Groups::new(),
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()> {
        let value = tuple
            .field(self.agg_field)
            .and_then(Field::as_int)
            .ok_or_else(|| {
                Error::InvalidOperation(format!("field {} is not an INT", self.agg_field))
            })?;
        let key = group_key(self.group_field, tuple)?;
        self.groups.entry(key).merge(value);
        Ok(())
    }

    fn results(&self) -> Result<Vec<Tuple>> {
        if self.groups.is_empty() && self.group_field.is_none() {
            // Ungrouped COUNT/SUM over no rows is zero; the rest have no value
            return Ok(match self.op {
                AggregateOp::Count | AggregateOp::Sum => vec![Tuple::new(vec![Field::Int(0)])],
                _ => Vec::new(),
            });
        }
        let mut results = Vec::with_capacity(self.groups.order.len());
        for (key, acc) in self.groups.iter() {
            if let Some(value) = acc.value(self.op)? {
                results.push(result_tuple(key, value));
            }
        }
        Ok(results)
    }
}

/// COUNT over a `STRING` column
pub struct StringAggregator {
    group_field: Option<usize>,
    agg_field: usize,
    groups: Groups<i64>,
}

impl StringAggregator {
    pub fn new(group_field: Option<usize>, agg_field: usize, op: AggregateOp) -> Result<Self> {
        if op != AggregateOp::Count {
            return Err(Error::InvalidOperation(format!(
                "{} is not supported on STRING columns",
                op
            )));
        }
        Ok(StringAggregator {
            group_field,
            agg_field,
            groups: Groups::new(),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()> {
        if tuple.field(self.agg_field).and_then(Field::as_str).is_none() {
            return Err(Error::InvalidOperation(format!(
                "field {} is not a STRING",
                self.agg_field
            )));
        }
        let key = group_key(self.group_field, tuple)?;
        *self.groups.entry(key) += 1;
        Ok(())
    }

    fn results(&self) -> Result<Vec<Tuple>> {
        if self.groups.is_empty() && self.group_field.is_none() {
            return Ok(vec![Tuple::new(vec![Field::Int(0)])]);
        }
        self.groups
            .iter()
            .map(|(key, &count)| Ok(result_tuple(key, int_field(count)?)))
            .collect()
    }
}

/// Computes one aggregate over the child, optionally grouped by one column.
///
/// The child is drained on `open`; results are then served from memory.
pub struct Aggregate {
    child: Box<dyn OpIterator>,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    td: TupleDesc,
    results: Option<Vec<Tuple>>,
    pos: usize,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn OpIterator>,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self> {
        let child_td = child.tuple_desc();
        let agg_type = child_td.field_type(agg_field).ok_or_else(|| {
            Error::InvalidOperation(format!("aggregate field {} out of range", agg_field))
        })?;
        if agg_type == Type::String && op != AggregateOp::Count {
            return Err(Error::InvalidOperation(format!(
                "{} is not supported on STRING columns",
                op
            )));
        }

        let agg_name = format!("{}({})", op, child_td.field_name(agg_field).unwrap_or("null"));
        let td = match group_field {
            None => TupleDesc::new(vec![Type::Int], vec![agg_name]),
            Some(idx) => {
                let group_type = child_td.field_type(idx).ok_or_else(|| {
                    Error::InvalidOperation(format!("group field {} out of range", idx))
                })?;
                let group_name = child_td.field_name(idx).unwrap_or("null").to_string();
                TupleDesc::new(vec![group_type, Type::Int], vec![group_name, agg_name])
            }
        };

        Ok(Aggregate {
            child,
            agg_field,
            group_field,
            op,
            td,
            results: None,
            pos: 0,
        })
    }

    fn aggregator(&self) -> Result<Box<dyn Aggregator>> {
        let agg_type = self.child.tuple_desc().field_type(self.agg_field);
        Ok(match agg_type {
            Some(Type::String) => Box::new(StringAggregator::new(
                self.group_field,
                self.agg_field,
                self.op,
            )?),
            _ => Box::new(IntegerAggregator::new(
                self.group_field,
                self.agg_field,
                self.op,
            )),
        })
    }

    fn results(&self, what: &'static str) -> Result<&Vec<Tuple>> {
        self.results.as_ref().ok_or(Error::IteratorProtocol(what))
    }
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> Result<()> {
        let mut aggregator = self.aggregator()?;
        self.child.open()?;
        while self.child.has_next()? {
            aggregator.merge_tuple_into_group(&self.child.next()?)?;
        }
        let results = aggregator.results()?;
        debug!(op = %self.op, groups = results.len(), "aggregate computed");
        self.results = Some(results);
        self.pos = 0;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        let pos = self.pos;
        Ok(pos < self.results("has_next called on a closed aggregate")?.len())
    }

    fn next(&mut self) -> Result<Tuple> {
        let tuple = self
            .results("next called on a closed aggregate")?
            .get(self.pos)
            .cloned()
            .ok_or(Error::IteratorProtocol("next called on an exhausted aggregate"))?;
        self.pos += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.results("rewind called on a closed aggregate")?;
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.results("close called on a closed aggregate")?;
        self.results = None;
        self.child.close()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}
