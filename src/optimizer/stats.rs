use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::buffer::BufferPool;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::optimizer::histogram::{IntHistogram, StringHistogram};
use crate::storage::catalog::Catalog;
use crate::storage::{DbFileIterator, TableId};
use crate::transaction::TransactionId;
use crate::types::{Field, Op, Type, TupleDesc};

/// Per-column histogram, chosen by the column type
#[derive(Debug, Clone)]
pub enum ColumnHistogram {
    Int(IntHistogram),
    String(StringHistogram),
}

impl ColumnHistogram {
    fn add(&mut self, field: &Field) {
        match (self, field) {
            (ColumnHistogram::Int(h), Field::Int(v)) => h.add_value(*v),
            (ColumnHistogram::String(h), Field::String(s)) => h.add_value(s),
            _ => {}
        }
    }
}

/// Statistics for one table, built by two full scans and immutable afterwards
#[derive(Debug, Clone)]
pub struct TableStats {
    table_id: TableId,
    io_cost_per_page: f64,
    num_pages: usize,
    total_tuples: usize,
    histograms: Vec<ColumnHistogram>,
}

impl TableStats {
    /// Scan `table_id` under a private transaction. The first pass finds the
    /// integer column bounds, the second fills the histograms.
    pub fn compute(
        pool: &Arc<BufferPool>,
        table_id: TableId,
        io_cost_per_page: f64,
        buckets: usize,
    ) -> Result<Self> {
        let started = Instant::now();
        let tx = TransactionId::new();
        let result = Self::scan(pool, tx, table_id, io_cost_per_page, buckets);
        // Read-only, so committing just releases the shared locks
        pool.transaction_complete(tx, true)?;

        let stats = result?;
        info!(
            table_id = stats.table_id,
            tuples = stats.total_tuples,
            pages = stats.num_pages,
            elapsed = ?started.elapsed(),
            "computed table statistics"
        );
        Ok(stats)
    }

    fn scan(
        pool: &Arc<BufferPool>,
        tx: TransactionId,
        table_id: TableId,
        io_cost_per_page: f64,
        buckets: usize,
    ) -> Result<Self> {
        let file = pool.file(table_id)?;
        let td = Arc::clone(file.tuple_desc());
        let mut iter = file.iterator(Arc::clone(pool), tx);
        iter.open()?;

        let mut bounds: Vec<Option<(i32, i32)>> = vec![None; td.num_fields()];
        let mut total_tuples = 0;
        while iter.has_next()? {
            let tuple = iter.next()?;
            total_tuples += 1;
            for (bound, field) in bounds.iter_mut().zip(tuple.fields()) {
                if let Field::Int(v) = field {
                    *bound = Some(match *bound {
                        Some((lo, hi)) => (lo.min(*v), hi.max(*v)),
                        None => (*v, *v),
                    });
                }
            }
        }
        debug!(table_id, tuples = total_tuples, "statistics bounds pass done");

        let mut histograms = Self::empty_histograms(&td, &bounds, buckets);
        iter.rewind()?;
        while iter.has_next()? {
            let tuple = iter.next()?;
            for (hist, field) in histograms.iter_mut().zip(tuple.fields()) {
                hist.add(field);
            }
        }
        iter.close()?;

        Ok(TableStats {
            table_id,
            io_cost_per_page,
            num_pages: file.num_pages(),
            total_tuples,
            histograms,
        })
    }

    fn empty_histograms(
        td: &TupleDesc,
        bounds: &[Option<(i32, i32)>],
        buckets: usize,
    ) -> Vec<ColumnHistogram> {
        td.types()
            .zip(bounds)
            .map(|(field_type, bound)| match field_type {
                Type::Int => {
                    let (lo, hi) = bound.unwrap_or((0, 0));
                    ColumnHistogram::Int(IntHistogram::new(buckets, lo, hi))
                }
                Type::String => ColumnHistogram::String(StringHistogram::new(buckets)),
            })
            .collect()
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Cost of reading the whole table: pages times per-page I/O cost
    pub fn estimate_scan_cost(&self) -> f64 {
        self.num_pages as f64 * self.io_cost_per_page
    }

    /// Expected number of rows passing a predicate of the given selectivity
    pub fn estimate_cardinality(&self, selectivity: f64) -> usize {
        (selectivity * self.total_tuples as f64).round() as usize
    }

    /// Fraction of rows expected to satisfy `field <op> constant`
    pub fn estimate_selectivity(&self, field: usize, op: Op, constant: &Field) -> Result<f64> {
        let hist = self.histograms.get(field).ok_or_else(|| {
            Error::InvalidOperation(format!(
                "field {} out of range ({} columns)",
                field,
                self.histograms.len()
            ))
        })?;
        match (hist, constant) {
            (ColumnHistogram::Int(h), Field::Int(v)) => Ok(h.estimate_selectivity(op, *v)),
            (ColumnHistogram::String(h), Field::String(s)) => Ok(h.estimate_selectivity(op, s)),
            _ => Err(Error::InvalidOperation(format!(
                "cannot compare field {} with {} constant",
                field,
                constant.field_type()
            ))),
        }
    }

    pub fn histogram(&self, field: usize) -> Option<&ColumnHistogram> {
        self.histograms.get(field)
    }

    pub fn total_tuples(&self) -> usize {
        self.total_tuples
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }
}

/// Table statistics by table name. Replacing an entry never disturbs readers
/// still holding the previous one.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    stats: RwLock<HashMap<String, Arc<TableStats>>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table_name: &str) -> Option<Arc<TableStats>> {
        self.stats.read().get(table_name).cloned()
    }

    /// Install `stats` for `table_name` and return the new entry
    pub fn replace(&self, table_name: &str, stats: TableStats) -> Arc<TableStats> {
        let stats = Arc::new(stats);
        self.stats
            .write()
            .insert(table_name.to_string(), Arc::clone(&stats));
        stats
    }

    pub fn remove(&self, table_name: &str) -> Option<Arc<TableStats>> {
        self.stats.write().remove(table_name)
    }

    /// Snapshot of every entry
    pub fn all(&self) -> HashMap<String, Arc<TableStats>> {
        self.stats.read().clone()
    }

    pub fn len(&self) -> usize {
        self.stats.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild statistics for every table in `catalog`
    pub fn compute_all(
        &self,
        catalog: &Catalog,
        pool: &Arc<BufferPool>,
        config: &Config,
    ) -> Result<()> {
        for table_id in catalog.table_ids() {
            let name = catalog.table_name(table_id)?;
            let stats = TableStats::compute(
                pool,
                table_id,
                config.io_cost_per_page,
                config.histogram_buckets,
            )?;
            self.replace(&name, stats);
        }
        info!(tables = self.len(), "computed statistics for all tables");
        Ok(())
    }
}
