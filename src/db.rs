use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::buffer::BufferPool;
use crate::config::Config;
use crate::error::Result;
use crate::optimizer::{StatsRegistry, TableStats};
use crate::storage::catalog::Catalog;
use crate::storage::{DbFile, HeapFile, TableId};
use crate::types::TupleDesc;

/// One page cache, the tables registered with it and their statistics
pub struct Database {
    config: Config,
    pool: Arc<BufferPool>,
    catalog: Catalog,
    stats: StatsRegistry,
}

impl Database {
    pub fn new(config: Config) -> Self {
        Database {
            pool: Arc::new(BufferPool::new(config.clone())),
            catalog: Catalog::new(),
            stats: StatsRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    /// Open (or create) the heap file at `path` and register it as `name`
    pub fn open_table<P: AsRef<Path>>(
        &self,
        name: &str,
        path: P,
        td: TupleDesc,
    ) -> Result<Arc<HeapFile>> {
        let file = HeapFile::open(path, td, self.config.page_size)?;
        Ok(self.attach(name, file))
    }

    /// Reopen every table described by serialized catalog metadata, each with
    /// the page size it was written with
    pub fn open_catalog(&self, data: &[u8]) -> Result<Vec<TableId>> {
        Catalog::deserialize(data)?
            .into_iter()
            .map(|meta| {
                let file = HeapFile::open(&meta.file_path, meta.desc, meta.page_size as usize)?;
                Ok(self.attach(&meta.name, file).id())
            })
            .collect()
    }

    fn attach(&self, name: &str, file: HeapFile) -> Arc<HeapFile> {
        let file = Arc::new(file);
        self.pool.register_file(Arc::clone(&file) as Arc<dyn DbFile>);
        self.catalog.add_table(Arc::clone(&file), name);
        info!(table = name, table_id = file.id(), pages = file.num_pages(), "opened table");
        file
    }

    /// Build statistics for `name` and cache them
    pub fn compute_table_stats(&self, name: &str) -> Result<Arc<TableStats>> {
        let table_id = self.catalog.table_id(name)?;
        let stats = TableStats::compute(
            &self.pool,
            table_id,
            self.config.io_cost_per_page,
            self.config.histogram_buckets,
        )?;
        Ok(self.stats.replace(name, stats))
    }

    /// Rebuild statistics for every table
    pub fn compute_statistics(&self) -> Result<()> {
        self.stats.compute_all(&self.catalog, &self.pool, &self.config)
    }
}
