use std::collections::HashMap;
use std::sync::Arc;

use bincode::{Decode, Encode};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::base::TableId;
use crate::storage::files::HeapFile;
use crate::storage::DbFile;
use crate::types::TupleDesc;

/// What it takes to reopen a table: enough to rebuild its `HeapFile`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TableMetadata {
    /// Table name
    pub name: String,
    /// Path to the heap file
    pub file_path: String,
    pub page_size: u64,
    /// Table schema
    pub desc: TupleDesc,
}

/// Header written in front of serialized metadata
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
struct CatalogHeader {
    version: u32,
    num_tables: u32,
    /// Checksum of the metadata bytes that follow
    checksum: u64,
}

const CATALOG_VERSION: u32 = 1;

struct CatalogEntry {
    name: String,
    file: Arc<HeapFile>,
}

#[derive(Default)]
struct CatalogInner {
    tables: HashMap<TableId, CatalogEntry>,
    by_name: HashMap<String, TableId>,
}

/// Table name <-> heap file mapping
#[derive(Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `file` under `name`. A table already using that name is replaced.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.by_name.remove(name) {
            inner.tables.remove(&old);
        }
        let table_id = file.id();
        if let Some(old) = inner.tables.remove(&table_id) {
            inner.by_name.remove(&old.name);
        }
        inner.by_name.insert(name.to_string(), table_id);
        inner.tables.insert(
            table_id,
            CatalogEntry {
                name: name.to_string(),
                file,
            },
        );
    }

    pub fn file(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or_else(|| Error::Storage(format!("no table with id {:x}", table_id)))
    }

    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.inner
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::Storage(format!("no table named {}", name)))
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| Error::Storage(format!("no table with id {:x}", table_id)))
    }

    pub fn tuple_desc(&self, table_id: TableId) -> Result<Arc<TupleDesc>> {
        Ok(Arc::clone(self.file(table_id)?.tuple_desc()))
    }

    /// Ids of every registered table, in no particular order
    pub fn table_ids(&self) -> Vec<TableId> {
        self.inner.read().tables.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata for every registered table, sorted by name
    pub fn metadata(&self) -> Vec<TableMetadata> {
        let inner = self.inner.read();
        let mut tables: Vec<TableMetadata> = inner
            .tables
            .values()
            .map(|entry| TableMetadata {
                name: entry.name.clone(),
                file_path: entry.file.path().to_string_lossy().into_owned(),
                page_size: entry.file.page_size() as u64,
                desc: TupleDesc::clone(entry.file.tuple_desc()),
            })
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    /// Serialize catalog metadata for persistence
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let tables = self.metadata();

        let mut table_bytes = Vec::new();
        for table_meta in &tables {
            let encoded = bincode::encode_to_vec(table_meta, bincode::config::standard())?;
            table_bytes.extend_from_slice(&encoded);
        }

        let header = CatalogHeader {
            version: CATALOG_VERSION,
            num_tables: tables.len() as u32,
            checksum: compute_checksum(&table_bytes),
        };

        let mut result = bincode::encode_to_vec(&header, bincode::config::standard())?;
        result.extend_from_slice(&table_bytes);
        Ok(result)
    }

    /// Decode metadata written by `serialize`
    pub fn deserialize(data: &[u8]) -> Result<Vec<TableMetadata>> {
        let (header, bytes_read): (CatalogHeader, usize) =
            bincode::decode_from_slice(data, bincode::config::standard())?;
        if header.version != CATALOG_VERSION {
            return Err(Error::Codec(format!(
                "unsupported catalog version {}",
                header.version
            )));
        }

        let table_bytes = &data[bytes_read..];
        let expected_checksum = compute_checksum(table_bytes);
        if header.checksum != expected_checksum {
            return Err(Error::Codec(format!(
                "catalog checksum mismatch: expected {}, got {}",
                expected_checksum, header.checksum
            )));
        }

        let mut tables = Vec::with_capacity(header.num_tables as usize);
        let mut offset = 0;
        for _ in 0..header.num_tables {
            let (metadata, bytes_read): (TableMetadata, usize) =
                bincode::decode_from_slice(&table_bytes[offset..], bincode::config::standard())?;
            tables.push(metadata);
            offset += bytes_read;
        }
        Ok(tables)
    }
}

/// Compute simple checksum for metadata validation
fn compute_checksum(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &byte| {
        acc.wrapping_mul(31).wrapping_add(byte as u64)
    })
}
