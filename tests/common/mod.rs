#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cinderdb::executor::OpIterator;
use cinderdb::{
    Config, Database, DbFile, DbFileIterator, Error, Field, Result, TableId, TransactionId, Tuple,
    TupleDesc, Type,
};
use tracing_subscriber::EnvFilter;

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

/// Route `tracing` output through the test harness; set RUST_LOG to see it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Isolated temp directory, removed on drop
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "cinder-test-{}-{}-{}",
            name,
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("failed to create temp dir");
        TestDir { path }
    }

    pub fn join(&self, file: &str) -> PathBuf {
        self.path.join(file)
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

impl AsRef<Path> for TestDir {
    fn as_ref(&self) -> &Path {
        self.path.as_ref()
    }
}

/// Small, fast config: short lock waits, no fsync
pub fn test_config() -> Config {
    Config::default()
        .with_lock_timeout(Duration::from_millis(300))
        .with_sync_on_commit(false)
}

/// `(a INT, b INT)`
pub fn two_int_desc() -> TupleDesc {
    TupleDesc::new(vec![Type::Int, Type::Int], vec!["a".into(), "b".into()])
}

/// `(id INT, name STRING)`
pub fn person_desc() -> TupleDesc {
    TupleDesc::new(vec![Type::Int, Type::String], vec!["id".into(), "name".into()])
}

pub fn int_row(values: &[i32]) -> Tuple {
    Tuple::new(values.iter().map(|&v| Field::Int(v)).collect())
}

pub fn person(id: i32, name: &str) -> Tuple {
    Tuple::new(vec![Field::Int(id), Field::String(name.to_string())])
}

/// A database over `dir` with one open table
pub fn open_db(dir: &TestDir, config: Config, name: &str, td: TupleDesc) -> (Database, TableId) {
    init_tracing();
    let db = Database::new(config);
    let file = db
        .open_table(name, dir.join(&format!("{}.dat", name)), td)
        .expect("open table");
    let table_id = file.id();
    (db, table_id)
}

/// Insert `rows` in one committed transaction
pub fn insert_committed(db: &Database, table_id: TableId, rows: Vec<Tuple>) {
    let tx = TransactionId::new();
    for mut row in rows {
        db.pool()
            .insert_tuple(tx, table_id, &mut row)
            .expect("insert");
    }
    db.pool().transaction_complete(tx, true).expect("commit");
}

/// Every live tuple of `table_id`, read in a fresh committed transaction
pub fn scan_all(db: &Database, table_id: TableId) -> Vec<Tuple> {
    let tx = TransactionId::new();
    let file = db.pool().file(table_id).expect("file");
    let mut iter = file.iterator(Arc::clone(db.pool()), tx);
    iter.open().expect("open");
    let mut out = Vec::new();
    while iter.has_next().expect("has_next") {
        out.push(iter.next().expect("next"));
    }
    iter.close().expect("close");
    db.pool().transaction_complete(tx, true).expect("commit");
    out
}

/// In-memory child operator over fixed tuples
pub struct VecSource {
    td: TupleDesc,
    tuples: Vec<Tuple>,
    pos: Option<usize>,
}

impl VecSource {
    pub fn new(td: TupleDesc, tuples: Vec<Tuple>) -> Self {
        VecSource {
            td,
            tuples,
            pos: None,
        }
    }
}

impl OpIterator for VecSource {
    fn open(&mut self) -> Result<()> {
        self.pos = Some(0);
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        let pos = self.pos.ok_or(Error::IteratorProtocol("source not open"))?;
        Ok(pos < self.tuples.len())
    }

    fn next(&mut self) -> Result<Tuple> {
        let pos = self.pos.ok_or(Error::IteratorProtocol("source not open"))?;
        let tuple = self
            .tuples
            .get(pos)
            .cloned()
            .ok_or(Error::IteratorProtocol("source exhausted"))?;
        self.pos = Some(pos + 1);
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos.ok_or(Error::IteratorProtocol("source not open"))?;
        self.pos = Some(0);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.pos.take().ok_or(Error::IteratorProtocol("source not open"))?;
        Ok(())
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}
