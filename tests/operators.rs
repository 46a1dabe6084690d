mod common;

use std::sync::Arc;

use cinderdb::executor::{
    collect, Aggregate, AggregateOp, Delete, Filter, Insert, OpIterator, Predicate, SeqScan,
};
use cinderdb::{AbortReason, DbFile, Error, Field, Op, PageId, Permissions, TransactionId};
use common::{
    insert_committed, int_row, open_db, person, person_desc, scan_all, test_config, two_int_desc,
    TestDir, VecSource,
};
use serial_test::serial;

#[test]
fn test_seq_scan_prefixes_names() {
    let dir = TestDir::new("ops-scan");
    let (db, table_id) = open_db(&dir, test_config(), "t", two_int_desc());
    insert_committed(&db, table_id, (0..3).map(|i| int_row(&[i, -i])).collect());

    let tx = TransactionId::new();
    let mut scan = SeqScan::new(db.pool(), tx, table_id, "t1").unwrap();
    assert_eq!(scan.alias(), "t1");
    assert_eq!(scan.tuple_desc().field_name(0), Some("t1.a"));
    assert_eq!(scan.tuple_desc().field_name(1), Some("t1.b"));

    scan.open().unwrap();
    let rows = collect(&mut scan).unwrap();
    assert_eq!(rows, (0..3).map(|i| int_row(&[i, -i])).collect::<Vec<_>>());
    scan.rewind().unwrap();
    assert_eq!(collect(&mut scan).unwrap().len(), 3);
    scan.close().unwrap();
    db.pool().transaction_complete(tx, true).unwrap();
}

#[test]
fn test_filter_over_scan() {
    let dir = TestDir::new("ops-filter");
    let (db, table_id) = open_db(&dir, test_config(), "t", two_int_desc());
    insert_committed(&db, table_id, (0..20).map(|i| int_row(&[i, i % 3])).collect());

    let tx = TransactionId::new();
    let scan = SeqScan::new(db.pool(), tx, table_id, "t").unwrap();
    let mut filter = Filter::new(
        Predicate::new(1, Op::Equals, Field::Int(0)),
        Box::new(scan),
    )
    .unwrap();
    filter.open().unwrap();
    let a: Vec<i32> = collect(&mut filter)
        .unwrap()
        .iter()
        .map(|t| t.field(0).and_then(Field::as_int).unwrap())
        .collect();
    assert_eq!(a, vec![0, 3, 6, 9, 12, 15, 18]);
    filter.close().unwrap();
    db.pool().transaction_complete(tx, true).unwrap();

    let tx = TransactionId::new();
    let scan = SeqScan::new(db.pool(), tx, table_id, "t").unwrap();
    assert!(matches!(
        Filter::new(Predicate::new(2, Op::Equals, Field::Int(0)), Box::new(scan)),
        Err(Error::InvalidOperation(_))
    ));
    db.pool().transaction_complete(tx, true).unwrap();
}

#[test]
fn test_insert_reports_count_once() {
    let dir = TestDir::new("ops-insert");
    let (db, table_id) = open_db(&dir, test_config(), "t", two_int_desc());

    let tx = TransactionId::new();
    let source = VecSource::new(two_int_desc(), (0..25).map(|i| int_row(&[i, i])).collect());
    let mut insert = Insert::new(Arc::clone(db.pool()), tx, Box::new(source), table_id).unwrap();
    assert_eq!(insert.tuple_desc().field_name(0), Some("count"));

    insert.open().unwrap();
    assert_eq!(collect(&mut insert).unwrap(), vec![int_row(&[25])]);
    assert!(matches!(insert.next(), Err(Error::IteratorProtocol(_))));

    // Rewinding replays the count without inserting again
    insert.rewind().unwrap();
    assert_eq!(insert.next().unwrap(), int_row(&[25]));
    insert.close().unwrap();
    db.pool().transaction_complete(tx, true).unwrap();

    assert_eq!(scan_all(&db, table_id).len(), 25);
}

#[test]
fn test_insert_rejects_mismatched_child() {
    let dir = TestDir::new("ops-insert-schema");
    let (db, table_id) = open_db(&dir, test_config(), "t", two_int_desc());
    let tx = TransactionId::new();
    let source = VecSource::new(person_desc(), vec![person(1, "ada")]);
    assert!(matches!(
        Insert::new(Arc::clone(db.pool()), tx, Box::new(source), table_id),
        Err(Error::InvalidOperation(_))
    ));
    db.pool().transaction_complete(tx, false).unwrap();
}

#[test]
fn test_copy_between_tables() {
    let dir = TestDir::new("ops-copy");
    let (db, src) = open_db(&dir, test_config(), "src", person_desc());
    let dst = db
        .open_table("dst", dir.join("dst.dat"), person_desc())
        .unwrap()
        .id();
    insert_committed(&db, src, vec![person(1, "ada"), person(2, "grace")]);

    let tx = TransactionId::new();
    let scan = SeqScan::new(db.pool(), tx, src, "s").unwrap();
    let mut insert = Insert::new(Arc::clone(db.pool()), tx, Box::new(scan), dst).unwrap();
    insert.open().unwrap();
    assert_eq!(insert.next().unwrap(), int_row(&[2]));
    insert.close().unwrap();
    db.pool().transaction_complete(tx, true).unwrap();

    assert_eq!(scan_all(&db, dst), vec![person(1, "ada"), person(2, "grace")]);
}

#[test]
fn test_delete_filtered_rows() {
    let dir = TestDir::new("ops-delete");
    let (db, table_id) = open_db(&dir, test_config(), "t", two_int_desc());
    insert_committed(&db, table_id, (0..10).map(|i| int_row(&[i, i])).collect());

    let tx = TransactionId::new();
    let scan = SeqScan::new(db.pool(), tx, table_id, "t").unwrap();
    let filter = Filter::new(
        Predicate::new(0, Op::GreaterThanOrEq, Field::Int(6)),
        Box::new(scan),
    )
    .unwrap();
    let mut delete = Delete::new(Arc::clone(db.pool()), tx, Box::new(filter));
    delete.open().unwrap();
    assert_eq!(collect(&mut delete).unwrap(), vec![int_row(&[4])]);
    delete.close().unwrap();
    db.pool().transaction_complete(tx, true).unwrap();

    assert_eq!(
        scan_all(&db, table_id),
        (0..6).map(|i| int_row(&[i, i])).collect::<Vec<_>>()
    );
}

#[test]
fn test_delete_propagates_storage_error() {
    let dir = TestDir::new("ops-delete-error");
    let (db, _table_id) = open_db(&dir, test_config(), "t", two_int_desc());

    let tx = TransactionId::new();
    // In-memory tuples carry no record id
    let source = VecSource::new(two_int_desc(), vec![int_row(&[1, 1])]);
    let mut delete = Delete::new(Arc::clone(db.pool()), tx, Box::new(source));
    delete.open().unwrap();
    assert!(matches!(delete.has_next(), Err(Error::Storage(_))));
    db.pool().transaction_complete(tx, false).unwrap();
}

#[test]
fn test_aborted_delete_leaves_rows() {
    let dir = TestDir::new("ops-delete-abort");
    let (db, table_id) = open_db(&dir, test_config(), "t", two_int_desc());
    insert_committed(&db, table_id, (0..4).map(|i| int_row(&[i, i])).collect());

    let tx = TransactionId::new();
    let scan = SeqScan::new(db.pool(), tx, table_id, "t").unwrap();
    let mut delete = Delete::new(Arc::clone(db.pool()), tx, Box::new(scan));
    delete.open().unwrap();
    assert_eq!(delete.next().unwrap(), int_row(&[4]));
    delete.close().unwrap();
    db.pool().transaction_complete(tx, false).unwrap();

    assert_eq!(scan_all(&db, table_id).len(), 4);
}

#[test]
fn test_grouped_aggregate_over_scan() {
    let dir = TestDir::new("ops-aggregate");
    let (db, table_id) = open_db(&dir, test_config(), "t", two_int_desc());
    // Groups 1, 0 in first-seen order
    let rows = vec![
        int_row(&[1, 10]),
        int_row(&[0, 5]),
        int_row(&[1, 20]),
        int_row(&[0, 6]),
        int_row(&[1, 31]),
    ];
    insert_committed(&db, table_id, rows);

    let tx = TransactionId::new();
    let scan = SeqScan::new(db.pool(), tx, table_id, "t").unwrap();
    let mut agg = Aggregate::new(Box::new(scan), 1, Some(0), AggregateOp::Avg).unwrap();
    assert_eq!(agg.tuple_desc().field_name(0), Some("t.a"));
    assert_eq!(agg.tuple_desc().field_name(1), Some("avg(t.b)"));

    agg.open().unwrap();
    assert_eq!(
        collect(&mut agg).unwrap(),
        vec![int_row(&[1, 20]), int_row(&[0, 5])]
    );
    agg.close().unwrap();
    db.pool().transaction_complete(tx, true).unwrap();
}

#[test]
fn test_string_count_aggregate() {
    let dir = TestDir::new("ops-aggregate-str");
    let (db, table_id) = open_db(&dir, test_config(), "people", person_desc());
    insert_committed(
        &db,
        table_id,
        vec![person(1, "ada"), person(2, "grace"), person(3, "ken")],
    );

    let tx = TransactionId::new();
    let scan = SeqScan::new(db.pool(), tx, table_id, "p").unwrap();
    let mut count = Aggregate::new(Box::new(scan), 1, None, AggregateOp::Count).unwrap();
    count.open().unwrap();
    assert_eq!(collect(&mut count).unwrap(), vec![int_row(&[3])]);
    count.close().unwrap();

    let scan = SeqScan::new(db.pool(), tx, table_id, "p").unwrap();
    assert!(matches!(
        Aggregate::new(Box::new(scan), 1, None, AggregateOp::Sum),
        Err(Error::InvalidOperation(_))
    ));
    db.pool().transaction_complete(tx, true).unwrap();
}

#[test]
#[serial]
fn test_lock_timeout_surfaces_through_insert() {
    let dir = TestDir::new("ops-timeout");
    let (db, table_id) = open_db(&dir, test_config(), "t", two_int_desc());
    insert_committed(&db, table_id, vec![int_row(&[1, 1])]);

    let holder = TransactionId::new();
    db.pool()
        .get_page(holder, PageId::new(table_id, 0), Permissions::Exclusive)
        .unwrap();

    let tx = TransactionId::new();
    let source = VecSource::new(two_int_desc(), vec![int_row(&[2, 2])]);
    let mut insert = Insert::new(Arc::clone(db.pool()), tx, Box::new(source), table_id).unwrap();
    insert.open().unwrap();
    let err = insert.has_next().unwrap_err();
    assert!(matches!(
        err,
        Error::TransactionAborted {
            reason: AbortReason::LockTimeout,
            ..
        }
    ));
    db.pool().transaction_complete(tx, false).unwrap();
    db.pool().transaction_complete(holder, true).unwrap();

    assert_eq!(scan_all(&db, table_id), vec![int_row(&[1, 1])]);
}
