use std::time::{Duration, Instant};

use super::support::{dataset, identity, port};
use crate::error::PtpError;
use crate::protocol::ptp::foreign::{ForeignMasterTable, ForeignUpdate};

#[test]
fn test_insert_then_update() {
    let now = Instant::now();
    let mut table = ForeignMasterTable::new(4);
    assert!(table.is_empty());

    let update = table.consider(dataset(1, 128, 248), port(1), 10, now).unwrap();
    assert_eq!(update, ForeignUpdate::Inserted);
    let update = table.consider(dataset(1, 100, 248), port(1), 11, now).unwrap();
    assert_eq!(update, ForeignUpdate::Updated);

    let record = table.get(&identity(1)).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(record.messages_received, 2);
    assert_eq!(record.last_sequence_id, 11);
    assert_eq!(record.dataset.priority1, 100, "dataset replaced wholesale");
}

#[test]
fn test_full_table_rejects_worse_candidate() {
    let now = Instant::now();
    let mut table = ForeignMasterTable::new(2);
    table.consider(dataset(1, 100, 248), port(1), 0, now).unwrap();
    table.consider(dataset(2, 100, 248), port(2), 0, now).unwrap();

    let result = table.consider(dataset(3, 200, 248), port(3), 0, now);
    assert!(matches!(result, Err(PtpError::TableFull)));
    assert_eq!(table.len(), 2);
    assert!(table.get(&identity(3)).is_none());
    assert!(table.get(&identity(1)).is_some());
    assert!(table.get(&identity(2)).is_some());
}

#[test]
fn test_full_table_evicts_worst_for_better_candidate() {
    let now = Instant::now();
    let mut table = ForeignMasterTable::new(2);
    table.consider(dataset(1, 100, 248), port(1), 0, now).unwrap();
    table.consider(dataset(2, 150, 248), port(2), 0, now).unwrap();

    let update = table.consider(dataset(3, 50, 248), port(3), 0, now).unwrap();
    assert_eq!(update, ForeignUpdate::Replaced(identity(2)));
    assert_eq!(table.len(), 2);
    assert_eq!(table.best_record().unwrap().source, port(3));
}

#[test]
fn test_best_qualified_needs_threshold() {
    let now = Instant::now();
    let mut table = ForeignMasterTable::new(4);
    table.consider(dataset(1, 100, 248), port(1), 0, now).unwrap();
    table.consider(dataset(2, 120, 248), port(2), 0, now).unwrap();
    table.consider(dataset(2, 120, 248), port(2), 1, now).unwrap();

    assert_eq!(table.best_record().unwrap().source, port(1));
    assert_eq!(table.best_qualified(2).unwrap().source, port(2));
    assert!(table.best_qualified(3).is_none());
}

#[test]
fn test_purge_stale_and_remove() {
    let start = Instant::now();
    let mut table = ForeignMasterTable::new(4);
    table.consider(dataset(1, 128, 248), port(1), 0, start).unwrap();
    table
        .consider(dataset(2, 128, 248), port(2), 0, start + Duration::from_secs(5))
        .unwrap();

    let removed = table.purge_stale(start + Duration::from_secs(6), Duration::from_secs(3));
    assert_eq!(removed, 1);
    assert!(table.get(&identity(1)).is_none());

    assert!(table.remove(&identity(2)).is_some());
    assert!(table.remove(&identity(2)).is_none());
    assert!(table.is_empty());
}

#[test]
fn test_zero_capacity_is_raised() {
    let mut table = ForeignMasterTable::new(0);
    assert_eq!(table.capacity(), 1);
    table
        .consider(dataset(1, 128, 248), port(1), 0, Instant::now())
        .unwrap();
    table.clear();
    assert!(table.is_empty());
}
