use std::cmp::Ordering;
use std::time::Instant;

use super::support::{dataset, identity, port};
use crate::protocol::ptp::bmc::{Recommendation, dataset_cmp, recommend, select_best};
use crate::protocol::ptp::dataset::{ClockDataset, ClockQuality};
use crate::protocol::ptp::foreign::ForeignMasterRecord;

fn record(ds: ClockDataset, n: u8) -> ForeignMasterRecord {
    ForeignMasterRecord {
        dataset: ds,
        source: port(n),
        last_sequence_id: 0,
        messages_received: 2,
        last_update: Instant::now(),
    }
}

// ===== Ordering =====

#[test]
fn test_identity_breaks_ties() {
    let a = dataset(1, 128, 248);
    let b = dataset(2, 128, 248);
    assert_eq!(dataset_cmp(&a, &b), Ordering::Less);
    assert_eq!(dataset_cmp(&b, &a), Ordering::Greater);
    assert_eq!(dataset_cmp(&a, &a), Ordering::Equal);
}

#[test]
fn test_priority1_beats_class() {
    let strong_class = dataset(1, 200, 6);
    let low_priority = dataset(2, 100, 248);
    assert_eq!(dataset_cmp(&low_priority, &strong_class), Ordering::Less);
}

#[test]
fn test_field_precedence() {
    let base = dataset(5, 128, 100);

    let better_accuracy = ClockDataset {
        quality: ClockQuality {
            clock_accuracy: 0x20,
            ..base.quality
        },
        ..base
    };
    assert!(dataset_cmp(&better_accuracy, &base).is_lt());

    let better_variance = ClockDataset {
        quality: ClockQuality {
            offset_scaled_log_variance: 0x1000,
            ..base.quality
        },
        ..base
    };
    assert!(dataset_cmp(&better_variance, &base).is_lt());

    let better_p2 = ClockDataset {
        priority2: 1,
        identity: identity(200),
        ..base
    };
    assert!(dataset_cmp(&better_p2, &base).is_lt());
}

#[test]
fn test_fewer_steps_wins_for_same_grandmaster() {
    let near = dataset(3, 128, 248);
    let far = ClockDataset {
        steps_removed: 2,
        ..near
    };
    assert!(dataset_cmp(&near, &far).is_lt());
}

// ===== Selection =====

#[test]
fn test_select_best_lowest() {
    let records = [
        record(dataset(3, 128, 248), 3),
        record(dataset(1, 128, 248), 1),
        record(dataset(2, 128, 248), 2),
    ];
    let best = select_best(records.iter(), None).unwrap();
    assert_eq!(best.source, port(1));
}

#[test]
fn test_select_best_empty() {
    let records: Vec<ForeignMasterRecord> = Vec::new();
    assert!(select_best(records.iter(), None).is_none());
}

#[test]
fn test_hysteresis_keeps_parent_of_equal_quality() {
    let records = [
        record(dataset(1, 128, 248), 1),
        record(dataset(2, 128, 248), 2),
    ];
    let parent = port(2);
    let best = select_best(records.iter(), Some(&parent)).unwrap();
    assert_eq!(best.source, port(2));
}

#[test]
fn test_strictly_better_quality_displaces_parent() {
    let records = [
        record(dataset(1, 127, 248), 1),
        record(dataset(2, 128, 248), 2),
    ];
    let parent = port(2);
    let best = select_best(records.iter(), Some(&parent)).unwrap();
    assert_eq!(best.source, port(1));
}

// ===== Recommendation =====

#[test]
fn test_recommend_without_candidates() {
    let local = ClockDataset::local(identity(9));
    assert_eq!(recommend(&local, false, None, None), Recommendation::Master);
    assert_eq!(recommend(&local, true, None, None), Recommendation::Listening);
}

#[test]
fn test_recommend_slave_only_always_follows() {
    let local = dataset(0, 1, 6);
    let worse = record(dataset(4, 255, 248), 4);
    assert_eq!(
        recommend(&local, true, Some(&worse), None),
        Recommendation::Slave(port(4))
    );
}

#[test]
fn test_recommend_master_when_local_better() {
    let local = dataset(1, 100, 248);
    let foreign = record(dataset(2, 128, 248), 2);
    assert_eq!(
        recommend(&local, false, Some(&foreign), None),
        Recommendation::Master
    );
}

#[test]
fn test_recommend_slave_when_foreign_better() {
    let local = ClockDataset::local(identity(9));
    let foreign = record(dataset(2, 128, 6), 2);
    assert_eq!(
        recommend(&local, false, Some(&foreign), None),
        Recommendation::Slave(port(2))
    );
}

#[test]
fn test_recommend_passive_for_grandmaster_capable_clock() {
    let local = dataset(9, 128, 13);
    let foreign = record(dataset(2, 128, 6), 2);
    assert_eq!(
        recommend(&local, false, Some(&foreign), None),
        Recommendation::Passive(port(2))
    );
}

#[test]
fn test_recommend_stays_slave_on_equal_quality() {
    // local identity is lower, but the parent advertises the same quality
    let local = dataset(1, 128, 248);
    let foreign = record(dataset(2, 128, 248), 2);
    let parent = port(2);
    assert_eq!(
        recommend(&local, false, Some(&foreign), Some(&parent)),
        Recommendation::Slave(port(2))
    );
    assert_eq!(
        recommend(&local, false, Some(&foreign), None),
        Recommendation::Master
    );
}
