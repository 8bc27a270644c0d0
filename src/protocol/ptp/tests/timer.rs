use std::time::Duration;

use crate::error::PtpError;
use crate::protocol::ptp::timer::{IntervalTimers, TIMER_ARRAY_SIZE, TickSource, TimerId};

fn timers(source: &TickSource) -> IntervalTimers {
    IntervalTimers::new(source.counter(), Duration::from_millis(100))
}

#[test]
fn test_expires_once_per_interval() {
    let source = TickSource::new();
    let mut t = timers(&source);
    t.start_ticks(TimerId::SyncInterval, 5);

    source.tick_n(3);
    assert!(!t.expired(TimerId::SyncInterval));
    source.tick_n(3);
    assert!(t.expired(TimerId::SyncInterval));
    assert!(!t.expired(TimerId::SyncInterval), "flag cleared on read");
    assert!(t.is_running(TimerId::SyncInterval));
}

#[test]
fn test_periodic_reload() {
    let source = TickSource::new();
    let mut t = timers(&source);
    t.start_ticks(TimerId::AnnounceInterval, 2);
    for _ in 0..3 {
        source.tick_n(2);
        assert!(t.expired(TimerId::AnnounceInterval));
    }
}

#[test]
fn test_stop_clears_pending_expiry() {
    let source = TickSource::new();
    let mut t = timers(&source);
    t.start_ticks(TimerId::Qualification, 1);
    source.tick();
    t.stop(TimerId::Qualification);
    assert!(!t.is_running(TimerId::Qualification));
    assert!(!t.expired(TimerId::Qualification));
    source.tick_n(5);
    assert!(!t.expired(TimerId::Qualification));
}

#[test]
fn test_restart_resets_countdown() {
    let source = TickSource::new();
    let mut t = timers(&source);
    t.start_ticks(TimerId::AnnounceReceipt, 3);
    source.tick_n(2);
    t.start_ticks(TimerId::AnnounceReceipt, 3);
    source.tick_n(2);
    assert!(!t.expired(TimerId::AnnounceReceipt));
    source.tick();
    assert!(t.expired(TimerId::AnnounceReceipt));
}

#[test]
fn test_ticks_before_start_are_ignored() {
    let source = TickSource::new();
    let mut t = timers(&source);
    source.tick_n(10);
    t.start_ticks(TimerId::SyncReceipt, 2);
    source.tick();
    assert!(!t.expired(TimerId::SyncReceipt));
}

#[test]
fn test_duration_rounds_up_to_ticks() {
    let source = TickSource::new();
    let t = timers(&source);
    assert_eq!(t.ticks_for(Duration::from_millis(250)), 3);
    assert_eq!(t.ticks_for(Duration::from_millis(100)), 1);
    assert_eq!(t.ticks_for(Duration::ZERO), 1);
}

#[test]
fn test_stop_all() {
    let source = TickSource::new();
    let mut t = timers(&source);
    for id in TimerId::ALL {
        t.start(id, Duration::from_secs(1));
    }
    t.stop_all();
    assert!(TimerId::ALL.iter().all(|id| !t.is_running(*id)));
}

#[test]
fn test_counters_are_independent() {
    let source = TickSource::new();
    let mut a = timers(&source);
    let mut b = timers(&source);
    a.start_ticks(TimerId::SyncInterval, 1);
    b.start_ticks(TimerId::SyncInterval, 1);
    source.tick();
    assert!(a.expired(TimerId::SyncInterval));
    assert!(b.expired(TimerId::SyncInterval));
}

#[test]
fn test_timer_index_conversion() {
    assert_eq!(TimerId::try_from(0).unwrap(), TimerId::SyncReceipt);
    assert_eq!(TimerId::try_from(7).unwrap(), TimerId::FaultRecovery);
    assert!(matches!(
        TimerId::try_from(TIMER_ARRAY_SIZE),
        Err(PtpError::TimerIndexOutOfRange(8))
    ));
}
