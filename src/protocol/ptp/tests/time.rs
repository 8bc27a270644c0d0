use std::time::Duration;

use crate::protocol::ptp::time::{TimeInternal, TimeRepresentation, V2TimeRepresentation};

// ===== Normalization =====

#[test]
fn test_new_carries_nanoseconds() {
    let t = TimeInternal::new(1, 1_500_000_000);
    assert_eq!(t.seconds, 2);
    assert_eq!(t.nanoseconds, 500_000_000);
}

#[test]
fn test_new_fixes_mixed_signs() {
    let t = TimeInternal::new(1, -200_000_000);
    assert_eq!(t, TimeInternal { seconds: 0, nanoseconds: 800_000_000 });

    let t = TimeInternal::new(-1, 200_000_000);
    assert_eq!(t, TimeInternal { seconds: 0, nanoseconds: -800_000_000 });
}

#[test]
fn test_new_negative_overflow() {
    let t = TimeInternal::new(0, -2_500_000_000);
    assert_eq!(t.seconds, -2);
    assert_eq!(t.nanoseconds, -500_000_000);
}

// ===== Arithmetic =====

#[test]
fn test_add_sub() {
    let a = TimeInternal::new(100, 999_999_999);
    let b = TimeInternal::new(0, 2);
    assert_eq!(a + b, TimeInternal::new(101, 1));
    assert_eq!(b - a, TimeInternal::new(-100, -999_999_997));
    assert_eq!((a - a), TimeInternal::ZERO);
}

#[test]
fn test_sub_crossing_zero() {
    let t2 = TimeInternal::new(100, 500);
    let t1 = TimeInternal::new(100, 0);
    assert_eq!(t2 - t1, TimeInternal::from_nanos(500));
    assert_eq!(t1 - t2, TimeInternal::from_nanos(-500));
    assert!((t1 - t2).is_negative());
}

#[test]
fn test_halve() {
    assert_eq!(TimeInternal::from_nanos(900).halve(), TimeInternal::from_nanos(450));
    assert_eq!(TimeInternal::new(3, 0).halve(), TimeInternal::new(1, 500_000_000));
    assert_eq!(TimeInternal::new(-3, 0).halve(), TimeInternal::new(-1, -500_000_000));
    assert_eq!(TimeInternal::from_nanos(-7).halve(), TimeInternal::from_nanos(-3));
}

#[test]
fn test_abs_and_neg() {
    let t = TimeInternal::new(-2, -5);
    assert_eq!(t.abs(), TimeInternal::new(2, 5));
    assert_eq!(-t, TimeInternal::new(2, 5));
    assert!(TimeInternal::ZERO.is_zero());
    assert!(!TimeInternal::ZERO.is_negative());
}

#[test]
fn test_nanos_conversion() {
    assert_eq!(TimeInternal::new(2, 5).to_nanos(), 2_000_000_005);
    assert_eq!(TimeInternal::from_nanos(-1_000_000_001), TimeInternal::new(-1, -1));
}

// ===== Intervals and durations =====

#[test]
fn test_from_log_interval() {
    assert_eq!(TimeInternal::from_log_interval(0), TimeInternal::new(1, 0));
    assert_eq!(TimeInternal::from_log_interval(1), TimeInternal::new(2, 0));
    assert_eq!(TimeInternal::from_log_interval(-1), TimeInternal::from_nanos(500_000_000));
    assert_eq!(TimeInternal::from_log_interval(-3), TimeInternal::from_nanos(125_000_000));
}

#[test]
fn test_duration_conversion() {
    let t = TimeInternal::from(Duration::from_millis(1500));
    assert_eq!(t, TimeInternal::new(1, 500_000_000));
    assert_eq!(t.to_duration(), Duration::from_millis(1500));
    assert_eq!(TimeInternal::from_nanos(-1).to_duration(), Duration::ZERO);
}

#[test]
fn test_display() {
    assert_eq!(TimeInternal::new(1, 5).to_string(), "1.000000005");
    assert_eq!(TimeInternal::from_nanos(-50).to_string(), "-0.000000050");
    assert_eq!(TimeInternal::ZERO.to_string(), "0.000000000");
}

// ===== Wire representations =====

#[test]
fn test_v1_negative_sets_sign_bit() {
    let rep = TimeInternal::new(-5, -10).to_v1(false);
    assert_eq!(rep.seconds, 5);
    assert_eq!(rep.nanoseconds, 0x8000_000A);
    let (back, half_epoch) = rep.to_internal();
    assert_eq!(back, TimeInternal::new(-5, -10));
    assert!(!half_epoch);
}

#[test]
fn test_v1_half_epoch_flag() {
    let rep = TimeRepresentation {
        seconds: 0x8000_0005,
        nanoseconds: 0,
    };
    let (t, half_epoch) = rep.to_internal();
    assert!(half_epoch);
    assert_eq!(t.seconds, 6);
}

#[test]
fn test_v2_representation_keeps_epoch() {
    let rep = TimeInternal::new(1_000, 1).to_v2(false, 7);
    assert_eq!(rep.epoch_number, 7);
    assert_eq!(rep.seconds, 1_000);
    assert_eq!(rep.to_internal(), TimeInternal::new(1_000, 1));

    let negative = V2TimeRepresentation {
        epoch_number: 0,
        seconds: 1,
        nanoseconds: 0x8000_0001,
    };
    assert_eq!(negative.to_internal(), TimeInternal::new(-1, -1));
}

// ===== Correction field =====

#[test]
fn test_correction_positive() {
    assert_eq!(TimeInternal::from_correction(0), TimeInternal::ZERO);
    assert_eq!(TimeInternal::from_correction(100 << 16), TimeInternal::from_nanos(100));
    assert_eq!(TimeInternal::from_nanos(250).to_correction(), 250 << 16);
}

#[test]
fn test_correction_negative_truncates_toward_zero() {
    assert_eq!(
        TimeInternal::from_correction(-(100 << 16)),
        TimeInternal::from_nanos(-100)
    );
    // -1.5 ns truncates to -1 ns, not -2
    assert_eq!(
        TimeInternal::from_correction(-(3 << 15)),
        TimeInternal::from_nanos(-1)
    );
}

#[test]
fn test_correction_extremes() {
    let t = TimeInternal::from_correction(i64::MIN);
    assert!(t.is_negative());
    assert!(t.nanoseconds.unsigned_abs() < 1_000_000_000);
    assert_eq!(TimeInternal::new(1_000_000_000, 0).to_correction(), i64::MAX);
    assert_eq!(TimeInternal::new(i64::MAX / 2, 0).to_nanos(), i64::MAX);
    assert_eq!(TimeInternal::new(i64::MIN / 2, 0).to_nanos(), i64::MIN);
    assert_eq!(TimeInternal::new(i64::MAX / 2, 0).to_correction(), i64::MAX);
    assert_eq!(TimeInternal::new(i64::MIN / 2, 0).to_correction(), i64::MIN);
}
