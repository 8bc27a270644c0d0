use proptest::prelude::*;

use crate::protocol::ptp::time::{NANOS_PER_SEC, TimeInternal};

fn time() -> impl Strategy<Value = TimeInternal> {
    (-1_000_000_000i64..1_000_000_000, -3_000_000_000i64..3_000_000_000)
        .prop_map(|(s, ns)| TimeInternal::new(s, ns))
}

proptest! {
    #[test]
    fn normalized_fields_share_sign(
        s in -1_000_000i64..1_000_000,
        ns in i64::from(i32::MIN)..i64::from(i32::MAX),
    ) {
        let t = TimeInternal::new(s, ns);
        prop_assert!(i64::from(t.nanoseconds).abs() < NANOS_PER_SEC);
        prop_assert!(!(t.seconds > 0 && t.nanoseconds < 0));
        prop_assert!(!(t.seconds < 0 && t.nanoseconds > 0));
        prop_assert_eq!(t.to_nanos(), s * NANOS_PER_SEC + ns);
    }

    #[test]
    fn add_matches_nanosecond_sum(a in time(), b in time()) {
        prop_assert_eq!((a + b).to_nanos(), a.to_nanos() + b.to_nanos());
        prop_assert_eq!((a - b).to_nanos(), a.to_nanos() - b.to_nanos());
        prop_assert_eq!(a + (-a), TimeInternal::ZERO);
    }

    #[test]
    fn halve_rounds_toward_zero(a in time()) {
        prop_assert_eq!(a.halve().to_nanos(), a.to_nanos() / 2);
    }

    #[test]
    fn v1_representation_roundtrips(
        s in 0i64..i64::from(i32::MAX),
        ns in 0i64..NANOS_PER_SEC,
        negative: bool,
    ) {
        let t = if negative { -TimeInternal::new(s, ns) } else { TimeInternal::new(s, ns) };
        let (back, half_epoch) = t.to_v1(false).to_internal();
        prop_assert_eq!(back, t);
        prop_assert!(!half_epoch);
    }

    #[test]
    fn v2_representation_roundtrips(
        s in 0i64..i64::from(i32::MAX),
        ns in 0i64..NANOS_PER_SEC,
        epoch: u16,
    ) {
        let t = TimeInternal::new(s, ns);
        let rep = t.to_v2(false, epoch);
        prop_assert_eq!(rep.epoch_number, epoch);
        prop_assert_eq!(rep.to_internal(), t);
    }

    #[test]
    fn correction_roundtrips_whole_nanoseconds(nanos in -1_000_000_000_000i64..1_000_000_000_000) {
        let t = TimeInternal::from_nanos(nanos);
        prop_assert_eq!(TimeInternal::from_correction(t.to_correction()), t);
    }
}
