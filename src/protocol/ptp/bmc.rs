//! Best master clock selection.
//!
//! Datasets are ranked lexicographically by priority1, clock class,
//! accuracy, variance, priority2 and grandmaster identity (lower wins in
//! every field). Datasets naming the same grandmaster are then ranked by
//! steps removed, and records by sender port as a final tie-break so the
//! order is total.

use std::cmp::Ordering;

use super::dataset::{ClockDataset, PortIdentity};
use super::foreign::ForeignMasterRecord;

/// Role the BMC recommends for a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    /// Local clock is best; become (or stay) master.
    Master,
    /// Synchronize to the given port.
    Slave(PortIdentity),
    /// A better master exists but this grandmaster-capable clock must not
    /// slave to it.
    Passive(PortIdentity),
    /// Nothing to do yet (slave-only with no candidate).
    Listening,
}

/// Compare two datasets; `Less` means `a` is the better clock.
#[must_use]
pub fn dataset_cmp(a: &ClockDataset, b: &ClockDataset) -> Ordering {
    a.priority1
        .cmp(&b.priority1)
        .then(a.quality.clock_class.cmp(&b.quality.clock_class))
        .then(a.quality.clock_accuracy.cmp(&b.quality.clock_accuracy))
        .then(
            a.quality
                .offset_scaled_log_variance
                .cmp(&b.quality.offset_scaled_log_variance),
        )
        .then(a.priority2.cmp(&b.priority2))
        .then(a.identity.cmp(&b.identity))
        .then(a.steps_removed.cmp(&b.steps_removed))
}

/// Compare two foreign records; `Less` means `a` is the better candidate.
#[must_use]
pub fn record_cmp(a: &ForeignMasterRecord, b: &ForeignMasterRecord) -> Ordering {
    dataset_cmp(&a.dataset, &b.dataset).then(a.source.cmp(&b.source))
}

/// Pick the master to follow from `candidates`.
///
/// The current parent keeps its place against a challenger that only wins
/// on identity or topology; a challenger must advertise strictly better
/// quality to displace it.
pub fn select_best<'a, I>(
    candidates: I,
    current_parent: Option<&PortIdentity>,
) -> Option<&'a ForeignMasterRecord>
where
    I: IntoIterator<Item = &'a ForeignMasterRecord>,
{
    let candidates: Vec<&ForeignMasterRecord> = candidates.into_iter().collect();
    let best = candidates.iter().copied().min_by(|a, b| record_cmp(a, b))?;
    let current = current_parent.and_then(|parent| {
        candidates
            .iter()
            .copied()
            .find(|r| r.source.clock_identity == parent.clock_identity)
    });
    match current {
        Some(current) if current.dataset.same_quality(&best.dataset) => Some(current),
        _ => Some(best),
    }
}

/// Decide the local port's role.
///
/// `best` is the output of [`select_best`]; `current_parent` is the port
/// currently followed, if any.
#[must_use]
pub fn recommend(
    local: &ClockDataset,
    slave_only: bool,
    best: Option<&ForeignMasterRecord>,
    current_parent: Option<&PortIdentity>,
) -> Recommendation {
    let Some(best) = best else {
        return if slave_only {
            Recommendation::Listening
        } else {
            Recommendation::Master
        };
    };
    if slave_only {
        return Recommendation::Slave(best.source);
    }

    let following_best =
        current_parent.is_some_and(|p| p.clock_identity == best.source.clock_identity);
    if following_best && local.same_quality(&best.dataset) {
        return Recommendation::Slave(best.source);
    }

    if dataset_cmp(local, &best.dataset).is_lt() {
        Recommendation::Master
    } else if local.quality.clock_class <= 127 {
        Recommendation::Passive(best.source)
    } else {
        Recommendation::Slave(best.source)
    }
}
