//! Bounded table of candidate masters heard on a port.

use std::time::{Duration, Instant};

use super::bmc::record_cmp;
use super::dataset::{ClockDataset, ClockIdentity, PortIdentity};
use crate::error::PtpError;

/// A candidate master observed through Announce (v2) or Sync (v1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignMasterRecord {
    /// Latest advertised dataset.
    pub dataset: ClockDataset,
    /// Port that sent it.
    pub source: PortIdentity,
    /// Sequence id of the last message.
    pub last_sequence_id: u16,
    /// Messages received since the record was created.
    pub messages_received: u32,
    /// When the record was last refreshed.
    pub last_update: Instant,
}

/// What [`ForeignMasterTable::consider`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignUpdate {
    /// Existing record refreshed.
    Updated,
    /// New record added to free space.
    Inserted,
    /// New record replaced the worst one, whose sender is returned.
    Replaced(ClockIdentity),
}

/// Fixed-capacity foreign master table keyed by sender clock identity.
#[derive(Debug, Clone)]
pub struct ForeignMasterTable {
    records: Vec<ForeignMasterRecord>,
    capacity: usize,
}

impl ForeignMasterTable {
    /// Create an empty table. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a dataset heard from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::TableFull`] when the table is full and the sample
    /// ranks no better than the worst record. The table is left unchanged.
    pub fn consider(
        &mut self,
        dataset: ClockDataset,
        source: PortIdentity,
        sequence_id: u16,
        now: Instant,
    ) -> Result<ForeignUpdate, PtpError> {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.source.clock_identity == source.clock_identity)
        {
            record.dataset = dataset;
            record.source = source;
            record.last_sequence_id = sequence_id;
            record.messages_received = record.messages_received.saturating_add(1);
            record.last_update = now;
            return Ok(ForeignUpdate::Updated);
        }

        let record = ForeignMasterRecord {
            dataset,
            source,
            last_sequence_id: sequence_id,
            messages_received: 1,
            last_update: now,
        };

        if self.records.len() < self.capacity {
            tracing::debug!(source = %source, "New foreign master");
            self.records.push(record);
            return Ok(ForeignUpdate::Inserted);
        }

        let worst = self
            .records
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| record_cmp(a, b))
            .map(|(i, _)| i);
        match worst {
            Some(i) if record_cmp(&record, &self.records[i]).is_lt() => {
                let evicted = self.records[i].source.clock_identity;
                tracing::debug!(source = %source, evicted = %evicted, "Foreign master replaced");
                self.records[i] = record;
                Ok(ForeignUpdate::Replaced(evicted))
            }
            _ => Err(PtpError::TableFull),
        }
    }

    /// Top-ranked record, or `None` if the table is empty.
    #[must_use]
    pub fn best_record(&self) -> Option<&ForeignMasterRecord> {
        self.records.iter().min_by(|a, b| record_cmp(a, b))
    }

    /// Top-ranked record among those heard at least `threshold` times.
    #[must_use]
    pub fn best_qualified(&self, threshold: u32) -> Option<&ForeignMasterRecord> {
        self.records
            .iter()
            .filter(|r| r.messages_received >= threshold)
            .min_by(|a, b| record_cmp(a, b))
    }

    /// Record for the given sender.
    #[must_use]
    pub fn get(&self, clock_identity: &ClockIdentity) -> Option<&ForeignMasterRecord> {
        self.records
            .iter()
            .find(|r| r.source.clock_identity == *clock_identity)
    }

    /// Remove the record for the given sender.
    pub fn remove(&mut self, clock_identity: &ClockIdentity) -> Option<ForeignMasterRecord> {
        let index = self
            .records
            .iter()
            .position(|r| r.source.clock_identity == *clock_identity)?;
        Some(self.records.remove(index))
    }

    /// Drop records not refreshed within `max_age` of `now`. Returns how many
    /// were removed.
    pub fn purge_stale(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.records.len();
        self.records
            .retain(|r| now.saturating_duration_since(r.last_update) <= max_age);
        before - self.records.len()
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ForeignMasterRecord> {
        self.records.iter()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
