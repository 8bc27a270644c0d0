//! Per-port countdown timers driven by a shared tick source.
//!
//! The tick producer only bumps an atomic counter. Each port owns a
//! [`TickCounter`] that remembers how far it has read, so ports drain
//! elapsed ticks independently and lazily when they check a timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::PtpError;

/// Number of timers per port.
pub const TIMER_ARRAY_SIZE: usize = 8;

/// Protocol timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// No Sync from the parent within the receipt window.
    SyncReceipt = 0,
    /// Master sends Sync.
    SyncInterval = 1,
    /// No Announce from the parent within the receipt window.
    AnnounceReceipt = 2,
    /// Master sends Announce.
    AnnounceInterval = 3,
    /// Peer delay request cadence.
    PdelayReqInterval = 4,
    /// Slave delay request cadence (randomized).
    DelayReqInterval = 5,
    /// `PRE_MASTER` qualification.
    Qualification = 6,
    /// FAULTY re-initialization.
    FaultRecovery = 7,
}

impl TimerId {
    /// Every timer, in index order.
    pub const ALL: [Self; TIMER_ARRAY_SIZE] = [
        Self::SyncReceipt,
        Self::SyncInterval,
        Self::AnnounceReceipt,
        Self::AnnounceInterval,
        Self::PdelayReqInterval,
        Self::DelayReqInterval,
        Self::Qualification,
        Self::FaultRecovery,
    ];
}

impl TryFrom<usize> for TimerId {
    type Error = PtpError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(PtpError::TimerIndexOutOfRange(index))
    }
}

/// Shared periodic tick producer.
///
/// `tick` never blocks, allocates, or logs, so it can be driven from any
/// periodic context.
#[derive(Debug, Clone, Default)]
pub struct TickSource {
    ticks: Arc<AtomicU64>,
}

impl TickSource {
    /// Create a source with no ticks delivered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one tick.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Release);
    }

    /// Deliver `n` ticks at once.
    pub fn tick_n(&self, n: u64) {
        self.ticks.fetch_add(n, Ordering::Release);
    }

    /// Register a consumer that sees ticks delivered from now on.
    #[must_use]
    pub fn counter(&self) -> TickCounter {
        TickCounter {
            ticks: Arc::clone(&self.ticks),
            seen: self.ticks.load(Ordering::Acquire),
        }
    }
}

/// One consumer's view of a [`TickSource`].
#[derive(Debug, Clone)]
pub struct TickCounter {
    ticks: Arc<AtomicU64>,
    seen: u64,
}

impl TickCounter {
    /// Ticks delivered since the last call.
    pub fn take(&mut self) -> u64 {
        let now = self.ticks.load(Ordering::Acquire);
        let delta = now.wrapping_sub(self.seen);
        self.seen = now;
        delta
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IntervalTimer {
    interval: u64,
    left: i64,
    expire: bool,
}

/// The timer array of one port.
#[derive(Debug, Clone)]
pub struct IntervalTimers {
    timers: [IntervalTimer; TIMER_ARRAY_SIZE],
    ticks: TickCounter,
    tick_interval: Duration,
}

impl IntervalTimers {
    /// Timers fed by `ticks`, each tick worth `tick_interval`.
    #[must_use]
    pub fn new(ticks: TickCounter, tick_interval: Duration) -> Self {
        Self {
            timers: [IntervalTimer::default(); TIMER_ARRAY_SIZE],
            ticks,
            tick_interval,
        }
    }

    /// Whole ticks covering `duration`, at least one.
    #[must_use]
    pub fn ticks_for(&self, duration: Duration) -> u64 {
        let tick = self.tick_interval.as_nanos().max(1);
        let ticks = duration.as_nanos().div_ceil(tick);
        u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
    }

    /// Arm `id` to expire every `interval`.
    pub fn start(&mut self, id: TimerId, interval: Duration) {
        let ticks = self.ticks_for(interval);
        self.start_ticks(id, ticks);
    }

    /// Arm `id` to expire every `ticks` ticks.
    pub fn start_ticks(&mut self, id: TimerId, ticks: u64) {
        self.advance();
        let timer = &mut self.timers[id as usize];
        timer.interval = ticks;
        timer.left = i64::try_from(ticks).unwrap_or(i64::MAX);
        timer.expire = false;
    }

    /// Disarm `id`.
    pub fn stop(&mut self, id: TimerId) {
        let timer = &mut self.timers[id as usize];
        timer.interval = 0;
        timer.expire = false;
    }

    /// Disarm every timer.
    pub fn stop_all(&mut self) {
        for id in TimerId::ALL {
            self.stop(id);
        }
    }

    /// Whether `id` is armed.
    #[must_use]
    pub fn is_running(&self, id: TimerId) -> bool {
        self.timers[id as usize].interval > 0
    }

    /// Whether `id` expired since the last call. Drains pending ticks first
    /// and clears the flag it reports.
    pub fn expired(&mut self, id: TimerId) -> bool {
        self.advance();
        let timer = &mut self.timers[id as usize];
        std::mem::take(&mut timer.expire)
    }

    fn advance(&mut self) {
        let delta = self.ticks.take();
        if delta == 0 {
            return;
        }
        let delta = i64::try_from(delta).unwrap_or(i64::MAX);
        for timer in &mut self.timers {
            if timer.interval == 0 {
                continue;
            }
            timer.left = timer.left.saturating_sub(delta);
            if timer.left <= 0 {
                timer.left = i64::try_from(timer.interval).unwrap_or(i64::MAX);
                timer.expire = true;
            }
        }
    }
}
