//! Per-port state machine.
//!
//! A [`PtpPort`] is sans-IO: the caller feeds it received frames, transmit
//! timestamps and the passage of time, and sends whatever [`Outbound`]
//! messages it returns. Timers are driven by a shared
//! [`TickSource`](super::timer::TickSource); the port drains its own
//! [`TickCounter`] whenever it checks a timer.
//!
//! ```text
//! INITIALIZING -> LISTENING -> PRE_MASTER -> MASTER
//!                     |    \-> PASSIVE
//!                     \------> UNCALIBRATED -> SLAVE
//! any -> FAULTY -> INITIALIZING        any -> DISABLED (management only)
//! ```

use std::fmt::{self, Write as _};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::bmc::{self, Recommendation};
use super::codec::{Codec, CodecOptions, crc};
use super::dataset::{
    ClockDataset, ClockIdentity, ClockQuality, PortIdentity, accuracy_from_v1_identifier,
    time_source,
};
use super::foreign::{ForeignMasterRecord, ForeignMasterTable};
use super::management::{
    ManagementErrorId, ManagementSnapshot, ManagementTarget, ManagementUpdate,
};
use super::message::{Header, Message, MessageType};
use super::servo::{DelayFilter, OffsetFilter, Servo};
use super::time::TimeInternal;
use super::timer::{IntervalTimers, TickCounter, TimerId};
use crate::clock::ClockControl;
use crate::error::PtpError;
use crate::net::{Destination, TimestampKey, TimestampRing};
use crate::types::config::{DelayMechanism, ProtocolVariant, PtpConfig, TimestampMode};

/// Transmitted event messages awaiting a hardware timestamp.
const TX_PENDING_CAPACITY: usize = 16;

/// Port states, with their IEEE 1588-2008 enumeration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PortState {
    /// One-time setup pending.
    Initializing = 1,
    /// Waiting out a fault before reinitializing.
    Faulty = 2,
    /// Stopped by management.
    Disabled = 3,
    /// Waiting for Announce messages.
    Listening = 4,
    /// About to become master.
    PreMaster = 5,
    /// Sending Sync and Announce.
    Master = 6,
    /// A better master exists; neither master nor slave.
    Passive = 7,
    /// Following a new master, not yet synchronized.
    Uncalibrated = 8,
    /// Synchronized to the parent.
    Slave = 9,
}

impl PortState {
    /// Whether the port takes part in the protocol.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Initializing | Self::Faulty | Self::Disabled)
    }

    /// Four-letter name used in the statistics line.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Initializing => "init",
            Self::Faulty => "flt",
            Self::Disabled => "dsbl",
            Self::Listening => "lstn",
            Self::PreMaster => "pmst",
            Self::Master => "mst",
            Self::Passive => "pass",
            Self::Uncalibrated => "uncl",
            Self::Slave => "slv",
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "INITIALIZING",
            Self::Faulty => "FAULTY",
            Self::Disabled => "DISABLED",
            Self::Listening => "LISTENING",
            Self::PreMaster => "PRE_MASTER",
            Self::Master => "MASTER",
            Self::Passive => "PASSIVE",
            Self::Uncalibrated => "UNCALIBRATED",
            Self::Slave => "SLAVE",
        };
        f.write_str(name)
    }
}

/// Per-message-type counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounters {
    counts: [u64; 16],
}

impl MessageCounters {
    /// Messages of `message_type`.
    #[must_use]
    pub fn get(&self, message_type: MessageType) -> u64 {
        self.counts[message_type as usize]
    }

    /// Messages of every type.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub(super) fn record(&mut self, message_type: MessageType) {
        let count = &mut self.counts[message_type as usize];
        *count = count.saturating_add(1);
    }
}

/// Counters kept by a port. Dropped messages only show up here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStatistics {
    /// Decoded messages received.
    pub received: MessageCounters,
    /// Messages sent.
    pub sent: MessageCounters,
    /// Frames that failed to decode.
    pub decode_errors: u64,
    /// Messages that failed to encode.
    pub encode_errors: u64,
    /// `Follow_Up`, `Delay_Resp` or timestamps without a matching request.
    pub sequence_mismatches: u64,
    /// Foreign masters rejected by a full table.
    pub table_full: u64,
    /// Clock reads or adjustments that failed.
    pub clock_adjust_failures: u64,
    /// Times the clock was stepped.
    pub clock_steps: u64,
    /// State transitions.
    pub state_changes: u64,
    /// Messages ignored in the current state or from the wrong sender.
    pub ignored: u64,
}

/// Snapshot of the synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatus {
    /// Current state.
    pub state: PortState,
    /// This port.
    pub port_identity: PortIdentity,
    /// Followed master, if any.
    pub parent: Option<PortIdentity>,
    /// Filtered one-way (or peer) delay.
    pub one_way_delay: TimeInternal,
    /// Filtered offset from master.
    pub offset_from_master: TimeInternal,
    /// Servo integral term in ppb.
    pub observed_drift: i64,
    /// Master transmit time of the last Sync (t1).
    pub sync_tx_time: TimeInternal,
    /// Local receive time of the last Sync (t2).
    pub sync_rx_time: TimeInternal,
    /// `t2 - t1 - correction` of the last Sync.
    pub master_to_slave_delay: TimeInternal,
}

impl PortStatus {
    /// Column names for [`to_csv`](Self::to_csv).
    #[must_use]
    pub fn csv_header() -> &'static str {
        "state, one_way_delay, offset_from_master, drift, sync_tx, sync_rx, master_to_slave_delay"
    }

    /// One statistics line. Timing columns are only present in SLAVE.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut line = self.state.short_name().to_string();
        if self.state == PortState::Slave {
            let _ = write!(
                line,
                ", {}, {}, {}, {}, {}, {}",
                self.one_way_delay,
                self.offset_from_master,
                self.observed_drift,
                self.sync_tx_time,
                self.sync_rx_time,
                self.master_to_slave_delay
            );
        }
        line
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state: {}", self.state.short_name())?;
        if self.state == PortState::Slave {
            write!(
                f,
                ", owd: {}, ofm: {}, drift: {}, sst: {}, srt: {}, msd: {}",
                self.one_way_delay,
                self.offset_from_master,
                self.observed_drift,
                self.sync_tx_time,
                self.sync_rx_time,
                self.master_to_slave_delay
            )?;
        }
        Ok(())
    }
}

/// A message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Typed message.
    pub message: Message,
    /// Encoded bytes (a full Ethernet frame for 802.1AS).
    pub bytes: Vec<u8>,
    /// Where to send it.
    pub destination: Destination,
    /// Set when the port wants the hardware transmit timestamp back through
    /// [`PtpPort::handle_tx_timestamp`].
    pub tx_timestamp_key: Option<TimestampKey>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Mirrors the time properties dataset"
)]
pub(super) struct TimeProperties {
    pub(super) current_utc_offset: i16,
    pub(super) utc_offset_valid: bool,
    pub(super) leap61: bool,
    pub(super) leap59: bool,
    pub(super) ptp_timescale: bool,
    pub(super) time_traceable: bool,
    pub(super) frequency_traceable: bool,
}

impl TimeProperties {
    fn from_config(config: &PtpConfig) -> Self {
        Self {
            current_utc_offset: config.utc_offset,
            utc_offset_valid: config.utc_offset != 0,
            ptp_timescale: config.variant != ProtocolVariant::V1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct SequenceIds {
    pub(super) sync: u16,
    pub(super) delay_req: u16,
    pub(super) pdelay_req: u16,
    pub(super) announce: u16,
    pub(super) management: u16,
}

pub(super) fn next_sequence(counter: &mut u16) -> u16 {
    let id = *counter;
    *counter = counter.wrapping_add(1);
    id
}

/// Two-step Sync waiting for its `Follow_Up`.
#[derive(Debug, Clone, Copy)]
pub(super) struct PendingSync {
    pub(super) sequence_id: u16,
    pub(super) t2: TimeInternal,
    pub(super) correction: TimeInternal,
}

/// Outstanding `Delay_Req`; `t3` is unknown until the transmit timestamp.
#[derive(Debug, Clone, Copy)]
pub(super) struct PendingDelayReq {
    pub(super) sequence_id: u16,
    pub(super) t3: Option<TimeInternal>,
}

/// Outstanding `Pdelay_Req` exchange.
#[derive(Debug, Clone, Copy)]
pub(super) struct PendingPdelay {
    pub(super) sequence_id: u16,
    pub(super) t1: Option<TimeInternal>,
    pub(super) t2: Option<TimeInternal>,
    pub(super) t3: Option<TimeInternal>,
    pub(super) t4: Option<TimeInternal>,
    pub(super) correction: TimeInternal,
}

/// What to do when a hardware transmit timestamp arrives.
#[derive(Debug, Clone, Copy)]
pub(super) enum PendingTx {
    Sync,
    DelayReq,
    PdelayReq,
    PdelayResp(Header),
}

/// One PTP port.
#[derive(Debug)]
pub struct PtpPort {
    pub(super) config: PtpConfig,
    pub(super) codec: Codec,
    pub(super) mac: [u8; 6],
    pub(super) port_identity: PortIdentity,
    pub(super) state: PortState,
    pub(super) timers: IntervalTimers,
    pub(super) foreign: ForeignMasterTable,
    pub(super) local: ClockDataset,
    pub(super) parent: Option<PortIdentity>,
    pub(super) grandmaster: ClockDataset,
    pub(super) steps_removed: u16,
    pub(super) time_properties: TimeProperties,
    pub(super) sequences: SequenceIds,
    pub(super) pending_sync: Option<PendingSync>,
    pub(super) pending_delay_req: Option<PendingDelayReq>,
    pub(super) pending_pdelay: Option<PendingPdelay>,
    pub(super) tx_pending: TimestampRing<TimestampKey, PendingTx>,
    pub(super) sync_tx_time: TimeInternal,
    pub(super) sync_rx_time: TimeInternal,
    pub(super) master_to_slave_delay: Option<TimeInternal>,
    pub(super) slave_to_master_delay: TimeInternal,
    pub(super) one_way_delay: TimeInternal,
    pub(super) peer_mean_path_delay: TimeInternal,
    pub(super) offset_from_master: TimeInternal,
    pub(super) delay_filter: DelayFilter,
    pub(super) peer_delay_filter: DelayFilter,
    pub(super) offset_filter: OffsetFilter,
    pub(super) servo: Servo,
    pub(super) rng: StdRng,
    pub(super) stats: PortStatistics,
}

impl PtpPort {
    /// Create a port in INITIALIZING. The first [`poll`](Self::poll) runs
    /// initialization.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::Config`] if `config` does not validate.
    pub fn new(
        config: PtpConfig,
        port_number: u16,
        mac: [u8; 6],
        ticks: TickCounter,
    ) -> Result<Self, PtpError> {
        config.validate()?;
        let identity = ClockIdentity::from_mac(mac);
        let local = local_dataset(&config, identity);
        let stiffness = config.servo.delay_filter_stiffness;
        Ok(Self {
            codec: Codec::new(CodecOptions::from_config(&config, mac)),
            mac,
            port_identity: PortIdentity::new(identity, port_number),
            state: PortState::Initializing,
            timers: IntervalTimers::new(ticks, config.tick_interval),
            foreign: ForeignMasterTable::new(config.max_foreign_records),
            local,
            parent: None,
            grandmaster: local,
            steps_removed: 0,
            time_properties: TimeProperties::from_config(&config),
            sequences: SequenceIds::default(),
            pending_sync: None,
            pending_delay_req: None,
            pending_pdelay: None,
            tx_pending: TimestampRing::new(TX_PENDING_CAPACITY),
            sync_tx_time: TimeInternal::ZERO,
            sync_rx_time: TimeInternal::ZERO,
            master_to_slave_delay: None,
            slave_to_master_delay: TimeInternal::ZERO,
            one_way_delay: TimeInternal::ZERO,
            peer_mean_path_delay: TimeInternal::ZERO,
            offset_from_master: TimeInternal::ZERO,
            delay_filter: DelayFilter::new(stiffness),
            peer_delay_filter: DelayFilter::new(stiffness),
            offset_filter: OffsetFilter::new(),
            servo: Servo::new(config.servo),
            rng: seeded_rng(mac),
            stats: PortStatistics::default(),
            config,
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PortState {
        self.state
    }

    /// This port's identity.
    #[must_use]
    pub fn port_identity(&self) -> PortIdentity {
        self.port_identity
    }

    /// Port currently followed.
    #[must_use]
    pub fn parent(&self) -> Option<PortIdentity> {
        self.parent
    }

    /// Dataset of the grandmaster in use (the local clock when master).
    #[must_use]
    pub fn grandmaster(&self) -> &ClockDataset {
        &self.grandmaster
    }

    /// Dataset this port advertises.
    #[must_use]
    pub fn local_dataset(&self) -> &ClockDataset {
        &self.local
    }

    /// Active configuration, including management changes.
    #[must_use]
    pub fn config(&self) -> &PtpConfig {
        &self.config
    }

    /// Candidate masters heard on this port.
    #[must_use]
    pub fn foreign_masters(&self) -> &ForeignMasterTable {
        &self.foreign
    }

    /// Counters.
    #[must_use]
    pub fn statistics(&self) -> &PortStatistics {
        &self.stats
    }

    /// Filtered offset from master.
    #[must_use]
    pub fn offset_from_master(&self) -> TimeInternal {
        self.offset_from_master
    }

    /// Filtered end-to-end one-way delay.
    #[must_use]
    pub fn one_way_delay(&self) -> TimeInternal {
        self.one_way_delay
    }

    /// Filtered peer mean path delay.
    #[must_use]
    pub fn peer_mean_path_delay(&self) -> TimeInternal {
        self.peer_mean_path_delay
    }

    /// Whether `id` is armed.
    #[must_use]
    pub fn is_timer_running(&self, id: TimerId) -> bool {
        self.timers.is_running(id)
    }

    /// Synchronization snapshot.
    #[must_use]
    pub fn status(&self) -> PortStatus {
        PortStatus {
            state: self.state,
            port_identity: self.port_identity,
            parent: self.parent,
            one_way_delay: self.path_delay(),
            offset_from_master: self.offset_from_master,
            observed_drift: self.servo.observed_drift(),
            sync_tx_time: self.sync_tx_time,
            sync_rx_time: self.sync_rx_time,
            master_to_slave_delay: self.master_to_slave_delay.unwrap_or_default(),
        }
    }

    /// Run timers and state actions. Call after every tick and receive.
    pub fn poll(&mut self, clock: &dyn ClockControl, now: Instant) -> Vec<Outbound> {
        let mut out = Vec::new();
        match self.state {
            PortState::Initializing => self.initialize(),
            PortState::Faulty => {
                if self.timers.expired(TimerId::FaultRecovery) {
                    self.to_state(PortState::Initializing);
                }
            }
            PortState::Disabled => {}
            _ => self.poll_active(clock, now, &mut out),
        }
        out
    }

    /// Force the port into FAULTY. It reinitializes after the configured
    /// retry interval.
    pub fn fault(&mut self, reason: &PtpError) {
        tracing::error!(port = %self.port_identity, "Port faulty: {}", reason);
        self.to_state(PortState::Faulty);
    }

    /// Process a received frame. `rx_timestamp` is the hardware receive
    /// time; without one the clock is read now.
    pub fn handle_frame(
        &mut self,
        bytes: &[u8],
        rx_timestamp: Option<TimeInternal>,
        clock: &dyn ClockControl,
        now: Instant,
    ) -> Vec<Outbound> {
        let rx_time = rx_timestamp.unwrap_or_else(|| clock.now(self.config.utc_offset))
            - TimeInternal::from_nanos(self.config.inbound_latency_ns);

        if matches!(self.state, PortState::Initializing | PortState::Faulty) {
            self.stats.ignored += 1;
            return Vec::new();
        }

        let message = match self.codec.decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                self.stats.decode_errors += 1;
                tracing::warn!(
                    port = %self.port_identity,
                    "Dropping undecodable frame ({} bytes): {}",
                    bytes.len(),
                    e
                );
                return Vec::new();
            }
        };
        self.stats.received.record(message.message_type());

        let mut out = Vec::new();
        self.dispatch(message, rx_time, clock, now, &mut out);
        out
    }

    /// Feed back the hardware transmit timestamp of a message this port
    /// sent with a [`TimestampKey`].
    pub fn handle_tx_timestamp(
        &mut self,
        key: TimestampKey,
        timestamp: TimeInternal,
    ) -> Vec<Outbound> {
        let mut out = Vec::new();
        let Some(pending) = self.tx_pending.find_and_remove(&key) else {
            self.stats.sequence_mismatches += 1;
            tracing::debug!(
                port = %self.port_identity,
                seq = key.sequence_id,
                "No pending {} for transmit timestamp",
                key.message_type
            );
            return out;
        };
        let tx_time = timestamp + TimeInternal::from_nanos(self.config.outbound_latency_ns);
        self.complete_transmit(pending, key.sequence_id, tx_time, &mut out);
        out
    }

    fn poll_active(&mut self, clock: &dyn ClockControl, now: Instant, out: &mut Vec<Outbound>) {
        self.foreign.purge_stale(now, self.receipt_window());

        if self.timers.expired(TimerId::AnnounceReceipt) {
            self.announce_receipt_expired();
        }
        if self.timers.expired(TimerId::SyncReceipt)
            && matches!(self.state, PortState::Uncalibrated | PortState::Slave)
        {
            tracing::warn!(port = %self.port_identity, "No Sync from parent, recalibrating");
            self.reset_sync_state();
            self.to_state(PortState::Uncalibrated);
        }
        if self.timers.expired(TimerId::Qualification) && self.state == PortState::PreMaster {
            self.to_state(PortState::Master);
        }
        if self.timers.expired(TimerId::PdelayReqInterval) {
            self.issue_pdelay_req(clock, out);
        }
        if self.timers.expired(TimerId::DelayReqInterval)
            && matches!(self.state, PortState::Uncalibrated | PortState::Slave)
        {
            self.issue_delay_req(clock, out);
            self.start_delay_req_timer();
        }
        if self.state == PortState::Master {
            if self.timers.expired(TimerId::SyncInterval) {
                self.issue_sync(clock, out);
            }
            if self.timers.expired(TimerId::AnnounceInterval) {
                self.issue_announce(clock, out);
            }
        }
    }

    fn initialize(&mut self) {
        tracing::info!(
            port = %self.port_identity,
            "Initializing port ({:?}, {:?} delay)",
            self.config.variant,
            self.config.effective_delay_mechanism()
        );
        let identity = self.port_identity.clock_identity;
        let stiffness = self.config.servo.delay_filter_stiffness;

        self.codec = Codec::new(CodecOptions::from_config(&self.config, self.mac));
        self.local = local_dataset(&self.config, identity);
        self.grandmaster = self.local;
        self.parent = None;
        self.steps_removed = 0;
        self.time_properties = TimeProperties::from_config(&self.config);
        self.foreign = ForeignMasterTable::new(self.config.max_foreign_records);
        self.sequences = SequenceIds::default();
        self.tx_pending = TimestampRing::new(TX_PENDING_CAPACITY);
        self.servo = Servo::new(self.config.servo);
        self.delay_filter = DelayFilter::new(stiffness);
        self.peer_delay_filter = DelayFilter::new(stiffness);
        self.pending_pdelay = None;
        self.peer_mean_path_delay = TimeInternal::ZERO;
        self.reset_sync_state();
        self.rng = seeded_rng(self.mac);
        self.timers.stop_all();

        self.to_state(PortState::Listening);
        if self.peer_delay() {
            let interval = log_duration(self.config.log_min_pdelay_req_interval);
            self.timers.start(TimerId::PdelayReqInterval, interval);
        }
    }

    /// Forget the current master's timing.
    pub(super) fn reset_sync_state(&mut self) {
        self.pending_sync = None;
        self.pending_delay_req = None;
        self.master_to_slave_delay = None;
        self.slave_to_master_delay = TimeInternal::ZERO;
        self.one_way_delay = TimeInternal::ZERO;
        self.offset_from_master = TimeInternal::ZERO;
        self.delay_filter.reset();
        self.offset_filter.reset();
        self.servo.reset();
    }

    pub(super) fn to_state(&mut self, state: PortState) {
        if self.state == state {
            return;
        }
        tracing::info!(port = %self.port_identity, "State {} -> {}", self.state, state);
        self.stats.state_changes += 1;
        self.state = state;
        self.enter(state);
    }

    fn enter(&mut self, state: PortState) {
        use TimerId::{
            AnnounceInterval, AnnounceReceipt, DelayReqInterval, FaultRecovery, Qualification,
            SyncInterval, SyncReceipt,
        };
        match state {
            PortState::Initializing => self.timers.stop_all(),
            PortState::Faulty => {
                self.timers.stop_all();
                self.timers
                    .start(FaultRecovery, self.config.fault_retry_interval);
            }
            PortState::Disabled => {
                self.timers.stop_all();
                self.parent = None;
            }
            PortState::Listening | PortState::Passive => {
                for id in [
                    SyncInterval,
                    AnnounceInterval,
                    DelayReqInterval,
                    Qualification,
                    SyncReceipt,
                ] {
                    self.timers.stop(id);
                }
                self.timers.start(AnnounceReceipt, self.receipt_window());
            }
            PortState::PreMaster => {
                for id in [AnnounceReceipt, DelayReqInterval, SyncReceipt] {
                    self.timers.stop(id);
                }
                let interval = log_duration(self.announce_log_interval());
                self.timers.start(Qualification, interval);
            }
            PortState::Master => {
                for id in [AnnounceReceipt, DelayReqInterval, Qualification, SyncReceipt] {
                    self.timers.stop(id);
                }
                self.parent = None;
                self.grandmaster = self.local;
                self.steps_removed = 0;
                self.time_properties = TimeProperties::from_config(&self.config);
                self.reset_sync_state();
                self.timers
                    .start(SyncInterval, log_duration(self.config.log_sync_interval));
                if self.sends_announce() {
                    self.timers
                        .start(AnnounceInterval, log_duration(self.config.log_announce_interval));
                }
            }
            PortState::Uncalibrated => {
                for id in [SyncInterval, AnnounceInterval, Qualification] {
                    self.timers.stop(id);
                }
                self.timers.start(AnnounceReceipt, self.receipt_window());
                self.timers.start(SyncReceipt, self.sync_receipt_window());
                if self.peer_delay() {
                    self.timers.stop(DelayReqInterval);
                } else {
                    self.start_delay_req_timer();
                }
            }
            PortState::Slave => {}
        }
    }

    fn announce_receipt_expired(&mut self) {
        tracing::info!(port = %self.port_identity, "Announce receipt timeout in {}", self.state);
        if let Some(parent) = self.parent {
            self.foreign.remove(&parent.clock_identity);
        }
        self.run_bmc(true);
    }

    /// Re-evaluate the port's role. `direct` skips `PRE_MASTER` (used when
    /// the master was lost rather than outranked).
    pub(super) fn run_bmc(&mut self, direct: bool) {
        let threshold = self.config.foreign_master_threshold;
        let parent = self.parent;
        let best = bmc::select_best(
            self.foreign
                .iter()
                .filter(|r| r.messages_received >= threshold),
            parent.as_ref(),
        )
        .cloned();
        let recommendation =
            bmc::recommend(&self.local, self.config.slave_only, best.as_ref(), parent.as_ref());
        tracing::debug!(port = %self.port_identity, ?recommendation, "BMC");

        match (recommendation, best) {
            (Recommendation::Master, _) => match self.state {
                PortState::Master | PortState::PreMaster => {}
                _ if direct => self.to_state(PortState::Master),
                _ => self.to_state(PortState::PreMaster),
            },
            (Recommendation::Slave(_), Some(best)) => self.follow(&best),
            (Recommendation::Passive(_), _) => {
                self.parent = None;
                self.to_state(PortState::Passive);
            }
            (Recommendation::Listening | Recommendation::Slave(_), _) => {
                self.parent = None;
                self.to_state(PortState::Listening);
            }
        }
    }

    fn follow(&mut self, record: &ForeignMasterRecord) {
        let new_parent = self.parent != Some(record.source)
            || !matches!(self.state, PortState::Uncalibrated | PortState::Slave);
        self.parent = Some(record.source);
        self.grandmaster = record.dataset;
        self.steps_removed = record.dataset.steps_removed.saturating_add(1);
        if !new_parent {
            return;
        }
        tracing::info!(
            port = %self.port_identity,
            parent = %record.source,
            grandmaster = %record.dataset.identity,
            "New master selected"
        );
        self.reset_sync_state();
        if self.state == PortState::Uncalibrated {
            self.enter(PortState::Uncalibrated);
        } else {
            self.to_state(PortState::Uncalibrated);
        }
    }

    fn start_delay_req_timer(&mut self) {
        let log = self.config.log_min_delay_req_interval.saturating_add(1);
        let window = self.timers.ticks_for(log_duration(log));
        let ticks = self.rng.gen_range(0..window).max(1);
        self.timers.start_ticks(TimerId::DelayReqInterval, ticks);
    }

    /// Header fields common to everything this port sends.
    pub(super) fn stamp_header(&self, header: &mut Header) {
        header.version = match self.config.variant {
            ProtocolVariant::V1 => 1,
            ProtocolVariant::V2 | ProtocolVariant::Ieee8021As => 2,
        };
        header.domain_number = self.config.effective_domain();
        header.source_port_identity = self.port_identity;
        header.flags.unicast = self.config.unicast_address.is_some();
        header.log_message_interval = match header.message_type {
            MessageType::Sync | MessageType::FollowUp => self.config.log_sync_interval,
            MessageType::DelayResp => self.config.log_min_delay_req_interval,
            MessageType::Announce => self.config.log_announce_interval,
            _ => 0x7F,
        };
    }

    /// Encode `message` and queue it. With hardware timestamping, `pending`
    /// is parked until the transmit timestamp comes back.
    pub(super) fn emit(
        &mut self,
        mut message: Message,
        pending: Option<PendingTx>,
        out: &mut Vec<Outbound>,
    ) {
        self.stamp_header(&mut message.header);
        let bytes = match self.codec.encode(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.encode_errors += 1;
                tracing::warn!(
                    port = %self.port_identity,
                    "Cannot encode {}: {}",
                    message.message_type(),
                    e
                );
                return;
            }
        };

        let message_type = message.message_type();
        let tx_timestamp_key = match pending {
            Some(pending) if self.hardware_timestamps() => {
                let key = TimestampKey {
                    message_type,
                    sequence_id: message.sequence_id(),
                };
                if let Some((evicted, _)) = self.tx_pending.insert(key, pending) {
                    tracing::debug!(
                        port = %self.port_identity,
                        seq = evicted.sequence_id,
                        "Transmit timestamp for {} never arrived",
                        evicted.message_type
                    );
                }
                Some(key)
            }
            _ => None,
        };

        self.stats.sent.record(message_type);
        out.push(Outbound {
            destination: self.destination(message_type),
            message,
            bytes,
            tx_timestamp_key,
        });
    }

    fn destination(&self, message_type: MessageType) -> Destination {
        let event = message_type.is_event();
        if self.config.variant == ProtocolVariant::Ieee8021As {
            Destination::RawLink
        } else if let Some(address) = self.config.unicast_address {
            Destination::Unicast { address, event }
        } else if message_type.is_peer_delay() {
            Destination::MulticastPdelay { event }
        } else if event {
            Destination::MulticastEvent
        } else {
            Destination::MulticastGeneral
        }
    }

    /// Software transmit time of a message sent now.
    pub(super) fn tx_time(&self, clock: &dyn ClockControl) -> TimeInternal {
        clock.now(self.config.utc_offset)
            + TimeInternal::from_nanos(self.config.outbound_latency_ns)
    }

    pub(super) fn hardware_timestamps(&self) -> bool {
        self.config.timestamping == TimestampMode::Hardware
    }

    pub(super) fn peer_delay(&self) -> bool {
        self.config.effective_delay_mechanism() == DelayMechanism::PeerToPeer
    }

    /// v1 carries the master dataset in Sync instead of Announce.
    pub(super) fn sends_announce(&self) -> bool {
        self.config.variant != ProtocolVariant::V1
    }

    /// Delay used to turn `t2 - t1` into an offset.
    pub(super) fn path_delay(&self) -> TimeInternal {
        if self.peer_delay() {
            self.peer_mean_path_delay
        } else {
            self.one_way_delay
        }
    }

    fn announce_log_interval(&self) -> i8 {
        if self.sends_announce() {
            self.config.log_announce_interval
        } else {
            self.config.log_sync_interval
        }
    }

    /// How long a master may stay silent before it is considered lost.
    pub(super) fn receipt_window(&self) -> Duration {
        log_duration(self.announce_log_interval())
            * u32::from(self.config.announce_receipt_timeout)
    }

    /// How long the parent may go without sending Sync.
    pub(super) fn sync_receipt_window(&self) -> Duration {
        log_duration(self.config.log_sync_interval)
            * u32::from(self.config.announce_receipt_timeout)
    }

    fn refresh_local(&mut self) {
        self.local = local_dataset(&self.config, self.port_identity.clock_identity);
        if self.state == PortState::Master {
            self.grandmaster = self.local;
        }
    }

    fn restart_if_running(&mut self, id: TimerId, interval: Duration) {
        if self.timers.is_running(id) {
            self.timers.start(id, interval);
        }
    }
}

impl ManagementTarget for PtpPort {
    fn snapshot(&self) -> ManagementSnapshot {
        let tp = &self.time_properties;
        ManagementSnapshot {
            port_identity: self.port_identity,
            physical_address: self.mac,
            number_ports: 1,
            two_step: true,
            slave_only: self.config.slave_only,
            local: self.local,
            domain_number: self.config.effective_domain(),
            steps_removed: self.steps_removed,
            offset_from_master: self.offset_from_master,
            mean_path_delay: self.one_way_delay,
            parent_port_identity: self.parent.unwrap_or(self.port_identity),
            grandmaster: self.grandmaster,
            observed_drift: i32::try_from(self.servo.observed_drift()).unwrap_or_default(),
            current_utc_offset: tp.current_utc_offset,
            utc_offset_valid: tp.utc_offset_valid,
            leap61: tp.leap61,
            leap59: tp.leap59,
            ptp_timescale: tp.ptp_timescale,
            port_state: self.state as u8,
            log_min_delay_req_interval: self.config.log_min_delay_req_interval,
            peer_mean_path_delay: self.peer_mean_path_delay,
            log_announce_interval: self.config.log_announce_interval,
            announce_receipt_timeout: self.config.announce_receipt_timeout,
            log_sync_interval: self.config.log_sync_interval,
            delay_mechanism: if self.peer_delay() { 2 } else { 1 },
            log_min_pdelay_req_interval: self.config.log_min_pdelay_req_interval,
            version_number: if self.sends_announce() { 2 } else { 1 },
        }
    }

    fn apply(&mut self, update: ManagementUpdate) -> Result<(), ManagementErrorId> {
        tracing::info!(port = %self.port_identity, ?update, "Management update");
        match update {
            ManagementUpdate::Priority1(value) => {
                self.config.priority1 = value;
                self.refresh_local();
            }
            ManagementUpdate::Priority2(value) => {
                self.config.priority2 = value;
                self.refresh_local();
            }
            ManagementUpdate::Domain(domain) => {
                if self.config.variant == ProtocolVariant::V1 {
                    let name = super::codec::v1::SUBDOMAINS
                        .get(usize::from(domain))
                        .ok_or(ManagementErrorId::WrongValue)?;
                    self.config.subdomain = (*name).to_string();
                }
                self.config.domain_number = domain;
                self.to_state(PortState::Initializing);
            }
            ManagementUpdate::SlaveOnly(slave_only) => {
                self.config.slave_only = slave_only;
                self.refresh_local();
                let may_not_lead = matches!(
                    self.state,
                    PortState::PreMaster | PortState::Master | PortState::Passive
                );
                if slave_only && may_not_lead {
                    self.to_state(PortState::Listening);
                }
            }
            ManagementUpdate::LogAnnounceInterval(log) => {
                self.config.log_announce_interval = log;
                self.restart_if_running(TimerId::AnnounceInterval, log_duration(log));
            }
            ManagementUpdate::AnnounceReceiptTimeout(timeout) => {
                if timeout == 0 {
                    return Err(ManagementErrorId::WrongValue);
                }
                self.config.announce_receipt_timeout = timeout;
            }
            ManagementUpdate::LogSyncInterval(log) => {
                if !(-7..=7).contains(&log) {
                    return Err(ManagementErrorId::WrongValue);
                }
                self.config.log_sync_interval = log;
                self.restart_if_running(TimerId::SyncInterval, log_duration(log));
            }
            ManagementUpdate::EnablePort => {
                if self.state == PortState::Disabled {
                    self.to_state(PortState::Initializing);
                }
            }
            ManagementUpdate::DisablePort => self.to_state(PortState::Disabled),
            ManagementUpdate::InitializeClock => self.to_state(PortState::Initializing),
            ManagementUpdate::GotoFaultyState => self.to_state(PortState::Faulty),
        }
        Ok(())
    }
}

/// `2^log` seconds.
pub(super) fn log_duration(log: i8) -> Duration {
    TimeInternal::from_log_interval(log).to_duration()
}

fn seeded_rng(mac: [u8; 6]) -> StdRng {
    StdRng::seed_from_u64(u64::from(crc::crc32(&mac)))
}

/// Dataset advertised by the local clock.
fn local_dataset(config: &PtpConfig, identity: ClockIdentity) -> ClockDataset {
    let v1 = config.variant == ProtocolVariant::V1;
    let priority1 = if v1 && config.preferred {
        config.priority1.min(127)
    } else {
        config.priority1
    };
    let clock_accuracy = if v1 {
        accuracy_from_v1_identifier(&config.clock_identifier_bytes())
    } else {
        config.clock_accuracy
    };
    ClockDataset {
        priority1,
        quality: ClockQuality {
            clock_class: if config.slave_only { 255 } else { config.clock_class },
            clock_accuracy,
            offset_scaled_log_variance: config.effective_variance(),
        },
        priority2: config.priority2,
        identity,
        steps_removed: 0,
        time_source: time_source::INTERNAL_OSCILLATOR,
    }
}
