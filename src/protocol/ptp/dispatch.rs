//! Inbound message handling and the messages a port originates.
//!
//! Slave side, end-to-end:
//!
//! ```text
//! master  t1 --Sync/Follow_Up-->  t2  slave
//! master  t4 <----Delay_Req-----  t3  slave
//! master  ------Delay_Resp(t4)-->      slave
//! ```
//!
//! `master_to_slave = t2 - t1 - correction`, `slave_to_master = t4 - t3 -
//! correction`, one-way delay is their mean and the offset is
//! `master_to_slave - delay`.

use std::time::Instant;

use super::dataset::{ClockDataset, PortIdentity, variance_to_v1};
use super::management;
use super::message::{
    AnnounceBody, Flags, Header, Message, MessageBody, MessageType, V1ClockFields,
};
use super::port::{
    Outbound, PendingDelayReq, PendingPdelay, PendingSync, PendingTx, PortState, PtpPort,
    TimeProperties, next_sequence,
};
use super::servo::{ServoAction, compute_peer_delay};
use super::time::TimeInternal;
use super::timer::TimerId;
use crate::clock::ClockControl;
use crate::error::PtpError;
use crate::types::config::ProtocolVariant;

impl PtpPort {
    /// Route one decoded message.
    pub(super) fn dispatch(
        &mut self,
        message: Message,
        rx_time: TimeInternal,
        clock: &dyn ClockControl,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let header = message.header;
        if header.source_port_identity.clock_identity == self.port_identity.clock_identity {
            tracing::trace!(port = %self.port_identity, "Ignoring own {}", header.message_type);
            self.stats.ignored += 1;
            return;
        }
        if header.domain_number != self.config.effective_domain() {
            tracing::debug!(
                port = %self.port_identity,
                "Ignoring {} from domain {}",
                header.message_type,
                header.domain_number
            );
            self.stats.ignored += 1;
            return;
        }
        if self.state == PortState::Disabled && header.message_type != MessageType::Management {
            self.stats.ignored += 1;
            return;
        }

        match message.body {
            MessageBody::Announce(body) => self.handle_announce(&header, &body, now),
            MessageBody::Sync {
                origin_timestamp,
                v1,
            } => {
                if let Some(fields) = v1 {
                    self.handle_v1_master_fields(&header, &fields, now);
                }
                self.handle_sync(&header, origin_timestamp, rx_time, clock);
            }
            MessageBody::FollowUp {
                associated_sequence_id,
                precise_origin_timestamp,
            } => self.handle_follow_up(
                &header,
                associated_sequence_id,
                precise_origin_timestamp,
                clock,
            ),
            MessageBody::DelayReq { .. } => self.handle_delay_req(&header, rx_time, out),
            MessageBody::DelayResp {
                receive_timestamp,
                requesting_port_identity,
                requesting_sequence_id,
            } => self.handle_delay_resp(
                &header,
                receive_timestamp,
                requesting_port_identity,
                requesting_sequence_id,
            ),
            MessageBody::PdelayReq { .. } => self.handle_pdelay_req(&header, rx_time, clock, out),
            MessageBody::PdelayResp {
                request_receipt_timestamp,
                requesting_port_identity,
            } => self.handle_pdelay_resp(
                &header,
                request_receipt_timestamp,
                requesting_port_identity,
                rx_time,
            ),
            MessageBody::PdelayRespFollowUp {
                response_origin_timestamp,
                requesting_port_identity,
            } => self.handle_pdelay_resp_follow_up(
                &header,
                response_origin_timestamp,
                requesting_port_identity,
            ),
            MessageBody::Management(request) => self.handle_management(&header, &request, out),
            MessageBody::Signaling { .. } => {
                tracing::debug!(port = %self.port_identity, "Ignoring Signaling");
                self.stats.ignored += 1;
            }
        }
    }

    fn is_parent(&self, header: &Header) -> bool {
        self.parent == Some(header.source_port_identity)
    }

    fn following(&self) -> bool {
        matches!(self.state, PortState::Uncalibrated | PortState::Slave)
    }

    fn consider_foreign(&mut self, dataset: ClockDataset, header: &Header, now: Instant) {
        let source = header.source_port_identity;
        if let Err(e) = self
            .foreign
            .consider(dataset, source, header.sequence_id, now)
        {
            self.stats.table_full += 1;
            tracing::debug!(port = %self.port_identity, source = %source, "{}", e);
        }
    }

    fn handle_announce(&mut self, header: &Header, body: &AnnounceBody, now: Instant) {
        self.consider_foreign(body.grandmaster, header, now);
        if self.is_parent(header) {
            if self.following() {
                self.timers
                    .start(TimerId::AnnounceReceipt, self.receipt_window());
            }
            let flags = header.flags;
            self.time_properties = TimeProperties {
                current_utc_offset: body.current_utc_offset,
                utc_offset_valid: flags.utc_offset_valid,
                leap61: flags.leap61,
                leap59: flags.leap59,
                ptp_timescale: flags.ptp_timescale,
                time_traceable: flags.time_traceable,
                frequency_traceable: flags.frequency_traceable,
            };
        }
        self.run_bmc(false);
    }

    /// v1 Sync doubles as the Announce.
    fn handle_v1_master_fields(&mut self, header: &Header, fields: &V1ClockFields, now: Instant) {
        self.consider_foreign(fields.to_dataset(), header, now);
        if self.is_parent(header) {
            if self.following() {
                self.timers
                    .start(TimerId::AnnounceReceipt, self.receipt_window());
            }
            self.time_properties.current_utc_offset = fields.current_utc_offset;
            self.time_properties.utc_offset_valid = fields.utc_reasonable;
            self.time_properties.leap61 = header.flags.leap61;
            self.time_properties.leap59 = header.flags.leap59;
            self.codec.set_half_epoch(fields.half_epoch);
        }
        self.run_bmc(false);
    }

    fn handle_sync(
        &mut self,
        header: &Header,
        origin_timestamp: TimeInternal,
        rx_time: TimeInternal,
        clock: &dyn ClockControl,
    ) {
        if !(self.following() && self.is_parent(header)) {
            self.stats.ignored += 1;
            return;
        }
        self.timers
            .start(TimerId::SyncReceipt, self.sync_receipt_window());
        self.sync_rx_time = rx_time;
        let correction = header.correction_time();
        if header.flags.two_step {
            self.pending_sync = Some(PendingSync {
                sequence_id: header.sequence_id,
                t2: rx_time,
                correction,
            });
        } else {
            self.pending_sync = None;
            self.process_sync(origin_timestamp, rx_time, correction, clock);
        }
    }

    fn handle_follow_up(
        &mut self,
        header: &Header,
        associated_sequence_id: u16,
        precise_origin_timestamp: TimeInternal,
        clock: &dyn ClockControl,
    ) {
        if !(self.following() && self.is_parent(header)) {
            self.stats.ignored += 1;
            return;
        }
        let Some(pending) = self.pending_sync.take() else {
            self.sequence_mismatch(MessageType::FollowUp, None, associated_sequence_id);
            return;
        };
        if pending.sequence_id != associated_sequence_id {
            self.sequence_mismatch(
                MessageType::FollowUp,
                Some(pending.sequence_id),
                associated_sequence_id,
            );
            self.pending_sync = Some(pending);
            return;
        }
        let correction = pending.correction + header.correction_time();
        self.process_sync(precise_origin_timestamp, pending.t2, correction, clock);
    }

    /// Offset from a matched t1/t2 pair, then one servo step.
    fn process_sync(
        &mut self,
        t1: TimeInternal,
        t2: TimeInternal,
        correction: TimeInternal,
        clock: &dyn ClockControl,
    ) {
        self.sync_tx_time = t1;
        self.sync_rx_time = t2;
        let master_to_slave = t2 - t1 - correction;
        self.master_to_slave_delay = Some(master_to_slave);
        let raw_offset = master_to_slave - self.path_delay();
        self.offset_from_master = self.offset_filter.update(raw_offset);
        tracing::debug!(
            port = %self.port_identity,
            "Offset from master {} (raw {}), delay {}",
            self.offset_from_master,
            raw_offset,
            self.path_delay()
        );
        self.update_clock(clock);
    }

    fn update_clock(&mut self, clock: &dyn ClockControl) {
        let offset = self.offset_from_master;
        match self.servo.update(offset, clock, self.config.utc_offset) {
            Ok(ServoAction::Stepped) => {
                self.stats.clock_steps += 1;
                tracing::info!(port = %self.port_identity, "Clock stepped by {}", -offset);
                self.master_to_slave_delay = None;
                self.one_way_delay = TimeInternal::ZERO;
                self.offset_from_master = TimeInternal::ZERO;
                self.delay_filter.reset();
                self.offset_filter.reset();
            }
            Ok(ServoAction::Adjusted(ppb)) => {
                tracing::trace!(port = %self.port_identity, ppb, "Frequency adjusted");
            }
            Ok(ServoAction::Skipped) => {}
            Err(e) => {
                self.stats.clock_adjust_failures += 1;
                tracing::warn!(port = %self.port_identity, "Clock adjustment failed: {}", e);
                return;
            }
        }
        if self.state == PortState::Uncalibrated {
            self.to_state(PortState::Slave);
        }
    }

    fn handle_delay_req(
        &mut self,
        header: &Header,
        rx_time: TimeInternal,
        out: &mut Vec<Outbound>,
    ) {
        if self.state != PortState::Master || self.peer_delay() {
            self.stats.ignored += 1;
            return;
        }
        let response = Message::delay_resp(self.port_identity, header, rx_time);
        self.emit(response, None, out);
    }

    fn handle_delay_resp(
        &mut self,
        header: &Header,
        t4: TimeInternal,
        requesting_port_identity: PortIdentity,
        requesting_sequence_id: u16,
    ) {
        if !self.following()
            || !self.is_parent(header)
            || requesting_port_identity != self.port_identity
        {
            self.stats.ignored += 1;
            return;
        }
        let pending = match self.pending_delay_req {
            Some(pending) if pending.sequence_id == requesting_sequence_id => pending,
            other => {
                let expected = other.map(|p| p.sequence_id);
                self.sequence_mismatch(MessageType::DelayResp, expected, requesting_sequence_id);
                return;
            }
        };
        let Some(t3) = pending.t3 else {
            tracing::debug!(
                port = %self.port_identity,
                seq = requesting_sequence_id,
                "Delay_Resp before Delay_Req transmit timestamp"
            );
            self.stats.sequence_mismatches += 1;
            return;
        };
        self.pending_delay_req = None;

        let Some(master_to_slave) = self.master_to_slave_delay else {
            tracing::debug!(port = %self.port_identity, "Delay_Resp before any Sync");
            return;
        };
        let slave_to_master = t4 - t3 - header.correction_time();
        self.slave_to_master_delay = slave_to_master;
        let raw = (master_to_slave + slave_to_master).halve();
        self.one_way_delay = self.delay_filter.update(raw);
        tracing::debug!(
            port = %self.port_identity,
            "One-way delay {} (raw {})",
            self.one_way_delay,
            raw
        );
    }

    fn handle_pdelay_req(
        &mut self,
        header: &Header,
        rx_time: TimeInternal,
        clock: &dyn ClockControl,
        out: &mut Vec<Outbound>,
    ) {
        if !self.peer_delay() {
            tracing::debug!(port = %self.port_identity, "Pdelay_Req on an end-to-end port");
            self.stats.ignored += 1;
            return;
        }
        let response = Message::pdelay_resp(self.port_identity, header, rx_time);
        self.emit(response, Some(PendingTx::PdelayResp(*header)), out);
        if !self.hardware_timestamps() {
            let t3 = self.tx_time(clock);
            let follow_up = Message::pdelay_resp_follow_up(self.port_identity, header, t3);
            self.emit(follow_up, None, out);
        }
    }

    fn handle_pdelay_resp(
        &mut self,
        header: &Header,
        t2: TimeInternal,
        requesting_port_identity: PortIdentity,
        rx_time: TimeInternal,
    ) {
        if !self.peer_delay() || requesting_port_identity != self.port_identity {
            self.stats.ignored += 1;
            return;
        }
        let Some(pending) = self.matching_pdelay(MessageType::PdelayResp, header.sequence_id) else {
            return;
        };
        pending.t2 = Some(t2);
        pending.t4 = Some(rx_time);
        pending.correction = header.correction_time();
        if !header.flags.two_step {
            pending.t3 = Some(t2);
        }
        self.try_complete_pdelay();
    }

    fn handle_pdelay_resp_follow_up(
        &mut self,
        header: &Header,
        t3: TimeInternal,
        requesting_port_identity: PortIdentity,
    ) {
        if !self.peer_delay() || requesting_port_identity != self.port_identity {
            self.stats.ignored += 1;
            return;
        }
        let Some(pending) =
            self.matching_pdelay(MessageType::PdelayRespFollowUp, header.sequence_id)
        else {
            return;
        };
        pending.t3 = Some(t3);
        pending.correction = pending.correction + header.correction_time();
        self.try_complete_pdelay();
    }

    fn matching_pdelay(
        &mut self,
        message_type: MessageType,
        sequence_id: u16,
    ) -> Option<&mut PendingPdelay> {
        let expected = self.pending_pdelay.map(|p| p.sequence_id);
        if expected != Some(sequence_id) {
            self.sequence_mismatch(message_type, expected, sequence_id);
            return None;
        }
        self.pending_pdelay.as_mut()
    }

    fn try_complete_pdelay(&mut self) {
        let Some(pending) = self.pending_pdelay else {
            return;
        };
        let (Some(t1), Some(t2), Some(t3), Some(t4)) =
            (pending.t1, pending.t2, pending.t3, pending.t4)
        else {
            return;
        };
        self.pending_pdelay = None;
        let raw = compute_peer_delay(t1, t2, t3, t4, pending.correction);
        if raw.is_negative() {
            tracing::debug!(port = %self.port_identity, "Dropping negative peer delay {}", raw);
            return;
        }
        self.peer_mean_path_delay = self.peer_delay_filter.update(raw);
        tracing::debug!(
            port = %self.port_identity,
            "Peer delay {} (raw {})",
            self.peer_mean_path_delay,
            raw
        );
    }

    fn handle_management(
        &mut self,
        header: &Header,
        request: &management::ManagementMessage,
        out: &mut Vec<Outbound>,
    ) {
        let Some(response) = management::respond(self, request, header.source_port_identity)
        else {
            return;
        };
        if self.config.variant == ProtocolVariant::V1 && response.v1_key().is_none() {
            tracing::debug!(
                port = %self.port_identity,
                id = ?response.id,
                "Management response has no v1 encoding"
            );
            return;
        }
        let sequence_id = next_sequence(&mut self.sequences.management);
        let message = Message {
            header: Header::new(MessageType::Management, self.port_identity, sequence_id),
            body: MessageBody::Management(response),
        };
        self.emit(message, None, out);
    }

    fn sequence_mismatch(&mut self, message_type: MessageType, expected: Option<u16>, got: u16) {
        self.stats.sequence_mismatches += 1;
        match expected {
            Some(expected) => tracing::debug!(
                port = %self.port_identity,
                "Dropping {}: {}",
                message_type,
                PtpError::SequenceMismatch { expected, got }
            ),
            None => tracing::debug!(
                port = %self.port_identity,
                seq = got,
                "Dropping unexpected {}",
                message_type
            ),
        }
    }

    /// Resume whatever was waiting on a hardware transmit timestamp.
    pub(super) fn complete_transmit(
        &mut self,
        pending: PendingTx,
        sequence_id: u16,
        tx_time: TimeInternal,
        out: &mut Vec<Outbound>,
    ) {
        match pending {
            PendingTx::Sync => self.send_follow_up(sequence_id, tx_time, out),
            PendingTx::DelayReq => match self.pending_delay_req.as_mut() {
                Some(p) if p.sequence_id == sequence_id => p.t3 = Some(tx_time),
                _ => self.sequence_mismatch(MessageType::DelayReq, None, sequence_id),
            },
            PendingTx::PdelayReq => match self.pending_pdelay.as_mut() {
                Some(p) if p.sequence_id == sequence_id => {
                    p.t1 = Some(tx_time);
                    self.try_complete_pdelay();
                }
                _ => self.sequence_mismatch(MessageType::PdelayReq, None, sequence_id),
            },
            PendingTx::PdelayResp(request) => {
                let follow_up =
                    Message::pdelay_resp_follow_up(self.port_identity, &request, tx_time);
                self.emit(follow_up, None, out);
            }
        }
    }

    fn time_flags(&self) -> Flags {
        let tp = &self.time_properties;
        Flags {
            leap61: tp.leap61,
            leap59: tp.leap59,
            utc_offset_valid: tp.utc_offset_valid,
            ptp_timescale: tp.ptp_timescale,
            time_traceable: tp.time_traceable,
            frequency_traceable: tp.frequency_traceable,
            ..Flags::default()
        }
    }

    /// Grandmaster and sender description carried in v1 Sync and `Delay_Req`.
    fn v1_clock_fields(&self, sequence_id: u16) -> V1ClockFields {
        let gm = &self.grandmaster;
        let parent = self.parent.unwrap_or(self.port_identity);
        let identifier = self.config.clock_identifier_bytes();
        V1ClockFields {
            epoch_number: self.config.epoch_number,
            current_utc_offset: self.time_properties.current_utc_offset,
            grandmaster_communication_technology: 1,
            grandmaster_uuid: gm.identity.to_uuid(),
            grandmaster_port_id: parent.port_number,
            grandmaster_sequence_id: sequence_id,
            grandmaster_stratum: gm.quality.clock_class,
            grandmaster_identifier: identifier,
            grandmaster_variance: variance_to_v1(gm.quality.offset_scaled_log_variance),
            grandmaster_preferred: gm.priority1 < 128,
            grandmaster_is_boundary_clock: false,
            sync_interval: self.config.log_sync_interval,
            local_clock_variance: variance_to_v1(self.local.quality.offset_scaled_log_variance),
            local_steps_removed: self.steps_removed,
            local_clock_stratum: self.local.quality.clock_class,
            local_clock_identifier: identifier,
            parent_communication_technology: 1,
            parent_uuid: parent.clock_identity.to_uuid(),
            parent_port_field: parent.port_number,
            estimated_master_variance: 0,
            estimated_master_drift: i32::try_from(self.servo.observed_drift()).unwrap_or_default(),
            utc_reasonable: self.time_properties.utc_offset_valid,
            half_epoch: self.codec.options().half_epoch,
        }
    }

    pub(super) fn issue_sync(&mut self, clock: &dyn ClockControl, out: &mut Vec<Outbound>) {
        let sequence_id = next_sequence(&mut self.sequences.sync);
        let origin_timestamp = self.tx_time(clock);
        let v1 = (!self.sends_announce()).then(|| self.v1_clock_fields(sequence_id));
        let mut header = Header::new(MessageType::Sync, self.port_identity, sequence_id);
        header.flags = self.time_flags();
        header.flags.two_step = true;
        let sync = Message {
            header,
            body: MessageBody::Sync {
                origin_timestamp,
                v1,
            },
        };
        self.emit(sync, Some(PendingTx::Sync), out);
        if !self.hardware_timestamps() {
            self.send_follow_up(sequence_id, origin_timestamp, out);
        }
    }

    fn send_follow_up(&mut self, sequence_id: u16, t1: TimeInternal, out: &mut Vec<Outbound>) {
        let mut follow_up = Message::follow_up(self.port_identity, sequence_id, t1);
        follow_up.header.flags = self.time_flags();
        self.emit(follow_up, None, out);
    }

    pub(super) fn issue_announce(&mut self, clock: &dyn ClockControl, out: &mut Vec<Outbound>) {
        if !self.sends_announce() {
            return;
        }
        let sequence_id = next_sequence(&mut self.sequences.announce);
        let body = AnnounceBody {
            origin_timestamp: clock.now(self.config.utc_offset),
            current_utc_offset: self.time_properties.current_utc_offset,
            grandmaster: ClockDataset {
                steps_removed: self.steps_removed,
                ..self.grandmaster
            },
        };
        let mut announce = Message::announce(self.port_identity, sequence_id, body);
        announce.header.flags = self.time_flags();
        self.emit(announce, None, out);
    }

    pub(super) fn issue_delay_req(&mut self, clock: &dyn ClockControl, out: &mut Vec<Outbound>) {
        let sequence_id = next_sequence(&mut self.sequences.delay_req);
        let t3 = self.tx_time(clock);
        let v1 = (!self.sends_announce()).then(|| self.v1_clock_fields(sequence_id));
        let request = Message {
            header: Header::new(MessageType::DelayReq, self.port_identity, sequence_id),
            body: MessageBody::DelayReq {
                origin_timestamp: t3,
                v1,
            },
        };
        self.pending_delay_req = Some(PendingDelayReq {
            sequence_id,
            t3: (!self.hardware_timestamps()).then_some(t3),
        });
        self.emit(request, Some(PendingTx::DelayReq), out);
    }

    pub(super) fn issue_pdelay_req(&mut self, clock: &dyn ClockControl, out: &mut Vec<Outbound>) {
        let sequence_id = next_sequence(&mut self.sequences.pdelay_req);
        let t1 = self.tx_time(clock);
        if let Some(stale) = self.pending_pdelay {
            tracing::debug!(
                port = %self.port_identity,
                seq = stale.sequence_id,
                "Peer delay exchange not completed"
            );
        }
        self.pending_pdelay = Some(PendingPdelay {
            sequence_id,
            t1: (!self.hardware_timestamps()).then_some(t1),
            t2: None,
            t3: None,
            t4: None,
            correction: TimeInternal::ZERO,
        });
        let request = Message::pdelay_req(self.port_identity, sequence_id, t1);
        self.emit(request, Some(PendingTx::PdelayReq), out);
    }
}
