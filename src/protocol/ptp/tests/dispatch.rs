use std::time::Instant;

use bytes::Bytes;

use super::support::{Node, dataset, exchange, port};
use crate::net::{Destination, TimestampKey};
use crate::protocol::ptp::codec::{Codec, CodecOptions};
use crate::protocol::ptp::message::{AnnounceBody, Header, Message, MessageBody, MessageType};
use crate::protocol::ptp::port::{Outbound, PortState};
use crate::protocol::ptp::time::TimeInternal;
use crate::protocol::ptp::timer::TickSource;
use crate::testing::{at, fast_config};
use crate::types::config::{DelayMechanism, ProtocolVariant, PtpConfigBuilder, TimestampMode};

fn frame(message: &Message) -> Vec<u8> {
    Codec::new(CodecOptions::for_variant(ProtocolVariant::V2))
        .encode(message)
        .unwrap()
}

fn deliver(node: &mut Node, message: &Message, rx: TimeInternal) -> Vec<Outbound> {
    node.port
        .handle_frame(&frame(message), Some(rx), &node.clock, Instant::now())
}

fn announce_from(n: u8) -> Message {
    Message::announce(
        port(n),
        0,
        AnnounceBody {
            origin_timestamp: at(1000, 0),
            current_utc_offset: 0,
            grandmaster: dataset(n, 1, 6),
        },
    )
}

fn listening(source: &TickSource, config: PtpConfigBuilder) -> Node {
    let mut node = Node::new(source, config.build().unwrap(), 1, at(1000, 0));
    node.poll();
    node
}

fn master(source: &TickSource, config: PtpConfigBuilder) -> Node {
    let mut node = listening(source, config);
    source.tick_n(3);
    node.poll();
    assert_eq!(node.port.state(), PortState::Master);
    node
}

/// `b` ends up SLAVE of `a`.
fn synchronized(source: &TickSource) -> (Node, Node) {
    let mut a = Node::new(source, fast_config().priority1(100).build().unwrap(), 1, at(1000, 0));
    let mut b = Node::new(source, fast_config().build().unwrap(), 2, at(1000, 500));
    for _ in 0..8 {
        source.tick();
        exchange(&mut a, &mut b, 400);
    }
    assert_eq!(b.port.state(), PortState::Slave);
    (a, b)
}

// ===== Filtering =====

#[test]
fn test_own_messages_are_ignored() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let own = Message::announce(
        node.port.port_identity(),
        0,
        AnnounceBody {
            origin_timestamp: at(1000, 0),
            current_utc_offset: 0,
            grandmaster: *node.port.local_dataset(),
        },
    );
    assert!(deliver(&mut node, &own, at(1000, 0)).is_empty());
    assert_eq!(node.port.statistics().ignored, 1);
    assert!(node.port.foreign_masters().is_empty());
}

#[test]
fn test_other_domain_is_ignored() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let mut message = announce_from(9);
    message.header.domain_number = 4;
    deliver(&mut node, &message, at(1000, 0));
    assert_eq!(node.port.statistics().ignored, 1);
    assert!(node.port.foreign_masters().is_empty());
}

#[test]
fn test_announce_recorded_as_foreign_master() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    deliver(&mut node, &announce_from(9), at(1000, 0));
    let stats = node.port.statistics();
    assert_eq!(stats.received.get(MessageType::Announce), 1);
    assert_eq!(stats.received.total(), 1);
    let record = node.port.foreign_masters().get(&port(9).clock_identity).unwrap();
    assert_eq!(record.messages_received, 1);
    // no qualified master yet
    assert_eq!(node.port.state(), PortState::PreMaster);

    let mut second = announce_from(9);
    second.header.sequence_id = 1;
    deliver(&mut node, &second, at(1000, 0));
    assert_eq!(node.port.state(), PortState::Uncalibrated);
    assert_eq!(node.port.parent(), Some(port(9)));
    assert_eq!(node.port.grandmaster().priority1, 1);
}

#[test]
fn test_signaling_is_ignored() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let message = Message {
        header: Header::new(MessageType::Signaling, port(9), 1),
        body: MessageBody::Signaling {
            target_port_identity: node.port.port_identity(),
            tlvs: Bytes::new(),
        },
    };
    assert!(deliver(&mut node, &message, at(1000, 0)).is_empty());
    assert_eq!(node.port.statistics().received.get(MessageType::Signaling), 1);
    assert_eq!(node.port.statistics().ignored, 1);
}

// ===== End-to-end delay =====

#[test]
fn test_delay_req_ignored_unless_master() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let request = Message::delay_req(port(9), 3, at(1000, 0));
    assert!(deliver(&mut node, &request, at(1000, 0)).is_empty());
    assert_eq!(node.port.statistics().ignored, 1);
}

#[test]
fn test_master_answers_delay_req() {
    let source = TickSource::new();
    let mut node = master(&source, fast_config().latency_ns(100, 0));
    let mut request = Message::delay_req(port(9), 42, at(999, 0));
    request.header.correction = 5 << 16;

    let out = deliver(&mut node, &request, at(1000, 600));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].destination, Destination::MulticastGeneral);
    assert_eq!(out[0].message.header.correction, 5 << 16);
    assert_eq!(out[0].message.header.log_message_interval, -3);
    match out[0].message.body {
        MessageBody::DelayResp {
            receive_timestamp,
            requesting_port_identity,
            requesting_sequence_id,
        } => {
            assert_eq!(receive_timestamp, at(1000, 500));
            assert_eq!(requesting_port_identity, port(9));
            assert_eq!(requesting_sequence_id, 42);
        }
        ref other => panic!("expected Delay_Resp, got {other:?}"),
    }
}

#[test]
fn test_follow_up_waits_for_matching_sync() {
    let source = TickSource::new();
    let (a, mut b) = synchronized(&source);
    let master_port = a.port.port_identity();
    let mismatches = b.port.statistics().sequence_mismatches;

    let mut sync = Message::sync(master_port, 500, TimeInternal::ZERO);
    sync.header.flags.two_step = true;
    deliver(&mut b, &sync, at(1000, 900));

    let wrong = Message::follow_up(master_port, 501, at(1000, 0));
    deliver(&mut b, &wrong, at(1000, 950));
    assert_eq!(b.port.statistics().sequence_mismatches, mismatches + 1);

    let right = Message::follow_up(master_port, 500, at(1000, 100));
    deliver(&mut b, &right, at(1000, 990));
    assert_eq!(b.port.statistics().sequence_mismatches, mismatches + 1);
    let status = b.port.status();
    assert_eq!(status.sync_tx_time, at(1000, 100));
    assert_eq!(status.sync_rx_time, at(1000, 900));
    assert_eq!(status.master_to_slave_delay, TimeInternal::from_nanos(800));
}

#[test]
fn test_one_step_sync_processed_immediately() {
    let source = TickSource::new();
    let (a, mut b) = synchronized(&source);
    let sync = Message::sync(a.port.port_identity(), 900, at(1000, 300));
    deliver(&mut b, &sync, at(1000, 1000));
    assert_eq!(
        b.port.status().master_to_slave_delay,
        TimeInternal::from_nanos(700)
    );
}

#[test]
fn test_sync_from_non_parent_is_ignored() {
    let source = TickSource::new();
    let (_a, mut b) = synchronized(&source);
    let ignored = b.port.statistics().ignored;
    let before = b.port.status();
    let sync = Message::sync(port(9), 1, at(1000, 0));
    deliver(&mut b, &sync, at(1000, 0));
    assert_eq!(b.port.statistics().ignored, ignored + 1);
    assert_eq!(b.port.status(), before);
}

#[test]
fn test_delay_resp_for_other_port_is_ignored() {
    let source = TickSource::new();
    let (a, mut b) = synchronized(&source);
    let ignored = b.port.statistics().ignored;

    let request = Message::delay_req(port(9), 0, at(1000, 0));
    let response = Message::delay_resp(a.port.port_identity(), &request.header, at(1000, 0));
    deliver(&mut b, &response, at(1000, 0));
    assert_eq!(b.port.statistics().ignored, ignored + 1);
    assert_eq!(b.port.one_way_delay(), TimeInternal::from_nanos(400));
}

#[test]
fn test_delay_resp_with_unknown_sequence_is_dropped() {
    let source = TickSource::new();
    let (a, mut b) = synchronized(&source);
    let mismatches = b.port.statistics().sequence_mismatches;

    let request = Message::delay_req(b.port.port_identity(), 9_999, at(1000, 0));
    let response = Message::delay_resp(a.port.port_identity(), &request.header, at(1000, 0));
    deliver(&mut b, &response, at(1000, 0));
    assert_eq!(b.port.statistics().sequence_mismatches, mismatches + 1);
    assert_eq!(b.port.one_way_delay(), TimeInternal::from_nanos(400));
}

// ===== Peer delay =====

#[test]
fn test_pdelay_responder_applies_latency() {
    let source = TickSource::new();
    let config = fast_config()
        .delay_mechanism(DelayMechanism::PeerToPeer)
        .latency_ns(100, 50);
    let mut node = listening(&source, config);

    let request = Message::pdelay_req(port(9), 7, at(999, 0));
    let out = deliver(&mut node, &request, at(1000, 500));
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].destination, Destination::MulticastPdelay { event: true });
    assert_eq!(out[1].destination, Destination::MulticastPdelay { event: false });
    assert_eq!(out[0].message.sequence_id(), 7);
    assert!(out[0].message.header.flags.two_step);
    assert_eq!(
        out[0].message.body,
        MessageBody::PdelayResp {
            request_receipt_timestamp: at(1000, 400),
            requesting_port_identity: port(9),
        }
    );
    assert_eq!(
        out[1].message.body,
        MessageBody::PdelayRespFollowUp {
            response_origin_timestamp: at(1000, 50),
            requesting_port_identity: port(9),
        }
    );
}

#[test]
fn test_pdelay_req_ignored_on_end_to_end_port() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let request = Message::pdelay_req(port(9), 7, at(999, 0));
    assert!(deliver(&mut node, &request, at(1000, 0)).is_empty());
    assert_eq!(node.port.statistics().ignored, 1);
}

#[test]
fn test_pdelay_resp_for_stale_request_is_dropped() {
    let source = TickSource::new();
    let config = fast_config().delay_mechanism(DelayMechanism::PeerToPeer);
    let mut node = listening(&source, config);
    source.tick();
    let out = node.poll();
    let request = &out[0].message;

    let mut late = request.clone();
    late.header.sequence_id = 77;
    let response = Message::pdelay_resp(port(9), &late.header, at(2000, 0));
    deliver(&mut node, &response, at(1000, 0));
    assert_eq!(node.port.statistics().sequence_mismatches, 1);
    assert_eq!(node.port.peer_mean_path_delay(), TimeInternal::ZERO);
}

// ===== Hardware timestamps =====

#[test]
fn test_hardware_sync_waits_for_transmit_timestamp() {
    let source = TickSource::new();
    let config = fast_config()
        .timestamping(TimestampMode::Hardware)
        .latency_ns(0, 50);
    let mut node = master(&source, config);
    source.tick();
    let out = node.poll();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].message.message_type(), MessageType::Sync);
    assert_eq!(out[1].message.message_type(), MessageType::Announce);
    let key = out[0].tx_timestamp_key.unwrap();
    assert_eq!(
        key,
        TimestampKey {
            message_type: MessageType::Sync,
            sequence_id: 0
        }
    );
    assert!(out[1].tx_timestamp_key.is_none());

    let follow_up = node.port.handle_tx_timestamp(key, at(1000, 10));
    assert_eq!(follow_up.len(), 1);
    assert_eq!(
        follow_up[0].message.body,
        MessageBody::FollowUp {
            associated_sequence_id: 0,
            precise_origin_timestamp: at(1000, 60),
        }
    );

    assert!(node.port.handle_tx_timestamp(key, at(1000, 10)).is_empty());
    assert_eq!(node.port.statistics().sequence_mismatches, 1);
}

#[test]
fn test_hardware_pdelay_completes_on_transmit_timestamp() {
    let source = TickSource::new();
    let config = fast_config()
        .delay_mechanism(DelayMechanism::PeerToPeer)
        .timestamping(TimestampMode::Hardware);
    let mut node = listening(&source, config);
    source.tick();
    let out = node.poll();
    let request = out[0].message.clone();
    let key = out[0].tx_timestamp_key.unwrap();

    let response = Message::pdelay_resp(port(9), &request.header, at(2000, 100));
    let follow_up = Message::pdelay_resp_follow_up(port(9), &request.header, at(2000, 300));
    deliver(&mut node, &response, at(1000, 600));
    deliver(&mut node, &follow_up, at(1000, 700));
    assert_eq!(node.port.peer_mean_path_delay(), TimeInternal::ZERO);

    node.port.handle_tx_timestamp(key, at(1000, 0));
    // ((600 - 0) - (300 - 100)) / 2
    assert_eq!(
        node.port.peer_mean_path_delay(),
        TimeInternal::from_nanos(200)
    );
}

#[test]
fn test_hardware_pdelay_responder_defers_follow_up() {
    let source = TickSource::new();
    let config = fast_config()
        .delay_mechanism(DelayMechanism::PeerToPeer)
        .timestamping(TimestampMode::Hardware);
    let mut node = listening(&source, config);

    let request = Message::pdelay_req(port(9), 3, at(999, 0));
    let out = deliver(&mut node, &request, at(1000, 500));
    assert_eq!(out.len(), 1);
    let key = out[0].tx_timestamp_key.unwrap();

    let follow_up = node.port.handle_tx_timestamp(key, at(1000, 800));
    assert_eq!(follow_up.len(), 1);
    assert_eq!(
        follow_up[0].message.body,
        MessageBody::PdelayRespFollowUp {
            response_origin_timestamp: at(1000, 800),
            requesting_port_identity: port(9),
        }
    );
    assert_eq!(follow_up[0].message.sequence_id(), 3);
}
