use std::time::Instant;

use bytes::Bytes;

use super::support::{Node, port};
use crate::protocol::ptp::codec::{Codec, CodecOptions};
use crate::protocol::ptp::management::{
    ManagementAction, ManagementErrorId, ManagementId, ManagementMessage, ManagementPayload,
    respond,
};
use crate::protocol::ptp::message::{Header, Message, MessageBody, MessageType};
use crate::protocol::ptp::port::{Outbound, PortState};
use crate::protocol::ptp::timer::TickSource;
use crate::testing::{at, fast_config};
use crate::types::config::{ProtocolVariant, PtpConfigBuilder};

fn listening(source: &TickSource, config: PtpConfigBuilder) -> Node {
    let mut node = Node::new(source, config.build().unwrap(), 1, at(1000, 0));
    node.poll();
    node
}

fn ask(node: &mut Node, request: &ManagementMessage) -> ManagementMessage {
    respond(&mut node.port, request, port(9)).unwrap()
}

fn set(id: ManagementId, data: &'static [u8]) -> ManagementMessage {
    ManagementMessage::request(ManagementAction::Set, id, Bytes::from_static(data))
}

fn command(id: ManagementId) -> ManagementMessage {
    ManagementMessage::request(ManagementAction::Command, id, Bytes::new())
}

fn send(node: &mut Node, variant: ProtocolVariant, request: ManagementMessage) -> Vec<Outbound> {
    let mut message = Message {
        header: Header::new(MessageType::Management, port(9), 1),
        body: MessageBody::Management(request),
    };
    if variant == ProtocolVariant::V1 {
        message.header.version = 1;
    }
    let bytes = Codec::new(CodecOptions::for_variant(variant))
        .encode(&message)
        .unwrap();
    node.port
        .handle_frame(&bytes, None, &node.clock, Instant::now())
}

// ===== GET =====

#[test]
fn test_get_default_dataset() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config().priority1(90).priority2(110));
    let local = *node.port.local_dataset();

    let response = ask(&mut node, &ManagementMessage::get(ManagementId::DefaultDataSet));
    assert_eq!(response.action, ManagementAction::Response);
    assert_eq!(response.id, ManagementId::DefaultDataSet);
    assert_eq!(response.target_port_identity, port(9));

    let mut expected = vec![0x01, 0x00, 0x00, 0x01, 90, local.quality.clock_class];
    expected.push(local.quality.clock_accuracy);
    expected.extend_from_slice(&local.quality.offset_scaled_log_variance.to_be_bytes());
    expected.push(110);
    expected.extend_from_slice(&local.identity.0);
    expected.extend_from_slice(&[0, 0]);
    assert_eq!(response.data(), expected.as_slice());
}

#[test]
fn test_get_port_dataset() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let response = ask(&mut node, &ManagementMessage::get(ManagementId::PortDataSet));
    let data = response.data();
    assert_eq!(data.len(), 26);
    assert_eq!(&data[..8], &node.port.port_identity().clock_identity.0);
    assert_eq!(&data[8..10], &[0, 1]);
    assert_eq!(data[10], PortState::Listening as u8);
    assert_eq!(data[20] as i8, -3);
    assert_eq!(data[21], 3);
    assert_eq!(data[22] as i8, -3);
    assert_eq!(data[23], 1, "end-to-end");
    assert_eq!(data[25], 2);
}

#[test]
fn test_get_time_properties_carries_utc_offset() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config().utc_offset(37));
    let response = ask(
        &mut node,
        &ManagementMessage::get(ManagementId::TimePropertiesDataSet),
    );
    assert_eq!(&response.data()[..2], &37i16.to_be_bytes());
    assert_eq!(response.data()[2] & 0x04, 0x04, "utc offset valid");
}

#[test]
fn test_clock_description_is_padded() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let response = ask(&mut node, &ManagementMessage::get(ManagementId::ClockDescription));
    let data = response.data();
    assert_eq!(&data[..2], &[0x80, 0x00]);
    assert_eq!(data.len() % 2, 0);
}

#[test]
fn test_get_errors() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());

    let unknown = ask(&mut node, &ManagementMessage::get(ManagementId::Unknown(0x1234)));
    assert_eq!(unknown.payload, ManagementPayload::Error(ManagementErrorId::NoSuchId));
    assert!(unknown.data().is_empty());

    let command_id = ask(&mut node, &ManagementMessage::get(ManagementId::DisablePort));
    assert_eq!(
        command_id.payload,
        ManagementPayload::Error(ManagementErrorId::NotSupported)
    );
}

// ===== SET =====

#[test]
fn test_set_priority1_updates_local_dataset() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let response = ask(&mut node, &set(ManagementId::Priority1, &[50, 0]));
    assert_eq!(response.action, ManagementAction::Response);
    assert_eq!(response.data(), &[50, 0]);
    assert_eq!(node.port.local_dataset().priority1, 50);
    assert_eq!(node.port.config().priority1, 50);

    let read = ask(&mut node, &ManagementMessage::get(ManagementId::Priority1));
    assert_eq!(read.data(), &[50, 0]);
}

#[test]
fn test_set_rejections() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());

    let short = ask(&mut node, &set(ManagementId::Priority1, &[50]));
    assert_eq!(short.payload, ManagementPayload::Error(ManagementErrorId::WrongLength));
    assert_eq!(node.port.local_dataset().priority1, 128);

    let read_only = ask(&mut node, &set(ManagementId::DefaultDataSet, &[0, 0]));
    assert_eq!(
        read_only.payload,
        ManagementPayload::Error(ManagementErrorId::NotSetable)
    );

    let unknown = ask(&mut node, &set(ManagementId::Unknown(0x4444), &[0, 0]));
    assert_eq!(unknown.payload, ManagementPayload::Error(ManagementErrorId::NoSuchId));

    let timeout = ask(&mut node, &set(ManagementId::AnnounceReceiptTimeout, &[0, 0]));
    assert_eq!(timeout.payload, ManagementPayload::Error(ManagementErrorId::WrongValue));
    assert_eq!(node.port.config().announce_receipt_timeout, 3);

    let interval = ask(&mut node, &set(ManagementId::LogSyncInterval, &[8]));
    assert_eq!(interval.payload, ManagementPayload::Error(ManagementErrorId::WrongValue));
    assert_eq!(node.port.config().log_sync_interval, -3);
}

#[test]
fn test_set_sync_interval_from_single_byte() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let response = ask(&mut node, &set(ManagementId::LogSyncInterval, &[0xFE]));
    assert_eq!(response.data(), &[0xFE, 0]);
    assert_eq!(node.port.config().log_sync_interval, -2);
}

#[test]
fn test_set_domain_reinitializes() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    ask(&mut node, &set(ManagementId::Domain, &[3, 0]));
    assert_eq!(node.port.state(), PortState::Initializing);
    assert_eq!(node.port.config().domain_number, 3);
    node.poll();
    assert_eq!(node.port.state(), PortState::Listening);
}

#[test]
fn test_v1_domain_must_name_a_subdomain() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config().variant(ProtocolVariant::V1));
    let response = ask(&mut node, &set(ManagementId::Domain, &[5, 0]));
    assert_eq!(response.payload, ManagementPayload::Error(ManagementErrorId::WrongValue));
    assert_eq!(node.port.state(), PortState::Listening);

    ask(&mut node, &set(ManagementId::Domain, &[2, 0]));
    assert_eq!(node.port.config().subdomain, "_ALT2");
    assert_eq!(node.port.config().effective_domain(), 2);
}

#[test]
fn test_set_slave_only_demotes_master() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    source.tick_n(3);
    node.poll();
    assert_eq!(node.port.state(), PortState::Master);

    ask(&mut node, &set(ManagementId::SlaveOnly, &[1, 0]));
    assert_eq!(node.port.state(), PortState::Listening);
    assert_eq!(node.port.local_dataset().quality.clock_class, 255);
    assert_eq!(
        ask(&mut node, &ManagementMessage::get(ManagementId::SlaveOnly)).data(),
        &[1, 0]
    );
}

// ===== COMMAND =====

#[test]
fn test_commands_acknowledged() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());

    let ack = ask(&mut node, &command(ManagementId::GotoFaultyState));
    assert_eq!(ack.action, ManagementAction::Acknowledge);
    assert!(ack.data().is_empty());
    assert_eq!(node.port.state(), PortState::Faulty);

    let not_a_command = ask(&mut node, &command(ManagementId::Priority1));
    assert_eq!(
        not_a_command.payload,
        ManagementPayload::Error(ManagementErrorId::NotSupported)
    );
}

#[test]
fn test_disabled_port_only_answers_management() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());

    let out = send(&mut node, ProtocolVariant::V2, command(ManagementId::DisablePort));
    assert_eq!(node.port.state(), PortState::Disabled);
    assert_eq!(out.len(), 1);
    match &out[0].message.body {
        MessageBody::Management(ack) => {
            assert_eq!(ack.action, ManagementAction::Acknowledge);
            assert_eq!(ack.target_port_identity, port(9));
        }
        other => panic!("expected management, got {other:?}"),
    }
    assert!(!node.port.is_timer_running(crate::protocol::ptp::timer::TimerId::AnnounceReceipt));

    let delay_req = Message::delay_req(port(9), 0, at(1000, 0));
    let bytes = Codec::new(CodecOptions::for_variant(ProtocolVariant::V2))
        .encode(&delay_req)
        .unwrap();
    node.port
        .handle_frame(&bytes, None, &node.clock, Instant::now());
    assert_eq!(node.port.statistics().ignored, 1);

    source.tick_n(10);
    assert!(node.poll().is_empty());
    assert_eq!(node.port.state(), PortState::Disabled);

    send(&mut node, ProtocolVariant::V2, command(ManagementId::EnablePort));
    assert_eq!(node.port.state(), PortState::Initializing);
    node.poll();
    assert_eq!(node.port.state(), PortState::Listening);
}

// ===== Addressing =====

#[test]
fn test_requests_for_other_ports_are_ignored() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());

    let mut elsewhere = ManagementMessage::get(ManagementId::DefaultDataSet);
    elsewhere.target_port_identity = port(7);
    assert!(respond(&mut node.port, &elsewhere, port(9)).is_none());

    let mut this_clock_any_port = ManagementMessage::get(ManagementId::DefaultDataSet);
    this_clock_any_port.target_port_identity.clock_identity =
        node.port.port_identity().clock_identity;
    assert!(respond(&mut node.port, &this_clock_any_port, port(9)).is_some());
}

#[test]
fn test_responses_are_not_answered() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    for action in [ManagementAction::Response, ManagementAction::Acknowledge] {
        let request = ManagementMessage::request(action, ManagementId::Null, Bytes::new());
        assert!(respond(&mut node.port, &request, port(9)).is_none());
    }
}

#[test]
fn test_response_hop_budget() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config());
    let mut request = ManagementMessage::get(ManagementId::Null);
    request.starting_boundary_hops = 5;
    request.boundary_hops = 3;
    let response = ask(&mut node, &request);
    assert_eq!(response.starting_boundary_hops, 2);
    assert_eq!(response.boundary_hops, 0);
}

#[test]
fn test_v1_management_over_the_wire() {
    let source = TickSource::new();
    let mut node = listening(&source, fast_config().variant(ProtocolVariant::V1));

    let out = send(
        &mut node,
        ProtocolVariant::V1,
        ManagementMessage::get(ManagementId::DefaultDataSet),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].message.header.version, 1);
    match &out[0].message.body {
        MessageBody::Management(response) => {
            assert_eq!(response.action, ManagementAction::Response);
            assert_eq!(response.v1_key(), Some(8));
        }
        other => panic!("expected management, got {other:?}"),
    }

    // addressed to another clock
    let mut unknown = ManagementMessage::get(ManagementId::DefaultDataSet);
    unknown.target_port_identity = port(7);
    assert!(send(&mut node, ProtocolVariant::V1, unknown).is_empty());
}
