//! Shared builders for the PTP unit tests.

use std::time::Instant;

use crate::clock::{ClockControl, SimulatedClock};
use crate::protocol::ptp::dataset::{
    ClockDataset, ClockIdentity, ClockQuality, PortIdentity, time_source,
};
use crate::protocol::ptp::port::{Outbound, PtpPort};
use crate::protocol::ptp::time::TimeInternal;
use crate::protocol::ptp::timer::TickSource;
use crate::testing::test_mac;
use crate::types::config::PtpConfig;

pub fn identity(n: u8) -> ClockIdentity {
    ClockIdentity::from_mac(test_mac(n))
}

pub fn port(n: u8) -> PortIdentity {
    PortIdentity::new(identity(n), 1)
}

pub fn dataset(n: u8, priority1: u8, clock_class: u8) -> ClockDataset {
    ClockDataset {
        priority1,
        quality: ClockQuality {
            clock_class,
            clock_accuracy: 0x22,
            offset_scaled_log_variance: 0x4000,
        },
        priority2: 128,
        identity: identity(n),
        steps_removed: 0,
        time_source: time_source::GPS,
    }
}

/// A port wired to its own manual clock.
pub struct Node {
    pub port: PtpPort,
    pub clock: SimulatedClock,
}

impl Node {
    pub fn new(source: &TickSource, config: PtpConfig, n: u8, start: TimeInternal) -> Self {
        Self {
            port: PtpPort::new(config, 1, test_mac(n), source.counter()).unwrap(),
            clock: SimulatedClock::manual(start),
        }
    }

    pub fn poll(&mut self) -> Vec<Outbound> {
        self.port.poll(&self.clock, Instant::now())
    }

    /// Deliver `frames`, stamping each with the local clock plus `latency_ns`.
    pub fn receive(&mut self, frames: &[Outbound], latency_ns: i64) -> Vec<Outbound> {
        let mut replies = Vec::new();
        for frame in frames {
            let rx = self.clock.now(0) + TimeInternal::from_nanos(latency_ns);
            replies.extend(
                self.port
                    .handle_frame(&frame.bytes, Some(rx), &self.clock, Instant::now()),
            );
        }
        replies
    }
}

/// Poll both nodes and pass messages back and forth until both go quiet.
pub fn exchange(a: &mut Node, b: &mut Node, latency_ns: i64) {
    let mut to_b = a.poll();
    let mut to_a = b.poll();
    while !(to_a.is_empty() && to_b.is_empty()) {
        let from_b = b.receive(&to_b, latency_ns);
        let from_a = a.receive(&to_a, latency_ns);
        to_a = from_b;
        to_b = from_a;
    }
}
