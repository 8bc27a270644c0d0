//! Top-level run loop.
//!
//! The [`Daemon`] owns every port, the clock and the shared tick source.
//! Each port runs its own cooperative loop (poll, send, wait for one frame)
//! and the loops share nothing mutable except the tick counter.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::watch;

use crate::clock::ClockControl;
use crate::error::{NetError, PtpError, Result};
use crate::net::Transport;
use crate::protocol::ptp::port::{Outbound, PortStatus, PtpPort};
use crate::protocol::ptp::timer::TickSource;
use crate::types::config::PtpConfig;

/// Most ports one daemon drives.
pub const MAX_PTP_PORTS: usize = 4;

struct PortRunner {
    port: PtpPort,
    transport: Box<dyn Transport>,
}

impl PortRunner {
    /// One poll/send/receive cycle.
    async fn cycle(&mut self, clock: &dyn ClockControl, recv_timeout: Duration) {
        let out = self.port.poll(clock, Instant::now());
        self.transmit(out).await;

        match self.transport.recv(recv_timeout).await {
            Ok(Some(frame)) => {
                tracing::trace!(
                    port = %self.port.port_identity(),
                    channel = ?frame.channel,
                    "Received {} bytes",
                    frame.bytes.len()
                );
                let out = self
                    .port
                    .handle_frame(&frame.bytes, frame.timestamp, clock, Instant::now());
                self.transmit(out).await;
            }
            Ok(None) => {}
            Err(e) => self.socket_failed(e),
        }
    }

    /// Send everything the port produced, feeding hardware transmit
    /// timestamps back as they become available.
    async fn transmit(&mut self, out: Vec<Outbound>) {
        let mut queue = VecDeque::from(out);
        while let Some(outbound) = queue.pop_front() {
            if let Err(e) = self
                .transport
                .send(&outbound.bytes, outbound.destination)
                .await
            {
                self.socket_failed(e);
                return;
            }
            let Some(key) = outbound.tx_timestamp_key else {
                continue;
            };
            match self.transport.take_tx_timestamp(key).await {
                Ok(Some(timestamp)) => queue.extend(self.port.handle_tx_timestamp(key, timestamp)),
                Ok(None) => tracing::debug!(
                    port = %self.port.port_identity(),
                    seq = key.sequence_id,
                    "No transmit timestamp for {}",
                    key.message_type
                ),
                Err(e) => {
                    self.socket_failed(e);
                    return;
                }
            }
        }
    }

    fn socket_failed(&mut self, e: NetError) {
        let err = PtpError::from(e);
        if err.is_fatal_for_port() {
            self.port.fault(&err);
        } else {
            tracing::warn!(port = %self.port.port_identity(), "{}", err);
        }
    }

    async fn run(
        &mut self,
        clock: &dyn ClockControl,
        recv_timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                () = self.cycle(clock, recv_timeout) => {}
            }
        }
        tracing::info!(port = %self.port.port_identity(), "Port loop stopped");
    }
}

/// Owns the ports of one clock.
pub struct Daemon {
    clock: Arc<dyn ClockControl>,
    ticks: TickSource,
    tick_interval: Duration,
    ports: Vec<PortRunner>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("tick_interval", &self.tick_interval)
            .field("ports", &self.ports.len())
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Create a daemon with no ports. `tick_interval` paces the shared tick
    /// and bounds how long a port waits for a frame.
    #[must_use]
    pub fn new(clock: Arc<dyn ClockControl>, tick_interval: Duration) -> Self {
        Self {
            clock,
            ticks: TickSource::new(),
            tick_interval,
            ports: Vec::new(),
        }
    }

    /// Add a port bound to `transport`. Ports are numbered from 1 in the
    /// order they are added.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::Config`] if the daemon already has
    /// [`MAX_PTP_PORTS`] ports, if the tick interval disagrees with the
    /// daemon's, or if `config` does not validate.
    pub fn add_port(
        &mut self,
        config: PtpConfig,
        mac: [u8; 6],
        transport: Box<dyn Transport>,
    ) -> Result<u16> {
        if self.ports.len() >= MAX_PTP_PORTS {
            return Err(PtpError::Config(format!(
                "at most {MAX_PTP_PORTS} ports are supported"
            )));
        }
        if config.tick_interval != self.tick_interval {
            return Err(PtpError::Config(format!(
                "port tick interval {:?} differs from daemon tick interval {:?}",
                config.tick_interval, self.tick_interval
            )));
        }
        let port_number = u16::try_from(self.ports.len() + 1)
            .map_err(|_| PtpError::Config("too many ports".to_string()))?;
        let port = PtpPort::new(config, port_number, mac, self.ticks.counter())?;
        tracing::info!(port = %port.port_identity(), "Port added");
        self.ports.push(PortRunner { port, transport });
        Ok(port_number)
    }

    /// The shared tick source. [`run`](Self::run) drives it; tests may tick
    /// it by hand.
    #[must_use]
    pub fn tick_source(&self) -> &TickSource {
        &self.ticks
    }

    /// Number of ports.
    #[must_use]
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Port `index` (zero based).
    #[must_use]
    pub fn port(&self, index: usize) -> Option<&PtpPort> {
        self.ports.get(index).map(|r| &r.port)
    }

    /// Status snapshot of every port.
    #[must_use]
    pub fn statuses(&self) -> Vec<PortStatus> {
        self.ports.iter().map(|r| r.port.status()).collect()
    }

    /// Run one cycle on every port without touching the tick source.
    pub async fn run_once(&mut self) {
        let clock = &*self.clock;
        let timeout = self.tick_interval;
        for runner in &mut self.ports {
            runner.cycle(clock, timeout).await;
        }
    }

    /// Run until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) {
        tracing::info!(
            ports = self.ports.len(),
            tick = ?self.tick_interval,
            "Daemon started"
        );
        let ticks = self.ticks.clone();
        let tick_interval = self.tick_interval;
        let clock = &*self.clock;

        let ticker = async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                ticks.tick();
            }
        };
        let loops = join_all(
            self.ports
                .iter_mut()
                .map(|runner| runner.run(clock, tick_interval, shutdown.clone())),
        );

        tokio::select! {
            _ = ticker => {}
            _ = loops => {}
        }
        tracing::info!("Daemon stopped");
    }
}
