//! In-memory network for testing

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;

use crate::clock::ClockControl;
use crate::error::NetError;
use crate::net::{Channel, Destination, ReceivedFrame, TimestampKey, Transport};
use crate::protocol::ptp::time::TimeInternal;

/// Link conditions applied to every delivery
#[derive(Clone, Debug, Default)]
pub struct LinkConditions {
    /// Packet loss probability (0.0 to 1.0)
    pub loss_rate: f64,
}

impl LinkConditions {
    /// Perfect network (no loss)
    #[must_use]
    pub fn perfect() -> Self {
        Self { loss_rate: 0.0 }
    }

    /// Lossy network
    #[must_use]
    pub fn lossy(loss_rate: f64) -> Self {
        Self { loss_rate }
    }

    /// Should this packet be dropped?
    #[must_use]
    pub fn should_drop(&self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.loss_rate.min(1.0))
    }
}

struct Endpoint {
    id: usize,
    inbox: mpsc::UnboundedSender<ReceivedFrame>,
    clock: Option<Arc<dyn ClockControl>>,
}

#[derive(Default)]
struct Shared {
    endpoints: Vec<Endpoint>,
    disconnected: HashSet<usize>,
    conditions: LinkConditions,
}

/// Broadcast segment connecting any number of [`MockTransport`]s.
///
/// Every frame sent by one endpoint is delivered to every other connected
/// endpoint, on the channel its destination maps to.
#[derive(Clone, Default)]
pub struct MockNetwork {
    shared: Arc<Mutex<Shared>>,
}

impl std::fmt::Debug for MockNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.lock();
        f.debug_struct("MockNetwork")
            .field("endpoints", &shared.endpoints.len())
            .field("disconnected", &shared.disconnected)
            .finish()
    }
}

impl MockNetwork {
    /// Create an empty, lossless network
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a network with the given conditions
    #[must_use]
    pub fn with_conditions(conditions: LinkConditions) -> Self {
        let network = Self::default();
        network.lock().conditions = conditions;
        network
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach an endpoint with software timestamps only
    #[must_use]
    pub fn endpoint(&self) -> MockTransport {
        self.attach(None)
    }

    /// Attach an endpoint whose "NIC" stamps receive and transmit times
    /// from `clock`
    #[must_use]
    pub fn endpoint_with_hardware_clock(&self, clock: Arc<dyn ClockControl>) -> MockTransport {
        self.attach(Some(clock))
    }

    fn attach(&self, clock: Option<Arc<dyn ClockControl>>) -> MockTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = self.lock();
        let id = shared.endpoints.len();
        shared.endpoints.push(Endpoint {
            id,
            inbox: tx,
            clock: clock.clone(),
        });
        MockTransport {
            id,
            network: self.clone(),
            inbox: rx,
            clock,
            sent: Vec::new(),
            fail_sends: false,
        }
    }

    /// Stop delivering to and from endpoint `id`
    pub fn disconnect(&self, id: usize) {
        self.lock().disconnected.insert(id);
    }

    /// Resume delivering to and from endpoint `id`
    pub fn reconnect(&self, id: usize) {
        self.lock().disconnected.remove(&id);
    }

    fn deliver(&self, from: usize, bytes: &[u8], destination: Destination) {
        let shared = self.lock();
        if shared.disconnected.contains(&from) {
            return;
        }
        let channel = destination.channel();
        for endpoint in &shared.endpoints {
            if endpoint.id == from || shared.disconnected.contains(&endpoint.id) {
                continue;
            }
            if shared.conditions.should_drop() {
                continue;
            }
            let frame = ReceivedFrame {
                channel,
                bytes: bytes.to_vec(),
                timestamp: stamp(endpoint.clock.as_deref(), channel),
            };
            // A dropped receiver just means that endpoint is gone.
            let _ = endpoint.inbox.send(frame);
        }
    }
}

fn stamp(clock: Option<&dyn ClockControl>, channel: Channel) -> Option<TimeInternal> {
    match (clock, channel) {
        (Some(clock), Channel::Event | Channel::Raw) => Some(clock.now(0)),
        _ => None,
    }
}

/// One endpoint on a [`MockNetwork`]
pub struct MockTransport {
    id: usize,
    network: MockNetwork,
    inbox: mpsc::UnboundedReceiver<ReceivedFrame>,
    clock: Option<Arc<dyn ClockControl>>,
    sent: Vec<(Destination, Vec<u8>)>,
    fail_sends: bool,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("id", &self.id)
            .field("sent", &self.sent.len())
            .field("hardware", &self.clock.is_some())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Endpoint id on the network
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Everything this endpoint has sent
    #[must_use]
    pub fn sent(&self) -> &[(Destination, Vec<u8>)] {
        &self.sent
    }

    /// Make every following send fail with an I/O error
    pub fn fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, buf: &[u8], destination: Destination) -> Result<(), NetError> {
        if self.fail_sends {
            return Err(NetError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated send failure",
            )));
        }
        self.sent.push((destination, buf.to_vec()));
        self.network.deliver(self.id, buf, destination);
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<ReceivedFrame>, NetError> {
        match tokio::time::timeout(timeout, self.inbox.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(NetError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn take_tx_timestamp(
        &mut self,
        key: TimestampKey,
    ) -> Result<Option<TimeInternal>, NetError> {
        let _ = key;
        Ok(self.clock.as_ref().map(|clock| clock.now(0)))
    }
}
