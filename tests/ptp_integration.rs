//! Integration tests for PTP synchronization.
//!
//! Two daemons, each owning one port and one simulated clock, share an
//! in-memory network. Tokio time is paused so a run of several seconds of
//! protocol time finishes instantly.

use std::sync::Arc;
use std::time::Duration;

use ptpd::clock::SimulatedClock;
use ptpd::daemon::{Daemon, MAX_PTP_PORTS};
use ptpd::testing::{MockNetwork, at, fast_config, test_mac};
use ptpd::{DelayMechanism, PortState, PtpConfig, PtpError, TimeInternal, TimestampMode};
use tokio::sync::watch;

const TICK: Duration = Duration::from_millis(125);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

struct Host {
    daemon: Daemon,
    clock: Arc<SimulatedClock>,
}

impl Host {
    fn new(network: &MockNetwork, config: PtpConfig, n: u8, start: TimeInternal) -> Self {
        let clock = Arc::new(SimulatedClock::manual(start));
        let transport = if config.timestamping == TimestampMode::Hardware {
            network.endpoint_with_hardware_clock(clock.clone())
        } else {
            network.endpoint()
        };
        let mut daemon = Daemon::new(clock.clone(), TICK);
        daemon
            .add_port(config, test_mac(n), Box::new(transport))
            .unwrap();
        Self { daemon, clock }
    }

    fn state(&self) -> PortState {
        self.daemon.port(0).unwrap().state()
    }
}

async fn run_for(a: &mut Host, b: &mut Host, duration: Duration) {
    let (_stop, shutdown) = watch::channel(false);
    let both = async {
        tokio::join!(a.daemon.run(shutdown.clone()), b.daemon.run(shutdown.clone()))
    };
    let _ = tokio::time::timeout(duration, both).await;
}

fn pair(network: &MockNetwork, master: PtpConfig, slave: PtpConfig) -> (Host, Host) {
    (
        Host::new(network, master, 1, at(1000, 0)),
        Host::new(network, slave, 2, at(1000, 500)),
    )
}

// ===== Synchronization =====

#[tokio::test(start_paused = true)]
async fn test_master_and_slave_converge() {
    init_tracing();
    let network = MockNetwork::new();
    let master = fast_config().priority1(100).build().unwrap();
    let (mut a, mut b) = pair(&network, master, fast_config().build().unwrap());

    run_for(&mut a, &mut b, Duration::from_secs(5)).await;

    assert_eq!(a.state(), PortState::Master);
    assert_eq!(b.state(), PortState::Slave);
    let status = b.daemon.statuses()[0];
    assert_eq!(status.parent, Some(a.daemon.port(0).unwrap().port_identity()));
    // software timestamps on frozen clocks see no path delay
    assert_eq!(status.offset_from_master, TimeInternal::from_nanos(500));
    assert_eq!(status.one_way_delay, TimeInternal::ZERO);
    assert!(b.clock.frequency_ppb() < 0);
    assert_eq!(a.clock.adjustments(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hardware_timestamps_converge() {
    init_tracing();
    let network = MockNetwork::new();
    let hardware = || fast_config().timestamping(TimestampMode::Hardware);
    let master = hardware().priority1(100).build().unwrap();
    let (mut a, mut b) = pair(&network, master, hardware().build().unwrap());

    run_for(&mut a, &mut b, Duration::from_secs(5)).await;

    assert_eq!(b.state(), PortState::Slave);
    let port = b.daemon.port(0).unwrap();
    assert_eq!(port.offset_from_master(), TimeInternal::from_nanos(500));
    assert_eq!(port.one_way_delay(), TimeInternal::ZERO);
    assert_eq!(port.statistics().sequence_mismatches, 0);
}

#[tokio::test(start_paused = true)]
async fn test_peer_delay_converges() {
    init_tracing();
    let network = MockNetwork::new();
    let p2p = || fast_config().delay_mechanism(DelayMechanism::PeerToPeer);
    let master = p2p().priority1(100).build().unwrap();
    let (mut a, mut b) = pair(&network, master, p2p().build().unwrap());

    run_for(&mut a, &mut b, Duration::from_secs(5)).await;

    assert_eq!(b.state(), PortState::Slave);
    let port = b.daemon.port(0).unwrap();
    assert_eq!(port.offset_from_master(), TimeInternal::from_nanos(500));
    assert_eq!(port.peer_mean_path_delay(), TimeInternal::ZERO);
    assert!(a.daemon.port(0).unwrap().statistics().sent.total() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_slave_takes_over_when_master_disappears() {
    init_tracing();
    let network = MockNetwork::new();
    let master = fast_config().priority1(100).build().unwrap();
    let (mut a, mut b) = pair(&network, master, fast_config().build().unwrap());
    run_for(&mut a, &mut b, Duration::from_secs(3)).await;
    assert_eq!(b.state(), PortState::Slave);

    network.disconnect(0);
    run_for(&mut a, &mut b, Duration::from_secs(2)).await;
    assert_eq!(b.state(), PortState::Master);
    assert_eq!(b.daemon.statuses()[0].parent, None);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_faults_port() {
    init_tracing();
    let network = MockNetwork::new();
    let clock = Arc::new(SimulatedClock::manual(at(1000, 0)));
    let mut transport = network.endpoint();
    transport.fail_sends(true);
    let mut daemon = Daemon::new(clock, TICK);
    daemon
        .add_port(fast_config().build().unwrap(), test_mac(1), Box::new(transport))
        .unwrap();

    let (_stop, shutdown) = watch::channel(false);
    let _ = tokio::time::timeout(Duration::from_secs(2), daemon.run(shutdown)).await;
    assert_eq!(daemon.port(0).unwrap().state(), PortState::Faulty);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_run() {
    let network = MockNetwork::new();
    let mut host = Host::new(&network, fast_config().build().unwrap(), 1, at(1000, 0));
    let (stop, shutdown) = watch::channel(false);

    let stopper = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.send(true).unwrap();
    };
    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(host.daemon.run(shutdown), stopper);
    })
    .await;
    assert!(finished.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_run_once_with_manual_ticks() {
    let network = MockNetwork::new();
    let mut host = Host::new(&network, fast_config().build().unwrap(), 1, at(1000, 0));

    host.daemon.run_once().await;
    assert_eq!(host.state(), PortState::Listening);
    for _ in 0..3 {
        host.daemon.tick_source().tick();
        host.daemon.run_once().await;
    }
    assert_eq!(host.state(), PortState::Master);
}

// ===== Port management =====

#[test]
fn test_add_port_limits() {
    let network = MockNetwork::new();
    let clock = Arc::new(SimulatedClock::manual(TimeInternal::ZERO));
    let mut daemon = Daemon::new(clock, TICK);

    for n in 1..=MAX_PTP_PORTS {
        let number = daemon
            .add_port(
                fast_config().build().unwrap(),
                test_mac(u8::try_from(n).unwrap()),
                Box::new(network.endpoint()),
            )
            .unwrap();
        assert_eq!(usize::from(number), n);
    }
    let extra = daemon.add_port(
        fast_config().build().unwrap(),
        test_mac(9),
        Box::new(network.endpoint()),
    );
    assert!(matches!(extra, Err(PtpError::Config(_))));
    assert_eq!(daemon.port_count(), MAX_PTP_PORTS);
}

#[test]
fn test_add_port_rejects_mismatched_tick() {
    let network = MockNetwork::new();
    let clock = Arc::new(SimulatedClock::manual(TimeInternal::ZERO));
    let mut daemon = Daemon::new(clock, TICK);
    let slow = fast_config()
        .tick_interval(Duration::from_millis(250))
        .build()
        .unwrap();
    let result = daemon.add_port(slow, test_mac(1), Box::new(network.endpoint()));
    assert!(matches!(result, Err(PtpError::Config(_))));
    assert_eq!(daemon.port_count(), 0);
}
