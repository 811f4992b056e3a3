//! Integration tests for the acquisition worker against the simulated node.

use cbla_daq::config::ConnectionConfig;
use cbla_daq::context::RigContext;
use cbla_daq::device::Device;
use cbla_daq::display::{drain_events, ChannelSink, DisplayEvent, RigStatus};
use cbla_daq::transport::{Fault, SensorScript, SimulatedTransport};
use cbla_daq::workers::{AcquisitionWorker, ConnectionRequest, ConnectionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::watch;

const SENSOR_A: Device = Device::new(0, 1, 1, 0);
const SENSOR_B: Device = Device::new(0, 1, 2, 2);
const ACTUATOR_A: Device = Device::new(0, 1, 3, 1);
const ACTUATOR_B: Device = Device::new(0, 1, 4, 3);

fn rig() -> Vec<Device> {
    vec![SENSOR_A, SENSOR_B, ACTUATOR_A, ACTUATOR_B]
}

fn worker(
    transport: &SimulatedTransport,
) -> (
    AcquisitionWorker,
    Arc<RigContext>,
    mpsc::Receiver<DisplayEvent>,
) {
    let ctx = RigContext::shared();
    let (sink, rx) = ChannelSink::new(4096);
    let worker = AcquisitionWorker::new(
        ctx.clone(),
        Arc::new(transport.clone()),
        ConnectionConfig::default(),
        Arc::new(sink),
    );
    (worker, ctx, rx)
}

fn values(ctx: &RigContext, sensor: Device) -> Vec<i32> {
    ctx.readings
        .snapshot(sensor.key())
        .into_iter()
        .map(|s| s.value)
        .collect()
}

#[tokio::test]
async fn test_buffer_keeps_newest_hundred_readings() {
    let transport = SimulatedTransport::new(rig())
        .with_script(SENSOR_A.key(), SensorScript::Sequence((1..=150).collect()));
    let (mut worker, ctx, _rx) = worker(&transport);

    worker.connect().await;
    assert_eq!(worker.state(), ConnectionState::Connected);

    for _ in 0..150 {
        worker.tick().await;
    }

    let expected: Vec<i32> = (51..=150).collect();
    assert_eq!(values(&ctx, SENSOR_A), expected);

    let arrivals: Vec<u64> = ctx
        .readings
        .snapshot(SENSOR_A.key())
        .iter()
        .map(|s| s.arrival)
        .collect();
    assert!(arrivals.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_failed_read_leaves_sensor_unchanged() {
    let transport = SimulatedTransport::new(rig())
        .with_script(SENSOR_A.key(), SensorScript::Sequence((1..=20).collect()))
        .with_script(SENSOR_B.key(), SensorScript::Sequence((101..=120).collect()))
        .with_fault(Fault::ReadFailsOn {
            key: SENSOR_A.key(),
            nth: 10,
        });
    let (mut worker, ctx, _rx) = worker(&transport);
    worker.connect().await;

    for _ in 0..9 {
        worker.tick().await;
    }
    let report = worker.tick().await;

    assert_eq!(report.sampled, 1);
    assert_eq!(report.failed_reads, 1);
    assert_eq!(ctx.readings.latest(SENSOR_A.key()).map(|s| s.value), Some(9));
    assert_eq!(ctx.readings.len(SENSOR_A.key()), 9);
    assert_eq!(ctx.readings.latest(SENSOR_B.key()).map(|s| s.value), Some(110));
    assert_eq!(ctx.readings.len(SENSOR_B.key()), 10);

    // Next read of A succeeds again and resumes the sequence.
    worker.tick().await;
    assert_eq!(ctx.readings.latest(SENSOR_A.key()).map(|s| s.value), Some(11));
}

#[tokio::test]
async fn test_commands_written_in_order_and_cleared() {
    let transport = SimulatedTransport::new(rig());
    let sim = transport.handle();
    let (mut worker, ctx, _rx) = worker(&transport);
    worker.connect().await;

    ctx.commands.enqueue(&ACTUATOR_A, 10).expect("enqueue");
    ctx.commands.enqueue(&ACTUATOR_B, 20).expect("enqueue");
    ctx.commands.enqueue(&ACTUATOR_A, 30).expect("enqueue");

    let report = worker.tick().await;
    assert_eq!(report.written, 3);
    assert!(ctx.commands.is_empty());
    assert_eq!(
        sim.writes(),
        vec![
            (ACTUATOR_A.key(), 10),
            (ACTUATOR_B.key(), 20),
            (ACTUATOR_A.key(), 30),
        ]
    );

    let report = worker.tick().await;
    assert_eq!(report.written, 0);
    assert_eq!(sim.writes().len(), 3);
}

#[tokio::test]
async fn test_failed_write_is_dropped_not_retried() {
    let transport =
        SimulatedTransport::new(rig()).with_fault(Fault::WriteFails(ACTUATOR_A.key()));
    let sim = transport.handle();
    let (mut worker, ctx, _rx) = worker(&transport);
    worker.connect().await;

    ctx.commands.enqueue(&ACTUATOR_A, 10).expect("enqueue");
    ctx.commands.enqueue(&ACTUATOR_B, 20).expect("enqueue");

    let report = worker.tick().await;
    assert_eq!(report.written, 1);
    assert_eq!(report.failed_writes, 1);
    assert!(ctx.commands.is_empty());

    sim.clear_faults();
    worker.tick().await;
    assert_eq!(sim.writes(), vec![(ACTUATOR_B.key(), 20)]);
}

#[tokio::test]
async fn test_commands_discarded_without_link() {
    let transport = SimulatedTransport::new(rig());
    let sim = transport.handle();
    let (mut worker, ctx, _rx) = worker(&transport);

    ctx.commands.enqueue(&ACTUATOR_A, 10).expect("enqueue");
    let report = worker.tick().await;

    assert_eq!(report.discarded, 1);
    assert!(ctx.commands.is_empty());
    assert!(sim.writes().is_empty());
}

#[tokio::test]
async fn test_open_failure_reports_and_does_not_retry() {
    let transport = SimulatedTransport::new(rig())
        .with_fault(Fault::OpenFails("access denied".to_string()));
    let sim = transport.handle();
    let (mut worker, ctx, mut rx) = worker(&transport);

    worker.connect().await;
    assert_eq!(worker.state(), ConnectionState::Disconnected);
    assert!(!worker.has_link());

    for _ in 0..5 {
        worker.tick().await;
    }
    assert_eq!(sim.opens(), 0);
    assert!(!ctx.registry.is_populated());

    let events = drain_events(&mut rx);
    assert!(events.contains(&DisplayEvent::Status(RigStatus::Disconnected)));
    let line = events
        .iter()
        .find_map(|e| match e {
            DisplayEvent::LogLine(line) => Some(line.clone()),
            _ => None,
        })
        .expect("failure logged");
    assert!(line.contains("Failed to open port COM7\n"));
    assert!(line.ends_with(" access denied"));
}

#[tokio::test]
async fn test_discovery_failure_closes_link() {
    let transport = SimulatedTransport::new(rig())
        .with_fault(Fault::DiscoveryFails("no response".to_string()));
    let sim = transport.handle();
    let (mut worker, ctx, _rx) = worker(&transport);

    worker.connect().await;

    assert_eq!(worker.state(), ConnectionState::Disconnected);
    assert!(!sim.is_open());
    assert_eq!(sim.closes(), 1);
    assert!(!ctx.registry.is_populated());

    let report = worker.tick().await;
    assert_eq!(report.sampled, 0);
}

#[tokio::test]
async fn test_reconnect_reopens_same_link() {
    let transport = SimulatedTransport::new(rig());
    let sim = transport.handle();
    let (mut worker, _ctx, mut rx) = worker(&transport);

    worker.connect().await;
    worker.disconnect().await;
    assert_eq!(worker.state(), ConnectionState::Disconnected);
    assert!(worker.has_link());
    assert!(!sim.is_open());

    worker.connect().await;
    assert_eq!(worker.state(), ConnectionState::Connected);
    assert_eq!(sim.opens(), 2);

    let lines: Vec<String> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            DisplayEvent::LogLine(line) => Some(line),
            _ => None,
        })
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("Connected to port COM7"));
    assert!(lines[1].ends_with("Disconnected from port COM7"));
    assert!(lines[2].ends_with("Reopened port COM7"));
}

#[tokio::test]
async fn test_discovery_publishes_layout() {
    let transport = SimulatedTransport::demo_rig();
    let (mut worker, ctx, mut rx) = worker(&transport);
    worker.connect().await;

    let devices = ctx.registry.snapshot().expect("devices installed");
    assert_eq!(devices.sensors().len(), 4);
    assert_eq!(devices.actuators().len(), 4);

    let layout = drain_events(&mut rx)
        .into_iter()
        .find_map(|e| match e {
            DisplayEvent::Devices(layout) => Some(layout),
            _ => None,
        })
        .expect("layout published");
    assert_eq!(layout.len(), 2);
    assert!(layout.iter().all(|p| p.actuators_per_sensor() == 1));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_applies_requests_and_stops() {
    let transport = SimulatedTransport::new(rig())
        .with_script(SENSOR_A.key(), SensorScript::Constant(512));
    let sim = transport.handle();
    let (worker, ctx, _rx) = worker(&transport);

    let (requests, requests_rx) = watch::channel(None);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(worker.run(Duration::from_millis(10), requests_rx, shutdown_rx));

    requests.send_replace(Some(ConnectionRequest::Connect));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sim.is_open());
    assert!(ctx.readings.len(SENSOR_A.key()) > 0);

    shutdown.send_replace(true);
    task.await.expect("worker task");
    assert!(!sim.is_open());
}
