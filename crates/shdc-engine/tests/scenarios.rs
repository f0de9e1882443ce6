//! End-to-end scenarios wiring a hub and one or more sensors together over
//! an in-memory network and fake clock: clean discovery/join, an
//! authenticated event, broadcast-key rotation, and the three classes of
//! rejected traffic (replay, stale clock, tampered signature).

use shdc_codec::header::{Header, MessageType};
use shdc_codec::packet::Packet;
use shdc_codec::payload::Payload;
use shdc_core::{DeviceId, Nonce3};
use shdc_crypto::{Keypair, OsCsrng};
use shdc_engine::{
    ClockEffects, EngineConfig, FakeClock, HubEngine, HubHandlers, InMemoryNetwork, PeerAddr,
    SensorEngine, SensorHandlers, SensorState, TransportEffects,
};
use shdc_keystore::SensorKeystore;
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn wait_until<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
    let start = tokio::time::Instant::now();
    loop {
        if predicate() {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

struct Harness {
    network: InMemoryNetwork,
    hub: Arc<HubEngine<shdc_engine::InMemoryTransport, FakeClock, OsCsrng>>,
    hub_clock: Arc<FakeClock>,
    joined: Arc<Mutex<Vec<DeviceId>>>,
    events: Arc<Mutex<Vec<(DeviceId, u8, Vec<u8>)>>>,
    hub_errors: Arc<Mutex<Vec<String>>>,
}

async fn spawn_hub(start_time: u32) -> Harness {
    let network = InMemoryNetwork::new();
    let csrng = Arc::new(OsCsrng);
    let hub_clock = Arc::new(FakeClock::new(start_time));
    let hub_identity = Keypair::generate(csrng.as_ref());
    let hub_transport = Arc::new(network.endpoint("hub"));

    let joined = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));
    let hub_errors = Arc::new(Mutex::new(Vec::new()));

    let joined_cb = joined.clone();
    let events_cb = events.clone();
    let errors_cb = hub_errors.clone();
    let hub_handlers = HubHandlers {
        on_device_joined: Box::new(move |id| joined_cb.lock().unwrap().push(id)),
        on_event: Box::new(move |id, event_type, payload| {
            events_cb.lock().unwrap().push((id, event_type, payload))
        }),
        on_error: Box::new(move |err| errors_cb.lock().unwrap().push(err.to_string())),
        ..Default::default()
    };

    let hub = Arc::new(
        HubEngine::new(
            1,
            hub_identity,
            hub_transport,
            hub_clock.clone(),
            csrng,
            EngineConfig::default(),
            hub_handlers,
        )
        .await,
    );

    let run_handle = hub.clone();
    tokio::spawn(async move { run_handle.run().await });

    Harness {
        network,
        hub,
        hub_clock,
        joined,
        events,
        hub_errors,
    }
}

struct Sensor {
    engine: Arc<SensorEngine<shdc_engine::InMemoryTransport, FakeClock, OsCsrng>>,
    keystore: Arc<SensorKeystore>,
    identity_seed: [u8; 32],
    clock: Arc<FakeClock>,
    commands: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
}

async fn spawn_sensor(harness: &Harness, name: &str, start_time: u32) -> Sensor {
    let csrng = Arc::new(OsCsrng);
    let clock = Arc::new(FakeClock::new(start_time));
    let identity = Keypair::generate(csrng.as_ref());
    let identity_seed = identity.seed();
    let transport = Arc::new(harness.network.endpoint(name));
    let keystore = Arc::new(SensorKeystore::new(Keypair::from_seed(identity_seed)));

    let commands = Arc::new(Mutex::new(Vec::new()));
    let commands_cb = commands.clone();
    let handlers = SensorHandlers {
        on_command: Box::new(move |cmd_type, data| {
            commands_cb.lock().unwrap().push((cmd_type, data))
        }),
        ..Default::default()
    };

    let engine = Arc::new(SensorEngine::new(
        identity,
        keystore.clone(),
        transport,
        clock.clone(),
        csrng,
        EngineConfig::default(),
        handlers,
    ));

    let run_handle = engine.clone();
    tokio::spawn(async move { run_handle.run().await });

    Sensor {
        engine,
        keystore,
        identity_seed,
        clock,
        commands,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_discovery_and_join() {
    let harness = spawn_hub(1_000).await;
    let sensor = spawn_sensor(&harness, "sensor-1", 1_000).await;

    sensor.engine.discover().await;

    assert!(
        wait_until(|| sensor.engine.state() == SensorState::Active, Duration::from_secs(2)).await,
        "sensor never reached Active"
    );
    assert!(wait_until(|| !harness.joined.lock().unwrap().is_empty(), Duration::from_secs(1)).await);
    assert!(sensor.keystore.hub().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn authenticated_event_report_reaches_hub() {
    let harness = spawn_hub(1_000).await;
    let sensor = spawn_sensor(&harness, "sensor-1", 1_000).await;
    sensor.engine.discover().await;
    assert!(wait_until(|| sensor.engine.state() == SensorState::Active, Duration::from_secs(2)).await);

    sensor.engine.send_event(0x01, b"motion-detected").await.unwrap();

    assert!(wait_until(|| !harness.events.lock().unwrap().is_empty(), Duration::from_secs(1)).await);
    let events = harness.events.lock().unwrap();
    assert_eq!(events[0].1, 0x01);
    assert_eq!(events[0].2, b"motion-detected".to_vec());
}

#[tokio::test(flavor = "multi_thread")]
async fn broadcast_command_reaches_active_sensor_and_survives_rotation() {
    let harness = spawn_hub(1_000).await;
    let sensor = spawn_sensor(&harness, "sensor-1", 1_000).await;
    sensor.engine.discover().await;
    assert!(wait_until(|| sensor.engine.state() == SensorState::Active, Duration::from_secs(2)).await);

    harness.hub.broadcast(0x01, b"lock-doors").await.unwrap();
    assert!(wait_until(|| !sensor.commands.lock().unwrap().is_empty(), Duration::from_secs(1)).await);
    assert_eq!(sensor.commands.lock().unwrap()[0], (0x01, b"lock-doors".to_vec()));

    let new_id = harness.hub.rotate_broadcast().await.unwrap();
    assert!(
        wait_until(
            || sensor
                .keystore
                .hub()
                .map(|h| h.broadcast.current_id() == new_id)
                .unwrap_or(false),
            Duration::from_secs(1),
        )
        .await,
        "sensor never observed the rotated broadcast key id"
    );

    harness.hub.broadcast(0x02, b"unlock-doors").await.unwrap();
    assert!(wait_until(|| sensor.commands.lock().unwrap().len() >= 2, Duration::from_secs(1)).await);
    assert_eq!(sensor.commands.lock().unwrap()[1], (0x02, b"unlock-doors".to_vec()));
}

#[tokio::test(flavor = "multi_thread")]
async fn replayed_event_is_rejected_on_second_delivery() {
    let harness = spawn_hub(1_000).await;
    let sensor = spawn_sensor(&harness, "sensor-1", 1_000).await;
    sensor.engine.discover().await;
    assert!(wait_until(|| sensor.engine.state() == SensorState::Active, Duration::from_secs(2)).await);

    let hub_record = sensor.keystore.hub().unwrap();
    let sensor_identity = Keypair::from_seed(sensor.identity_seed);
    let now = harness.hub_clock.now_unix().await;
    let header = Header {
        msg_type: MessageType::EventReport,
        device_id: hub_record.device_id,
        timestamp: now,
        nonce: Nonce3([1, 2, 3]),
    };
    let report = shdc_engine::envelope::EventReport {
        event_type: 0x01,
        data: b"door-open".to_vec(),
    };
    let sealed = shdc_engine::envelope::seal_opaque(
        &hub_record.session.current().key,
        &header,
        &report.encode(),
    )
    .unwrap();
    let payload = Payload::EventReport { sealed };
    let signature = sensor_identity.sign(&shdc_codec::packet::signing_bytes(&header, &payload));
    let packet = Packet::new(header, payload, signature);
    let bytes = packet.encode();

    let attacker = harness.network.endpoint("attacker");
    let hub_addr = PeerAddr::new("hub");

    let before = harness.events.lock().unwrap().len();
    attacker.send(&hub_addr, &bytes).await.unwrap();
    assert!(
        wait_until(|| harness.events.lock().unwrap().len() > before, Duration::from_secs(1)).await,
        "first delivery of the crafted event should have been accepted"
    );

    let before_errors = harness.hub_errors.lock().unwrap().len();
    attacker.send(&hub_addr, &bytes).await.unwrap();
    assert!(
        wait_until(
            || harness.hub_errors.lock().unwrap().len() > before_errors,
            Duration::from_secs(1),
        )
        .await,
        "replayed packet should have produced an error"
    );
    assert_eq!(
        harness.events.lock().unwrap().len(),
        before + 1,
        "replayed event must not be delivered twice"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_timestamp_is_rejected() {
    let harness = spawn_hub(100_000).await;
    let sensor = spawn_sensor(&harness, "sensor-1", 100_000).await;
    sensor.engine.discover().await;
    assert!(wait_until(|| sensor.engine.state() == SensorState::Active, Duration::from_secs(2)).await);

    let hub_record = sensor.keystore.hub().unwrap();
    let sensor_identity = Keypair::from_seed(sensor.identity_seed);
    let stale_timestamp = harness.hub_clock.now_unix().await - 120;
    let header = Header {
        msg_type: MessageType::EventReport,
        device_id: hub_record.device_id,
        timestamp: stale_timestamp,
        nonce: Nonce3([9, 9, 9]),
    };
    let report = shdc_engine::envelope::EventReport {
        event_type: 0x01,
        data: b"late-arrival".to_vec(),
    };
    let sealed = shdc_engine::envelope::seal_opaque(
        &hub_record.session.current().key,
        &header,
        &report.encode(),
    )
    .unwrap();
    let payload = Payload::EventReport { sealed };
    let signature = sensor_identity.sign(&shdc_codec::packet::signing_bytes(&header, &payload));
    let packet = Packet::new(header, payload, signature);

    let attacker = harness.network.endpoint("attacker");
    let before_errors = harness.hub_errors.lock().unwrap().len();
    attacker
        .send(&PeerAddr::new("hub"), &packet.encode())
        .await
        .unwrap();

    assert!(
        wait_until(
            || harness.hub_errors.lock().unwrap().len() > before_errors,
            Duration::from_secs(1),
        )
        .await,
        "stale timestamp should have been rejected"
    );
    assert!(harness.events.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_payload_fails_signature_verification() {
    let harness = spawn_hub(1_000).await;
    let sensor = spawn_sensor(&harness, "sensor-1", 1_000).await;
    sensor.engine.discover().await;
    assert!(wait_until(|| sensor.engine.state() == SensorState::Active, Duration::from_secs(2)).await);

    let hub_record = sensor.keystore.hub().unwrap();
    let sensor_identity = Keypair::from_seed(sensor.identity_seed);
    let now = harness.hub_clock.now_unix().await;
    let header = Header {
        msg_type: MessageType::EventReport,
        device_id: hub_record.device_id,
        timestamp: now,
        nonce: Nonce3([4, 5, 6]),
    };
    let report = shdc_engine::envelope::EventReport {
        event_type: 0x01,
        data: b"motion".to_vec(),
    };
    let sealed = shdc_engine::envelope::seal_opaque(
        &hub_record.session.current().key,
        &header,
        &report.encode(),
    )
    .unwrap();
    let payload = Payload::EventReport { sealed };
    let signature = sensor_identity.sign(&shdc_codec::packet::signing_bytes(&header, &payload));
    let packet = Packet::new(header, payload, signature);
    let mut bytes = packet.encode();

    let tamper_index = shdc_core::constants::HEADER_LEN;
    bytes[tamper_index] ^= 0x01;

    let attacker = harness.network.endpoint("attacker");
    let before_errors = harness.hub_errors.lock().unwrap().len();
    attacker.send(&PeerAddr::new("hub"), &bytes).await.unwrap();

    assert!(
        wait_until(
            || harness.hub_errors.lock().unwrap().len() > before_errors,
            Duration::from_secs(1),
        )
        .await,
        "tampered payload should have failed signature verification"
    );
    assert!(harness.events.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn discovery_gives_up_after_timeout_with_no_hub() {
    let network = InMemoryNetwork::new();
    let csrng = Arc::new(OsCsrng);
    let clock = Arc::new(FakeClock::new(1_000));
    let identity = Keypair::generate(csrng.as_ref());
    let transport = Arc::new(network.endpoint("lonely-sensor"));
    let keystore = Arc::new(SensorKeystore::new(Keypair::from_seed(identity.seed())));

    let engine = Arc::new(SensorEngine::new(
        identity,
        keystore,
        transport,
        clock,
        csrng,
        EngineConfig::default(),
        SensorHandlers::default(),
    ));

    engine.discover().await;
    assert_eq!(engine.state(), SensorState::Idle);
}
