//! Hub-side engine: per-sensor `UNKNOWN -> JOINING -> ACTIVE` state,
//! broadcast-key ownership, and the inbound dispatch pipeline.

use crate::config::EngineConfig;
use crate::dispatcher::{check_replay, wait_until_unix};
use crate::effects::{ClockEffects, PeerAddr, TransportEffects};
use crate::envelope::{self, EventReport, JoinGrant, KeyRotationGrant};
use crate::handlers::HubHandlers;
use shdc_codec::header::{Header, MessageType};
use shdc_codec::packet::Packet;
use shdc_codec::payload::Payload;
use shdc_core::{BroadcastKeyId, DeviceId, ProtocolError, ShdcError};
use shdc_crypto::csrng::Csrng;
use shdc_crypto::{rand_32, rand_nonce3, Keypair};
use shdc_keystore::{HubKeystore, HubPeerStore, SensorRecord, SessionKeySlot};
use shdc_replay::ReplayGuard;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A hub's view of one of its sensors, beyond what the keystore persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerState {
    /// JOIN_RESPONSE was sent; no confirmed event has arrived yet.
    Joining,
    /// At least one event has been authenticated under the session key.
    Active,
}

struct HubInner {
    identity: Keypair,
    hub_id: u32,
    keystore: HubKeystore,
    replay: ReplayGuard,
    peer_states: parking_lot::RwLock<HashMap<DeviceId, PeerState>>,
    addresses: parking_lot::RwLock<HashMap<DeviceId, PeerAddr>>,
    failures: parking_lot::RwLock<HashMap<DeviceId, u32>>,
    next_device_id: AtomicU32,
}

/// A running SHDC hub.
pub struct HubEngine<T: TransportEffects, C: ClockEffects, R: Csrng> {
    inner: Arc<HubInner>,
    transport: Arc<T>,
    clock: Arc<C>,
    csrng: Arc<R>,
    config: EngineConfig,
    handlers: Arc<HubHandlers>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<T, C, R> HubEngine<T, C, R>
where
    T: TransportEffects + 'static,
    C: ClockEffects + 'static,
    R: Csrng + 'static,
{
    /// Build a hub engine with a freshly generated broadcast key.
    pub async fn new(
        hub_id: u32,
        identity: Keypair,
        transport: Arc<T>,
        clock: Arc<C>,
        csrng: Arc<R>,
        config: EngineConfig,
        handlers: HubHandlers,
    ) -> Self {
        let now = clock.now_unix().await;
        let initial_broadcast_key = rand_32(csrng.as_ref());
        let keystore = HubKeystore::new(
            Keypair::from_seed(identity.seed()),
            initial_broadcast_key,
            now,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            inner: Arc::new(HubInner {
                identity,
                hub_id,
                keystore,
                replay: ReplayGuard::default(),
                peer_states: parking_lot::RwLock::new(HashMap::new()),
                addresses: parking_lot::RwLock::new(HashMap::new()),
                failures: parking_lot::RwLock::new(HashMap::new()),
                next_device_id: AtomicU32::new(1),
            }),
            transport,
            clock,
            csrng,
            config,
            handlers: Arc::new(handlers),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Run the receive loop and the rotation schedulers until [`Self::stop`]
    /// is called. Intended to be spawned with `tokio::spawn`.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(hub_id = self.inner.hub_id, "hub engine shutting down");
                        return;
                    }
                }
                received = self.transport.recv() => {
                    match received {
                        Ok((bytes, from)) => self.handle_inbound(&bytes, from).await,
                        Err(err) => warn!(error = %err, "hub transport recv failed"),
                    }
                }
            }
        }
    }

    /// Signal the receive loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn handle_inbound(&self, bytes: &[u8], from: PeerAddr) {
        let packet = match Packet::decode(bytes) {
            Ok(p) => p,
            Err(err) => {
                (self.handlers.on_error)(ShdcError::from(err));
                return;
            }
        };

        let result = match &packet.payload {
            Payload::HubDiscoveryReq { .. } => self.handle_discovery(&packet, from).await,
            Payload::JoinRequest { .. } => self.handle_join(&packet, from).await,
            Payload::EventReport { .. } => self.handle_event(&packet, from).await,
            _ => Err(ShdcError::Protocol(ProtocolError::WrongState)),
        };

        if let Err(err) = result {
            self.record_failure(packet.header.device_id);
            (self.handlers.on_error)(err);
        }
    }

    async fn handle_discovery(&self, packet: &Packet, from: PeerAddr) -> Result<(), ShdcError> {
        let Payload::HubDiscoveryReq { pubkey, .. } = &packet.payload else {
            unreachable!("caller matched HubDiscoveryReq")
        };
        let signing_bytes = shdc_codec::packet::signing_bytes(&packet.header, &packet.payload);
        shdc_crypto::ed25519::verify_or_err(pubkey, &signing_bytes, &packet.signature)?;

        let now = self.clock.now_unix().await;
        let nonce = rand_nonce3(self.csrng.as_ref());
        let header = Header {
            msg_type: MessageType::HubDiscoveryResp,
            device_id: DeviceId(self.inner.hub_id),
            timestamp: now,
            nonce,
        };
        let payload = Payload::HubDiscoveryResp {
            hub_id: self.inner.hub_id,
            hub_pubkey: self.inner.identity.public_key(),
            caps: Vec::new(),
        };
        self.sign_and_send(header, payload, &from).await
    }

    async fn handle_join(&self, packet: &Packet, from: PeerAddr) -> Result<(), ShdcError> {
        let Payload::JoinRequest { pubkey, .. } = &packet.payload else {
            unreachable!("caller matched JoinRequest")
        };
        let signing_bytes = shdc_codec::packet::signing_bytes(&packet.header, &packet.payload);
        shdc_crypto::ed25519::verify_or_err(pubkey, &signing_bytes, &packet.signature)?;

        if !(self.handlers.accept_join)(pubkey) {
            warn!("hub: join refused by admission policy");
            return Err(ShdcError::Protocol(ProtocolError::JoinRefused(
                "identity rejected by admission policy".to_string(),
            )));
        }

        let now = self.clock.now_unix().await;
        let device_id = DeviceId(self.inner.next_device_id.fetch_add(1, Ordering::SeqCst));

        let session_key = rand_32(self.csrng.as_ref());
        let (broadcast_id, broadcast_key) = self.inner.keystore.broadcast_key(now);
        self.inner.keystore.insert_sensor(SensorRecord::new(
            device_id,
            *pubkey,
            SessionKeySlot::new(session_key, now),
            now,
            broadcast_id,
        ));
        self.inner
            .peer_states
            .write()
            .insert(device_id, PeerState::Joining);
        self.inner.addresses.write().insert(device_id, from.clone());

        let grant = JoinGrant {
            session_key,
            broadcast_key_id: broadcast_id,
            broadcast_key,
        };

        let nonce = rand_nonce3(self.csrng.as_ref());
        let header = Header {
            msg_type: MessageType::JoinResponse,
            device_id,
            timestamp: now,
            nonce,
        };
        let sealed_join = shdc_crypto::join_wrap::seal(
            self.csrng.as_ref(),
            pubkey,
            &header.encode(),
            &grant.encode(),
        )
        .map_err(ShdcError::from)?;

        let payload = Payload::JoinResponse {
            eph_pub: sealed_join.eph_pub,
            sealed: sealed_join.sealed,
        };
        info!(device_id = %device_id, "hub: sensor joining");
        self.sign_and_send(header, payload, &from).await
    }

    async fn handle_event(&self, packet: &Packet, from: PeerAddr) -> Result<(), ShdcError> {
        let Payload::EventReport { sealed } = &packet.payload else {
            unreachable!("caller matched EventReport")
        };
        let device_id = packet.header.device_id;
        let record = self
            .inner
            .keystore
            .get_sensor(device_id)
            .ok_or(ProtocolError::UnknownDevice(device_id.0))?;

        let signing_bytes = shdc_codec::packet::signing_bytes(&packet.header, &packet.payload);
        shdc_crypto::ed25519::verify_or_err(
            &record.identity_pubkey,
            &signing_bytes,
            &packet.signature,
        )?;

        let now = self.clock.now_unix().await;
        check_replay(&self.inner.replay, &packet.header, now)?;

        let plaintext = open_with_any_key(&record.session, &packet.header, sealed, now)?;
        let report = EventReport::decode(&plaintext).map_err(ShdcError::from)?;

        self.inner.addresses.write().insert(device_id, from);
        self.inner.keystore.touch_sensor(device_id, now);
        let was_joining = matches!(
            self.inner.peer_states.read().get(&device_id),
            Some(PeerState::Joining) | None
        );
        if was_joining {
            self.inner
                .peer_states
                .write()
                .insert(device_id, PeerState::Active);
            (self.handlers.on_device_joined)(device_id);
        }
        self.clear_failures(device_id);
        (self.handlers.on_event)(device_id, report.event_type, report.data);
        Ok(())
    }

    /// Seal and unicast a BROADCAST_COMMAND-typed application payload to
    /// every currently active sensor.
    pub async fn broadcast(&self, cmd_type: u8, cmd_data: &[u8]) -> Result<(), ShdcError> {
        let now = self.clock.now_unix().await;
        let (broadcast_id, broadcast_key) = self.inner.keystore.broadcast_key(now);
        let command = crate::envelope::BroadcastCommand {
            cmd_type,
            cmd_data: cmd_data.to_vec(),
        }
        .encode();
        let active: Vec<DeviceId> = self
            .inner
            .peer_states
            .read()
            .iter()
            .filter(|(_, state)| **state == PeerState::Active)
            .map(|(id, _)| *id)
            .collect();

        for device_id in active {
            let Some(addr) = self.inner.addresses.read().get(&device_id).cloned() else {
                continue;
            };
            let nonce = rand_nonce3(self.csrng.as_ref());
            let header = Header {
                msg_type: MessageType::BroadcastCommand,
                device_id,
                timestamp: now,
                nonce,
            };
            let sealed = envelope::seal_opaque(&broadcast_key, &header, &command)
                .map_err(ShdcError::from)?;
            let payload = Payload::BroadcastCommand {
                bkid: broadcast_id.0,
                sealed,
            };
            self.sign_and_send(header, payload, &addr).await?;
        }
        Ok(())
    }

    /// Rotate one sensor's session key: announce it via KEY_ROTATION with a
    /// `valid_from` a few seconds out, then apply it to the keystore once
    /// that time arrives, so the previous key's grace window starts from
    /// the same instant the sensor itself applies the rotation.
    pub async fn rotate_session(&self, device_id: DeviceId) -> Result<(), ShdcError> {
        let now = self.clock.now_unix().await;
        let new_key = rand_32(self.csrng.as_ref());
        let valid_from = now + self.config.rotation.activation_delay.as_secs() as u32;

        let record = self
            .inner
            .keystore
            .get_sensor(device_id)
            .ok_or(ProtocolError::UnknownDevice(device_id.0))?;
        let Some(addr) = self.inner.addresses.read().get(&device_id).cloned() else {
            return Err(ShdcError::Protocol(ProtocolError::UnknownDevice(device_id.0)));
        };

        let grant = KeyRotationGrant::Session {
            new_key,
            valid_from,
        };
        let nonce = rand_nonce3(self.csrng.as_ref());
        let header = Header {
            msg_type: MessageType::KeyRotation,
            device_id,
            timestamp: now,
            nonce,
        };
        let sealed = envelope::seal_opaque(&record.session.current().key, &header, &grant.encode())
            .map_err(ShdcError::from)?;

        self.sign_and_send(header, Payload::KeyRotation { sealed }, &addr)
            .await?;

        let inner = self.inner.clone();
        let clock = self.clock.clone();
        let handlers = self.handlers.clone();
        tokio::spawn(async move {
            wait_until_unix(clock.as_ref(), valid_from).await;
            if let Err(err) = inner.keystore.rotate_session(device_id, new_key, valid_from) {
                (handlers.on_error)(ShdcError::from(err));
            }
        });
        Ok(())
    }

    /// Rotate the hub-wide broadcast key: announce the new id and key to
    /// every active sensor with a `valid_from` a few seconds out, then
    /// apply it to the keystore once that time arrives. Returns the new id
    /// immediately so callers can track it without waiting for activation.
    pub async fn rotate_broadcast(&self) -> Result<BroadcastKeyId, ShdcError> {
        let now = self.clock.now_unix().await;
        let new_key = rand_32(self.csrng.as_ref());
        let new_id = self.inner.keystore.peek_next_broadcast_id();
        let valid_from = now + self.config.rotation.activation_delay.as_secs() as u32;

        let active: Vec<DeviceId> = self
            .inner
            .peer_states
            .read()
            .iter()
            .filter(|(_, state)| **state == PeerState::Active)
            .map(|(id, _)| *id)
            .collect();

        for device_id in active {
            let Some(record) = self.inner.keystore.get_sensor(device_id) else {
                continue;
            };
            let Some(addr) = self.inner.addresses.read().get(&device_id).cloned() else {
                continue;
            };
            let grant = KeyRotationGrant::Broadcast {
                new_id,
                new_key,
                valid_from,
            };
            let nonce = rand_nonce3(self.csrng.as_ref());
            let header = Header {
                msg_type: MessageType::KeyRotation,
                device_id,
                timestamp: now,
                nonce,
            };
            let sealed = match envelope::seal_opaque(&record.session.current().key, &header, &grant.encode()) {
                Ok(sealed) => sealed,
                Err(err) => {
                    (self.handlers.on_error)(ShdcError::from(err));
                    continue;
                }
            };
            if let Err(err) = self
                .sign_and_send(header, Payload::KeyRotation { sealed }, &addr)
                .await
            {
                (self.handlers.on_error)(err);
                continue;
            }
            // No wire ACK exists for KEY_ROTATION; record the hand-off
            // optimistically at announcement time.
            self.inner.keystore.ack_broadcast_key(device_id, new_id);
        }

        let inner = self.inner.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            wait_until_unix(clock.as_ref(), valid_from).await;
            inner.keystore.rotate_broadcast(new_id, new_key, valid_from);
        });
        Ok(new_id)
    }

    /// Forget a sensor entirely: its keystore record, replay history,
    /// learned address, and join state. Administrative reset, not part of
    /// the steady-state protocol flow.
    pub fn reset_peer(&self, device_id: DeviceId) {
        self.inner.keystore.remove_sensor(device_id);
        self.inner.replay.forget_device(device_id);
        self.inner.addresses.write().remove(&device_id);
        self.inner.peer_states.write().remove(&device_id);
        self.clear_failures(device_id);
        (self.handlers.on_device_left)(device_id);
    }

    fn record_failure(&self, device_id: DeviceId) {
        if device_id == DeviceId::UNASSIGNED {
            return;
        }
        let mut failures = self.inner.failures.write();
        let count = failures.entry(device_id).or_insert(0);
        *count += 1;
        if *count >= self.config.max_consecutive_failures {
            drop(failures);
            warn!(device_id = %device_id, "hub: dropping sensor after repeated failures");
            self.reset_peer(device_id);
        }
    }

    fn clear_failures(&self, device_id: DeviceId) {
        self.inner.failures.write().remove(&device_id);
    }

    async fn sign_and_send(
        &self,
        header: Header,
        payload: Payload,
        dst: &PeerAddr,
    ) -> Result<(), ShdcError> {
        let signing_bytes = shdc_codec::packet::signing_bytes(&header, &payload);
        let signature = self.inner.identity.sign(&signing_bytes);
        let packet = Packet::new(header, payload, signature);
        self.transport
            .send(dst, &packet.encode())
            .await
            .map_err(ShdcError::from)
    }
}

/// Try to AEAD-open `sealed` under every key the session slot currently
/// accepts (current, and previous while inside its grace window), so a
/// sensor that hasn't yet observed a rotation is still understood.
fn open_with_any_key(
    slot: &SessionKeySlot,
    header: &Header,
    sealed: &[u8],
    now: u32,
) -> Result<Vec<u8>, ShdcError> {
    for key_material in slot.acceptable_keys(now) {
        if let Ok(plaintext) = envelope::open_opaque(&key_material.key, header, sealed) {
            return Ok(plaintext);
        }
    }
    Err(ShdcError::Crypto(shdc_core::CryptoError::AeadFailure))
}

/// Spawn the broadcast-key rotation scheduler: sleeps for the configured
/// period and rotates, forever, until `shutdown_rx` fires.
pub fn spawn_broadcast_rotation_scheduler<T, C, R>(
    engine: Arc<HubEngine<T, C, R>>,
    clock: Arc<C>,
) -> JoinHandle<()>
where
    T: TransportEffects + 'static,
    C: ClockEffects + 'static,
    R: Csrng + 'static,
{
    let mut shutdown_rx = engine.shutdown_rx.clone();
    let period = engine.config.rotation.broadcast_period;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = clock.sleep(period) => {
                    if let Err(err) = engine.rotate_broadcast().await {
                        debug!(error = %err, "scheduled broadcast rotation failed");
                    }
                }
            }
        }
    })
}

/// Spawn the per-sensor session-key rotation scheduler: every period, every
/// currently active sensor's session key is rotated in turn.
pub fn spawn_session_rotation_scheduler<T, C, R>(
    engine: Arc<HubEngine<T, C, R>>,
    clock: Arc<C>,
) -> JoinHandle<()>
where
    T: TransportEffects + 'static,
    C: ClockEffects + 'static,
    R: Csrng + 'static,
{
    let mut shutdown_rx = engine.shutdown_rx.clone();
    let period = engine.config.rotation.session_period;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = clock.sleep(period) => {
                    let devices: Vec<DeviceId> = engine
                        .inner
                        .peer_states
                        .read()
                        .iter()
                        .filter(|(_, state)| **state == PeerState::Active)
                        .map(|(id, _)| *id)
                        .collect();
                    for device_id in devices {
                        if let Err(err) = engine.rotate_session(device_id).await {
                            debug!(error = %err, device_id = %device_id, "scheduled session rotation failed");
                        }
                    }
                }
            }
        }
    })
}
