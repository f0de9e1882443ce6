//! Sensor-side engine: `IDLE -> DISCOVERING -> JOINING -> ACTIVE` state,
//! discovery backoff, and the inbound dispatch pipeline.

use crate::config::EngineConfig;
use crate::dispatcher::{check_replay, wait_until_unix};
use crate::effects::{ClockEffects, PeerAddr, TransportEffects};
use crate::envelope::{self, BroadcastCommand, EventReport, JoinGrant, KeyRotationGrant};
use crate::handlers::SensorHandlers;
use parking_lot::RwLock;
use shdc_codec::header::{Header, MessageType};
use shdc_codec::packet::Packet;
use shdc_codec::payload::Payload;
use shdc_core::{DeviceId, ProtocolError, ShdcError};
use shdc_crypto::csrng::Csrng;
use shdc_crypto::{rand_32, rand_nonce3, Keypair};
use shdc_keystore::{HubRecord, SensorPeerStore, SessionKeySlot};
use shdc_replay::ReplayGuard;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Where a sensor is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    /// Not attempting to connect.
    Idle,
    /// Sending `HUB_DISCOVERY_REQ` on a backoff schedule.
    Discovering,
    /// Sent `JOIN_REQUEST`, awaiting `JOIN_RESPONSE`.
    Joining,
    /// Joined and exchanging session-sealed traffic with its hub.
    Active,
}

struct SensorInner {
    identity: Keypair,
    keystore: Arc<dyn SensorPeerStore>,
    replay: ReplayGuard,
    state: RwLock<SensorState>,
    hub_addr: RwLock<Option<PeerAddr>>,
    /// Hub id and identity pubkey learned from `HUB_DISCOVERY_RESP`,
    /// carried forward until `JOIN_RESPONSE` lets them settle into the
    /// keystore's `HubRecord`.
    pending_hub: RwLock<Option<(u32, [u8; 32])>>,
    consecutive_failures: RwLock<u32>,
}

/// A running SHDC sensor.
pub struct SensorEngine<T: TransportEffects, C: ClockEffects, R: Csrng> {
    inner: Arc<SensorInner>,
    transport: Arc<T>,
    clock: Arc<C>,
    csrng: Arc<R>,
    config: EngineConfig,
    handlers: Arc<SensorHandlers>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<T, C, R> SensorEngine<T, C, R>
where
    T: TransportEffects + 'static,
    C: ClockEffects + 'static,
    R: Csrng + 'static,
{
    /// Build a sensor engine that has not yet started discovering.
    pub fn new(
        identity: Keypair,
        keystore: Arc<dyn SensorPeerStore>,
        transport: Arc<T>,
        clock: Arc<C>,
        csrng: Arc<R>,
        config: EngineConfig,
        handlers: SensorHandlers,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(SensorInner {
                identity,
                keystore,
                replay: ReplayGuard::default(),
                state: RwLock::new(SensorState::Idle),
                hub_addr: RwLock::new(None),
                pending_hub: RwLock::new(None),
                consecutive_failures: RwLock::new(0),
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

    /// Current lifecycle state.
    pub fn state(&self) -> SensorState {
        *self.inner.state.read()
    }

    /// Run the receive loop until [`Self::stop`] is called. Discovery and
    /// joining are driven by [`Self::discover`]; this loop only handles
    /// inbound traffic once discovery is under way or the sensor is active.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("sensor engine shutting down");
                        return;
                    }
                }
                received = self.transport.recv() => {
                    match received {
                        Ok((bytes, from)) => self.handle_inbound(&bytes, from).await,
                        Err(err) => warn!(error = %err, "sensor transport recv failed"),
                    }
                }
            }
        }
    }

    /// Signal the receive loop (and the discovery/rotation schedulers) to
    /// stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Begin (or resume) discovery: send `HUB_DISCOVERY_REQ` on the
    /// configured backoff schedule until a hub responds or the discovery
    /// timeout elapses, in which case the sensor returns to `Idle`.
    pub async fn discover(&self) {
        run_discovery(
            self.inner.clone(),
            self.transport.clone(),
            self.clock.clone(),
            self.csrng.clone(),
            self.config.clone(),
            self.handlers.clone(),
            self.shutdown_rx.clone(),
        )
        .await
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
            Payload::HubDiscoveryResp { .. } => self.handle_discovery_resp(&packet, from).await,
            Payload::JoinResponse { .. } => self.handle_join_resp(&packet).await,
            Payload::BroadcastCommand { .. } => self.handle_broadcast(&packet).await,
            Payload::KeyRotation { .. } => self.handle_key_rotation(&packet).await,
            _ => Err(ShdcError::Protocol(ProtocolError::WrongState)),
        };

        if let Err(err) = result {
            self.record_failure();
            (self.handlers.on_error)(err);
        }
    }

    async fn handle_discovery_resp(&self, packet: &Packet, from: PeerAddr) -> Result<(), ShdcError> {
        if *self.inner.state.read() != SensorState::Discovering {
            return Err(ShdcError::Protocol(ProtocolError::WrongState));
        }
        let Payload::HubDiscoveryResp {
            hub_id,
            hub_pubkey,
            ..
        } = &packet.payload
        else {
            unreachable!("caller matched HubDiscoveryResp")
        };
        let signing_bytes = shdc_codec::packet::signing_bytes(&packet.header, &packet.payload);
        shdc_crypto::ed25519::verify_or_err(hub_pubkey, &signing_bytes, &packet.signature)?;

        *self.inner.hub_addr.write() = Some(from.clone());
        *self.inner.pending_hub.write() = Some((*hub_id, *hub_pubkey));
        *self.inner.state.write() = SensorState::Joining;

        let now = self.clock.now_unix().await;
        let nonce = rand_nonce3(self.csrng.as_ref());
        let header = Header {
            msg_type: MessageType::JoinRequest,
            device_id: DeviceId::UNASSIGNED,
            timestamp: now,
            nonce,
        };
        let payload = Payload::JoinRequest {
            pubkey: self.inner.identity.public_key(),
            info: Vec::new(),
        };
        info!(hub_id = *hub_id, "sensor: sending join request");
        self.sign_and_send(header, payload, &from).await
    }

    async fn handle_join_resp(&self, packet: &Packet) -> Result<(), ShdcError> {
        if *self.inner.state.read() != SensorState::Joining {
            return Err(ShdcError::Protocol(ProtocolError::WrongState));
        }
        let Payload::JoinResponse { eph_pub, sealed } = &packet.payload else {
            unreachable!("caller matched JoinResponse")
        };
        let Some((_, hub_pubkey)) = self.inner.pending_hub.read().clone() else {
            return Err(ShdcError::Protocol(ProtocolError::WrongState));
        };
        let signing_bytes = shdc_codec::packet::signing_bytes(&packet.header, &packet.payload);
        shdc_crypto::ed25519::verify_or_err(&hub_pubkey, &signing_bytes, &packet.signature)?;

        let plaintext = shdc_crypto::join_wrap::open(
            &self.inner.identity.seed(),
            eph_pub,
            &packet.header.encode(),
            sealed,
        )?;
        let grant = JoinGrant::decode(&plaintext)?;

        let now = self.clock.now_unix().await;
        let Some(hub_addr) = self.inner.hub_addr.read().clone() else {
            return Err(ShdcError::Protocol(ProtocolError::WrongState));
        };
        let Some((hub_id, hub_pubkey)) = self.inner.pending_hub.read().clone() else {
            return Err(ShdcError::Protocol(ProtocolError::WrongState));
        };

        let hub_record = HubRecord::new(
            hub_id,
            hub_pubkey,
            packet.header.device_id,
            SessionKeySlot::new(grant.session_key, now),
            shdc_keystore::BroadcastKeySlot::new(grant.broadcast_key_id, grant.broadcast_key, now),
        );
        self.inner.keystore.set_hub(hub_record);
        *self.inner.pending_hub.write() = None;
        *self.inner.state.write() = SensorState::Active;
        let _ = hub_addr;

        info!(device_id = %packet.header.device_id, "sensor: joined hub");
        (self.handlers.on_joined)(packet.header.device_id);
        Ok(())
    }

    async fn handle_broadcast(&self, packet: &Packet) -> Result<(), ShdcError> {
        let Payload::BroadcastCommand { bkid, sealed } = &packet.payload else {
            unreachable!("caller matched BroadcastCommand")
        };
        let Some(hub) = self.inner.keystore.hub() else {
            return Err(ShdcError::Protocol(ProtocolError::WrongState));
        };
        let signing_bytes = shdc_codec::packet::signing_bytes(&packet.header, &packet.payload);
        shdc_crypto::ed25519::verify_or_err(&hub.hub_pubkey, &signing_bytes, &packet.signature)?;

        let now = self.clock.now_unix().await;
        check_replay(&self.inner.replay, &packet.header, now)?;

        let key = hub
            .broadcast
            .resolve(shdc_core::BroadcastKeyId(*bkid), now)
            .ok_or(shdc_core::CryptoError::KeyUnavailable)?;
        let plaintext = envelope::open_opaque(&key.key, &packet.header, sealed)?;
        let command = BroadcastCommand::decode(&plaintext).map_err(ShdcError::from)?;

        self.clear_failures();
        (self.handlers.on_command)(command.cmd_type, command.cmd_data);
        Ok(())
    }

    async fn handle_key_rotation(&self, packet: &Packet) -> Result<(), ShdcError> {
        let Payload::KeyRotation { sealed } = &packet.payload else {
            unreachable!("caller matched KeyRotation")
        };
        let Some(hub) = self.inner.keystore.hub() else {
            return Err(ShdcError::Protocol(ProtocolError::WrongState));
        };
        let signing_bytes = shdc_codec::packet::signing_bytes(&packet.header, &packet.payload);
        shdc_crypto::ed25519::verify_or_err(&hub.hub_pubkey, &signing_bytes, &packet.signature)?;

        let now = self.clock.now_unix().await;
        check_replay(&self.inner.replay, &packet.header, now)?;

        let plaintext = open_with_any_session_key(&hub.session, &packet.header, sealed, now)?;
        let grant = KeyRotationGrant::decode(&plaintext)?;

        let keystore = self.inner.keystore.clone();
        let clock = self.clock.clone();
        let handlers = self.handlers.clone();
        match grant {
            KeyRotationGrant::Session {
                new_key,
                valid_from,
            } => {
                tokio::spawn(async move {
                    wait_until_unix(clock.as_ref(), valid_from).await;
                    if let Err(err) = keystore.update_session_key(new_key, valid_from) {
                        (handlers.on_error)(ShdcError::from(err));
                    }
                });
            }
            KeyRotationGrant::Broadcast {
                new_id,
                new_key,
                valid_from,
            } => {
                tokio::spawn(async move {
                    wait_until_unix(clock.as_ref(), valid_from).await;
                    keystore.update_broadcast_key(new_id, new_key, valid_from);
                });
            }
        }
        self.clear_failures();
        Ok(())
    }

    /// Seal and send an `EVENT_REPORT` application payload to the joined
    /// hub.
    pub async fn send_event(&self, event_type: u8, data: &[u8]) -> Result<(), ShdcError> {
        let hub = self
            .inner
            .keystore
            .hub()
            .ok_or(ProtocolError::WrongState)?;
        let Some(hub_addr) = self.inner.hub_addr.read().clone() else {
            return Err(ShdcError::Protocol(ProtocolError::WrongState));
        };

        let now = self.clock.now_unix().await;
        let nonce = rand_nonce3(self.csrng.as_ref());
        let header = Header {
            msg_type: MessageType::EventReport,
            device_id: hub.device_id,
            timestamp: now,
            nonce,
        };
        let report = EventReport {
            event_type,
            data: data.to_vec(),
        };
        let sealed = envelope::seal_opaque(&hub.session.current().key, &header, &report.encode())?;
        self.sign_and_send(header, Payload::EventReport { sealed }, &hub_addr)
            .await
    }

    /// Forget the joined hub and return to `Idle` (administrative reset).
    pub fn reset(&self) {
        self.inner.keystore.clear_hub();
        *self.inner.state.write() = SensorState::Idle;
        *self.inner.hub_addr.write() = None;
        self.clear_failures();
    }

    fn record_failure(&self) {
        let mut failures = self.inner.consecutive_failures.write();
        *failures += 1;
        if *failures >= self.config.max_consecutive_failures && *self.inner.state.read() == SensorState::Active {
            warn!("sensor: too many consecutive failures, re-discovering");
            drop(failures);
            self.inner.keystore.clear_hub();
            *self.inner.hub_addr.write() = None;
            self.clear_failures();
            *self.inner.state.write() = SensorState::Discovering;

            tokio::spawn(run_discovery(
                self.inner.clone(),
                self.transport.clone(),
                self.clock.clone(),
                self.csrng.clone(),
                self.config.clone(),
                self.handlers.clone(),
                self.shutdown_rx.clone(),
            ));
        }
    }

    fn clear_failures(&self) {
        *self.inner.consecutive_failures.write() = 0;
    }

    async fn sign_and_send(
        &self,
        header: Header,
        payload: Payload,
        dst: &PeerAddr,
    ) -> Result<(), ShdcError> {
        sign_and_send(&self.inner, self.transport.as_ref(), header, payload, dst).await
    }
}

async fn sign_and_send<T: TransportEffects>(
    inner: &SensorInner,
    transport: &T,
    header: Header,
    payload: Payload,
    dst: &PeerAddr,
) -> Result<(), ShdcError> {
    let signing_bytes = shdc_codec::packet::signing_bytes(&header, &payload);
    let signature = inner.identity.sign(&signing_bytes);
    let packet = Packet::new(header, payload, signature);
    transport
        .send(dst, &packet.encode())
        .await
        .map_err(ShdcError::from)
}

async fn send_discovery_req<T: TransportEffects, C: ClockEffects, R: Csrng>(
    inner: &SensorInner,
    transport: &T,
    clock: &C,
    csrng: &R,
) -> Result<(), ShdcError> {
    let now = clock.now_unix().await;
    let nonce = rand_nonce3(csrng);
    let header = Header {
        msg_type: MessageType::HubDiscoveryReq,
        device_id: DeviceId::UNASSIGNED,
        timestamp: now,
        nonce,
    };
    let payload = Payload::HubDiscoveryReq {
        pubkey: inner.identity.public_key(),
        info: Vec::new(),
    };
    sign_and_send(inner, transport, header, payload, &transport.discovery_addr()).await
}

/// Drive a sensor's discovery backoff loop against its own state, shared by
/// [`SensorEngine::discover`] and the automatic re-discovery triggered by
/// [`SensorEngine::record_failure`], neither of which can assume the other
/// already holds an `Arc<SensorEngine<..>>` to spawn from.
async fn run_discovery<T, C, R>(
    inner: Arc<SensorInner>,
    transport: Arc<T>,
    clock: Arc<C>,
    csrng: Arc<R>,
    config: EngineConfig,
    handlers: Arc<SensorHandlers>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    T: TransportEffects + 'static,
    C: ClockEffects + 'static,
    R: Csrng + 'static,
{
    {
        let mut state = inner.state.write();
        if *state == SensorState::Active {
            return;
        }
        *state = SensorState::Discovering;
    }

    let deadline = clock.now_unix().await + config.discovery.timeout.as_secs() as u32;
    let mut attempt = 0usize;

    loop {
        if *inner.state.read() != SensorState::Discovering {
            return;
        }
        let now = clock.now_unix().await;
        if now >= deadline {
            warn!("sensor: discovery timed out, returning to idle");
            *inner.state.write() = SensorState::Idle;
            return;
        }

        if let Err(err) =
            send_discovery_req(&inner, transport.as_ref(), clock.as_ref(), csrng.as_ref()).await
        {
            (handlers.on_error)(err);
        }

        let backoff = config.discovery.backoff_for_attempt(attempt);
        attempt += 1;
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = clock.sleep(backoff) => {}
        }
    }
}

fn open_with_any_session_key(
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
