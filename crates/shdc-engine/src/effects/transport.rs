//! Datagram transport effect. Binding a real UDP socket, handling
//! multicast membership, and every other detail of getting bytes onto a
//! physical network is out of scope here — this trait only says how the
//! engine hands a peer a datagram and waits for the next one, so it can be
//! driven by a real socket or an in-memory fake identically.

use async_trait::async_trait;
use shdc_core::TransportError;
use std::fmt;
use std::sync::Arc;

/// An opaque destination: a UDP socket address, a well-known discovery
/// address, or (in tests) a peer's assigned name. The engine never parses
/// this, it only round-trips it back to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr(String);

impl PeerAddr {
    /// Wrap an address string.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Borrow the underlying address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerAddr {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Datagram send/receive, and the well-known discovery destination this
/// transport would use to reach every hub on the network.
#[async_trait]
pub trait TransportEffects: Send + Sync {
    /// Send a datagram to `dst`.
    async fn send(&self, dst: &PeerAddr, bytes: &[u8]) -> Result<(), TransportError>;

    /// Receive the next available datagram and its source address.
    async fn recv(&self) -> Result<(Vec<u8>, PeerAddr), TransportError>;

    /// The address a discovery request should be sent to (broadcast or
    /// multicast group, depending on what the concrete transport binds).
    fn discovery_addr(&self) -> PeerAddr;
}

#[async_trait]
impl<T: TransportEffects + ?Sized> TransportEffects for Arc<T> {
    async fn send(&self, dst: &PeerAddr, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(dst, bytes).await
    }

    async fn recv(&self) -> Result<(Vec<u8>, PeerAddr), TransportError> {
        (**self).recv().await
    }

    fn discovery_addr(&self) -> PeerAddr {
        (**self).discovery_addr()
    }
}

#[cfg(feature = "testing")]
mod fake {
    use super::{PeerAddr, TransportEffects};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use shdc_core::TransportError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::sync::Notify;

    const DISCOVERY_ADDR: &str = "discovery:broadcast";

    struct Mailbox {
        queue: Mutex<VecDeque<(Vec<u8>, PeerAddr)>>,
        notify: Notify,
    }

    impl Mailbox {
        fn new() -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }
        }

        fn push(&self, bytes: Vec<u8>, from: PeerAddr) {
            self.queue.lock().push_back((bytes, from));
            self.notify.notify_one();
        }
    }

    /// A shared in-process datagram bus. Every participant (hub or sensor)
    /// registers under its own address, and a discovery send fans out to
    /// every other registered participant, mimicking a broadcast network.
    #[derive(Clone)]
    pub struct InMemoryNetwork {
        mailboxes: Arc<Mutex<HashMap<PeerAddr, Arc<Mailbox>>>>,
    }

    impl Default for InMemoryNetwork {
        fn default() -> Self {
            Self {
                mailboxes: Arc::new(Mutex::new(HashMap::new())),
            }
        }
    }

    impl InMemoryNetwork {
        /// Build a fresh, empty network.
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a participant and return its transport handle.
        pub fn endpoint(&self, addr: impl Into<String>) -> InMemoryTransport {
            let addr = PeerAddr::new(addr);
            let mailbox = Arc::new(Mailbox::new());
            self.mailboxes.lock().insert(addr.clone(), mailbox.clone());
            InMemoryTransport {
                self_addr: addr,
                network: self.clone(),
                mailbox,
            }
        }
    }

    /// [`TransportEffects`] backed by [`InMemoryNetwork`], for scenario
    /// tests that wire a hub and one or more sensors together without any
    /// real sockets.
    pub struct InMemoryTransport {
        self_addr: PeerAddr,
        network: InMemoryNetwork,
        mailbox: Arc<Mailbox>,
    }

    #[async_trait]
    impl TransportEffects for InMemoryTransport {
        async fn send(&self, dst: &PeerAddr, bytes: &[u8]) -> Result<(), TransportError> {
            if dst.as_str() == DISCOVERY_ADDR {
                let mailboxes = self.network.mailboxes.lock();
                for (addr, mailbox) in mailboxes.iter() {
                    if *addr != self.self_addr {
                        mailbox.push(bytes.to_vec(), self.self_addr.clone());
                    }
                }
                return Ok(());
            }

            let mailbox = self
                .network
                .mailboxes
                .lock()
                .get(dst)
                .cloned()
                .ok_or_else(|| TransportError::SendFailed(format!("no such peer: {dst}")))?;
            mailbox.push(bytes.to_vec(), self.self_addr.clone());
            Ok(())
        }

        async fn recv(&self) -> Result<(Vec<u8>, PeerAddr), TransportError> {
            loop {
                if let Some(item) = self.mailbox.queue.lock().pop_front() {
                    return Ok(item);
                }
                self.mailbox.notify.notified().await;
            }
        }

        fn discovery_addr(&self) -> PeerAddr {
            PeerAddr::new(DISCOVERY_ADDR)
        }
    }
}

#[cfg(feature = "testing")]
pub use fake::{InMemoryNetwork, InMemoryTransport};
