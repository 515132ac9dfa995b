//! Network collaborator shims (supplemental, SPEC_FULL.md §3.1): a thin
//! `Transport` trait the overlay sends bytes through, plus two concrete
//! implementations. Grounded on the teacher's `net::mod::networking` (TCP
//! connections established on demand, framed length-prefixed messages) and
//! its in-memory loopback path used for same-node process-to-process
//! delivery.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::TransportError;
use crate::ids::PublicKey;
use crate::topology::{Address, ServerIdentity};

/// What the overlay needs from the network layer: deliver bytes to a peer,
/// identified by its `ServerIdentity` (spec.md §4.6 SendToTreeNode,
/// §4.9 Router).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, to: &ServerIdentity, bytes: Vec<u8>) -> Result<(), TransportError>;
}

/// What a server exposes to accept inbound bytes; the return channel feeds
/// the overlay's `Process` entry point (spec.md §4.6 data flow:
/// `Transport -> Server.processor -> Overlay.Process`).
pub type InboundSender = tokio::sync::mpsc::Sender<Vec<u8>>;
pub type InboundReceiver = tokio::sync::mpsc::Receiver<Vec<u8>>;

/// A length-prefixed TCP transport: one connection per destination,
/// established lazily and cached.
pub struct TcpRouter {
    connections: dashmap::DashMap<(String, u16), Arc<AsyncMutex<TcpStream>>>,
}

impl Default for TcpRouter {
    fn default() -> Self {
        Self {
            connections: dashmap::DashMap::new(),
        }
    }
}

impl TcpRouter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn connection_for(&self, address: &Address) -> Result<Arc<AsyncMutex<TcpStream>>, TransportError> {
        let key = (address.host.clone(), address.port);
        if let Some(conn) = self.connections.get(&key) {
            return Ok(conn.clone());
        }
        let stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
        let conn = Arc::new(AsyncMutex::new(stream));
        self.connections.insert(key, conn.clone());
        Ok(conn)
    }

    /// Accepts connections on `listener` and, for each one, forwards framed
    /// payloads to `inbound` until the peer disconnects (spec.md §4.9
    /// "waits on the transport ... to reach listening").
    pub async fn serve(listener: TcpListener, inbound: InboundSender) -> Result<(), TransportError> {
        loop {
            let (mut stream, _peer) = listener.accept().await?;
            let inbound = inbound.clone();
            tokio::spawn(async move {
                loop {
                    match read_frame(&mut stream).await {
                        Ok(Some(bytes)) => {
                            if inbound.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        _ => break,
                    }
                }
            });
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpRouter {
    async fn send(&self, to: &ServerIdentity, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !matches!(to.address.scheme, crate::topology::Scheme::Tcp | crate::topology::Scheme::Tls) {
            return Err(TransportError::UnsupportedScheme(to.address.scheme.to_string()));
        }
        let conn = self.connection_for(&to.address).await?;
        let mut stream = conn.lock().await;
        write_frame(&mut *stream, &bytes).await
    }
}

async fn write_frame(stream: &mut TcpStream, bytes: &[u8]) -> Result<(), TransportError> {
    stream.write_u32(bytes.len() as u32).await?;
    stream.write_all(bytes).await?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> Result<Option<Vec<u8>>, TransportError> {
    let len = match stream.read_u32().await {
        Ok(len) => len,
        Err(_) => return Ok(None),
    };
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// An in-process transport keyed by public key, for tests and
/// single-process deployments (spec.md §4.9's `local` scheme).
#[derive(Default)]
pub struct LocalRouter {
    peers: dashmap::DashMap<PublicKey, InboundSender>,
}

impl LocalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, public_key: PublicKey, inbound: InboundSender) {
        self.peers.insert(public_key, inbound);
    }
}

#[async_trait::async_trait]
impl Transport for LocalRouter {
    async fn send(&self, to: &ServerIdentity, bytes: Vec<u8>) -> Result<(), TransportError> {
        let Some(sender) = self.peers.get(&to.public_key) else {
            return Err(TransportError::Unreachable);
        };
        sender.send(bytes).await.map_err(|_| TransportError::Unreachable)
    }
}
