//! MessageProxy layer (C5): a pluggable wire codec, with a default instance
//! that just serializes the envelope. Grounded on the teacher's
//! `MessageProxy`-shaped split between "runtime module" and "userspace
//! process" senders in `kernel/mod.rs` (`enum ProcessSender { Runtime(..),
//! Userspace(..) }`) — a small registry keyed by identity, one default
//! fallback path.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::message::{MessageTypeID, OverlayMsg, ProtocolMsg};

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("message proxy: (de)serialization failed: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),
}

pub trait MessageProxy: Send + Sync {
    fn wrap(&self, msg: &ProtocolMsg, overlay_info: Option<&OverlayMsg>) -> Result<Vec<u8>, ProxyError>;
    fn unwrap(&self, wire: &[u8]) -> Result<(ProtocolMsg, Option<OverlayMsg>), ProxyError>;
    fn packet_type(&self) -> MessageTypeID;
    fn name(&self) -> &str;
}

/// Marshals `msg`/`overlay_info` with the host's type codec (`bincode`,
/// matching the teacher's wire format throughout `kv.rs`/`sqlite.rs`) and
/// re-decodes the same way on `unwrap` (spec.md §4.5).
pub struct DefaultMessageProxy;

pub const DEFAULT_PACKET_NAME: &str = "onet/default-message-proxy";

impl MessageProxy for DefaultMessageProxy {
    fn wrap(&self, msg: &ProtocolMsg, overlay_info: Option<&OverlayMsg>) -> Result<Vec<u8>, ProxyError> {
        Ok(bincode::serialize(&(msg, overlay_info))?)
    }

    fn unwrap(&self, wire: &[u8]) -> Result<(ProtocolMsg, Option<OverlayMsg>), ProxyError> {
        Ok(bincode::deserialize(wire)?)
    }

    fn packet_type(&self) -> MessageTypeID {
        MessageTypeID::of(DEFAULT_PACKET_NAME)
    }

    fn name(&self) -> &str {
        DEFAULT_PACKET_NAME
    }
}

/// At most one proxy may be registered per `PacketType`; look-ups fall back
/// to [`DefaultMessageProxy`] (spec.md §4.5).
pub struct ProxyRegistry {
    proxies: DashMap<MessageTypeID, Arc<dyn MessageProxy>>,
    default: Arc<dyn MessageProxy>,
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self {
            proxies: DashMap::new(),
            default: Arc::new(DefaultMessageProxy),
        }
    }
}

impl ProxyRegistry {
    /// Returns `false` (without replacing) if a proxy is already registered
    /// for this packet type.
    pub fn register(&self, proxy: Arc<dyn MessageProxy>) -> bool {
        let key = proxy.packet_type();
        if self.proxies.contains_key(&key) {
            return false;
        }
        self.proxies.insert(key, proxy);
        true
    }

    pub fn get(&self, packet_type: MessageTypeID) -> Arc<dyn MessageProxy> {
        self.proxies
            .get(&packet_type)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn default_proxy(&self) -> Arc<dyn MessageProxy> {
        self.default.clone()
    }
}
