//! Protocol registry (C4): a global, process-wide name -> constructor map
//! that freezes once any server starts, plus a per-server copy taken at
//! construction time (spec.md §4.4).
//!
//! Grounded on `lazy_static!`-backed global tables in the teacher
//! (`types::{ENCRYPTOR_PROCESS_ID, ETH_RPC_PROCESS_ID, ...}`) and on the
//! "serverStarted latch is a one-shot flag with compare-and-swap semantics"
//! redesign note (spec.md §9), implemented with `AtomicBool`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::ids::{protocol_id, ProtocolID};
use crate::protocol::ProtocolInstance;
use crate::tni::TreeNodeInstance;

pub type ProtocolConstructor =
    Arc<dyn Fn(Arc<TreeNodeInstance>) -> Result<Box<dyn ProtocolInstance>, crate::error::OverlayError> + Send + Sync>;

lazy_static::lazy_static! {
    static ref GLOBAL_PROTOCOLS: DashMap<ProtocolID, (String, ProtocolConstructor)> = DashMap::new();
    static ref SERVER_STARTED: AtomicBool = AtomicBool::new(false);
}

/// One-shot flag: once any server calls `start`, further global
/// registration fails (spec.md §4.4, §8 scenario 6).
pub fn latch_server_started() {
    SERVER_STARTED.store(true, Ordering::SeqCst);
}

pub fn is_frozen() -> bool {
    SERVER_STARTED.load(Ordering::SeqCst)
}

/// Registers a protocol constructor in the global table. Name collisions
/// are rejected on first registration (spec.md §4.4); rejected outright
/// once any server has started.
pub fn global_protocol_register(
    name: &str,
    constructor: ProtocolConstructor,
) -> Result<ProtocolID, RegistryError> {
    if is_frozen() {
        return Err(RegistryError::GlobalRegistryFrozen);
    }
    let id = protocol_id(name);
    if GLOBAL_PROTOCOLS.contains_key(&id) {
        return Err(RegistryError::DuplicateProtocolName(name.to_string()));
    }
    GLOBAL_PROTOCOLS.insert(id, (name.to_string(), constructor));
    Ok(id)
}

/// `ProtocolNameToID` (spec.md §4.4): deterministic, matches across nodes
/// since it is pure UUID5 derivation and carries no local registration
/// state.
pub fn protocol_name_to_id(name: &str) -> ProtocolID {
    protocol_id(name)
}

/// A server's private registry, copied from the global set at
/// construction time (spec.md §4.4) so that later global registrations (if
/// any slipped in before the latch closed) don't retroactively change a
/// running server's view.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    protocols: Arc<DashMap<ProtocolID, (String, ProtocolConstructor)>>,
}

impl ProtocolRegistry {
    pub fn snapshot_from_global() -> Self {
        let protocols = DashMap::new();
        for entry in GLOBAL_PROTOCOLS.iter() {
            protocols.insert(*entry.key(), entry.value().clone());
        }
        Self {
            protocols: Arc::new(protocols),
        }
    }

    pub fn get(&self, id: ProtocolID) -> Result<ProtocolConstructor, RegistryError> {
        self.protocols
            .get(&id)
            .map(|e| e.value().1.clone())
            .ok_or(RegistryError::UnknownProtocol(id))
    }

    pub fn name_of(&self, id: ProtocolID) -> Option<String> {
        self.protocols.get(&id).map(|e| e.value().0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Global registry tests run in the same process as every other test in
    // this crate and the latch is process-wide by design, so we only
    // exercise pure derivation and duplicate-name rejection here, never the
    // freeze itself (that's covered by the end-to-end scenario in
    // tests/registration_latch.rs, which runs in its own process).

    #[test]
    fn protocol_name_to_id_is_deterministic_across_calls() {
        assert_eq!(protocol_name_to_id("cosi"), protocol_name_to_id("cosi"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let ctor: ProtocolConstructor = Arc::new(|_tni| Ok(Box::new(crate::protocol::NoopProtocol)));
        let name = format!("test-protocol-{}", uuid::Uuid::new_v4());
        global_protocol_register(&name, ctor.clone()).unwrap();
        assert!(matches!(
            global_protocol_register(&name, ctor),
            Err(RegistryError::DuplicateProtocolName(_))
        ));
    }
}
