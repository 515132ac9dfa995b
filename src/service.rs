//! Service manager (C8, spec.md §4.8): the glue between externally
//! registered services and protocol instantiation, plus each server's
//! embedded key-value store.
//!
//! Grounded on the teacher's `kv.rs` for the embedded-store lifecycle (one
//! store per server, opened lazily, path derived from the node's own
//! identity) and on `overlay.rs`'s already-defined `ProtocolFactory` seam,
//! which `ServiceManager` implements so it plugs directly into
//! `Overlay::create_tni` without `overlay.rs` depending on this module.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{RegistryError, ServiceError};
use crate::ids::{service_id, ServiceID};
use crate::kvstore::{KvStats, KvStore};
use crate::logging::{log, PrintSender};
use crate::overlay::ProtocolFactory;
use crate::protocol::ProtocolInstance;
use crate::suite::CipherSuite;
use crate::tni::TreeNodeInstance;
use crate::token::GenericConfig;
use crate::topology::ServerIdentity;

/// What a service author implements. `new_protocol`'s default returns
/// `Ok(None)`, meaning "let onet fall back to the protocol's default
/// constructor" (spec.md §4.8 NewProtocol bridge, `(nil, nil)` case) —
/// services that never instantiate protocols of their own never need to
/// override it.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    async fn new_protocol(
        &self,
        tni: Arc<TreeNodeInstance>,
        config: Option<GenericConfig>,
    ) -> Result<Option<Box<dyn ProtocolInstance>>, ServiceError> {
        let _ = (tni, config);
        Ok(None)
    }

    /// Client-facing RPC entry point (spec.md §6 WebSocket front-end). The
    /// default rejects everything, matching services that only ever speak
    /// the tree protocol and expose no client surface.
    fn process_client_request(&self, handler_path: &str, body: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
        let _ = body;
        Err(ServiceError::Store(format!("no client handler for {handler_path}")))
    }
}

struct ServiceEntry {
    name: String,
    service: Arc<dyn Service>,
}

/// Holds the per-server `name -> Service` map and the server's embedded
/// store (spec.md §4.8).
pub struct ServiceManager {
    our: ServerIdentity,
    db: Arc<dyn KvStore>,
    services: DashMap<ServiceID, ServiceEntry>,
    print_tx: PrintSender,
}

impl ServiceManager {
    pub fn new(our: ServerIdentity, db: Arc<dyn KvStore>, print_tx: PrintSender) -> Arc<Self> {
        Arc::new(Self {
            our,
            db,
            services: DashMap::new(),
            print_tx,
        })
    }

    pub fn db(&self) -> &Arc<dyn KvStore> {
        &self.db
    }

    /// Registers `service` under `name`. When `suite` is `Some`, the
    /// server's identity must already carry a matching service-identity
    /// key pair (spec.md §4.8 key-pair discipline); without a suite the
    /// service shares the server's default suite key pair.
    pub fn register(
        &self,
        name: &str,
        suite: Option<&Arc<dyn CipherSuite>>,
        service: Arc<dyn Service>,
    ) -> Result<ServiceID, ServiceError> {
        if suite.is_some() && self.our.service_public_key(name).is_none() {
            return Err(ServiceError::MissingServiceKeyPair(name.to_string()));
        }
        let id = service_id(name);
        if self.services.contains_key(&id) {
            return Err(ServiceError::Registry(RegistryError::DuplicateServiceName(name.to_string())));
        }
        self.services.insert(
            id,
            ServiceEntry {
                name: name.to_string(),
                service,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: ServiceID) -> Option<Arc<dyn Service>> {
        self.services.get(&id).map(|e| e.service.clone())
    }

    /// DB-level metrics folded into the server's status view (spec.md §4.8
    /// "Status reporting").
    pub fn status(&self) -> KvStats {
        self.db.stats()
    }
}

#[async_trait::async_trait]
impl ProtocolFactory for ServiceManager {
    async fn new_protocol(
        &self,
        service_id: ServiceID,
        tni: Arc<TreeNodeInstance>,
        config: Option<GenericConfig>,
    ) -> Result<Option<Box<dyn ProtocolInstance>>, ServiceError> {
        let Some(entry) = self.services.get(&service_id) else {
            return Ok(None);
        };
        let service = entry.service.clone();
        let name = entry.name.clone();
        drop(entry);

        use futures::FutureExt;
        match std::panic::AssertUnwindSafe(service.new_protocol(tni, config))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                log(&self.print_tx, 1, format!("service {name}: NewProtocol panicked"));
                Err(ServiceError::NewProtocolPanic(name))
            }
        }
    }
}

/// Derives `${CONODE_SERVICE_PATH:-<user-data-dir>/conode}/<hash of packed
/// public key>.db`, renaming an old-format file (hex of the raw public key
/// bytes, with no hashing) onto the new name if one is found (spec.md §6
/// "Persisted state").
#[cfg(feature = "build-binary")]
pub fn resolve_db_path(
    public_key: &crate::ids::PublicKey,
    suite: &dyn CipherSuite,
) -> Result<std::path::PathBuf, ServiceError> {
    use sha2::{Digest, Sha256};
    use std::path::PathBuf;

    let base = match std::env::var("CONODE_SERVICE_PATH") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conode"),
    };
    std::fs::create_dir_all(&base).map_err(|e| ServiceError::Store(e.to_string()))?;

    let packed = suite.pack_public_key(public_key);
    let mut hasher = Sha256::new();
    hasher.update(&packed);
    let new_name = format!("{}.db", hex::encode(hasher.finalize()));
    let old_name = format!("{}.db", hex::encode(&packed));

    let new_path = base.join(&new_name);
    let old_path = base.join(&old_name);
    if old_path.exists() && !new_path.exists() {
        std::fs::rename(&old_path, &new_path).map_err(|e| ServiceError::Store(e.to_string()))?;
    }
    Ok(new_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PublicKey as Pk;
    use crate::kvstore::MemoryKvStore;
    use crate::suite::Ed25519Suite;
    use crate::topology::{Address, Scheme};

    fn identity() -> ServerIdentity {
        ServerIdentity::new(Pk(vec![1]), Address::new(Scheme::Local, "h", 1))
    }

    struct EchoService;

    #[async_trait::async_trait]
    impl Service for EchoService {
        fn name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn registering_with_suite_requires_matching_identity_record() {
        let manager = ServiceManager::new(identity(), MemoryKvStore::new(), crate::logging::channel().0);
        let suite: Arc<dyn CipherSuite> = Arc::new(Ed25519Suite::default());
        let result = manager.register("echo", Some(&suite), Arc::new(EchoService));
        assert!(matches!(result, Err(ServiceError::MissingServiceKeyPair(_))));
    }

    #[test]
    fn registering_without_suite_succeeds() {
        let manager = ServiceManager::new(identity(), MemoryKvStore::new(), crate::logging::channel().0);
        let id = manager.register("echo", None, Arc::new(EchoService)).unwrap();
        assert!(manager.get(id).is_some());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let manager = ServiceManager::new(identity(), MemoryKvStore::new(), crate::logging::channel().0);
        manager.register("echo", None, Arc::new(EchoService)).unwrap();
        let result = manager.register("echo", None, Arc::new(EchoService));
        assert!(matches!(result, Err(ServiceError::Registry(RegistryError::DuplicateServiceName(_)))));
    }

    #[tokio::test]
    async fn unknown_service_id_falls_back_to_none() {
        use crate::ids::{new_round_id, protocol_id};

        let manager = ServiceManager::new(identity(), MemoryKvStore::new(), crate::logging::channel().0);
        let tree = crate::topology::Tree::new(
            crate::topology::Roster::new(vec![identity()]).unwrap(),
            crate::topology::TreeNodeSpec::leaf(0),
        );
        let suite: Arc<dyn CipherSuite> = Arc::new(Ed25519Suite::default());
        let token = crate::token::Token::new(
            tree.roster.get_id(),
            tree.id(),
            protocol_id("p"),
            service_id("unknown"),
            new_round_id(),
            tree.root().id,
        );

        struct NullOverlay;
        #[async_trait::async_trait]
        impl crate::tni::OverlayHandle for NullOverlay {
            async fn send_to_tree_node(
                &self,
                _from: &crate::token::Token,
                _to: &crate::token::Token,
                _msg_type: crate::message::MessageTypeID,
                _bytes: Vec<u8>,
                _config: Option<GenericConfig>,
            ) -> Result<usize, crate::error::OverlayError> {
                Ok(0)
            }
            fn node_done(&self, _token: crate::token::TokenID) {}
        }
        let overlay_arc: Arc<dyn crate::tni::OverlayHandle> = Arc::new(NullOverlay);
        let overlay = Arc::downgrade(&overlay_arc);
        let (pk, sk) = suite.key_pair();
        let tni = TreeNodeInstance::new(token, tree, overlay, suite, sk, pk, crate::logging::channel().0).unwrap();

        let result = manager
            .new_protocol(service_id("unknown"), tni, None)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
