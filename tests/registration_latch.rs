//! Scenario 6 (spec.md §8): a global protocol registration succeeds before
//! any server starts; once a server has started, the next global
//! registration is rejected. Runs in its own process (a `tests/` binary)
//! since the registry's "started" latch is a process-wide, one-shot flag.

use std::sync::Arc;

use onet::error::RegistryError;
use onet::kvstore::MemoryKvStore;
use onet::overlay::{Overlay, RegistryOnlyFactory};
use onet::registry::{global_protocol_register, is_frozen, ProtocolRegistry};
use onet::server::Server;
use onet::service::ServiceManager;
use onet::suite::{CipherSuite, Ed25519Suite};
use onet::topology::{Address, Scheme, ServerIdentity};
use onet::transport::LocalRouter;

#[tokio::test]
async fn register_succeeds_before_start_and_fails_after() {
    assert!(!is_frozen());

    let ctor: onet::registry::ProtocolConstructor = Arc::new(|_tni| Ok(Box::new(onet::protocol::NoopProtocol)));
    global_protocol_register("registration-latch-before", ctor.clone()).unwrap();

    let suite: Arc<dyn CipherSuite> = Arc::new(Ed25519Suite::default());
    let (pk, sk) = suite.key_pair();
    let our = ServerIdentity::new(pk, Address::new(Scheme::Local, "h", 1));
    let overlay = Overlay::new(
        our.clone(),
        suite,
        sk,
        Arc::new(LocalRouter::new()),
        ProtocolRegistry::default(),
        Arc::new(RegistryOnlyFactory),
        onet::logging::channel().0,
    );
    let services = ServiceManager::new(our, MemoryKvStore::new(), onet::logging::channel().0);
    let server = Server::new(overlay, services, onet::logging::channel().0);
    let (_tx, rx) = tokio::sync::mpsc::channel(1);
    server.start(rx);
    server.wait_startup().await;

    assert!(is_frozen());
    let result = global_protocol_register("registration-latch-after", ctor);
    assert!(matches!(result, Err(RegistryError::GlobalRegistryFrozen)));

    server.close().await;
}
