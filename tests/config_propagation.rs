//! Scenario 3 (spec.md §8): a parent calls `SetConfig` then sends to its
//! children. Each child's service observes the config bytes exactly once,
//! in `NewProtocol` for the first message addressed to it; config never
//! repeats because `SendRaw` only attaches it to a node's first send
//! (spec.md §4.7), so there is nothing left for a second `NewProtocol` call
//! to see a stale copy of.

use std::sync::{Arc, Mutex};

use onet::error::ServiceError;
use onet::kvstore::MemoryKvStore;
use onet::overlay::{Overlay, ProtocolFactory};
use onet::protocol::{NoopProtocol, ProtocolInstance};
use onet::service::{Service, ServiceManager};
use onet::suite::{CipherSuite, Ed25519Suite};
use onet::tni::TreeNodeInstance;
use onet::token::{GenericConfig, Token};
use onet::topology::{Address, Roster, Scheme, ServerIdentity, Tree, TreeNodeSpec};
use onet::transport::LocalRouter;

struct ConfigCapture {
    seen: Arc<Mutex<Vec<Option<Vec<u8>>>>>,
}

#[derive(serde::Serialize)]
struct Msg;

#[async_trait::async_trait]
impl Service for ConfigCapture {
    fn name(&self) -> &str {
        "config-capture-service"
    }

    async fn new_protocol(
        &self,
        _tni: Arc<TreeNodeInstance>,
        config: Option<GenericConfig>,
    ) -> Result<Option<Box<dyn ProtocolInstance>>, ServiceError> {
        self.seen.lock().unwrap().push(config.map(|c| c.0));
        Ok(Some(Box::new(NoopProtocol)))
    }
}

#[tokio::test]
async fn first_message_to_each_child_carries_config() {
    let suite: Arc<dyn CipherSuite> = Arc::new(Ed25519Suite::default());
    let (pk_root, sk_root) = suite.key_pair();
    let (pk_a, sk_a) = suite.key_pair();
    let (pk_b, _) = suite.key_pair();
    let root_si = ServerIdentity::new(pk_root, Address::new(Scheme::Local, "root", 1));
    let child_a_si = ServerIdentity::new(pk_a, Address::new(Scheme::Local, "a", 2));
    let child_b_si = ServerIdentity::new(pk_b, Address::new(Scheme::Local, "b", 3));
    let roster = Roster::new(vec![root_si.clone(), child_a_si.clone(), child_b_si.clone()]).unwrap();
    let tree = Tree::new(
        roster.clone(),
        TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1), TreeNodeSpec::leaf(2)]),
    );

    let router = Arc::new(LocalRouter::new());
    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(32);
    router.register(child_a_si.public_key.clone(), inbound_tx.clone());
    router.register(child_b_si.public_key.clone(), inbound_tx);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let services = ServiceManager::new(child_a_si.clone(), MemoryKvStore::new(), onet::logging::channel().0);
    services
        .register("config-capture-service", None, Arc::new(ConfigCapture { seen: seen.clone() }))
        .unwrap();
    let services_factory: Arc<dyn ProtocolFactory> = services.clone();

    let child_overlay = Overlay::new(
        child_a_si.clone(),
        suite.clone(),
        sk_a.clone(),
        router.clone(),
        onet::registry::ProtocolRegistry::default(),
        services_factory,
        onet::logging::channel().0,
    );
    child_overlay.tree_storage().set(tree.clone());
    let child_server = onet::server::Server::new(child_overlay, services, onet::logging::channel().0);
    child_server.start(inbound_rx);
    child_server.wait_startup().await;

    let parent_overlay = Overlay::new(
        root_si.clone(),
        suite.clone(),
        sk_root,
        router,
        onet::registry::ProtocolRegistry::default(),
        Arc::new(onet::overlay::RegistryOnlyFactory),
        onet::logging::channel().0,
    );
    parent_overlay.tree_storage().set(tree.clone());
    let parent_overlay_handle: Arc<dyn onet::tni::OverlayHandle> = parent_overlay.clone();
    let parent_token = Token::new(
        roster.get_id(),
        tree.id(),
        onet::ids::protocol_id("config-propagation-scenario-protocol"),
        onet::ids::service_id("config-capture-service"),
        onet::ids::new_round_id(),
        tree.root().id,
    );
    let (tni_pk, tni_sk) = suite.key_pair();
    let parent_tni = TreeNodeInstance::new(
        parent_token,
        tree,
        Arc::downgrade(&parent_overlay_handle),
        suite.clone(),
        tni_sk,
        tni_pk,
        onet::logging::channel().0,
    )
    .unwrap();

    parent_tni.set_config(GenericConfig(vec![0x01, 0x02, 0x03, 0x04])).unwrap();
    parent_tni.send_to_children(&Msg).await.unwrap();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if seen.lock().unwrap().len() >= 2 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "children never received config");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let captured = seen.lock().unwrap();
    assert_eq!(captured.len(), 2);
    for config in captured.iter() {
        assert_eq!(config.as_deref(), Some([0x01, 0x02, 0x03, 0x04].as_slice()));
    }

    child_server.close().await;
}
