//! Scenario 4 (spec.md §8): two protocol instances share one tree. Tearing
//! down the first leaves the tree in storage because the second still
//! references it; tearing down the second schedules removal, and the tree
//! disappears once the removal delay elapses.

use std::sync::Arc;
use std::time::Duration;

use onet::kvstore::MemoryKvStore;
use onet::message::{MessageTypeID, ProtocolMsg};
use onet::overlay::{Overlay, RegistryOnlyFactory};
use onet::registry::{global_protocol_register, ProtocolConstructor, ProtocolRegistry};
use onet::suite::{CipherSuite, Ed25519Suite};
use onet::token::Token;
use onet::topology::{Address, Roster, Scheme, ServerIdentity, Tree, TreeNodeSpec};
use onet::transport::LocalRouter;
use onet::tree_storage::DEFAULT_REMOVAL_DELAY;

#[tokio::test(start_paused = true)]
async fn tree_outlives_first_done_and_expires_after_second() {
    let ctor: ProtocolConstructor = Arc::new(|_tni| Ok(Box::new(onet::protocol::NoopProtocol)));
    global_protocol_register("tree-delete-race-protocol", ctor).unwrap();

    let suite: Arc<dyn CipherSuite> = Arc::new(Ed25519Suite::default());
    let (pk, sk) = suite.key_pair();
    let root = ServerIdentity::new(pk, Address::new(Scheme::Local, "root", 1));
    let (child_pk, _) = suite.key_pair();
    let child = ServerIdentity::new(child_pk, Address::new(Scheme::Local, "child", 2));

    let roster = Roster::new(vec![root.clone(), child.clone()]).unwrap();
    let tree = Tree::new(roster.clone(), TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1)]));

    let overlay = Overlay::new(
        root.clone(),
        suite,
        sk,
        Arc::new(LocalRouter::new()),
        ProtocolRegistry::snapshot_from_global(),
        Arc::new(RegistryOnlyFactory),
        onet::logging::channel().0,
    );
    overlay.tree_storage().set(tree.clone());

    let root_node = tree.root().id;
    let make_token = || {
        Token::new(
            roster.get_id(),
            tree.id(),
            onet::ids::protocol_id("tree-delete-race-protocol"),
            onet::ids::service_id("tree-delete-race-service"),
            onet::ids::new_round_id(),
            root_node,
        )
    };
    let tok1 = make_token();
    let tok2 = make_token();
    assert_ne!(tok1.id(), tok2.id());

    for tok in [&tok1, &tok2] {
        let msg = ProtocolMsg::new(tok.clone(), tok.clone(), child.clone(), MessageTypeID::of("tree-delete-race-msg"), vec![1]);
        overlay.transmit_msg(msg).await.unwrap();
    }

    overlay.node_done_sync(tok1.id());
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    tokio::time::advance(DEFAULT_REMOVAL_DELAY + Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert!(overlay.tree_storage().get(tree.id()).is_some(), "tree removed while tok2's instance still used it");

    overlay.node_done_sync(tok2.id());
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    tokio::time::advance(DEFAULT_REMOVAL_DELAY + Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert!(overlay.tree_storage().get(tree.id()).is_none(), "tree should have expired after both instances were done");
}
