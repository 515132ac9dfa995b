//! Scenario 2 (spec.md §8): a root with two children and an aggregate
//! handler fires exactly once, with a slice holding both children's values
//! in arrival order.

use std::sync::{Arc, Mutex};

use onet::error::OverlayError;
use onet::ids::{protocol_id, service_id, PublicKey};
use onet::suite::{CipherSuite, Ed25519Suite};
use onet::tni::{DispatchItem, OverlayHandle, TreeNodeInstance};
use onet::token::{GenericConfig, Token, TokenID};
use onet::topology::{Address, Roster, Scheme, ServerIdentity, Tree, TreeNodeSpec};

struct NullOverlay;
#[async_trait::async_trait]
impl OverlayHandle for NullOverlay {
    async fn send_to_tree_node(
        &self,
        _from: &Token,
        _to: &Token,
        _msg_type: onet::message::MessageTypeID,
        bytes: Vec<u8>,
        _config: Option<GenericConfig>,
    ) -> Result<usize, OverlayError> {
        Ok(bytes.len())
    }
    fn node_done(&self, _token: TokenID) {}
}

fn dangling_overlay() -> std::sync::Weak<dyn OverlayHandle> {
    let arc: Arc<dyn OverlayHandle> = Arc::new(NullOverlay);
    Arc::downgrade(&arc)
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Msg {
    i: u32,
}

#[tokio::test]
async fn aggregate_handler_fires_once_with_both_children() {
    let root_si = ServerIdentity::new(PublicKey(vec![1]), Address::new(Scheme::Tcp, "root", 1));
    let child_a_si = ServerIdentity::new(PublicKey(vec![2]), Address::new(Scheme::Tcp, "a", 2));
    let child_b_si = ServerIdentity::new(PublicKey(vec![3]), Address::new(Scheme::Tcp, "b", 3));
    let roster = Roster::new(vec![root_si.clone(), child_a_si.clone(), child_b_si.clone()]).unwrap();
    let tree = Tree::new(
        roster.clone(),
        TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1), TreeNodeSpec::leaf(2)]),
    );

    let root_tok = Token::new(
        roster.get_id(),
        tree.id(),
        protocol_id("aggregation-scenario-protocol"),
        service_id("aggregation-scenario-service"),
        onet::ids::new_round_id(),
        tree.root().id,
    );
    let child_a_tok = root_tok.change_tree_node_id(tree.node(tree.search_index(child_a_si.id()).unwrap()).id);
    let child_b_tok = root_tok.change_tree_node_id(tree.node(tree.search_index(child_b_si.id()).unwrap()).id);

    let suite: Arc<dyn CipherSuite> = Arc::new(Ed25519Suite::default());
    let (pk, sk) = suite.key_pair();
    let (print_tx, _print_rx) = onet::logging::channel();
    let tni = TreeNodeInstance::new(root_tok, tree, dangling_overlay(), suite, sk, pk, print_tx).unwrap();

    let received: Arc<Mutex<Vec<Vec<u32>>>> = Arc::new(Mutex::new(Vec::new()));
    let collected = received.clone();
    tni.register_aggregate_handler::<Msg, _>(move |group| {
        collected.lock().unwrap().push(group.iter().map(|m| m.msg.i).collect());
        Ok(())
    })
    .unwrap();
    tni.start_dispatch();

    for (tok, si, value) in [(child_a_tok, child_a_si.clone(), 3u32), (child_b_tok, child_b_si.clone(), 4u32)] {
        let bytes = bincode::serialize(&Msg { i: value }).unwrap();
        tni.enqueue(DispatchItem {
            from: tok,
            server_identity: si,
            msg_type: onet::message::MessageTypeID::of(std::any::type_name::<Msg>()),
            bytes,
        })
        .unwrap();
    }

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
    loop {
        if !received.lock().unwrap().is_empty() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "aggregate handler never fired");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let fired = received.lock().unwrap();
    assert_eq!(fired.len(), 1, "handler should fire exactly once");
    assert_eq!(fired[0], vec![3, 4]);
}
