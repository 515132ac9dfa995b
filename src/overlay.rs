//! Overlay (C6): the per-server router tying together tree resolution, TNI
//! lifecycle, and message transmission (spec.md §4.6).
//!
//! Grounded on the teacher's `kernel::mod` dispatch loop (`senders` map
//! keyed by process id, messages routed by looking the target up and
//! handing off, spawning a fresh "process" when none exists yet) —
//! `instances`/`protocolInstances` here plays the same role `senders` plays
//! there, generalized from a flat process table to a tree-aware one with
//! the deferred "we don't have the tree yet, go fetch it" path spec.md
//! calls for.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{OverlayError, ServiceError, TniError};
use crate::ids::{RoundID, ServiceID, TreeID};
use crate::logging::{log, PrintSender};
use crate::message::{MessageTypeID, OverlayMsg, ProtocolMsg, REQUEST_TREE_VERSION};
use crate::message_proxy::ProxyRegistry;
use crate::protocol::ProtocolInstance;
use crate::registry::ProtocolRegistry;
use crate::suite::CipherSuite;
use crate::token::{GenericConfig, Token, TokenID};
use crate::topology::{Roster, ServerIdentity, Tree, TreeMarshal};
use crate::transport::Transport;
use crate::tni::{DispatchItem, OverlayHandle, TreeNodeInstance};
use crate::tree_storage::TreeStorage;

/// What the overlay asks a service manager to do when a `ProtocolMsg`'s
/// token names a service (spec.md §4.8 NewProtocol bridge). Kept as a
/// trait so this module doesn't depend on `service.rs` directly.
#[async_trait::async_trait]
pub trait ProtocolFactory: Send + Sync {
    async fn new_protocol(
        &self,
        service_id: ServiceID,
        tni: Arc<TreeNodeInstance>,
        config: Option<GenericConfig>,
    ) -> Result<Option<Box<dyn ProtocolInstance>>, ServiceError>;
}

/// No service is registered for the token's `ServiceID`: fall back to the
/// global protocol registry's default constructor (spec.md §4.6 step 2).
pub struct RegistryOnlyFactory;

#[async_trait::async_trait]
impl ProtocolFactory for RegistryOnlyFactory {
    async fn new_protocol(
        &self,
        _service_id: ServiceID,
        _tni: Arc<TreeNodeInstance>,
        _config: Option<GenericConfig>,
    ) -> Result<Option<Box<dyn ProtocolInstance>>, ServiceError> {
        Ok(None)
    }
}

pub struct Overlay {
    our: ServerIdentity,
    suite: Arc<dyn CipherSuite>,
    secret_key: crate::suite::SecretKey,
    transport: Arc<dyn Transport>,
    tree_storage: Arc<TreeStorage>,
    proxies: Arc<ProxyRegistry>,
    protocols: ProtocolRegistry,
    services: Arc<dyn ProtocolFactory>,
    print_tx: PrintSender,

    instances: DashMap<TokenID, Arc<TreeNodeInstance>>,
    instances_info: DashMap<TokenID, bool>,
    pending_configs: DashMap<TokenID, GenericConfig>,
    pending_msg: DashMap<TreeID, Vec<ProtocolMsg>>,
    done_rounds: DashMap<RoundID, ()>,
    closed: AtomicBool,
}

impl Overlay {
    pub fn new(
        our: ServerIdentity,
        suite: Arc<dyn CipherSuite>,
        secret_key: crate::suite::SecretKey,
        transport: Arc<dyn Transport>,
        protocols: ProtocolRegistry,
        services: Arc<dyn ProtocolFactory>,
        print_tx: PrintSender,
    ) -> Arc<Self> {
        Arc::new(Self {
            our,
            suite,
            secret_key,
            transport,
            tree_storage: TreeStorage::new(),
            proxies: Arc::new(ProxyRegistry::default()),
            protocols,
            services,
            print_tx,
            instances: DashMap::new(),
            instances_info: DashMap::new(),
            pending_configs: DashMap::new(),
            pending_msg: DashMap::new(),
            done_rounds: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn tree_storage(&self) -> &Arc<TreeStorage> {
        &self.tree_storage
    }

    pub fn proxies(&self) -> &Arc<ProxyRegistry> {
        &self.proxies
    }

    pub fn our(&self) -> &ServerIdentity {
        &self.our
    }

    /// Live TNI count, folded into `Server::status()` (SPEC_FULL.md §3.2).
    pub fn active_tree_node_instances(&self) -> usize {
        self.instances.len()
    }

    /// Entry point for bytes arriving off the wire, already unwrapped by a
    /// `MessageProxy` into a `ProtocolMsg` plus optional `OverlayMsg`
    /// (spec.md §4.6 data flow).
    pub async fn process(
        self: &Arc<Self>,
        msg: ProtocolMsg,
        overlay_info: Option<OverlayMsg>,
    ) -> Result<(), OverlayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OverlayError::Closed);
        }
        match overlay_info {
            Some(OverlayMsg::RequestTree { tree_id, .. }) => {
                self.handle_request_tree(tree_id, msg.server_identity).await
            }
            Some(OverlayMsg::ResponseTree { tree, roster }) => self.handle_send_tree(tree, roster).await,
            Some(OverlayMsg::Config { bytes, dest }) => {
                self.pending_configs.insert(dest, bytes);
                Ok(())
            }
            _ => self.transmit_msg(msg).await,
        }
    }

    /// The core transmit path (spec.md §4.6 "Transmit path").
    pub async fn transmit_msg(self: &Arc<Self>, msg: ProtocolMsg) -> Result<(), OverlayError> {
        let to = msg.to.clone();
        let Some(tree) = self.tree_storage.get_and_refresh(to.tree_id) else {
            let was_registered = self.tree_storage.is_registered(to.tree_id);
            self.pending_msg.entry(to.tree_id).or_default().push(msg.clone());
            if !was_registered {
                self.tree_storage.register(to.tree_id);
                self.request_tree(&msg.server_identity, to.tree_id).await?;
            }
            return Ok(());
        };

        let token_id = to.id();
        if self.instances_info.get(&token_id).map(|d| *d).unwrap_or(false) {
            return Ok(());
        }

        let tni = match self.instances.get(&token_id).map(|e| e.value().clone()) {
            Some(tni) => tni,
            None => {
                if self.done_rounds.contains_key(&to.round_id) {
                    return Err(OverlayError::AlreadyDone(to.round_id));
                }
                self.create_tni(tree, to.clone()).await?
            }
        };

        let item = DispatchItem {
            from: msg.from,
            server_identity: msg.server_identity,
            msg_type: msg.msg_type,
            bytes: match msg.body {
                crate::message::MsgBody::Bytes(b) => b,
            },
        };
        tni.enqueue(item).map_err(OverlayError::Tni)
    }

    async fn create_tni(self: &Arc<Self>, tree: Tree, to: Token) -> Result<Arc<TreeNodeInstance>, OverlayError> {
        let handle: std::sync::Weak<dyn OverlayHandle> = Arc::downgrade(self);
        let tni = TreeNodeInstance::new(
            to.clone(),
            tree,
            handle,
            self.suite.clone(),
            self.secret_key.clone(),
            self.our.public_key.clone(),
            self.print_tx.clone(),
        )
        .map_err(OverlayError::Tni)?;

        let config = self.pending_configs.remove(&to.id()).map(|(_, c)| c);

        use futures::FutureExt;
        let factory_result = std::panic::AssertUnwindSafe(self.services.new_protocol(to.service_id, tni.clone(), config.clone()))
            .catch_unwind()
            .await;
        let pi = match factory_result {
            Ok(Ok(Some(pi))) => Some(pi),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                log(&self.print_tx, 1, format!("overlay: service NewProtocol error: {e}"));
                return Err(OverlayError::Transport(e.to_string()));
            }
            Err(_) => {
                log(&self.print_tx, 1, "overlay: service NewProtocol panicked".to_string());
                return Err(OverlayError::ProtocolPanic(format!("service for {}", to.service_id)));
            }
        };

        let pi = match pi {
            Some(pi) => pi,
            None => {
                let ctor = self.protocols.get(to.proto_id).map_err(OverlayError::Registry)?;
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (*ctor)(tni.clone()))) {
                    Ok(Ok(pi)) => pi,
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(OverlayError::ProtocolPanic(format!("protocol {}", to.proto_id))),
                }
            }
        };

        if let Some(config) = config {
            let _ = tni.set_config(config);
        }
        tni.bind(pi).map_err(OverlayError::Tni)?;
        tni.start_dispatch();
        self.instances.insert(to.id(), tni.clone());
        Ok(tni)
    }

    async fn request_tree(&self, to: &ServerIdentity, tree_id: TreeID) -> Result<(), OverlayError> {
        let overlay_msg = OverlayMsg::RequestTree {
            tree_id,
            version: REQUEST_TREE_VERSION,
        };
        let proxy = self.proxies.default_proxy();
        let placeholder = placeholder_msg(self.our.clone());
        let wire = proxy
            .wrap(&placeholder, Some(&overlay_msg))
            .map_err(|e| OverlayError::Transport(e.to_string()))?;
        self.transport
            .send(to, wire)
            .await
            .map_err(|e| OverlayError::Transport(e.to_string()))
    }

    async fn handle_request_tree(self: &Arc<Self>, tree_id: TreeID, requester: ServerIdentity) -> Result<(), OverlayError> {
        let Some(tree) = self.tree_storage.get(tree_id) else {
            return Ok(());
        };
        let response = OverlayMsg::ResponseTree {
            tree: tree.marshal(),
            roster: tree.roster.clone(),
        };
        let placeholder = placeholder_msg(self.our.clone());
        let wire = self
            .proxies
            .default_proxy()
            .wrap(&placeholder, Some(&response))
            .map_err(|e| OverlayError::Transport(e.to_string()))?;
        self.transport
            .send(&requester, wire)
            .await
            .map_err(|e| OverlayError::Transport(e.to_string()))
    }

    /// `handleSendTree`: rejects a tree that was never registered (the
    /// anti-fill defence, spec.md §4.6), and otherwise stores it, which
    /// flushes any pending messages for it.
    async fn handle_send_tree(self: &Arc<Self>, marshal: TreeMarshal, roster: Roster) -> Result<(), OverlayError> {
        let tree_id = marshal.tree_id;
        if !self.tree_storage.is_registered(tree_id) {
            return Err(OverlayError::UnregisteredTreeResponse(tree_id));
        }
        let tree = Tree::unmarshal(&marshal, roster)?;
        self.tree_storage.set(tree);

        if let Some((_, pending)) = self.pending_msg.remove(&tree_id) {
            for msg in pending {
                self.transmit_msg(msg).await?;
            }
        }
        Ok(())
    }

    /// `nodeDone`: tears down one TNI; if no remaining instance references
    /// its tree, schedules the tree's removal (spec.md §4.6 lifecycle).
    pub fn node_done_sync(&self, token_id: TokenID) {
        if let Some((_, tni)) = self.instances.remove(&token_id) {
            self.instances_info.insert(token_id, true);
            self.done_rounds.insert(tni.token().round_id, ());
            let tree_id = tni.tree().id();
            let still_used = self.instances.iter().any(|e| e.value().tree().id() == tree_id);
            if !still_used {
                let storage = self.tree_storage.clone();
                tokio::spawn(async move {
                    let _ = storage.remove(tree_id);
                });
            }
        }
    }

    pub async fn close(self: &Arc<Self>) {
        self.closed.store(true, Ordering::SeqCst);
        for entry in self.instances.iter() {
            entry.value().close_dispatch();
        }
        self.instances.clear();
        self.tree_storage.close().await;
    }
}

#[async_trait::async_trait]
impl OverlayHandle for Overlay {
    async fn send_to_tree_node(
        &self,
        from: &Token,
        to: &Token,
        msg_type: MessageTypeID,
        bytes: Vec<u8>,
        config: Option<GenericConfig>,
    ) -> Result<usize, OverlayError> {
        let Some(tree) = self.tree_storage.get(to.tree_id) else {
            return Err(OverlayError::UnknownTree(to.tree_id));
        };
        let Some(node) = tree.search(to.tree_node_id) else {
            return Err(OverlayError::Tni(TniError::UnknownTreeNode(to.tree_node_id.to_string())));
        };
        let dest_si = &tree.roster.list[node.roster_index];

        let mut total = 0;
        if let Some(config) = config {
            let config_msg = OverlayMsg::Config {
                bytes: config,
                dest: to.id(),
            };
            let placeholder = placeholder_msg(self.our.clone());
            let wire = self
                .proxies
                .default_proxy()
                .wrap(&placeholder, Some(&config_msg))
                .map_err(|e| OverlayError::Transport(e.to_string()))?;
            total += wire.len();
            self.transport
                .send(dest_si, wire)
                .await
                .map_err(|e| OverlayError::Transport(e.to_string()))?;
        }

        let msg = ProtocolMsg::new(from.clone(), to.clone(), self.our.clone(), msg_type, bytes);
        let wire = self
            .proxies
            .default_proxy()
            .wrap(&msg, None)
            .map_err(|e| OverlayError::Transport(e.to_string()))?;
        total += wire.len();
        self.transport
            .send(dest_si, wire)
            .await
            .map_err(|e| OverlayError::Transport(e.to_string()))?;
        Ok(total)
    }

    fn node_done(&self, token: TokenID) {
        self.node_done_sync(token);
    }
}

fn placeholder_msg(our: ServerIdentity) -> ProtocolMsg {
    use crate::ids::{protocol_id, service_id};
    let tok = Token::new(
        crate::ids::RosterID::nil(),
        TreeID::nil(),
        protocol_id("onet/overlay-control"),
        service_id("onet/overlay-control"),
        crate::ids::new_round_id(),
        crate::ids::TreeNodeID::nil(),
    );
    ProtocolMsg::new(tok.clone(), tok, our, MessageTypeID::of("onet/overlay-control"), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PublicKey as Pk;
    use crate::topology::{Address, Roster as R, Scheme, TreeNodeSpec};

    fn identity(byte: u8, port: u16) -> ServerIdentity {
        ServerIdentity::new(Pk(vec![byte]), Address::new(Scheme::Local, "h", port))
    }

    #[tokio::test]
    async fn transmit_without_tree_queues_and_requests() {
        let root = identity(1, 1);
        let other = identity(2, 2);
        let roster = R::new(vec![root.clone(), other.clone()]).unwrap();
        let tree = Tree::new(roster.clone(), TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1)]));

        let router = Arc::new(crate::transport::LocalRouter::new());
        let (inbound_tx, _inbound_rx) = tokio::sync::mpsc::channel(8);
        router.register(other.public_key.clone(), inbound_tx);

        let (print_tx, _print_rx) = crate::logging::channel();
        let suite: Arc<dyn CipherSuite> = Arc::new(crate::suite::Ed25519Suite::default());
        let (pk, sk) = suite.key_pair();
        let overlay = Overlay::new(
            ServerIdentity { public_key: pk, ..root.clone() },
            suite,
            sk,
            router,
            ProtocolRegistry::default(),
            Arc::new(RegistryOnlyFactory),
            print_tx,
        );

        let tok = Token::new(
            roster.get_id(),
            tree.id(),
            crate::ids::protocol_id("p"),
            crate::ids::service_id("s"),
            crate::ids::new_round_id(),
            tree.node(tree.search_index(other.id()).unwrap()).id,
        );
        let msg = ProtocolMsg::new(tok.clone(), tok, other.clone(), MessageTypeID::of("x"), vec![1]);
        overlay.transmit_msg(msg).await.unwrap();

        assert!(overlay.tree_storage.is_registered(tree.id()));
        assert!(overlay.tree_storage.get(tree.id()).is_none());
    }

    #[tokio::test]
    async fn transmit_after_round_done_is_rejected() {
        let root = identity(1, 1);
        let other = identity(2, 2);
        let roster = R::new(vec![root.clone(), other.clone()]).unwrap();
        let tree = Tree::new(roster.clone(), TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1)]));

        let router = Arc::new(crate::transport::LocalRouter::new());
        let (print_tx, _print_rx) = crate::logging::channel();
        let suite: Arc<dyn CipherSuite> = Arc::new(crate::suite::Ed25519Suite::default());
        let (pk, sk) = suite.key_pair();
        let overlay = Overlay::new(
            ServerIdentity { public_key: pk, ..root.clone() },
            suite,
            sk,
            router,
            ProtocolRegistry::default(),
            Arc::new(RegistryOnlyFactory),
            print_tx,
        );
        overlay.tree_storage.set(tree.clone());

        let tok = Token::new(
            roster.get_id(),
            tree.id(),
            crate::ids::protocol_id("p"),
            crate::ids::service_id("s"),
            crate::ids::new_round_id(),
            tree.node(tree.search_index(other.id()).unwrap()).id,
        );
        overlay.done_rounds.insert(tok.round_id, ());

        let msg = ProtocolMsg::new(tok.clone(), tok, other.clone(), MessageTypeID::of("x"), vec![1]);
        let err = overlay.transmit_msg(msg).await.unwrap_err();
        assert!(matches!(err, OverlayError::AlreadyDone(_)));
    }
}
