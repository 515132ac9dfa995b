//! TreeNodeInstance (C7): the per-protocol-per-node dispatch context
//! (spec.md §4.7). This is the largest single component — registration of
//! typed channels/handlers, a single dispatch fiber per instance doing
//! aggregation and sender-authentication, and the parent/child send
//! primitives.
//!
//! Grounded on the teacher's per-process state machine in
//! `kernel/mod.rs` (`ProcessState`, one dispatch task per process reading
//! its own `MessageReceiver`) for the "one fiber owns one FIFO" shape, and
//! on `kernel_types.rs`'s typed request/response enums for the
//! registration-by-type idiom — Rust has no runtime reflection to match
//! Go's `reflect`-driven channel/handler registration (spec.md §9 redesign
//! note), so registration here is generic over `T: DeserializeOwned` and
//! keyed by a `MessageTypeID` derived from `std::any::type_name::<T>()`.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{OverlayError, TniError};
use crate::ids::{PublicKey, TreeNodeID};
use crate::logging::{log, PrintSender};
use crate::message::MessageTypeID;
use crate::protocol::ProtocolInstance;
use crate::suite::CipherSuite;
use crate::token::{GenericConfig, Token, TokenID};
use crate::topology::{ServerIdentity, Tree, TreeNode};

pub const DEFAULT_CHANNEL_LENGTH: usize = 100;

/// What a registered channel or handler for type `T` receives: the sender's
/// position in the tree, paired with the decoded payload.
#[derive(Clone, Debug)]
pub struct TreeNodeMsg<T> {
    pub tree_node: TreeNode,
    pub msg: T,
}

/// One inbound item, already routed to this instance by the overlay but not
/// yet decoded to its concrete type (spec.md §4.6 step 3, §4.7 dispatch
/// loop step 1).
pub struct DispatchItem {
    pub from: Token,
    pub server_identity: ServerIdentity,
    pub msg_type: MessageTypeID,
    pub bytes: Vec<u8>,
}

/// What the TNI needs back from the overlay: sending on the wire and
/// reporting instance completion. Kept as a trait so this module never
/// depends on `overlay.rs` directly — the overlay implements it.
#[async_trait::async_trait]
pub trait OverlayHandle: Send + Sync {
    async fn send_to_tree_node(
        &self,
        from: &Token,
        to: &Token,
        msg_type: MessageTypeID,
        bytes: Vec<u8>,
        config: Option<GenericConfig>,
    ) -> Result<usize, OverlayError>;

    fn node_done(&self, token: TokenID);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TniState {
    Created,
    Bound,
    Dispatching,
    Closing,
    Done,
}

trait Slot: Send + Sync {
    fn is_aggregate(&self) -> bool;
    fn deliver(&self, group: Vec<(TreeNode, Vec<u8>)>, print_tx: &PrintSender) -> Result<(), TniError>;
}

fn decode<T: DeserializeOwned>(type_name: &str, bytes: &[u8]) -> Result<T, TniError> {
    bincode::deserialize(bytes).map_err(|e| TniError::Codec(type_name.to_string(), e.to_string()))
}

enum ChannelKind<T> {
    Single(tokio::sync::mpsc::Sender<TreeNodeMsg<T>>),
    Aggregate(tokio::sync::mpsc::Sender<Vec<TreeNodeMsg<T>>>),
}

struct ChannelSlot<T> {
    aggregate: bool,
    kind: ChannelKind<T>,
}

impl<T: DeserializeOwned + Send + Sync + 'static> Slot for ChannelSlot<T> {
    fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    fn deliver(&self, group: Vec<(TreeNode, Vec<u8>)>, _print_tx: &PrintSender) -> Result<(), TniError> {
        let type_name = std::any::type_name::<T>();
        match &self.kind {
            ChannelKind::Single(tx) => {
                for (node, bytes) in group {
                    let msg = decode::<T>(type_name, &bytes)?;
                    tx.try_send(TreeNodeMsg { tree_node: node, msg })
                        .map_err(|_| TniError::ChannelTooSmall)?;
                }
                Ok(())
            }
            ChannelKind::Aggregate(tx) => {
                let mut items = Vec::with_capacity(group.len());
                for (node, bytes) in group {
                    items.push(TreeNodeMsg {
                        tree_node: node,
                        msg: decode::<T>(type_name, &bytes)?,
                    });
                }
                tx.try_send(items).map_err(|_| TniError::ChannelTooSmall)
            }
        }
    }
}

struct HandlerSlotSingle<T, F> {
    f: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> Slot for HandlerSlotSingle<T, F>
where
    T: DeserializeOwned + Send + Sync + 'static,
    F: Fn(TreeNodeMsg<T>) -> Result<(), OverlayError> + Send + Sync,
{
    fn is_aggregate(&self) -> bool {
        false
    }

    fn deliver(&self, group: Vec<(TreeNode, Vec<u8>)>, print_tx: &PrintSender) -> Result<(), TniError> {
        let type_name = std::any::type_name::<T>();
        let mut first_err: Option<TniError> = None;
        for (node, bytes) in group {
            let msg = match decode::<T>(type_name, &bytes) {
                Ok(m) => m,
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    } else {
                        log(print_tx, 1, format!("tni handler decode error for {type_name}"));
                    }
                    continue;
                }
            };
            if let Err(e) = (self.f)(TreeNodeMsg { tree_node: node, msg }) {
                if first_err.is_none() {
                    first_err = Some(TniError::Codec(type_name.to_string(), e.to_string()));
                } else {
                    log(print_tx, 1, format!("tni handler error for {type_name}: {e}"));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct HandlerSlotAggregate<T, F> {
    f: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> Slot for HandlerSlotAggregate<T, F>
where
    T: DeserializeOwned + Send + Sync + 'static,
    F: Fn(Vec<TreeNodeMsg<T>>) -> Result<(), OverlayError> + Send + Sync,
{
    fn is_aggregate(&self) -> bool {
        true
    }

    fn deliver(&self, group: Vec<(TreeNode, Vec<u8>)>, _print_tx: &PrintSender) -> Result<(), TniError> {
        let type_name = std::any::type_name::<T>();
        let mut items = Vec::with_capacity(group.len());
        for (node, bytes) in group {
            items.push(TreeNodeMsg {
                tree_node: node,
                msg: decode::<T>(type_name, &bytes)?,
            });
        }
        (self.f)(items).map_err(|e| TniError::Codec(type_name.to_string(), e.to_string()))
    }
}

/// The per-instance dispatch context (spec.md §4.7).
pub struct TreeNodeInstance {
    token: Token,
    tree: Tree,
    node_index: usize,
    overlay: std::sync::Weak<dyn OverlayHandle>,
    suite: Arc<dyn CipherSuite>,
    secret_key: crate::suite::SecretKey,
    public_key: PublicKey,
    print_tx: PrintSender,

    state: Mutex<TniState>,
    handlers: DashMap<MessageTypeID, Arc<dyn Slot>>,
    pending_aggregation: DashMap<MessageTypeID, Vec<(TreeNode, Vec<u8>)>>,
    sent_to: DashMap<TreeNodeID, ()>,
    pending_config: Mutex<Option<GenericConfig>>,
    config_set: AtomicBool,

    dispatch_tx: tokio::sync::mpsc::Sender<DispatchItem>,
    dispatch_rx: Mutex<Option<tokio::sync::mpsc::Receiver<DispatchItem>>>,
    close_notify: Arc<tokio::sync::Notify>,

    protocol: Mutex<Option<Box<dyn ProtocolInstance>>>,
    on_done: Mutex<Option<Box<dyn FnMut() -> bool + Send>>>,

    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
}

impl TreeNodeInstance {
    pub fn new(
        token: Token,
        tree: Tree,
        overlay: std::sync::Weak<dyn OverlayHandle>,
        suite: Arc<dyn CipherSuite>,
        secret_key: crate::suite::SecretKey,
        public_key: PublicKey,
        print_tx: PrintSender,
    ) -> Result<Arc<Self>, TniError> {
        let node_index = tree
            .search_index(token.tree_node_id)
            .ok_or_else(|| TniError::UnknownTreeNode(token.tree_node_id.to_string()))?;
        let (dispatch_tx, dispatch_rx) = tokio::sync::mpsc::channel(DEFAULT_CHANNEL_LENGTH);
        Ok(Arc::new(Self {
            token,
            tree,
            node_index,
            overlay,
            suite,
            secret_key,
            public_key,
            print_tx,
            state: Mutex::new(TniState::Created),
            handlers: DashMap::new(),
            pending_aggregation: DashMap::new(),
            sent_to: DashMap::new(),
            pending_config: Mutex::new(None),
            config_set: AtomicBool::new(false),
            dispatch_tx,
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
            close_notify: Arc::new(tokio::sync::Notify::new()),
            protocol: Mutex::new(None),
            on_done: Mutex::new(None),
            rx_bytes: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
        }))
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn state(&self) -> TniState {
        *self.state.lock().unwrap()
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }

    fn insert_slot(&self, id: MessageTypeID, slot: Arc<dyn Slot>) -> Result<(), TniError> {
        if self.handlers.contains_key(&id) {
            return Err(TniError::BadRegistrationTarget);
        }
        self.handlers.insert(id, slot);
        Ok(())
    }

    pub fn register_channel<T>(&self) -> Result<tokio::sync::mpsc::Receiver<TreeNodeMsg<T>>, TniError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.register_channel_length(DEFAULT_CHANNEL_LENGTH)
    }

    pub fn register_channel_length<T>(
        &self,
        length: usize,
    ) -> Result<tokio::sync::mpsc::Receiver<TreeNodeMsg<T>>, TniError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let id = MessageTypeID::of(std::any::type_name::<T>());
        let (tx, rx) = tokio::sync::mpsc::channel(length.max(1));
        self.insert_slot(
            id,
            Arc::new(ChannelSlot {
                aggregate: false,
                kind: ChannelKind::Single(tx),
            }),
        )?;
        Ok(rx)
    }

    pub fn register_aggregate_channel<T>(
        &self,
    ) -> Result<tokio::sync::mpsc::Receiver<Vec<TreeNodeMsg<T>>>, TniError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let id = MessageTypeID::of(std::any::type_name::<T>());
        let (tx, rx) = tokio::sync::mpsc::channel(DEFAULT_CHANNEL_LENGTH);
        self.insert_slot(
            id,
            Arc::new(ChannelSlot {
                aggregate: true,
                kind: ChannelKind::Aggregate(tx),
            }),
        )?;
        Ok(rx)
    }

    pub fn register_handler<T, F>(&self, f: F) -> Result<(), TniError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        F: Fn(TreeNodeMsg<T>) -> Result<(), OverlayError> + Send + Sync + 'static,
    {
        let id = MessageTypeID::of(std::any::type_name::<T>());
        self.insert_slot(
            id,
            Arc::new(HandlerSlotSingle {
                f,
                _marker: PhantomData,
            }),
        )
    }

    pub fn register_aggregate_handler<T, F>(&self, f: F) -> Result<(), TniError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        F: Fn(Vec<TreeNodeMsg<T>>) -> Result<(), OverlayError> + Send + Sync + 'static,
    {
        let id = MessageTypeID::of(std::any::type_name::<T>());
        self.insert_slot(
            id,
            Arc::new(HandlerSlotAggregate {
                f,
                _marker: PhantomData,
            }),
        )
    }

    /// Binds the user protocol instance to this TNI. Idempotent only for
    /// the first call (spec.md §4.7 state machine).
    pub fn bind(self: &Arc<Self>, instance: Box<dyn ProtocolInstance>) -> Result<(), TniError> {
        let mut state = self.state.lock().unwrap();
        if *state != TniState::Created {
            return Err(TniError::ErrProtocolRegistered);
        }
        *self.protocol.lock().unwrap() = Some(instance);
        *state = TniState::Bound;
        Ok(())
    }

    /// Spawns the dispatch fiber and the protocol's own `dispatch()` fiber
    /// (spec.md §5 scheduling model).
    pub fn start_dispatch(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == TniState::Bound {
                *state = TniState::Dispatching;
            }
        }
        let Some(rx) = self.dispatch_rx.lock().unwrap().take() else {
            return;
        };
        let this = self.clone();
        tokio::spawn(async move { this.run_dispatch_loop(rx).await });

        let protocol_fiber = self.clone();
        tokio::spawn(async move {
            let mut guard = protocol_fiber.protocol.lock().unwrap().take();
            if let Some(mut pi) = guard.take() {
                if let Err(e) = pi.dispatch().await {
                    log(&protocol_fiber.print_tx, 1, format!("protocol dispatch error: {e}"));
                }
                *protocol_fiber.protocol.lock().unwrap() = Some(pi);
            }
        });
    }

    /// Enqueues an inbound message for this instance's dispatch fiber
    /// (spec.md §4.6 step 3, handed to us by the overlay).
    pub fn enqueue(&self, item: DispatchItem) -> Result<(), TniError> {
        self.dispatch_tx
            .try_send(item)
            .map_err(|_| TniError::ChannelTooSmall)
    }

    async fn run_dispatch_loop(self: Arc<Self>, mut rx: tokio::sync::mpsc::Receiver<DispatchItem>) {
        loop {
            tokio::select! {
                item = rx.recv() => {
                    match item {
                        Some(item) => {
                            if let Err(e) = self.process_one(item) {
                                log(&self.print_tx, 1, format!("tni dispatch error: {e}"));
                            }
                        }
                        None => break,
                    }
                }
                _ = self.close_notify.notified() => break,
            }
        }
    }

    fn process_one(&self, item: DispatchItem) -> Result<(), TniError> {
        self.rx_bytes.fetch_add(item.bytes.len() as u64, Ordering::Relaxed);

        let Some(slot) = self.handlers.get(&item.msg_type).map(|e| e.value().clone()) else {
            log(&self.print_tx, 2, "tni: no registration for message type, dropping".to_string());
            return Ok(());
        };

        let resolved_index = self
            .tree
            .search_index(item.from.tree_node_id)
            .ok_or_else(|| TniError::UnknownTreeNode(item.from.tree_node_id.to_string()))?;
        let resolved_node = self.tree.node(resolved_index).clone();
        let resolved_si = &self.tree.roster.list[resolved_node.roster_index];

        // Anti-spoof: the Router authenticates `ServerIdentity` at the
        // transport layer, so a mismatch here means the claimed sender and
        // the transport-authenticated one disagree (spec.md §4.7 step 3).
        if resolved_si.public_key != item.server_identity.public_key {
            return Err(TniError::SenderMismatch(item.from.id()));
        }

        let is_from_parent = self
            .tree
            .parent_of(self.node_index)
            .map(|p| p.id == item.from.tree_node_id)
            .unwrap_or(false);

        let group = if is_from_parent || !slot.is_aggregate() {
            vec![(resolved_node, item.bytes)]
        } else {
            let mut pending = self
                .pending_aggregation
                .entry(item.msg_type)
                .or_insert_with(Vec::new);
            pending.push((resolved_node, item.bytes));
            let num_children = self.tree.children_of(self.node_index).count();
            if pending.len() < num_children {
                return Ok(());
            }
            std::mem::take(&mut *pending)
        };

        slot.deliver(group, &self.print_tx)
    }

    /// Binding a `Token` to a tree position this tree doesn't have is the
    /// "binding a nonexistent TNI" failure mode (spec.md §7.5 registration
    /// conflicts).
    fn next_tree_node_id(&self, to: TreeNodeID) -> Result<Token, TniError> {
        self.tree
            .search_index(to)
            .ok_or(TniError::ErrWrongTreeNodeInstance)?;
        Ok(self.token.change_tree_node_id(to))
    }

    /// `SetConfig`: at most once, before the first send (spec.md §4.7 config
    /// contract).
    pub fn set_config(&self, config: GenericConfig) -> Result<(), TniError> {
        if self
            .config_set
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TniError::ConfigAlreadySet);
        }
        *self.pending_config.lock().unwrap() = Some(config);
        Ok(())
    }

    async fn send_raw(&self, to_node: TreeNodeID, msg_type: MessageTypeID, bytes: Vec<u8>) -> Result<usize, OverlayError> {
        if *self.state.lock().unwrap() == TniState::Closing || *self.state.lock().unwrap() == TniState::Done {
            return Err(OverlayError::Tni(TniError::Closing));
        }
        let to = self.next_tree_node_id(to_node).map_err(OverlayError::Tni)?;
        let first_send = self.sent_to.insert(to_node, ()).is_none();
        let config = if first_send {
            self.pending_config.lock().unwrap().clone()
        } else {
            None
        };
        let Some(overlay) = self.overlay.upgrade() else {
            return Err(OverlayError::Closed);
        };
        let n = overlay
            .send_to_tree_node(&self.token, &to, msg_type, bytes, config)
            .await?;
        self.tx_bytes.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    pub async fn send_to<T: serde::Serialize + Send + Sync>(&self, to_node: TreeNodeID, msg: &T) -> Result<usize, OverlayError> {
        let msg_type = MessageTypeID::of(std::any::type_name::<T>());
        let bytes = bincode::serialize(msg).map_err(|e| OverlayError::Tni(TniError::Codec(std::any::type_name::<T>().into(), e.to_string())))?;
        self.send_raw(to_node, msg_type, bytes).await
    }

    pub async fn send_to_parent<T: serde::Serialize + Send + Sync>(&self, msg: &T) -> Result<usize, OverlayError> {
        let Some(parent) = self.tree.parent_of(self.node_index) else {
            return Ok(0);
        };
        self.send_to(parent.id, msg).await
    }

    /// Sequential: stops at the first error (spec.md §4.7 send primitives).
    pub async fn send_to_children<T: serde::Serialize + Send + Sync>(&self, msg: &T) -> Result<usize, OverlayError> {
        let mut total = 0;
        let children: Vec<TreeNodeID> = self.tree.children_of(self.node_index).map(|c| c.id).collect();
        for child in children {
            total += self.send_to(child, msg).await?;
        }
        Ok(total)
    }

    /// Independent fibers, collecting every error rather than stopping at
    /// the first (spec.md §4.7 send primitives).
    pub async fn send_to_children_in_parallel<T>(self: &Arc<Self>, msg: &T) -> Result<usize, OverlayError>
    where
        T: serde::Serialize + Send + Sync,
    {
        let children: Vec<TreeNodeID> = self.tree.children_of(self.node_index).map(|c| c.id).collect();
        let bytes = bincode::serialize(msg).map_err(|e| OverlayError::Tni(TniError::Codec(std::any::type_name::<T>().into(), e.to_string())))?;
        let msg_type = MessageTypeID::of(std::any::type_name::<T>());

        let mut tasks = Vec::with_capacity(children.len());
        for child in children {
            let this = self.clone();
            let bytes = bytes.clone();
            tasks.push(tokio::spawn(async move { this.send_raw(child, msg_type, bytes).await }));
        }
        let mut total = 0;
        let mut first_err = None;
        for task in tasks {
            match task.await {
                Ok(Ok(n)) => total += n,
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(_) => {
                    if first_err.is_none() {
                        first_err = Some(OverlayError::Closed);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    pub async fn broadcast<T: serde::Serialize + Send + Sync>(&self, msg: &T) -> Result<usize, OverlayError> {
        let mut total = 0;
        let targets: Vec<TreeNodeID> = self
            .tree
            .nodes()
            .iter()
            .filter(|n| n.id != self.token.tree_node_id)
            .map(|n| n.id)
            .collect();
        for target in targets {
            total += self.send_to(target, msg).await?;
        }
        Ok(total)
    }

    pub async fn multicast<T: serde::Serialize + Send + Sync>(&self, msg: &T, nodes: &[TreeNodeID]) -> Result<usize, OverlayError> {
        let mut total = 0;
        for &node in nodes {
            total += self.send_to(node, msg).await?;
        }
        Ok(total)
    }

    /// `Done`: runs the onDone callback (if any) and waits for it to say
    /// true before asking the overlay to delete this instance
    /// (spec.md §4.7 lifecycle).
    pub fn done(self: &Arc<Self>) {
        let ready = match self.on_done.lock().unwrap().as_mut() {
            Some(cb) => cb(),
            None => true,
        };
        if !ready {
            return;
        }
        self.close_dispatch();
        if let Some(overlay) = self.overlay.upgrade() {
            overlay.node_done(self.token.id());
        }
    }

    pub fn set_on_done(&self, cb: Box<dyn FnMut() -> bool + Send>) {
        *self.on_done.lock().unwrap() = Some(cb);
    }

    /// `closeDispatch`: sets `closing`, wakes the dispatch fiber so it
    /// exits, and runs the protocol's `shutdown()` (spec.md §4.7 lifecycle).
    pub fn close_dispatch(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == TniState::Done {
                return;
            }
            *state = TniState::Closing;
        }
        self.close_notify.notify_waiters();
        if let Some(mut pi) = self.protocol.lock().unwrap().take() {
            pi.shutdown();
        }
        *self.state.lock().unwrap() = TniState::Done;
    }

    /// This instance's own secret key for its owning service, falling back
    /// to the node's default suite key pair (spec.md §4.7 cipher-suite
    /// view).
    pub fn secret_key(&self) -> &crate::suite::SecretKey {
        &self.secret_key
    }

    /// This instance's public key for its owning service, falling back to
    /// the node's default suite key pair when no per-service key is
    /// registered (spec.md §4.7 "PublicKey (for its owning service,
    /// falling back to the default)").
    pub fn public_key(&self) -> PublicKey {
        let node = self.tree.node(self.node_index);
        let si = &self.tree.roster.list[node.roster_index];
        Self::resolve_service_key(si, self.token.service_id).unwrap_or_else(|| self.public_key.clone())
    }

    pub fn public_key_index(&self) -> usize {
        self.node_index
    }

    /// Every node's public key for this instance's owning service, each
    /// falling back to that node's default (spec.md §4.7 "PublicKeys (all
    /// nodes' per-service keys)").
    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.tree
            .roster
            .list
            .iter()
            .map(|si| Self::resolve_service_key(si, self.token.service_id).unwrap_or_else(|| si.public_key.clone()))
            .collect()
    }

    pub fn suite(&self) -> &Arc<dyn CipherSuite> {
        &self.suite
    }

    /// `si`'s public key for this instance's owning service, falling back
    /// to `si`'s default.
    pub fn node_public(&self, si: &ServerIdentity) -> PublicKey {
        Self::resolve_service_key(si, self.token.service_id).unwrap_or_else(|| si.public_key.clone())
    }

    fn resolve_service_key(si: &ServerIdentity, service_id: crate::ids::ServiceID) -> Option<PublicKey> {
        si.service_identities
            .iter()
            .find(|ident| crate::ids::service_id(&ident.service_name) == service_id)
            .map(|ident| ident.public_key.clone())
    }
}
