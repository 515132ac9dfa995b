//! Typed error kinds for the core, grouped the way the teacher repo groups
//! its own per-module error enums (`FsError`, `VfsError`,
//! `HttpClientError`, ...): one `thiserror` enum per component, each with a
//! `kind()` accessor for lightweight classification by callers that don't
//! want to match on the full enum.

use thiserror::Error;

use crate::ids::{ProtocolID, RoundID, ServiceID, TokenID, TreeID};

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("roster: cannot build a roster with zero members")]
    EmptyRoster,
    #[error("roster: first member has no public key")]
    NoRootPublicKey,
    #[error("tree marshal: missing roster")]
    MarshalMissingRoster,
    #[error("tree marshal: roster id mismatch, marshal wants {wanted}, got {got}")]
    RosterIdMismatch { wanted: String, got: String },
    #[error("tree marshal: server identity id {0} not found in roster")]
    UnknownServerIdentity(String),
    #[error("tree shape: cannot satisfy branching factor {n} while using every roster entry")]
    UnsatisfiableBranching { n: usize },
    #[error("tree shape: roster is empty")]
    EmptyRosterForShape,
}

impl TopologyError {
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyError::EmptyRoster => "EmptyRoster",
            TopologyError::NoRootPublicKey => "NoRootPublicKey",
            TopologyError::MarshalMissingRoster => "MarshalMissingRoster",
            TopologyError::RosterIdMismatch { .. } => "RosterIdMismatch",
            TopologyError::UnknownServerIdentity(_) => "UnknownServerIdentity",
            TopologyError::UnsatisfiableBranching { .. } => "UnsatisfiableBranching",
            TopologyError::EmptyRosterForShape => "EmptyRosterForShape",
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("tree storage: {0} is not registered")]
    NotRegistered(TreeID),
    #[error("tree storage: closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("protocol registry: name {0} already registered")]
    DuplicateProtocolName(String),
    #[error("protocol registry: no constructor registered for {0}")]
    UnknownProtocol(ProtocolID),
    #[error("service registry: name {0} already registered")]
    DuplicateServiceName(String),
    #[error("service registry: no service registered for {0}")]
    UnknownService(ServiceID),
    #[error("protocol registry: global registration attempted after a server started")]
    GlobalRegistryFrozen,
}

#[derive(Error, Debug)]
pub enum TniError {
    #[error("tni: channel too small; use RegisterChannelLength")]
    ChannelTooSmall,
    #[error("tni: sender mismatch for message into {0}")]
    SenderMismatch(TokenID),
    #[error("tni: tree node {0} not found in tree")]
    UnknownTreeNode(String),
    #[error("tni: instance is closing, cannot send")]
    Closing,
    #[error("tni: SetConfig called more than once")]
    ConfigAlreadySet,
    #[error("tni: protocol already bound to this instance")]
    ErrProtocolRegistered,
    #[error("tni: no such tree node instance")]
    ErrWrongTreeNodeInstance,
    #[error("tni: registration target is not a channel or function")]
    BadRegistrationTarget,
    #[error("tni: failed to decode message body for {0}: {1}")]
    Codec(String, String),
}

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Tni(#[from] TniError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("overlay: tree {0} unknown, request queued")]
    UnknownTree(TreeID),
    #[error("overlay: response for unregistered tree {0} dropped")]
    UnregisteredTreeResponse(TreeID),
    #[error("overlay: round {0} already done")]
    AlreadyDone(RoundID),
    #[error("overlay: transport send failed: {0}")]
    Transport(String),
    #[error("overlay: protocol construction panicked: {0}")]
    ProtocolPanic(String),
    #[error("overlay: closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service: key-value store error: {0}")]
    Store(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("service: NewProtocol panicked: {0}")]
    NewProtocolPanic(String),
    #[error("service: missing service identity key pair for suite {0}")]
    MissingServiceKeyPair(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport: unsupported address scheme {0}")]
    UnsupportedScheme(String),
    #[error("transport: io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport: peer not reachable")]
    Unreachable,
}
