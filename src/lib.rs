//! onet: a runtime library for building cothority nodes — long-lived
//! servers that execute tree-structured protocols (threshold signing,
//! DKG, consensus) over a roster of peers, exposing the result as an RPC
//! service.
//!
//! Module layout mirrors the teacher's own `mod` tree (one file or
//! directory per runtime component, re-exported flat from the crate
//! root): `topology` is the static model (roster/tree/addresses),
//! `tree_storage`/`registry` the per-server caches, `message`/
//! `message_proxy` the wire format, `tni`/`overlay` the live dispatch
//! path, `service`/`kvstore`/`server` the node shell, and `ws`/`config`
//! the binary-only front door.

pub mod config;
pub mod error;
pub mod ids;
pub mod kvstore;
pub mod logging;
pub mod message;
pub mod message_proxy;
pub mod overlay;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod service;
pub mod suite;
pub mod tni;
pub mod token;
pub mod topology;
pub mod transport;
pub mod tree_storage;
pub mod ws;

pub use error::{OverlayError, RegistryError, ServiceError, StorageError, TniError, TopologyError, TransportError};
pub use ids::{ProtocolID, PublicKey, RosterID, RoundID, ServiceID, TokenID, TreeID, TreeNodeID};
pub use message::{MessageTypeID, MsgBody, OverlayMsg, ProtocolMsg};
pub use overlay::Overlay;
pub use protocol::ProtocolInstance;
pub use registry::ProtocolRegistry;
pub use server::Server;
pub use service::{Service, ServiceManager};
pub use suite::{CipherSuite, SecretKey};
pub use tni::TreeNodeInstance;
pub use token::{GenericConfig, Token};
pub use topology::{Address, Roster, Scheme, ServerIdentity, Tree, TreeNode, TreeNodeSpec};
pub use transport::Transport;
pub use tree_storage::TreeStorage;
