//! Wire envelopes: `ProtocolMsg` and `OverlayMsg` (spec.md §3, §4.5, §6).
//!
//! A registered message type is named by a stable `MessageTypeID` — a UUID5
//! of its structural (type) name — rather than by runtime reflection, per
//! spec.md §9's redesign note: "the wire-side type id is a stable UUID of
//! the structural name". Grounded on the teacher's `KernelMessage`
//! (`types.rs`), which bundles `source`/`target`/`message`/`payload` the
//! same way `ProtocolMsg` bundles `from`/`to`/`body`/`config`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::TreeID;
use crate::token::{GenericConfig, Token};
use crate::topology::{Roster, ServerIdentity, TreeMarshal};
use crate::token::TokenID;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MessageTypeID(pub uuid::Uuid);

impl MessageTypeID {
    pub fn of(structural_name: &str) -> Self {
        Self(uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, structural_name.as_bytes()))
    }
}

impl fmt::Display for MessageTypeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl fmt::Debug for MessageTypeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageTypeID({})", self.0)
    }
}

/// Either the decoded message value's raw marshalled bytes (what crosses
/// the wire) or, locally within one node, a pre-decoded box so the overlay
/// doesn't need to round-trip through bytes when handing a message to a
/// same-process dispatcher.
#[derive(Clone, Serialize, Deserialize)]
pub enum MsgBody {
    Bytes(Vec<u8>),
}

impl MsgBody {
    pub fn len(&self) -> usize {
        match self {
            MsgBody::Bytes(b) => b.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Envelope for protocol-level traffic (spec.md §3).
#[derive(Clone, Serialize, Deserialize)]
pub struct ProtocolMsg {
    pub from: Token,
    pub to: Token,
    pub server_identity: ServerIdentity,
    pub msg_type: MessageTypeID,
    pub body: MsgBody,
    pub size: usize,
    pub config: Option<GenericConfig>,
}

impl ProtocolMsg {
    pub fn new(from: Token, to: Token, server_identity: ServerIdentity, msg_type: MessageTypeID, bytes: Vec<u8>) -> Self {
        let size = bytes.len();
        Self {
            from,
            to,
            server_identity,
            msg_type,
            body: MsgBody::Bytes(bytes),
            size,
            config: None,
        }
    }

    pub fn with_config(mut self, config: Option<GenericConfig>) -> Self {
        self.config = config;
        self
    }
}

/// Tagged union of what the overlay exchanges out-of-band with peers to
/// resolve topology (spec.md §4.5, §6). The `Legacy*` variants must be
/// accepted on ingress for interoperability but are never produced by this
/// implementation (spec.md §9).
#[derive(Clone, Serialize, Deserialize)]
pub enum OverlayMsg {
    TreeNodeInfo,
    RequestTree { tree_id: TreeID, version: u32 },
    ResponseTree { tree: TreeMarshal, roster: Roster },
    Config { bytes: GenericConfig, dest: TokenID },
    LegacyRequestRoster { roster_id: crate::ids::RosterID },
    LegacySendTree(TreeMarshal),
    LegacyRoster(Roster),
}

pub const REQUEST_TREE_VERSION: u32 = 1;
