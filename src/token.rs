//! Token: the unique key identifying one protocol instance at one node
//! (spec.md §3, §4.1). Grounded on the teacher's `Address` (`node` +
//! `ProcessId`) as "the thing a message is routed by", generalized to the
//! six-field tuple the spec requires and given content-addressed derivation
//! instead of a raw string join.

use serde::{Deserialize, Serialize};

use crate::ids::{ProtocolID, RosterID, RoundID, ServiceID, TreeID, TreeNodeID};
pub use crate::ids::TokenID;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub roster_id: RosterID,
    pub tree_id: TreeID,
    pub proto_id: ProtocolID,
    pub service_id: ServiceID,
    pub round_id: RoundID,
    pub tree_node_id: TreeNodeID,
}

impl Token {
    pub fn new(
        roster_id: RosterID,
        tree_id: TreeID,
        proto_id: ProtocolID,
        service_id: ServiceID,
        round_id: RoundID,
        tree_node_id: TreeNodeID,
    ) -> Self {
        Self {
            roster_id,
            tree_id,
            proto_id,
            service_id,
            round_id,
            tree_node_id,
        }
    }

    /// Recomputable at any time from the token's six fields
    /// (spec.md §4.1). We don't cache it on the struct: caching here would
    /// be one more piece of state that must stay in sync with the fields
    /// above, and the hash is cheap.
    pub fn id(&self) -> TokenID {
        let canonical = format!(
            "{}/{}/{}/{}/{}/{}",
            self.roster_id, self.tree_id, self.proto_id, self.service_id, self.round_id, self.tree_node_id
        );
        TokenID(uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, canonical.as_bytes()))
    }

    /// Returns a *new* token with a new recipient; this is the only
    /// supported mutation pattern for a `Token` (spec.md §3).
    pub fn change_tree_node_id(&self, new_tree_node_id: TreeNodeID) -> Token {
        Token {
            tree_node_id: new_tree_node_id,
            ..self.clone()
        }
    }
}

/// Opaque bytes delivered once with the first message a parent sends to a
/// given child; later read by the child's service at protocol-construction
/// time (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenericConfig(pub Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token() -> Token {
        Token::new(
            RosterID::from_canonical("r"),
            TreeID::from_canonical("t"),
            crate::ids::protocol_id("p"),
            crate::ids::service_id("s"),
            crate::ids::new_round_id(),
            TreeNodeID::from_canonical("n"),
        )
    }

    #[test]
    fn clone_has_same_id() {
        let tok = sample_token();
        assert_eq!(tok.id(), tok.clone().id());
    }

    #[test]
    fn change_tree_node_id_updates_recipient_and_id() {
        let tok = sample_token();
        let new_node = TreeNodeID::from_canonical("other-node");
        let changed = tok.change_tree_node_id(new_node);
        assert_eq!(changed.tree_node_id, new_node);
        assert_ne!(changed.id(), tok.id());
    }
}
