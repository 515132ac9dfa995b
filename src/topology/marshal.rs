//! TreeMarshal: the send-safe shape of a [`Tree`] (spec.md §3, §4.2).
//!
//! Only ids and a child list cross the wire; the top-level marshal carries
//! `TreeID`/`RosterID`, and reconstruction resolves each `ServerIdentityID`
//! against the roster supplied by the caller. Grounded on the teacher's
//! `TreeMarshal`-equivalent pattern of shipping ids across the wire and
//! resolving them locally, e.g. `kernel_types::Address` carrying a `NodeId`
//! string resolved against the local PKI rather than embedding the full
//! `Identity`.

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::ids::{RosterID, TreeID, TreeNodeID};
use crate::topology::roster::Roster;
use crate::topology::tree::{Tree, TreeNodeSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeNodeMarshal {
    pub tree_node_id: TreeNodeID,
    /// Resolved against the roster via `ServerIdentity::id()`.
    pub server_identity_id: TreeNodeID,
    pub children: Vec<TreeNodeMarshal>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeMarshal {
    pub tree_id: TreeID,
    pub roster_id: RosterID,
    pub root: TreeNodeMarshal,
}

impl Tree {
    pub fn marshal(&self) -> TreeMarshal {
        fn walk(tree: &Tree, idx: usize) -> TreeNodeMarshal {
            let node = tree.node(idx);
            TreeNodeMarshal {
                tree_node_id: node.id,
                server_identity_id: tree.roster.list[node.roster_index].id(),
                children: node.children.iter().map(|&c| walk(tree, c)).collect(),
            }
        }
        TreeMarshal {
            tree_id: self.id(),
            roster_id: self.roster.get_id(),
            root: walk(self, self.root_index()),
        }
    }

    /// Reconstruction fails if the marshal's `RosterID` differs from the
    /// supplied roster's id, or if any `ServerIdentityID` is not found in
    /// the roster (spec.md §4.2).
    pub fn unmarshal(marshal: &TreeMarshal, roster: Roster) -> Result<Tree, TopologyError> {
        if marshal.roster_id != roster.get_id() {
            return Err(TopologyError::RosterIdMismatch {
                wanted: marshal.roster_id.to_string(),
                got: roster.get_id().to_string(),
            });
        }
        let index_of = roster.id_index_map();
        fn to_spec(
            m: &TreeNodeMarshal,
            index_of: &std::collections::HashMap<TreeNodeID, usize>,
        ) -> Result<TreeNodeSpec, TopologyError> {
            let roster_index = *index_of
                .get(&m.server_identity_id)
                .ok_or_else(|| TopologyError::UnknownServerIdentity(m.server_identity_id.to_string()))?;
            let children = m
                .children
                .iter()
                .map(|c| to_spec(c, index_of))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TreeNodeSpec::with_children(roster_index, children))
        }
        let spec = to_spec(&marshal.root, &index_of)?;
        let tree = Tree::new(roster, spec);
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PublicKey;
    use crate::topology::roster::{Address, Scheme, ServerIdentity};

    fn roster(n: u8) -> Roster {
        let list = (0..n)
            .map(|i| {
                ServerIdentity::new(
                    PublicKey(vec![i + 1]),
                    Address::new(Scheme::Tcp, "127.0.0.1", 7000 + i as u16),
                )
            })
            .collect();
        Roster::new(list).unwrap()
    }

    #[test]
    fn marshal_round_trip() {
        let r = roster(3);
        let spec = TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1), TreeNodeSpec::leaf(2)]);
        let tree = Tree::new(r.clone(), spec);
        let m = tree.marshal();
        let tree2 = Tree::unmarshal(&m, r).unwrap();
        assert_eq!(tree.id(), tree2.id());
        assert_eq!(tree.nodes().len(), tree2.nodes().len());
    }

    #[test]
    fn marshal_rejects_wrong_roster() {
        let r = roster(3);
        let other = roster(3);
        let spec = TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1)]);
        let tree = Tree::new(r, spec);
        let m = tree.marshal();
        assert!(matches!(
            Tree::unmarshal(&m, other),
            Err(TopologyError::RosterIdMismatch { .. })
        ));
    }
}
