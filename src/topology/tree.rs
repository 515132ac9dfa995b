//! Tree and TreeNode (C2). An arena-backed tree: nodes are stored flat in a
//! `Vec` with parent/child links as indices, so there is no cyclic
//! ownership between parent and child (spec.md §9 design note). This plays
//! the same role the teacher's `Tree`/`ProcessMetadata` arena-in-a-`HashMap`
//! patterns play elsewhere in the kernel (owning sequence + index lookups
//! rather than `Rc<RefCell<_>>` cycles).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::TopologyError;
use crate::ids::{TreeID, TreeNodeID};
use crate::topology::roster::Roster;

/// Mixed into the hash after any node with no children, so that two
/// differently shaped trees over the same multiset of keys cannot collide
/// (spec.md §9: "Preserve the sentinel").
const LEAF_SENTINEL: u8 = 0xFF;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: TreeNodeID,
    pub roster_index: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// A caller-built shape, flattened into a [`Tree`]'s arena by [`Tree::new`].
#[derive(Clone, Debug)]
pub struct TreeNodeSpec {
    pub roster_index: usize,
    pub children: Vec<TreeNodeSpec>,
}

impl TreeNodeSpec {
    pub fn leaf(roster_index: usize) -> Self {
        Self {
            roster_index,
            children: Vec::new(),
        }
    }

    pub fn with_children(roster_index: usize, children: Vec<TreeNodeSpec>) -> Self {
        Self {
            roster_index,
            children,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tree {
    id: TreeID,
    pub roster: Roster,
    nodes: Vec<TreeNode>,
    root: usize,
}

impl Tree {
    /// `TreeID` is computed from the roster id and a DFS pre-order
    /// traversal of node public keys with a leaf-sentinel byte
    /// (spec.md §3, §4.2, §9).
    pub fn new(roster: Roster, root_spec: TreeNodeSpec) -> Self {
        let mut nodes = Vec::new();
        let mut hasher = Sha256::new();
        hasher.update(roster.get_id().0.as_bytes());
        let root = build(&roster, &root_spec, None, &mut nodes, &mut hasher);
        let digest = hasher.finalize();
        let id = TreeID(Uuid::new_v5(&Uuid::NAMESPACE_URL, &digest));
        Self {
            id,
            roster,
            nodes,
            root,
        }
    }

    pub fn id(&self) -> TreeID {
        self.id
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[self.root]
    }

    pub fn root_index(&self) -> usize {
        self.root
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> &TreeNode {
        &self.nodes[idx]
    }

    pub fn parent_of(&self, idx: usize) -> Option<&TreeNode> {
        self.nodes[idx].parent.map(|p| &self.nodes[p])
    }

    pub fn children_of(&self, idx: usize) -> impl Iterator<Item = &TreeNode> {
        self.nodes[idx].children.iter().map(|&c| &self.nodes[c])
    }

    /// DFS search by `TreeNodeID`; `None` if absent (spec.md §4.2).
    pub fn search(&self, id: TreeNodeID) -> Option<&TreeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn search_index(&self, id: TreeNodeID) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Every node has 0 or exactly `n` children.
    pub fn is_nary(&self, n: usize) -> bool {
        self.nodes
            .iter()
            .all(|node| node.children.is_empty() || node.children.len() == n)
    }

    /// True iff every roster entry appears at least once in the tree.
    pub fn uses_list(&self) -> bool {
        let mut seen = vec![false; self.roster.len()];
        for node in &self.nodes {
            seen[node.roster_index] = true;
        }
        seen.into_iter().all(|b| b)
    }

    fn dfs_roster_indices(&self) -> Vec<usize> {
        fn walk(tree: &Tree, idx: usize, out: &mut Vec<usize>) {
            out.push(tree.nodes[idx].roster_index);
            for &c in &tree.nodes[idx].children {
                walk(tree, c, out);
            }
        }
        let mut out = Vec::with_capacity(self.nodes.len());
        walk(self, self.root, &mut out);
        out
    }

    /// True iff `other` is a non-identity cyclic rotation of this tree's
    /// DFS pre-order roster-index sequence.
    pub fn is_rotation(&self, other: &Tree) -> bool {
        let a = self.dfs_roster_indices();
        let b = other.dfs_roster_indices();
        if a.len() != b.len() || a.is_empty() {
            return false;
        }
        if a == b {
            return false; // identity is not a rotation
        }
        let doubled: Vec<usize> = a.iter().chain(a.iter()).copied().collect();
        doubled.windows(b.len()).any(|w| w == b.as_slice())
    }

    /// Returns a roster of size <= n+1 beginning with the given root node's
    /// server identity, followed by a cryptographically-seeded permutation
    /// of the remaining roster entries (spec.md §4.2).
    pub fn random_subset(&self, root_idx: usize, n: usize) -> Roster {
        use rand::seq::SliceRandom;
        let root_roster_idx = self.nodes[root_idx].roster_index;
        let mut rest: Vec<usize> = (0..self.roster.len())
            .filter(|&i| i != root_roster_idx)
            .collect();
        rest.shuffle(&mut rand::thread_rng());
        rest.truncate(n);
        let mut list = vec![self.roster.list[root_roster_idx].clone()];
        list.extend(rest.into_iter().map(|i| self.roster.list[i].clone()));
        // unwrap: list is non-empty and its first entry came from a valid roster
        Roster::new(list).expect("subset of a valid roster is itself valid")
    }
}

fn build(
    roster: &Roster,
    spec: &TreeNodeSpec,
    parent: Option<usize>,
    nodes: &mut Vec<TreeNode>,
    hasher: &mut Sha256,
) -> usize {
    let idx = nodes.len();
    let si = &roster.list[spec.roster_index];
    hasher.update(&si.public_key.0);
    nodes.push(TreeNode {
        id: si.id(),
        roster_index: spec.roster_index,
        parent,
        children: Vec::new(),
    });
    if spec.children.is_empty() {
        hasher.update([LEAF_SENTINEL]);
    }
    let mut child_indices = Vec::with_capacity(spec.children.len());
    for child_spec in &spec.children {
        child_indices.push(build(roster, child_spec, Some(idx), nodes, hasher));
    }
    nodes[idx].children = child_indices;
    idx
}

pub fn empty_roster_error_if_needed(roster: &Roster) -> Result<(), TopologyError> {
    if roster.is_empty() {
        return Err(TopologyError::EmptyRosterForShape);
    }
    Ok(())
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
    fn tree_id_is_deterministic() {
        let r = roster(3);
        let spec = TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1), TreeNodeSpec::leaf(2)]);
        let t1 = Tree::new(r.clone(), spec.clone());
        let t2 = Tree::new(r, spec);
        assert_eq!(t1.id(), t2.id());
    }

    #[test]
    fn leaf_sentinel_distinguishes_shapes() {
        let r = roster(3);
        // chain: 0 -> 1 -> 2
        let chain = TreeNodeSpec::with_children(
            0,
            vec![TreeNodeSpec::with_children(1, vec![TreeNodeSpec::leaf(2)])],
        );
        // star: 0 -> {1, 2}
        let star = TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1), TreeNodeSpec::leaf(2)]);
        let t_chain = Tree::new(r.clone(), chain);
        let t_star = Tree::new(r, star);
        assert_ne!(t_chain.id(), t_star.id());
    }

    #[test]
    fn search_finds_node_dfs() {
        let r = roster(3);
        let spec = TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1), TreeNodeSpec::leaf(2)]);
        let t = Tree::new(r.clone(), spec);
        let target = r.list[1].id();
        assert!(t.search(target).is_some());
        let missing = crate::ids::TreeNodeID::nil();
        assert!(t.search(missing).is_none());
    }

    #[test]
    fn is_nary_true_for_uniform_branching() {
        let r = roster(3);
        let spec = TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1), TreeNodeSpec::leaf(2)]);
        let t = Tree::new(r, spec);
        assert!(t.is_nary(2));
        assert!(!t.is_nary(3));
    }

    #[test]
    fn uses_list_detects_missing_entries() {
        let r = roster(3);
        let spec = TreeNodeSpec::with_children(0, vec![TreeNodeSpec::leaf(1)]);
        let t = Tree::new(r, spec);
        assert!(!t.uses_list());
    }
}
