//! Topology model (C2): Roster, Tree, TreeNode, TreeMarshal, and shape
//! generators.

pub mod marshal;
pub mod roster;
pub mod shapes;
pub mod tree;

pub use marshal::{TreeMarshal, TreeNodeMarshal};
pub use roster::{Address, Roster, Scheme, ServerIdentity, ServiceIdentity};
pub use shapes::{
    generate_big_nary_tree, generate_binary_tree, generate_nary_tree, generate_nary_tree_with_root,
    generate_star,
};
pub use tree::{Tree, TreeNode, TreeNodeSpec};
