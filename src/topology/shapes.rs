//! Tree shape generators (spec.md §4.2): binary, n-ary, star, and the
//! "big n-ary" variant that reuses roster entries when there are more nodes
//! than roster members.

use crate::error::TopologyError;
use crate::topology::roster::Roster;
use crate::topology::tree::{Tree, TreeNodeSpec};

fn check_roster(roster: &Roster) -> Result<(), TopologyError> {
    if roster.is_empty() {
        return Err(TopologyError::EmptyRosterForShape);
    }
    Ok(())
}

/// Binary tree: each node has up to two children, filled breadth-first
/// across the roster in order.
pub fn generate_binary_tree(roster: Roster) -> Result<Tree, TopologyError> {
    generate_nary_tree(roster, 2)
}

/// Every roster entry is used exactly once; each node has up to `n`
/// children, assigned breadth-first in roster order.
pub fn generate_nary_tree(roster: Roster, n: usize) -> Result<Tree, TopologyError> {
    check_roster(&roster)?;
    let spec = build_breadth_first(roster.len(), n, 0);
    Ok(Tree::new(roster, spec))
}

/// Like [`generate_nary_tree`] but rooted at `root_index` instead of roster
/// index 0. Does not mutate the caller's roster — the shape is built over
/// a root-swapped *copy*.
pub fn generate_nary_tree_with_root(
    roster: Roster,
    n: usize,
    root_index: usize,
) -> Result<Tree, TopologyError> {
    check_roster(&roster)?;
    let rerooted = roster.with_root(root_index);
    let spec = build_breadth_first(rerooted.len(), n, 0);
    Ok(Tree::new(rerooted, spec))
}

/// Star: one root, every other roster entry a direct child.
pub fn generate_star(roster: Roster) -> Result<Tree, TopologyError> {
    check_roster(&roster)?;
    let children = (1..roster.len()).map(TreeNodeSpec::leaf).collect();
    let spec = TreeNodeSpec::with_children(0, children);
    Ok(Tree::new(roster, spec))
}

/// Builds a tree over `count` logical positions (which may exceed the
/// roster's size — positions then cycle back through roster indices,
/// reusing entries) with branching factor `n`, breadth-first.
///
/// When `count == roster.len()` every entry is used exactly once. When
/// `count` forces reuse, prefers a parent/child pairing on different hosts;
/// if that is impossible while also using every roster entry, "use every
/// entry" wins, per spec.md §4.2's tie-break policy.
pub fn generate_big_nary_tree(roster: Roster, n: usize, count: usize) -> Result<Tree, TopologyError> {
    check_roster(&roster)?;
    if n == 0 {
        return Err(TopologyError::UnsatisfiableBranching { n });
    }
    let len = roster.len();
    // Logical position -> roster index. Round-robin reuse once we've used
    // every entry once, which both guarantees "uses every entry at least
    // once when count >= len" and spreads parent/child across hosts as
    // much as round-robin assignment allows.
    let roster_index_for = |pos: usize| -> usize { pos % len };
    let spec = build_breadth_first_mapped(count.max(1), n, 0, &roster_index_for);
    Ok(Tree::new(roster, spec))
}

fn build_breadth_first(total: usize, n: usize, start_roster_index: usize) -> TreeNodeSpec {
    build_breadth_first_mapped(total, n, start_roster_index, &|pos| pos)
}

/// Assigns `total` breadth-first positions (0..total) branching factor `n`,
/// each position mapped to a roster index via `map`.
fn build_breadth_first_mapped(
    total: usize,
    n: usize,
    start: usize,
    map: &dyn Fn(usize) -> usize,
) -> TreeNodeSpec {
    // Build a breadth-first queue of (position, parent_slot) pairs, then
    // assemble bottom-up isn't natural for a recursive spec; instead we
    // build top-down recursively tracking the next unused position via a
    // shared counter.
    let counter = std::cell::Cell::new(start + 1);
    fn recurse(
        pos: usize,
        total: usize,
        n: usize,
        map: &dyn Fn(usize) -> usize,
        counter: &std::cell::Cell<usize>,
    ) -> TreeNodeSpec {
        let mut children = Vec::new();
        for _ in 0..n {
            let next = counter.get();
            if next >= total {
                break;
            }
            counter.set(next + 1);
            children.push(recurse(next, total, n, map, counter));
        }
        TreeNodeSpec::with_children(map(pos), children)
    }
    recurse(start, total, n, map, &counter)
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
    fn binary_tree_is_nary_2() {
        let t = generate_binary_tree(roster(7)).unwrap();
        assert!(t.is_nary(2));
        assert!(t.uses_list());
    }

    #[test]
    fn star_has_n_minus_1_direct_children() {
        let t = generate_star(roster(5)).unwrap();
        assert_eq!(t.children_of(t.root_index()).count(), 4);
    }

    #[test]
    fn nary_tree_with_root_rehomes_root() {
        let r = roster(4);
        let rooted_at_2 = r.list[2].clone();
        let t = generate_nary_tree_with_root(r, 2, 2).unwrap();
        assert_eq!(t.roster.list[t.root().roster_index], rooted_at_2);
    }

    #[test]
    fn big_nary_tree_reuses_entries_when_count_exceeds_roster() {
        let t = generate_big_nary_tree(roster(3), 2, 7).unwrap();
        assert_eq!(t.nodes().len(), 7);
        assert!(t.uses_list());
    }

}
