//! Dynamic R-tree over bounding boxes.
//!
//! Nodes live in a contiguous arena and refer to each other by index, so the
//! parent back-links used for upward bound recomputation and condensation
//! carry no ownership. Insertion uses least-enlargement descent with a
//! first-found tie-break; overflowing nodes are split at the median of their
//! children's x centres. Removal condenses underfull nodes by detaching them
//! and re-inserting their entries from the root.

use crate::Bounds;
use crate::error::GeoTilesError;
use smallvec::SmallVec;
use std::cmp::Ordering;

pub const DEFAULT_MIN_ENTRIES: usize = 4;
pub const DEFAULT_MAX_ENTRIES: usize = 9;

/// Validate a fan-out pair. `max_entries` must be at least 2 and
/// `min_entries` between 1 and `ceil(max_entries / 2)`, otherwise a median
/// split could produce an underfull node.
pub fn check_fanout(min_entries: usize, max_entries: usize) -> Result<(), String> {
    if max_entries < 2 {
        return Err("Index max_entries must be at least 2".to_string());
    }
    if min_entries == 0 || min_entries > max_entries.div_ceil(2) {
        return Err(format!(
            "Index min_entries must be between 1 and {} for max_entries {}",
            max_entries.div_ceil(2),
            max_entries
        ));
    }
    Ok(())
}

/// Inline child capacity: one above the default fan-out so an overflowing
/// node still fits before it is split.
const INLINE_CHILDREN: usize = DEFAULT_MAX_ENTRIES + 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct NodeId(usize);

#[derive(Debug, Clone)]
struct LeafEntry<T> {
    bounds: Bounds,
    item: T,
}

#[derive(Debug, Clone)]
enum Children<T> {
    Leaf(SmallVec<[LeafEntry<T>; INLINE_CHILDREN]>),
    Internal(SmallVec<[NodeId; INLINE_CHILDREN]>),
}

#[derive(Debug, Clone)]
struct Node<T> {
    bounds: Bounds,
    parent: Option<NodeId>,
    children: Children<T>,
}

impl<T> Node<T> {
    fn empty_leaf(parent: Option<NodeId>) -> Self {
        Self {
            bounds: Bounds::EMPTY,
            parent,
            children: Children::Leaf(SmallVec::new()),
        }
    }

    fn len(&self) -> usize {
        match &self.children {
            Children::Leaf(entries) => entries.len(),
            Children::Internal(ids) => ids.len(),
        }
    }

    fn is_leaf(&self) -> bool {
        matches!(self.children, Children::Leaf(_))
    }
}

/// R-tree mapping bounding boxes to items.
///
/// Items are matched by `PartialEq` on removal, so callers that need
/// identity semantics should use a handle type whose equality is identity.
///
/// # Examples
///
/// ```
/// use geotiles::Bounds;
/// use geotiles::index::RTree;
///
/// let mut tree = RTree::new();
/// tree.insert(1u32, Bounds::new(0.0, 0.0, 1.0, 1.0));
/// tree.insert(2u32, Bounds::new(5.0, 5.0, 6.0, 6.0));
///
/// let hits = tree.search(&Bounds::new(0.5, 0.5, 2.0, 2.0));
/// assert_eq!(hits, vec![1]);
/// ```
#[derive(Debug, Clone)]
pub struct RTree<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    root: NodeId,
    size: usize,
    min_entries: usize,
    max_entries: usize,
}

impl<T> Default for RTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RTree<T> {
    /// Empty tree with the default fan-out (4..=9 children per node).
    pub fn new() -> Self {
        Self::with_checked_fanout(DEFAULT_MIN_ENTRIES, DEFAULT_MAX_ENTRIES)
    }

    /// Empty tree with custom fan-out. Fails with
    /// [`GeoTilesError::InvalidConfig`] unless [`check_fanout`] accepts the
    /// pair.
    pub fn with_fanout(min_entries: usize, max_entries: usize) -> crate::error::Result<Self> {
        check_fanout(min_entries, max_entries).map_err(GeoTilesError::InvalidConfig)?;
        Ok(Self::with_checked_fanout(min_entries, max_entries))
    }

    fn with_checked_fanout(min_entries: usize, max_entries: usize) -> Self {
        Self {
            nodes: vec![Node::empty_leaf(None)],
            free: Vec::new(),
            root: NodeId(0),
            size: 0,
            min_entries,
            max_entries,
        }
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn min_entries(&self) -> usize {
        self.min_entries
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Union of every indexed box, [`Bounds::EMPTY`] for an empty tree.
    pub fn bounds(&self) -> Bounds {
        self.node(self.root).bounds
    }

    /// Number of levels from the root to the leaves (1 for a lone leaf root).
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.root;
        while let Children::Internal(ids) = &self.node(current).children {
            match ids.first() {
                Some(&first) => {
                    current = first;
                    depth += 1;
                }
                None => break,
            }
        }
        depth
    }

    /// Drop every item and reset to a single empty leaf.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::empty_leaf(None));
        self.free.clear();
        self.root = NodeId(0);
        self.size = 0;
    }

    /// Insert an item under `bounds`. Always succeeds.
    pub fn insert(&mut self, item: T, bounds: Bounds) {
        self.insert_entry(LeafEntry { bounds, item });
        self.size += 1;
    }

    /// Every item whose box overlaps `query`, in no particular order.
    pub fn search(&self, query: &Bounds) -> Vec<T>
    where
        T: Clone,
    {
        let mut out = Vec::new();
        self.visit(query, &mut |item: &T, _: &Bounds| out.push(item.clone()));
        out
    }

    /// Call `f` with every item (and its box) overlapping `query`.
    pub fn visit(&self, query: &Bounds, f: &mut dyn FnMut(&T, &Bounds)) {
        self.visit_node(self.root, query, f);
    }

    /// Call `f` with every item in the tree.
    pub fn for_each(&self, mut f: impl FnMut(&T, &Bounds)) {
        for node in self.live_leaves() {
            if let Children::Leaf(entries) = &node.children {
                for entry in entries {
                    f(&entry.item, &entry.bounds);
                }
            }
        }
    }

    /// Remove `item`, descending only through nodes whose boxes intersect
    /// `bounds`.
    ///
    /// Returns `false` (and leaves the tree untouched) when the item is not
    /// found along that path, including when `bounds` no longer matches the
    /// box the item was inserted under.
    pub fn remove(&mut self, item: &T, bounds: &Bounds) -> bool
    where
        T: PartialEq,
    {
        match self.find_leaf(self.root, item, bounds) {
            Some((leaf, index)) => {
                self.remove_at(leaf, index);
                true
            }
            None => false,
        }
    }

    /// Remove `item` by scanning every leaf regardless of bounds.
    ///
    /// Linear in the number of nodes; meant as a fallback when the caller
    /// cannot supply the exact indexed box.
    pub fn remove_anywhere(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let found = self.reachable_nodes().into_iter().find_map(|id| {
            match &self.node(id).children {
                Children::Leaf(entries) => entries
                    .iter()
                    .position(|e| &e.item == item)
                    .map(|index| (id, index)),
                Children::Internal(_) => None,
            }
        });
        match found {
            Some((leaf, index)) => {
                self.remove_at(leaf, index);
                true
            }
            None => false,
        }
    }

    /// Box an item is currently indexed under, found by full scan.
    pub fn indexed_bounds(&self, item: &T) -> Option<Bounds>
    where
        T: PartialEq,
    {
        let mut found = None;
        self.for_each(|candidate, bounds| {
            if found.is_none() && candidate == item {
                found = Some(*bounds);
            }
        });
        found
    }

    /// Verify structural invariants: parent links, fan-out, tight bounds,
    /// uniform leaf depth and item count.
    pub fn audit(&self) -> Result<(), String> {
        let mut leaf_depth = None;
        let mut count = 0;
        self.audit_node(self.root, None, 1, &mut leaf_depth, &mut count)?;
        if count != self.size {
            return Err(format!(
                "tree holds {} items but size is {}",
                count, self.size
            ));
        }
        Ok(())
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.nodes[id.0]
    }

    fn alloc(&mut self, node: Node<T>) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                NodeId(slot)
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id.0] = Node::empty_leaf(None);
        self.free.push(id.0);
    }

    fn reachable_nodes(&self) -> Vec<NodeId> {
        let mut stack = vec![self.root];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if let Children::Internal(ids) = &self.node(id).children {
                stack.extend(ids.iter().copied());
            }
            out.push(id);
        }
        out
    }

    fn live_leaves(&self) -> impl Iterator<Item = &Node<T>> + '_ {
        self.reachable_nodes()
            .into_iter()
            .map(|id| self.node(id))
            .filter(|node| node.is_leaf())
    }

    fn recompute_bounds(&mut self, id: NodeId) {
        let bounds = match &self.node(id).children {
            Children::Leaf(entries) => entries
                .iter()
                .fold(Bounds::EMPTY, |acc, e| acc.union(&e.bounds)),
            Children::Internal(ids) => ids
                .iter()
                .fold(Bounds::EMPTY, |acc, c| acc.union(&self.node(*c).bounds)),
        };
        self.node_mut(id).bounds = bounds;
    }

    /// Recompute tight bounds from `id` up to the root.
    fn adjust_upward(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node) = current {
            self.recompute_bounds(node);
            current = self.node(node).parent;
        }
    }

    fn choose_leaf(&self, bounds: &Bounds) -> NodeId {
        let mut current = self.root;
        loop {
            let Children::Internal(ids) = &self.node(current).children else {
                return current;
            };
            let mut best = ids[0];
            let mut best_growth = self.node(best).bounds.enlargement(bounds);
            for &child in ids.iter().skip(1) {
                let growth = self.node(child).bounds.enlargement(bounds);
                if growth < best_growth {
                    best = child;
                    best_growth = growth;
                }
            }
            current = best;
        }
    }

    fn insert_entry(&mut self, entry: LeafEntry<T>) {
        let leaf = self.choose_leaf(&entry.bounds);
        if let Children::Leaf(entries) = &mut self.node_mut(leaf).children {
            entries.push(entry);
        }
        self.adjust_upward(leaf);
        if self.node(leaf).len() > self.max_entries {
            self.split_node(leaf);
        }
    }

    /// Split an overflowing node at the median x centre of its children and
    /// hang the right half off the parent, growing a new root if needed.
    fn split_node(&mut self, id: NodeId) {
        let parent = self.node(id).parent;
        let children = std::mem::replace(
            &mut self.node_mut(id).children,
            Children::Leaf(SmallVec::new()),
        );

        let (left, right) = match children {
            Children::Leaf(mut entries) => {
                entries.sort_by(|a, b| cmp_center_x(&a.bounds, &b.bounds));
                let right: SmallVec<_> = entries.drain(entries.len() / 2..).collect();
                (Children::Leaf(entries), Children::Leaf(right))
            }
            Children::Internal(mut ids) => {
                ids.sort_by(|a, b| cmp_center_x(&self.node(*a).bounds, &self.node(*b).bounds));
                let right: SmallVec<_> = ids.drain(ids.len() / 2..).collect();
                (Children::Internal(ids), Children::Internal(right))
            }
        };

        let moved: SmallVec<[NodeId; INLINE_CHILDREN]> = match &right {
            Children::Internal(ids) => ids.clone(),
            Children::Leaf(_) => SmallVec::new(),
        };

        self.node_mut(id).children = left;
        let sibling = self.alloc(Node {
            bounds: Bounds::EMPTY,
            parent,
            children: right,
        });
        for child in moved {
            self.node_mut(child).parent = Some(sibling);
        }
        self.recompute_bounds(id);
        self.recompute_bounds(sibling);

        match parent {
            None => {
                let mut ids = SmallVec::new();
                ids.push(id);
                ids.push(sibling);
                let root = self.alloc(Node {
                    bounds: Bounds::EMPTY,
                    parent: None,
                    children: Children::Internal(ids),
                });
                self.node_mut(id).parent = Some(root);
                self.node_mut(sibling).parent = Some(root);
                self.recompute_bounds(root);
                self.root = root;
            }
            Some(parent) => {
                if let Children::Internal(ids) = &mut self.node_mut(parent).children {
                    ids.push(sibling);
                }
                self.adjust_upward(parent);
                if self.node(parent).len() > self.max_entries {
                    self.split_node(parent);
                }
            }
        }
    }

    fn visit_node(&self, id: NodeId, query: &Bounds, f: &mut dyn FnMut(&T, &Bounds)) {
        let node = self.node(id);
        if !node.bounds.intersects(query) {
            return;
        }
        match &node.children {
            Children::Leaf(entries) => {
                for entry in entries {
                    if entry.bounds.intersects(query) {
                        f(&entry.item, &entry.bounds);
                    }
                }
            }
            Children::Internal(ids) => {
                for &child in ids {
                    self.visit_node(child, query, f);
                }
            }
        }
    }

    fn find_leaf(&self, id: NodeId, item: &T, bounds: &Bounds) -> Option<(NodeId, usize)>
    where
        T: PartialEq,
    {
        match &self.node(id).children {
            Children::Leaf(entries) => entries
                .iter()
                .position(|e| &e.item == item)
                .map(|index| (id, index)),
            Children::Internal(ids) => ids
                .iter()
                .filter(|child| self.node(**child).bounds.intersects(bounds))
                .find_map(|child| self.find_leaf(*child, item, bounds)),
        }
    }

    fn remove_at(&mut self, leaf: NodeId, index: usize) {
        if let Children::Leaf(entries) = &mut self.node_mut(leaf).children {
            entries.remove(index);
        }
        self.size -= 1;
        self.condense(leaf);
    }

    /// Walk from `leaf` to the root, detaching underfull nodes and tightening
    /// the rest, then re-insert the detached entries from the root.
    fn condense(&mut self, leaf: NodeId) {
        let mut orphans = Vec::new();
        let mut current = leaf;

        while let Some(parent) = self.node(current).parent {
            if self.node(current).len() < self.min_entries {
                if let Children::Internal(ids) = &mut self.node_mut(parent).children {
                    ids.retain(|child| *child != current);
                }
                self.drain_subtree(current, &mut orphans);
            } else {
                self.recompute_bounds(current);
            }
            current = parent;
        }

        self.recompute_bounds(current);
        self.shrink_root();

        for entry in orphans {
            self.insert_entry(entry);
        }
    }

    fn drain_subtree(&mut self, id: NodeId, out: &mut Vec<LeafEntry<T>>) {
        let children = std::mem::replace(
            &mut self.node_mut(id).children,
            Children::Leaf(SmallVec::new()),
        );
        match children {
            Children::Leaf(entries) => out.extend(entries),
            Children::Internal(ids) => {
                for child in ids {
                    self.drain_subtree(child, out);
                }
            }
        }
        self.release(id);
    }

    /// Collapse single-child internal roots; an internal root left with no
    /// children becomes an empty leaf.
    fn shrink_root(&mut self) {
        loop {
            let root = self.root;
            let only_child = match &self.node(root).children {
                Children::Internal(ids) if ids.len() == 1 => Some(ids[0]),
                Children::Internal(ids) if ids.is_empty() => None,
                _ => return,
            };
            match only_child {
                Some(child) => {
                    self.node_mut(child).parent = None;
                    self.release(root);
                    self.root = child;
                }
                None => {
                    *self.node_mut(root) = Node::empty_leaf(None);
                    return;
                }
            }
        }
    }

    fn audit_node(
        &self,
        id: NodeId,
        expected_parent: Option<NodeId>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        count: &mut usize,
    ) -> Result<(), String> {
        let node = self.node(id);
        if node.parent != expected_parent {
            return Err(format!(
                "node {:?} has parent {:?}, expected {:?}",
                id, node.parent, expected_parent
            ));
        }
        if id != self.root && (node.len() < self.min_entries || node.len() > self.max_entries) {
            return Err(format!(
                "node {:?} has {} children, outside {}..={}",
                id,
                node.len(),
                self.min_entries,
                self.max_entries
            ));
        }

        let tight = match &node.children {
            Children::Leaf(entries) => entries
                .iter()
                .fold(Bounds::EMPTY, |acc, e| acc.union(&e.bounds)),
            Children::Internal(ids) => ids
                .iter()
                .fold(Bounds::EMPTY, |acc, c| acc.union(&self.node(*c).bounds)),
        };
        if tight != node.bounds {
            return Err(format!(
                "node {:?} bounds {:?} differ from union of children {:?}",
                id, node.bounds, tight
            ));
        }

        match &node.children {
            Children::Leaf(entries) => {
                match leaf_depth {
                    Some(expected) if *expected != depth => {
                        return Err(format!(
                            "leaf {:?} at depth {} but other leaves at {}",
                            id, depth, expected
                        ));
                    }
                    Some(_) => {}
                    None => *leaf_depth = Some(depth),
                }
                *count += entries.len();
            }
            Children::Internal(ids) => {
                for &child in ids {
                    self.audit_node(child, Some(id), depth + 1, leaf_depth, count)?;
                }
            }
        }
        Ok(())
    }
}

fn cmp_center_x(a: &Bounds, b: &Bounds) -> Ordering {
    a.center()
        .x
        .partial_cmp(&b.center().x)
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_box(rng: &mut fastrand::Rng, extent: f64, max_size: f64) -> Bounds {
        let x = rng.f64() * extent;
        let y = rng.f64() * extent;
        let w = rng.f64() * max_size;
        let h = rng.f64() * max_size;
        Bounds::new(x, y, x + w, y + h)
    }

    #[test]
    fn test_empty_tree() {
        let tree: RTree<u32> = RTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 1);
        assert!(tree.search(&Bounds::new(-180.0, -90.0, 180.0, 90.0)).is_empty());
        assert!(tree.audit().is_ok());
    }

    #[test]
    fn test_twenty_points_grow_the_tree() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut tree = RTree::with_fanout(4, 9).unwrap();

        for i in 0..20u32 {
            let lon = rng.f64() * 10.0;
            let lat = rng.f64() * 10.0;
            tree.insert(i, Bounds::new(lon, lat, lon, lat).expand(1e-6));
            if i == 9 {
                assert!(tree.depth() > 1, "tenth insert should split the root leaf");
            }
        }

        let mut all = tree.search(&Bounds::new(0.0, 0.0, 10.0, 10.0));
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
        assert!(tree.audit().is_ok());
    }

    #[test]
    fn test_search_matches_brute_force() {
        let mut rng = fastrand::Rng::with_seed(42);
        let mut tree = RTree::new();
        let mut boxes = Vec::new();
        for i in 0..500usize {
            let b = random_box(&mut rng, 100.0, 5.0);
            tree.insert(i, b);
            boxes.push(b);
        }

        for _ in 0..50 {
            let query = random_box(&mut rng, 100.0, 20.0);
            let mut found = tree.search(&query);
            found.sort_unstable();
            let expected: Vec<usize> = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| b.intersects(&query))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn test_randomized_mutations_keep_invariants() {
        let mut rng = fastrand::Rng::with_seed(1234);
        let mut tree = RTree::new();
        let mut live: Vec<(usize, Bounds)> = Vec::new();
        let mut next_id = 0usize;
        let mut removed = 0usize;

        for step in 0..1500 {
            if live.is_empty() || rng.u8(..) < 150 {
                let b = random_box(&mut rng, 50.0, 2.0);
                tree.insert(next_id, b);
                live.push((next_id, b));
                next_id += 1;
            } else {
                let index = rng.usize(..live.len());
                let (id, b) = live.swap_remove(index);
                assert!(tree.remove(&id, &b), "step {}: remove of {} failed", step, id);
                removed += 1;
            }
            assert_eq!(tree.len(), next_id - removed);
            if let Err(e) = tree.audit() {
                panic!("step {}: {}", step, e);
            }
        }

        while let Some((id, b)) = live.pop() {
            assert!(tree.remove(&id, &b));
            assert!(tree.audit().is_ok());
        }
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_remove_with_wrong_bounds_is_noop() {
        let mut tree = RTree::new();
        for i in 0..30u32 {
            let x = i as f64;
            tree.insert(i, Bounds::new(x, 0.0, x + 0.5, 0.5));
        }
        assert!(!tree.remove(&3, &Bounds::new(100.0, 100.0, 101.0, 101.0)));
        assert_eq!(tree.len(), 30);
        assert!(!tree.remove(&99, &Bounds::new(0.0, 0.0, 30.0, 1.0)));

        assert!(tree.remove_anywhere(&3));
        assert_eq!(tree.len(), 29);
        assert!(tree.audit().is_ok());
    }

    #[test]
    fn test_tie_break_takes_first_child() {
        let mut tree = RTree::with_fanout(2, 3).unwrap();
        tree.insert('a', Bounds::new(0.0, 0.0, 1.0, 1.0));
        tree.insert('b', Bounds::new(10.0, 0.0, 11.0, 1.0));
        tree.insert('c', Bounds::new(0.0, 0.0, 1.0, 1.0));
        tree.insert('d', Bounds::new(10.0, 0.0, 11.0, 1.0));
        assert_eq!(tree.depth(), 2);

        // Halfway between both children: equal growth, so the first wins.
        tree.insert('e', Bounds::new(5.5, 0.5, 5.5, 0.5));
        assert!(tree.audit().is_ok());
        assert_eq!(tree.indexed_bounds(&'e'), Some(Bounds::new(5.5, 0.5, 5.5, 0.5)));

        let Children::Internal(ids) = &tree.node(tree.root).children else {
            panic!("root should be internal");
        };
        let Children::Leaf(entries) = &tree.node(ids[0]).children else {
            panic!("first child should be a leaf");
        };
        assert!(entries.iter().any(|entry| entry.item == 'e'));
    }

    #[test]
    fn test_clear_resets() {
        let mut tree = RTree::new();
        for i in 0..100u32 {
            tree.insert(i, Bounds::new(i as f64, 0.0, i as f64 + 1.0, 1.0));
        }
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.bounds(), Bounds::EMPTY);
        assert!(tree.audit().is_ok());
    }

    #[test]
    fn test_zero_vertex_bounds_are_indexable() {
        let mut tree = RTree::new();
        tree.insert(1u8, Bounds::EMPTY);
        tree.insert(2u8, Bounds::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(tree.search(&Bounds::new(-1.0, -1.0, 2.0, 2.0)), vec![2]);
        assert!(!tree.remove(&1, &Bounds::EMPTY));
        assert!(tree.remove_anywhere(&1));
        assert_eq!(tree.len(), 1);
    }
}
