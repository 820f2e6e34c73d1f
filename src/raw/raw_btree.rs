use core::borrow::Borrow;

use alloc::vec::Vec;

use tracing::{debug, trace, warn};

use super::arena::Arena;
use super::element::{Element, ElementHandle};
use super::node::{Elements, Node, NodeHandle, Role, SearchResult};
use crate::error::{Error, Result};
use crate::order::Order;

const MISSING_CHILD: Error = Error::TreeInvariantViolation("internal node is missing a child");

/// The core B-tree implementation backing `BTree`.
pub(crate) struct RawBTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    /// Arena storing all elements; nodes refer to them by handle.
    elements: Arena<Element<K, V>>,
    order: Order,
    root: NodeHandle<K, V>,
    /// Number of node levels; a lone root has height 1.
    height: usize,
    /// Total number of key-value pairs in the tree.
    len: usize,
}

/// Where `locate` decided a key belongs.
enum Location<K, V> {
    /// The key is already present in this element.
    Replace(ElementHandle<K, V>),
    /// The key goes immediately before this leaf element.
    LeftOf(ElementHandle<K, V>),
    /// The key goes immediately after this leaf element.
    RightOf(ElementHandle<K, V>),
    /// The tree holds no elements at all.
    EmptyRoot,
}

impl<K, V> RawBTree<K, V> {
    /// Creates a tree consisting of a single empty root.
    pub(crate) fn new(order: Order) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::new(order, Role::Root));
        Self {
            nodes,
            elements: Arena::new(),
            order,
            root,
            height: 1,
            len: 0,
        }
    }

    pub(crate) const fn order(&self) -> Order {
        self.order
    }

    pub(crate) const fn height(&self) -> usize {
        self.height
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every element and starts over with an empty root.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.elements.clear();
        self.root = self.nodes.alloc(Node::new(self.order, Role::Root));
        self.height = 1;
        self.len = 0;
    }

    /// Returns the child of `node` at child position `index` (0..=len).
    fn child(&self, node: NodeHandle<K, V>, index: usize) -> Option<NodeHandle<K, V>> {
        let node = self.nodes.get(node);
        if index == 0 {
            node.first().and_then(|e| self.elements.get(e).left())
        } else {
            self.elements.get(node.element(index - 1)).right()
        }
    }

    fn first_child(&self, node: NodeHandle<K, V>) -> Option<NodeHandle<K, V>> {
        self.nodes.get(node).first().and_then(|e| self.elements.get(e).left())
    }

    fn last_child(&self, node: NodeHandle<K, V>) -> Option<NodeHandle<K, V>> {
        self.nodes.get(node).last().and_then(|e| self.elements.get(e).right())
    }

    /// Rewrites every back-reference that hangs off `node`: each element's owning node and
    /// position, and each child's parent and bounding elements.
    fn relink(&mut self, node: NodeHandle<K, V>) {
        let handles = Elements::from_slice(self.nodes.get(node).elements());

        for (index, &e) in handles.iter().enumerate() {
            self.elements.get_mut(e).relocate(node, index);
        }

        for (index, &e) in handles.iter().enumerate() {
            let element = self.elements.get(e);
            let (left, right) = (element.left(), element.right());
            if index == 0 {
                if let Some(child) = left {
                    self.nodes.get_mut(child).attach(Some(node), None, Some(e));
                }
            }
            if let Some(child) = right {
                let successor = handles.get(index + 1).copied();
                self.nodes.get_mut(child).attach(Some(node), Some(e), successor);
            }
        }
    }

    /// Promotes `child` to root after the old root lost its last separator.
    fn demote_root(&mut self, old_root: NodeHandle<K, V>, child: NodeHandle<K, V>) {
        self.nodes.free(old_root);
        let node = self.nodes.get_mut(child);
        node.set_role(Role::Root);
        node.attach(None, None, None);
        self.root = child;
        self.height -= 1;
        debug!(root = child.to_index(), height = self.height, "root emptied; tree shrank a level");
    }

    /// Returns the keys of every node, level by level, left to right.
    pub(crate) fn levels(&self) -> Vec<Vec<Vec<&K>>> {
        let mut levels: Vec<Vec<Vec<&K>>> = Vec::with_capacity(self.height);
        let mut frontier = alloc::vec![self.root];

        while !frontier.is_empty() {
            let mut level = Vec::with_capacity(frontier.len());
            let mut next = Vec::new();
            for &handle in &frontier {
                let node = self.nodes.get(handle);
                level.push(node.elements().iter().map(|&e| self.elements.get(e).key()).collect::<Vec<_>>());
                next.extend((0..=node.len()).filter_map(|index| self.child(handle, index)));
            }
            levels.push(level);
            frontier = next;
        }

        levels
    }
}

impl<K: Ord, V> RawBTree<K, V> {
    /// Searches for a key and returns the element holding it.
    fn search<Q>(&self, key: &Q) -> Result<Option<ElementHandle<K, V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;

        loop {
            let node = self.nodes.get(current);
            match node.search(&self.elements, key) {
                SearchResult::Found(idx) => return Ok(Some(node.element(idx))),
                SearchResult::NotFound(_) if node.is_leaf_level(self.height) => return Ok(None),
                SearchResult::NotFound(idx) => current = self.child(current, idx).ok_or(MISSING_CHILD)?,
            }
        }
    }

    /// Returns a reference to the value corresponding to the key.
    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.search(key) {
            Ok(found) => found.map(|e| self.elements.get(e).value()),
            Err(error) => {
                warn!(%error, "lookup ran into a corrupt node");
                None
            }
        }
    }

    /// Descends from the root to the element holding `key`, or to the leaf position where
    /// it would be inserted.
    fn locate(&self, key: &K) -> Result<Location<K, V>> {
        let mut current = self.root;

        loop {
            let node = self.nodes.get(current);
            if node.is_empty() {
                if current == self.root && self.height == 1 {
                    return Ok(Location::EmptyRoot);
                }
                return Err(Error::TreeInvariantViolation("descended into an empty node"));
            }
            match node.search(&self.elements, key) {
                SearchResult::Found(idx) => return Ok(Location::Replace(node.element(idx))),
                SearchResult::NotFound(0) if node.is_leaf_level(self.height) => {
                    return Ok(Location::LeftOf(node.element(0)));
                }
                SearchResult::NotFound(idx) if node.is_leaf_level(self.height) => {
                    return Ok(Location::RightOf(node.element(idx - 1)));
                }
                SearchResult::NotFound(idx) => current = self.child(current, idx).ok_or(MISSING_CHILD)?,
            }
        }
    }

    /// Inserts a key-value pair into the tree.
    /// Returns `false` if the key was already present and only its value was replaced.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Result<bool> {
        let (node, index) = match self.locate(&key)? {
            Location::Replace(e) => {
                // Key exists, replace value in-place without touching the structure
                *self.elements.get_mut(e).value_mut() = value;
                return Ok(false);
            }
            Location::LeftOf(e) => {
                let element = self.elements.get(e);
                (element.node(), element.index())
            }
            Location::RightOf(e) => {
                let element = self.elements.get(e);
                (element.node(), element.index() + 1)
            }
            Location::EmptyRoot => (self.root, 0),
        };

        let element = self.elements.alloc(Element::new(key, value, node, index));
        if let Err(error) = self.nodes.get_mut(node).insert(index, element) {
            self.elements.free(element);
            return Err(error);
        }
        self.relink(node);
        self.len += 1;

        if self.nodes.get(node).is_overflowing() {
            self.split_and_propagate(node)?;
        }

        Ok(true)
    }

    /// Splits an overflowing node and keeps splitting ancestors until one has room.
    fn split_and_propagate(&mut self, mut node: NodeHandle<K, V>) -> Result<()> {
        while self.nodes.get(node).is_overflowing() {
            let role = if self.nodes.get(node).is_leaf_level(self.height) {
                Role::Leaf
            } else {
                Role::Internal
            };

            // `node` keeps the lower half. The median's children already coincide with the
            // last child of the lower half and the first child of the upper half.
            let (median, upper) = self
                .nodes
                .get_mut(node)
                .split()
                .ok_or(Error::TreeInvariantViolation("split of an empty node"))?;
            let right = self.nodes.alloc(Node::with_elements(self.order, role, upper));
            self.elements.get_mut(median).set_children(Some(node), Some(right));

            let parent = match self.nodes.get(node).parent() {
                Some(parent) => parent,
                None => {
                    let new_root = self.nodes.alloc(Node::new(self.order, Role::Root));
                    self.root = new_root;
                    self.height += 1;
                    debug!(root = new_root.to_index(), height = self.height, "root split; tree grew a level");
                    new_root
                }
            };
            self.nodes.get_mut(node).set_role(role);

            let position = self.nodes.get(node).predecessor().map_or(0, |p| self.elements.get(p).index() + 1);
            self.nodes.get_mut(parent).insert(position, median)?;
            // The element after the median used to bound `node`; it now bounds `right`.
            if let Some(&next) = self.nodes.get(parent).elements().get(position + 1) {
                self.elements.get_mut(next).set_left(Some(right));
            }

            self.relink(node);
            self.relink(right);
            self.relink(parent);

            trace!(
                left = node.to_index(),
                right = right.to_index(),
                parent = parent.to_index(),
                parent_len = self.nodes.get(parent).len(),
                "split node"
            );

            node = parent;
        }

        Ok(())
    }

    /// Removes a key from the tree and returns the key-value pair.
    pub(crate) fn remove_entry<Q>(&mut self, key: &Q) -> Result<Option<(K, V)>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let Some(target) = self.search(key)? else {
            return Ok(None);
        };

        let node = self.elements.get(target).node();
        if !self.nodes.get(node).is_leaf_level(self.height) {
            return self.substitute_and_remove(target).map(Some);
        }

        let index = self.elements.get(target).index();
        self.nodes.get_mut(node).remove(index);
        self.relink(node);
        let entry = self.elements.take(target).into_entry();
        self.len -= 1;

        self.rebalance(node, None)?;

        Ok(Some(entry))
    }

    /// Follows first children down to the leaf holding the smallest key under `node`.
    fn leftmost_leaf(&self, mut node: NodeHandle<K, V>) -> Result<NodeHandle<K, V>> {
        while !self.nodes.get(node).is_leaf_level(self.height) {
            node = self.first_child(node).ok_or(MISSING_CHILD)?;
        }
        Ok(node)
    }

    /// Follows last children down to the leaf holding the largest key under `node`.
    fn rightmost_leaf(&self, mut node: NodeHandle<K, V>) -> Result<NodeHandle<K, V>> {
        while !self.nodes.get(node).is_leaf_level(self.height) {
            node = self.last_child(node).ok_or(MISSING_CHILD)?;
        }
        Ok(node)
    }

    /// Removes an element stored in an internal node by moving its in-order successor (or,
    /// failing that, predecessor) up from a leaf into its place.
    ///
    /// The successor leaf is used only when it can spare an element. Otherwise the
    /// predecessor leaf donates regardless, and is rebalanced afterwards.
    fn substitute_and_remove(&mut self, target: ElementHandle<K, V>) -> Result<(K, V)> {
        let (node, index, left, right) = {
            let element = self.elements.get(target);
            (element.node(), element.index(), element.left(), element.right())
        };

        let successor_leaf = right.map(|child| self.leftmost_leaf(child)).transpose()?;
        let (leaf, donor, needs_rebalance) = match successor_leaf {
            Some(leaf) if self.nodes.get(leaf).can_lend() => (leaf, self.nodes.get(leaf).first(), false),
            _ => {
                let child = left.ok_or(Error::TreeInvariantViolation("no leaf can supply a substitute"))?;
                let leaf = self.rightmost_leaf(child)?;
                (leaf, self.nodes.get(leaf).last(), true)
            }
        };
        let donor = donor.ok_or(Error::TreeInvariantViolation("substitute leaf is empty"))?;

        let donor_index = self.elements.get(donor).index();
        self.nodes.get_mut(leaf).remove(donor_index);
        self.nodes.get_mut(node).replace(index, donor);
        self.elements.get_mut(donor).set_children(left, right);
        self.relink(node);
        self.relink(leaf);

        let entry = self.elements.take(target).into_entry();
        self.len -= 1;

        trace!(
            node = node.to_index(),
            leaf = leaf.to_index(),
            from_successor = !needs_rebalance,
            "substituted internal element"
        );

        if needs_rebalance {
            self.rebalance(leaf, None)?;
        }

        Ok(entry)
    }

    /// Restores minimum occupancy after `node` lost an element, walking up the tree while
    /// merges keep draining parents.
    ///
    /// `orphan` is the sole child of `node` when `node` is an internal node left without any
    /// elements; no element can refer to it in that state.
    fn rebalance(&mut self, mut node: NodeHandle<K, V>, mut orphan: Option<NodeHandle<K, V>>) -> Result<()> {
        loop {
            let current = self.nodes.get(node);
            if current.role() == Role::Root {
                if current.is_empty() {
                    if let Some(child) = orphan {
                        self.demote_root(node, child);
                    }
                }
                return Ok(());
            }
            if !current.is_underflowing() {
                return Ok(());
            }

            // Siblings are reached through the parent elements bounding this node.
            let left = current.predecessor().and_then(|p| Some((p, self.elements.get(p).left()?)));
            let right = current.successor().and_then(|s| Some((s, self.elements.get(s).right()?)));

            let (parent, merged) = match (left, right) {
                (Some((separator, sibling)), _) if self.nodes.get(sibling).can_lend() => {
                    return self.rotate_right(sibling, separator, node, orphan);
                }
                (_, Some((separator, sibling))) if self.nodes.get(sibling).can_lend() => {
                    return self.rotate_left(node, separator, sibling, orphan);
                }
                (Some((separator, sibling)), _) => self.merge(sibling, separator, node, orphan)?,
                (None, Some((separator, sibling))) => self.merge(node, separator, sibling, orphan)?,
                (None, None) => {
                    return Err(Error::TreeInvariantViolation("underflowing node has no sibling"));
                }
            };

            orphan = self.nodes.get(parent).is_empty().then_some(merged);
            node = parent;
        }
    }

    /// Borrows the left sibling's largest element: it replaces `separator` in the parent and
    /// `separator` becomes the smallest element of `node`.
    fn rotate_right(
        &mut self,
        left: NodeHandle<K, V>,
        separator: ElementHandle<K, V>,
        node: NodeHandle<K, V>,
        orphan: Option<NodeHandle<K, V>>,
    ) -> Result<()> {
        let lender = self.nodes.get_mut(left);
        let borrowed = lender.remove(lender.len() - 1);
        let (parent, separator_index) = {
            let element = self.elements.get(separator);
            (element.node(), element.index())
        };

        let moved_child = self.elements.get(borrowed).right();
        let first_child = self.first_child(node).or(orphan);

        self.nodes.get_mut(parent).replace(separator_index, borrowed);
        self.elements.get_mut(borrowed).set_children(Some(left), Some(node));
        self.elements.get_mut(separator).set_children(moved_child, first_child);
        self.nodes.get_mut(node).insert(0, separator)?;

        self.relink(left);
        self.relink(node);
        self.relink(parent);

        trace!(from = left.to_index(), to = node.to_index(), "rotated right");
        Ok(())
    }

    /// Borrows the right sibling's smallest element: it replaces `separator` in the parent
    /// and `separator` becomes the largest element of `node`.
    fn rotate_left(
        &mut self,
        node: NodeHandle<K, V>,
        separator: ElementHandle<K, V>,
        right: NodeHandle<K, V>,
        orphan: Option<NodeHandle<K, V>>,
    ) -> Result<()> {
        let borrowed = self.nodes.get_mut(right).remove(0);
        let (parent, separator_index) = {
            let element = self.elements.get(separator);
            (element.node(), element.index())
        };

        let moved_child = self.elements.get(borrowed).left();
        let last_child = self.last_child(node).or(orphan);

        self.nodes.get_mut(parent).replace(separator_index, borrowed);
        self.elements.get_mut(borrowed).set_children(Some(node), Some(right));
        self.elements.get_mut(separator).set_children(last_child, moved_child);
        self.nodes.get_mut(node).push(separator)?;

        self.relink(right);
        self.relink(node);
        self.relink(parent);

        trace!(from = right.to_index(), to = node.to_index(), "rotated left");
        Ok(())
    }

    /// Pulls `separator` down out of the parent and folds it, along with every element of
    /// `right`, into `left`. `right` is freed.
    ///
    /// Returns the parent and the merged node.
    fn merge(
        &mut self,
        left: NodeHandle<K, V>,
        separator: ElementHandle<K, V>,
        right: NodeHandle<K, V>,
        orphan: Option<NodeHandle<K, V>>,
    ) -> Result<(NodeHandle<K, V>, NodeHandle<K, V>)> {
        let (parent, separator_index) = {
            let element = self.elements.get(separator);
            (element.node(), element.index())
        };

        let inner_left = self.last_child(left).or(orphan);
        let inner_right = self.first_child(right).or(orphan);
        self.elements.get_mut(separator).set_children(inner_left, inner_right);

        self.nodes.get_mut(parent).remove(separator_index);
        // The element after the separator used to bound `right`; it now bounds `left`.
        if let Some(&next) = self.nodes.get(parent).elements().get(separator_index) {
            self.elements.get_mut(next).set_left(Some(left));
        }

        let absorbed = self.nodes.get_mut(right).take_all();
        let merged = self.nodes.get_mut(left);
        merged.push(separator)?;
        merged.append(absorbed)?;
        self.nodes.free(right);

        self.relink(left);
        self.relink(parent);

        trace!(
            into = left.to_index(),
            len = self.nodes.get(left).len(),
            parent = parent.to_index(),
            parent_len = self.nodes.get(parent).len(),
            "merged nodes"
        );
        Ok((parent, left))
    }
}

/// One node awaiting inspection in `validate`, along with what its surroundings promise.
struct Frame<'a, K, V> {
    node: NodeHandle<K, V>,
    depth: usize,
    lower: Option<&'a K>,
    upper: Option<&'a K>,
    parent: Option<NodeHandle<K, V>>,
    predecessor: Option<ElementHandle<K, V>>,
    successor: Option<ElementHandle<K, V>>,
}

impl<K: Ord, V> RawBTree<K, V> {
    /// Walks the whole tree and checks every structural invariant.
    pub(crate) fn validate(&self) -> Result<()> {
        let violation = Error::TreeInvariantViolation;
        let mut stack = alloc::vec![Frame {
            node: self.root,
            depth: 1,
            lower: None,
            upper: None,
            parent: None,
            predecessor: None,
            successor: None,
        }];
        let mut node_count = 0;
        let mut element_count = 0;

        while let Some(frame) = stack.pop() {
            if !self.nodes.contains(frame.node) {
                return Err(violation("child handle refers to a freed node"));
            }
            let node = self.nodes.get(frame.node);
            node_count += 1;
            element_count += node.len();

            let is_root = frame.node == self.root;
            let leaf_level = frame.depth == self.height;
            let expected_role = match (is_root, leaf_level) {
                (true, _) => Role::Root,
                (false, true) => Role::Leaf,
                (false, false) => Role::Internal,
            };
            if node.role() != expected_role {
                return Err(violation("node role does not match its position"));
            }
            if node.is_overflowing() {
                return Err(violation("node holds more elements than its order allows"));
            }
            if node.is_underflowing() {
                return Err(violation("non-root node holds fewer elements than its order requires"));
            }
            if !leaf_level && node.is_empty() {
                return Err(violation("internal node has no elements"));
            }
            if node.parent() != frame.parent
                || node.predecessor() != frame.predecessor
                || node.successor() != frame.successor
            {
                return Err(violation("node back-references are stale"));
            }

            let handles = node.elements();
            for (index, &e) in handles.iter().enumerate() {
                let element = self.elements.get(e);
                if element.node() != frame.node || element.index() != index {
                    return Err(violation("element owning node or position is stale"));
                }

                let lower = if index == 0 {
                    frame.lower
                } else {
                    Some(self.elements.get(handles[index - 1]).key())
                };
                if lower.is_some_and(|lower| lower >= element.key()) || frame.upper.is_some_and(|upper| upper <= element.key()) {
                    return Err(violation("keys are out of order"));
                }

                if let Some(&next) = handles.get(index + 1) {
                    if element.right() != self.elements.get(next).left() {
                        return Err(violation("adjacent elements disagree on their shared child"));
                    }
                }

                if leaf_level {
                    if element.left().is_some() || element.right().is_some() {
                        return Err(violation("leaf element has a child"));
                    }
                    continue;
                }

                let upper = handles.get(index + 1).map(|&next| self.elements.get(next).key()).or(frame.upper);
                let Some(right) = element.right() else {
                    return Err(MISSING_CHILD);
                };
                stack.push(Frame {
                    node: right,
                    depth: frame.depth + 1,
                    lower: Some(element.key()),
                    upper,
                    parent: Some(frame.node),
                    predecessor: Some(e),
                    successor: handles.get(index + 1).copied(),
                });
                if index == 0 {
                    let Some(left) = element.left() else {
                        return Err(MISSING_CHILD);
                    };
                    stack.push(Frame {
                        node: left,
                        depth: frame.depth + 1,
                        lower: frame.lower,
                        upper: Some(element.key()),
                        parent: Some(frame.node),
                        predecessor: None,
                        successor: Some(e),
                    });
                }
            }
        }

        if element_count != self.len || self.elements.len() != self.len {
            return Err(violation("element count does not match the tree length"));
        }
        if node_count != self.nodes.len() {
            return Err(violation("node arena holds unreachable nodes"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::vec;

    fn tree(order: usize, keys: impl IntoIterator<Item = u32>) -> RawBTree<u32, u32> {
        let mut tree = RawBTree::new(Order::new(order).unwrap());
        for key in keys {
            assert!(tree.insert(key, key * 10).unwrap());
            tree.validate().unwrap();
        }
        tree
    }

    fn shape(tree: &RawBTree<u32, u32>) -> Vec<Vec<Vec<u32>>> {
        tree.levels()
            .into_iter()
            .map(|level| {
                level
                    .into_iter()
                    .map(|node| node.into_iter().copied().collect::<Vec<_>>())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn root_split_grows_the_tree() {
        let tree = tree(3, 1..=3);
        assert_eq!(tree.height(), 2);
        assert_eq!(shape(&tree), vec![vec![vec![2]], vec![vec![1], vec![3]]]);

        let root = tree.nodes.get(tree.root);
        assert_eq!(root.role(), Role::Root);
        let separator = root.element(0);
        let left = tree.elements.get(separator).left().unwrap();
        let right = tree.elements.get(separator).right().unwrap();
        assert_eq!(tree.nodes.get(left).role(), Role::Leaf);
        assert_eq!(tree.nodes.get(left).successor(), Some(separator));
        assert_eq!(tree.nodes.get(right).predecessor(), Some(separator));
        assert_eq!(tree.nodes.get(right).parent(), Some(tree.root));
    }

    #[test]
    fn internal_split_rewires_the_next_separator() {
        // 1..=7 in a 2-3 tree cascades a leaf split into a root split.
        let tree = tree(3, 1..=7);
        assert_eq!(tree.height(), 3);
        assert_eq!(
            shape(&tree),
            vec![
                vec![vec![4]],
                vec![vec![2], vec![6]],
                vec![vec![1], vec![3], vec![5], vec![7]],
            ]
        );
    }

    #[test]
    fn replace_keeps_the_structure() {
        let mut tree = tree(3, 1..=5);
        let before = shape(&tree);
        assert!(!tree.insert(4, 99).unwrap());
        assert_eq!(shape(&tree), before);
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.get(&4), Some(&99));
    }

    #[test]
    fn successor_with_surplus_replaces_internal_element() {
        let mut tree = tree(3, 1..=4);
        assert_eq!(shape(&tree), vec![vec![vec![2]], vec![vec![1], vec![3, 4]]]);

        assert_eq!(tree.remove_entry(&2).unwrap(), Some((2, 20)));
        tree.validate().unwrap();
        assert_eq!(shape(&tree), vec![vec![vec![3]], vec![vec![1], vec![4]]]);
        assert_eq!(tree.get(&3), Some(&30));
    }

    #[test]
    fn predecessor_is_used_when_successor_cannot_spare() {
        let mut tree = tree(3, [2, 1, 3, 0]);
        assert_eq!(shape(&tree), vec![vec![vec![2]], vec![vec![0, 1], vec![3]]]);

        assert_eq!(tree.remove_entry(&2).unwrap(), Some((2, 20)));
        tree.validate().unwrap();
        assert_eq!(shape(&tree), vec![vec![vec![1]], vec![vec![0], vec![3]]]);
        assert_eq!(tree.get(&1), Some(&10));
    }

    #[test]
    fn predecessor_donates_even_without_surplus() {
        let mut tree = tree(3, 1..=3);
        assert_eq!(tree.remove_entry(&2).unwrap(), Some((2, 20)));
        tree.validate().unwrap();
        // The predecessor leaf [1] was drained and merged back with [3].
        assert_eq!(tree.height(), 1);
        assert_eq!(shape(&tree), vec![vec![vec![1, 3]]]);
    }

    #[test]
    fn leaf_underflow_rotates_from_left_sibling() {
        let mut tree = tree(3, [2, 1, 3, 0]);
        assert_eq!(tree.remove_entry(&3).unwrap(), Some((3, 30)));
        tree.validate().unwrap();
        assert_eq!(shape(&tree), vec![vec![vec![1]], vec![vec![0], vec![2]]]);
    }

    #[test]
    fn leaf_underflow_rotates_from_right_sibling() {
        let mut tree = tree(3, 1..=4);
        assert_eq!(tree.remove_entry(&1).unwrap(), Some((1, 10)));
        tree.validate().unwrap();
        assert_eq!(shape(&tree), vec![vec![vec![3]], vec![vec![2], vec![4]]]);
    }

    #[test]
    fn internal_underflow_rotates_children_along() {
        // Root [4] over [2] and [6, 8]; deleting 1 drains the left half.
        let mut tree = tree(3, 1..=9);
        assert_eq!(
            shape(&tree),
            vec![
                vec![vec![4]],
                vec![vec![2], vec![6, 8]],
                vec![vec![1], vec![3], vec![5], vec![7], vec![9]],
            ]
        );

        assert!(tree.remove_entry(&1).unwrap().is_some());
        tree.validate().unwrap();
        assert_eq!(
            shape(&tree),
            vec![
                vec![vec![6]],
                vec![vec![4], vec![8]],
                vec![vec![2, 3], vec![5], vec![7], vec![9]],
            ]
        );
    }

    #[test]
    fn merge_cascade_demotes_the_root() {
        let mut tree = tree(3, 1..=7);
        assert!(tree.remove_entry(&1).unwrap().is_some());
        tree.validate().unwrap();
        assert_eq!(tree.height(), 2);
        assert_eq!(shape(&tree), vec![vec![vec![4, 6]], vec![vec![2, 3], vec![5], vec![7]]]);
    }

    #[test]
    fn emptying_a_lone_root_keeps_height_one() {
        let mut tree = tree(4, [5]);
        assert_eq!(tree.remove_entry(&5).unwrap(), Some((5, 50)));
        tree.validate().unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        assert!(tree.nodes.get(tree.root).is_empty());
    }

    #[test]
    fn missing_key_is_not_an_error() {
        let mut tree = tree(4, 1..=20);
        assert_eq!(tree.remove_entry(&99).unwrap(), None);
        assert_eq!(tree.get(&0), None);
        assert_eq!(tree.len(), 20);
    }

    #[test]
    fn clear_resets_to_a_single_root() {
        let mut tree = tree(3, 1..=10);
        tree.clear();
        tree.validate().unwrap();
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.nodes.len(), 1);
        assert!(tree.insert(1, 1).unwrap());
    }

    #[test]
    fn underflow_without_siblings_is_an_invariant_violation() {
        let mut tree = tree(3, 1..=3);
        let separator = tree.nodes.get(tree.root).element(0);
        let leaf = tree.elements.get(separator).left().unwrap();

        // Cut the leaf off from both bounding elements and drain it.
        tree.nodes.get_mut(leaf).attach(Some(tree.root), None, None);
        let only = tree.nodes.get_mut(leaf).remove(0);
        tree.elements.free(only);

        assert_eq!(
            tree.rebalance(leaf, None),
            Err(Error::TreeInvariantViolation("underflowing node has no sibling"))
        );
    }

    #[test]
    fn validate_detects_a_broken_shared_child() {
        let mut tree = tree(4, 1..=10);
        tree.validate().unwrap();

        let root = tree.nodes.get(tree.root);
        let first = root.element(0);
        let left = tree.elements.get(first).left();
        tree.elements.get_mut(first).set_children(left, None);

        assert!(matches!(tree.validate(), Err(Error::TreeInvariantViolation(_))));
    }

    #[test]
    fn corrupt_descent_is_reported_by_mutations() {
        let mut tree = tree(3, 1..=3);
        let separator = tree.nodes.get(tree.root).element(0);
        tree.elements.get_mut(separator).set_left(None);

        assert_eq!(tree.insert(0, 0), Err(MISSING_CHILD));
        assert_eq!(tree.remove_entry(&1), Err(MISSING_CHILD));
        assert_eq!(tree.get(&1), None);
    }

    #[test]
    fn internal_delete_without_children_is_an_invariant_violation() {
        let mut tree = tree(3, 1..=3);
        let separator = tree.nodes.get(tree.root).element(0);
        tree.elements.get_mut(separator).set_children(None, None);

        assert_eq!(
            tree.remove_entry(&2),
            Err(Error::TreeInvariantViolation("no leaf can supply a substitute"))
        );
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn failed_insert_releases_its_element() {
        let mut tree = tree(3, [1, 3]);
        let root = tree.root;
        // A leaf that overflowed without being split.
        let stray = tree.elements.alloc(Element::new(5, 50, root, 2));
        tree.nodes.get_mut(root).push(stray).unwrap();

        assert_eq!(
            tree.insert(2, 20),
            Err(Error::TreeInvariantViolation("insert into a node that was never split"))
        );
        assert_eq!(tree.elements.len(), 3);
        assert_eq!(tree.len(), 2);
    }
}
