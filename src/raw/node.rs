use core::borrow::Borrow;

use smallvec::SmallVec;

use super::arena::Arena;
use super::element::{Element, ElementHandle};
use super::handle::Handle;
use crate::error::{Error, Result};
use crate::order::Order;

pub(crate) type NodeHandle<K, V> = Handle<Node<K, V>>;

// Orders up to 8 keep their elements inline, plus room for the transient overflow.
const INLINE_ELEMENTS: usize = 8;

pub(crate) type Elements<K, V> = SmallVec<[ElementHandle<K, V>; INLINE_ELEMENTS]>;

/// Position of a node in the tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Role {
    Root,
    Internal,
    Leaf,
}

/// An ordered run of elements.
///
/// Children are not stored here: child `i` is `elements[i].left()` and child `i + 1` is
/// `elements[i].right()`. The node only keeps navigational back-references to its parent
/// and to the parent elements bounding its key range on either side.
pub(crate) struct Node<K, V> {
    order: Order,
    role: Role,
    elements: Elements<K, V>,
    parent: Option<NodeHandle<K, V>>,
    // The parent element whose right child is this node (absent for the leftmost child).
    predecessor: Option<ElementHandle<K, V>>,
    // The parent element whose left child is this node (absent for the rightmost child).
    successor: Option<ElementHandle<K, V>>,
}

/// Result of searching for a key in a node.
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is where it would be inserted.
    NotFound(usize),
}

impl<K, V> Node<K, V> {
    /// Creates an empty node.
    pub(crate) fn new(order: Order, role: Role) -> Self {
        Self {
            order,
            role,
            elements: SmallVec::new(),
            parent: None,
            predecessor: None,
            successor: None,
        }
    }

    /// Creates a node holding `elements`, which must already be sorted.
    pub(crate) fn with_elements(order: Order, role: Role, elements: Elements<K, V>) -> Self {
        Self {
            elements,
            ..Self::new(order, role)
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// Returns true if inserts land in this node: a leaf, or the root of a one-level tree.
    pub(crate) fn is_leaf_level(&self, height: usize) -> bool {
        match self.role {
            Role::Leaf => true,
            Role::Root => height == 1,
            Role::Internal => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns true if the node holds more elements than its order allows.
    pub(crate) fn is_overflowing(&self) -> bool {
        self.elements.len() > self.order.max_elements()
    }

    /// Returns true if this non-root node holds fewer elements than its order requires.
    pub(crate) fn is_underflowing(&self) -> bool {
        self.role != Role::Root && self.elements.len() < self.order.min_elements()
    }

    /// Returns true if this node can lend an element to a sibling.
    pub(crate) fn can_lend(&self) -> bool {
        self.elements.len() > self.order.min_elements()
    }

    #[inline]
    pub(crate) fn element(&self, index: usize) -> ElementHandle<K, V> {
        self.elements[index]
    }

    pub(crate) fn elements(&self) -> &[ElementHandle<K, V>] {
        &self.elements
    }

    pub(crate) fn first(&self) -> Option<ElementHandle<K, V>> {
        self.elements.first().copied()
    }

    pub(crate) fn last(&self) -> Option<ElementHandle<K, V>> {
        self.elements.last().copied()
    }

    pub(crate) fn parent(&self) -> Option<NodeHandle<K, V>> {
        self.parent
    }

    pub(crate) fn predecessor(&self) -> Option<ElementHandle<K, V>> {
        self.predecessor
    }

    pub(crate) fn successor(&self) -> Option<ElementHandle<K, V>> {
        self.successor
    }

    /// Points this node at its parent and at the parent elements bounding it.
    pub(crate) fn attach(
        &mut self,
        parent: Option<NodeHandle<K, V>>,
        predecessor: Option<ElementHandle<K, V>>,
        successor: Option<ElementHandle<K, V>>,
    ) {
        self.parent = parent;
        self.predecessor = predecessor;
        self.successor = successor;
    }

    /// Searches for a key among this node's elements.
    #[inline]
    pub(crate) fn search<Q>(&self, elements: &Arena<Element<K, V>>, key: &Q) -> SearchResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.elements.binary_search_by(|&e| elements.get(e).key().borrow().cmp(key)) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    /// Inserts an element at the given position.
    ///
    /// A node may overflow by one element while an insert is in progress; anything beyond
    /// that means a split was skipped.
    pub(crate) fn insert(&mut self, index: usize, element: ElementHandle<K, V>) -> Result<()> {
        if self.is_overflowing() {
            return Err(Error::TreeInvariantViolation("insert into a node that was never split"));
        }
        self.elements.insert(index, element);
        Ok(())
    }

    /// Appends an element.
    pub(crate) fn push(&mut self, element: ElementHandle<K, V>) -> Result<()> {
        let len = self.elements.len();
        self.insert(len, element)
    }

    /// Removes and returns the element at the given position.
    pub(crate) fn remove(&mut self, index: usize) -> ElementHandle<K, V> {
        self.elements.remove(index)
    }

    /// Replaces the element at `index`, returning the previous one.
    pub(crate) fn replace(&mut self, index: usize, element: ElementHandle<K, V>) -> ElementHandle<K, V> {
        core::mem::replace(&mut self.elements[index], element)
    }

    /// Splits off the median. Returns (`median`, `right_elements`); this node keeps the
    /// elements left of the median.
    pub(crate) fn split(&mut self) -> Option<(ElementHandle<K, V>, Elements<K, V>)> {
        let mid = self.elements.len() / 2;
        let right: Elements<K, V> = self.elements.drain(mid + 1..).collect();
        let median = self.elements.pop()?;
        Some((median, right))
    }

    /// Takes all elements, leaving the node empty.
    pub(crate) fn take_all(&mut self) -> Elements<K, V> {
        core::mem::take(&mut self.elements)
    }

    /// Appends a run of elements from a merged sibling.
    pub(crate) fn append(&mut self, mut elements: Elements<K, V>) -> Result<()> {
        if self.elements.len() + elements.len() > self.order.max_elements() {
            return Err(Error::TreeInvariantViolation("merged node would exceed its capacity"));
        }
        self.elements.append(&mut elements);
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn order(n: usize) -> Order {
        Order::new(n).unwrap()
    }

    fn filled(order: Order, keys: &[u32]) -> (Arena<Element<u32, ()>>, Node<u32, ()>) {
        let mut elements = Arena::new();
        let mut nodes: Arena<Node<u32, ()>> = Arena::new();
        let handle = nodes.alloc(Node::new(order, Role::Leaf));
        let mut node = nodes.take(handle);
        for (i, &k) in keys.iter().enumerate() {
            let e = elements.alloc(Element::new(k, (), handle, i));
            node.push(e).unwrap();
        }
        (elements, node)
    }

    #[test]
    fn search_reports_found_and_insertion_points() {
        let (elements, node) = filled(order(5), &[10, 20, 30]);
        assert!(matches!(node.search(&elements, &20), SearchResult::Found(1)));
        assert!(matches!(node.search(&elements, &5), SearchResult::NotFound(0)));
        assert!(matches!(node.search(&elements, &25), SearchResult::NotFound(2)));
        assert!(matches!(node.search(&elements, &99), SearchResult::NotFound(3)));
    }

    #[test]
    fn overflow_by_one_is_allowed_but_not_two() {
        let (mut elements, mut node) = filled(order(3), &[1, 2, 3]);
        assert!(node.is_overflowing());
        let extra = elements.alloc(Element::new(4, (), Handle::from_index(0), 3));
        assert_eq!(
            node.push(extra),
            Err(Error::TreeInvariantViolation("insert into a node that was never split"))
        );
    }

    #[test]
    fn split_picks_the_lower_median() {
        let (elements, mut node) = filled(order(4), &[1, 2, 3, 4]);
        let (median, right) = node.split().unwrap();
        assert_eq!(*elements.get(median).key(), 3);
        assert_eq!(node.len(), 2);
        assert_eq!(right.len(), 1);
    }

    #[test]
    fn occupancy_limits_follow_the_order() {
        let (_, mut node) = filled(order(5), &[1, 2]);
        node.set_role(Role::Internal);
        assert!(!node.is_underflowing());
        assert!(!node.can_lend());
        node.remove(0);
        assert!(node.is_underflowing());
        node.set_role(Role::Root);
        assert!(!node.is_underflowing());
    }

    #[test]
    fn root_is_leaf_level_only_in_a_one_level_tree() {
        let node: Node<u32, ()> = Node::new(order(3), Role::Root);
        assert!(node.is_leaf_level(1));
        assert!(!node.is_leaf_level(2));
    }
}
