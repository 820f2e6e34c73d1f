use super::handle::Handle;
use super::node::NodeHandle;

/// A single key/value entry together with the subtrees on either side of it.
///
/// Two elements that are neighbours in a node share the child between them:
/// `a.right() == b.left()` always holds once an operation completes.
pub(crate) struct Element<K, V> {
    key: K,
    value: V,
    // Owning node and position in it, rewritten whenever the element moves.
    node: NodeHandle<K, V>,
    index: usize,
    left: Option<NodeHandle<K, V>>,
    right: Option<NodeHandle<K, V>>,
}

pub(crate) type ElementHandle<K, V> = Handle<Element<K, V>>;

impl<K, V> Element<K, V> {
    /// Creates a detached element owned by `node`; the caller places it at `index`.
    pub(crate) fn new(key: K, value: V, node: NodeHandle<K, V>, index: usize) -> Self {
        Self {
            key,
            value,
            node,
            index,
            left: None,
            right: None,
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    pub(crate) fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub(crate) fn into_entry(self) -> (K, V) {
        (self.key, self.value)
    }

    #[inline]
    pub(crate) fn node(&self) -> NodeHandle<K, V> {
        self.node
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Records the element's new home after it was moved or shifted.
    pub(crate) fn relocate(&mut self, node: NodeHandle<K, V>, index: usize) {
        self.node = node;
        self.index = index;
    }

    /// Subtree holding keys smaller than this element's key.
    #[inline]
    pub(crate) fn left(&self) -> Option<NodeHandle<K, V>> {
        self.left
    }

    /// Subtree holding keys greater than this element's key.
    #[inline]
    pub(crate) fn right(&self) -> Option<NodeHandle<K, V>> {
        self.right
    }

    pub(crate) fn set_left(&mut self, left: Option<NodeHandle<K, V>>) {
        self.left = left;
    }

    pub(crate) fn set_children(&mut self, left: Option<NodeHandle<K, V>>, right: Option<NodeHandle<K, V>>) {
        self.left = left;
        self.right = right;
    }
}
