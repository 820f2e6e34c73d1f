//! The [`BTree`] index and its public operations.

use core::borrow::Borrow;
use core::fmt;

use alloc::vec::Vec;

use crate::error::Result;
use crate::order::Order;
use crate::raw::RawBTree;

/// An ordered key/value index based on a [B-Tree] of configurable order.
///
/// Keys must implement [`Ord`]. Every node of a tree of order `m` holds at most `m - 1`
/// keys and, except for the root, at least `ceil(m / 2) - 1`; all leaves sit at the same
/// depth. Lookups, insertions, and deletions take O(log n) node visits.
///
/// It is a logic error for a key to be modified in such a way that the key's ordering relative to
/// any other key, as determined by the [`Ord`] trait, changes while it is in the tree. The
/// resulting behavior is unspecified but confined to the `BTree`: lookups may miss and
/// mutations may return [`Error::TreeInvariantViolation`](crate::Error::TreeInvariantViolation).
///
/// # Examples
///
/// ```
/// use element_btree::BTree;
///
/// // type inference lets us omit an explicit type signature (which
/// // would be `BTree<u32, &str>` in this example).
/// let mut rooms = BTree::new(3)?;
///
/// rooms.insert(101, "single")?;
/// rooms.insert(204, "double")?;
/// rooms.insert(310, "suite")?;
///
/// if rooms.find(&999).is_none() {
///     println!("We have {} rooms, but not room 999.", rooms.len());
/// }
///
/// // renovations turned 204 into a suite.
/// let inserted = rooms.insert(204, "suite")?;
/// assert!(!inserted);
///
/// // 101 is closed for good.
/// assert!(rooms.delete(&101)?);
/// assert_eq!(rooms.len(), 2);
/// # Ok::<(), element_btree::Error>(())
/// ```
///
/// [B-Tree]: https://en.wikipedia.org/wiki/B-tree
pub struct BTree<K, V> {
    raw: RawBTree<K, V>,
}

impl<K, V> BTree<K, V> {
    /// Makes a new, empty `BTree` of the given order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`](crate::Error::InvalidOrder) if `order` is 2 or less.
    ///
    /// # Examples
    ///
    /// ```
    /// use element_btree::{BTree, Error};
    ///
    /// let tree: BTree<i32, &str> = BTree::new(5)?;
    /// assert!(tree.is_empty());
    ///
    /// assert!(matches!(BTree::<i32, &str>::new(2), Err(Error::InvalidOrder(2))));
    /// # Ok::<(), Error>(())
    /// ```
    pub fn new(order: usize) -> Result<Self> {
        Ok(Self::with_order(Order::new(order)?))
    }

    /// Makes a new, empty `BTree` from an already validated [`Order`].
    #[must_use]
    pub fn with_order(order: Order) -> Self {
        BTree {
            raw: RawBTree::new(order),
        }
    }

    /// Returns the order the tree was built with.
    #[must_use]
    pub fn order(&self) -> Order {
        self.raw.order()
    }

    /// Returns the number of node levels. An empty tree, or one that fits in its root, has
    /// height 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use element_btree::BTree;
    ///
    /// let mut tree = BTree::new(3)?;
    /// tree.insert(1, ())?;
    /// tree.insert(2, ())?;
    /// assert_eq!(tree.height(), 1);
    /// tree.insert(3, ())?; // the root splits
    /// assert_eq!(tree.height(), 2);
    /// # Ok::<(), element_btree::Error>(())
    /// ```
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Returns the number of keys in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Removes every key, leaving an empty tree of the same order.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns the keys of every node, level by level from the root down, each level
    /// listed left to right.
    ///
    /// This is a breadth-first walk along the elements' child links and is meant for
    /// dumping or inspecting the tree's shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use element_btree::BTree;
    ///
    /// let mut tree = BTree::new(3)?;
    /// for key in 1..=3 {
    ///     tree.insert(key, ())?;
    /// }
    /// assert_eq!(tree.levels(), vec![vec![vec![&2]], vec![vec![&1], vec![&3]]]);
    /// # Ok::<(), element_btree::Error>(())
    /// ```
    #[must_use]
    pub fn levels(&self) -> Vec<Vec<Vec<&K>>> {
        self.raw.levels()
    }
}

impl<K: Ord, V> BTree<K, V> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the tree's key type, but the ordering
    /// on the borrowed form *must* match the ordering on the key type.
    ///
    /// A lookup that runs into a corrupt node is logged as a warning and also returns
    /// `None`. Use [`validate`](Self::validate) to tell corruption apart from a missing key.
    ///
    /// # Examples
    ///
    /// ```
    /// use element_btree::BTree;
    ///
    /// let mut tree = BTree::new(4)?;
    /// tree.insert(1, "a")?;
    /// assert_eq!(tree.find(&1), Some(&"a"));
    /// assert_eq!(tree.find(&2), None);
    /// # Ok::<(), element_btree::Error>(())
    /// ```
    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns `true` if the tree contains a value for the specified key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key).is_some()
    }

    /// Inserts a key-value pair into the tree.
    ///
    /// Returns `true` if the key was new. If the key was already present its value is
    /// replaced, the tree's shape is left untouched, and `false` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TreeInvariantViolation`](crate::Error::TreeInvariantViolation) if the
    /// descent or a split runs into a broken node.
    ///
    /// # Examples
    ///
    /// ```
    /// use element_btree::BTree;
    ///
    /// let mut tree = BTree::new(4)?;
    /// assert!(tree.insert(37, "a")?);
    /// assert!(!tree.insert(37, "b")?);
    /// assert_eq!(tree.find(&37), Some(&"b"));
    /// assert_eq!(tree.len(), 1);
    /// # Ok::<(), element_btree::Error>(())
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<bool> {
        self.raw.insert(key, value)
    }

    /// Removes a key from the tree, returning `true` if it was present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TreeInvariantViolation`](crate::Error::TreeInvariantViolation) if
    /// rebalancing finds the tree in an impossible state, such as an underflowing node
    /// without siblings.
    ///
    /// # Examples
    ///
    /// ```
    /// use element_btree::BTree;
    ///
    /// let mut tree = BTree::new(4)?;
    /// tree.insert(1, "a")?;
    /// assert!(tree.delete(&1)?);
    /// assert!(!tree.delete(&1)?);
    /// # Ok::<(), element_btree::Error>(())
    /// ```
    pub fn delete<Q>(&mut self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        Ok(self.raw.remove_entry(key)?.is_some())
    }

    /// Removes a key from the tree, returning the stored key and value if it was present.
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`delete`](Self::delete).
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Result<Option<(K, V)>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove_entry(key)
    }

    /// Checks every structural invariant of the tree.
    ///
    /// The checks cover key ordering within and across nodes, equal leaf depth, per-node
    /// occupancy, the links between elements, nodes, and their parents, and the cached
    /// length.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::TreeInvariantViolation`](crate::Error::TreeInvariantViolation)
    /// found.
    pub fn validate(&self) -> Result<()> {
        self.raw.validate()
    }
}

impl<K: fmt::Debug, V> fmt::Debug for BTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTree")
            .field("order", &self.order().get())
            .field("height", &self.height())
            .field("len", &self.len())
            .field("levels", &self.levels())
            .finish()
    }
}
