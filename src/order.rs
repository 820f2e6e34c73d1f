use core::fmt;

use crate::error::{Error, Result};

/// The order of a [`BTree`](crate::BTree): the maximum number of children of a node.
///
/// A node of order `m` holds at most `m - 1` elements and, unless it is the root, at least
/// `ceil(m / 2) - 1`. The smallest valid order is 3, which yields a 2-3 tree.
///
/// # Examples
///
/// ```
/// use element_btree::Order;
///
/// let order = Order::new(4).unwrap();
/// assert_eq!(order.max_elements(), 3);
/// assert_eq!(order.min_elements(), 1);
///
/// assert!(Order::new(2).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(usize);

impl Order {
    /// The smallest order accepted by [`Order::new`].
    pub const MIN: usize = 3;

    /// Validates `order`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order` is 2 or less.
    pub const fn new(order: usize) -> Result<Self> {
        if order < Self::MIN {
            return Err(Error::InvalidOrder(order));
        }
        Ok(Self(order))
    }

    /// Returns the order as a plain number.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Maximum number of elements in any node.
    #[must_use]
    pub const fn max_elements(self) -> usize {
        self.0 - 1
    }

    /// Minimum number of elements in any node other than the root.
    #[must_use]
    pub const fn min_elements(self) -> usize {
        self.0.div_ceil(2) - 1
    }
}

impl TryFrom<usize> for Order {
    type Error = Error;

    fn try_from(order: usize) -> Result<Self> {
        Self::new(order)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(Order, usize);

    #[test]
    fn orders_below_three_are_rejected() {
        for order in 0..=2 {
            assert_eq!(Order::new(order), Err(Error::InvalidOrder(order)));
        }
    }

    #[test]
    fn two_three_tree_limits() {
        let order = Order::try_from(3).unwrap();
        assert_eq!(order.max_elements(), 2);
        assert_eq!(order.min_elements(), 1);
    }

    proptest! {
        #[test]
        fn limits_leave_room_to_split(order in Order::MIN..512usize) {
            let order = Order::new(order).unwrap();
            // Splitting an overflowing node must leave both halves at or above the minimum.
            let overflow = order.max_elements() + 1;
            let left = overflow / 2;
            let right = overflow - left - 1;
            prop_assert!(left >= order.min_elements());
            prop_assert!(right >= order.min_elements());
            prop_assert!(order.min_elements() >= 1);
        }
    }
}
