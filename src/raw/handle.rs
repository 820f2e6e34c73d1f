use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::num::NonZero;

#[cfg(test)]
type RawHandle = u16;
#[cfg(not(test))]
type RawHandle = u32;

/// Index of a slot in an [`Arena<T>`](super::arena::Arena).
///
/// The type parameter only records which arena the handle belongs to, so a node handle
/// can never be used to look up an element and vice versa.
#[repr(transparent)]
pub(crate) struct Handle<T>(NonZero<RawHandle>, PhantomData<fn() -> T>);

impl<T> Handle<T> {
    pub(crate) const MAX: usize = (RawHandle::MAX - 1) as usize;

    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        assert!(index <= Self::MAX, "`Handle::from_index()` - `index` > `Handle::MAX`!");
        // `index + 1` cannot be zero and cannot overflow.
        #[allow(clippy::cast_possible_truncation)]
        Self(NonZero::new((index + 1) as RawHandle).unwrap(), PhantomData)
    }

    #[inline]
    pub(crate) const fn to_index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

// Manual impls: deriving would put needless bounds on `T`.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_index())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use static_assertions::assert_eq_size;

    // Verify our assumptions about `Handle` and the niche optimization.
    assert_eq_size!(Handle<u8>, Option<Handle<u8>>);
    assert_eq_size!(Handle<u64>, RawHandle);

    #[test]
    #[should_panic(expected = "`Handle::from_index()` - `index` > `Handle::MAX`!")]
    fn invalid_handle() {
        let _ = Handle::<u8>::from_index(Handle::<u8>::MAX + 1);
    }

    #[test]
    fn handles_compare_by_index() {
        let a: Handle<u8> = Handle::from_index(3);
        let b: Handle<u8> = Handle::from_index(3);
        let c: Handle<u8> = Handle::from_index(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    proptest! {
        #[test]
        fn handle_round_trip(index in 0..=Handle::<u8>::MAX) {
            let handle: Handle<u8> = Handle::from_index(index);
            assert_eq!(handle.to_index(), index);
        }
    }
}
