use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Wrapper type whose "identity" for equality and hashing is determined from the reference itself
/// (ie. the pointer) and not from the underlying data.
///
/// Handles into the generator arenas (`ClassId`, `MethodId`, `FieldId`) are all `RefId`s: two
/// handles are the same entity exactly when they point at the same arena entry, which is what the
/// interning registries guarantee for identical declarations.
pub struct RefId<'a, T>(pub &'a T);

impl<'a, T> RefId<'a, T> {
    /// Check whether two handles refer to the same arena entry
    pub fn same(self, other: RefId<'a, T>) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl<'a, T> Clone for RefId<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for RefId<'a, T> {}

impl<'a, T> Deref for RefId<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

impl<'a, T> Hash for RefId<'a, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state)
    }
}

impl<'a, 'b, T> PartialEq<RefId<'b, T>> for RefId<'a, T> {
    fn eq(&self, other: &RefId<'b, T>) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl<'a, T> Eq for RefId<'a, T> {}

impl<'a, T: fmt::Debug> fmt::Debug for RefId<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
