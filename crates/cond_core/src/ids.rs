use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Stable handle to one condition of value type `T`.
///
/// The index is dense and assigned in insertion order. It stays valid when the
/// underlying storage shifts, since it never encodes a byte offset.
pub struct ConditionId<T: ?Sized> {
    index: u32,
    _kind: PhantomData<fn(&T)>,
}

pub type BoolConditionId = ConditionId<bool>;
pub type CharConditionId = ConditionId<u8>;
pub type FloatConditionId = ConditionId<f32>;
pub type StringConditionId = ConditionId<[u8]>;

impl<T: ?Sized> ConditionId<T> {
    pub const fn from_index(index: u32) -> Self {
        Self { index, _kind: PhantomData }
    }

    pub const fn index(self) -> u32 {
        self.index
    }
}

impl<T: ?Sized> Clone for ConditionId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for ConditionId<T> {}

impl<T: ?Sized> PartialEq for ConditionId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T: ?Sized> Eq for ConditionId<T> {}

impl<T: ?Sized> Hash for ConditionId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for ConditionId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConditionId(#{})", self.index)
    }
}

impl<T: ?Sized> fmt::Display for ConditionId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub u32);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule #{}", self.0)
    }
}
