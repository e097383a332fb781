use std::hash::{BuildHasher, Hash, Hasher};
pub use fxhash::{FxHashMap, FxHashSet, FxHasher};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FxHashBuilder;

pub type HashMap<K, V> = FxHashMap<K, V>;
pub type HashSet<K> = FxHashSet<K>;

impl BuildHasher for FxHashBuilder {
    type Hasher = FxHasher;
    fn build_hasher(&self) -> Self::Hasher {
        FxHasher::default()
    }
}

/// Hashes a value with the same hasher the IR tables use.
#[inline]
pub fn fx_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}
