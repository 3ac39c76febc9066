//! Generally useful container types

pub mod unordered {
    //! Maps whose iteration order is not meant to matter.
    //!
    //! With the `deterministic_containers` feature (on by default), these are ordered maps, so
    //! that logs and exported listings come out the same from run to run. Without it, they are
    //! hash maps. Keys must therefore be both [`Hash`](std::hash::Hash) and [`Ord`].

    #[cfg(not(feature = "deterministic_containers"))]
    pub type UnorderedMap<K, V> = std::collections::HashMap<K, V>;
    #[cfg(feature = "deterministic_containers")]
    pub type UnorderedMap<K, V> = std::collections::BTreeMap<K, V>;

    /// The entries of `map`, sorted by key, regardless of the underlying map type.
    pub fn sorted_entries<K: Ord, V>(map: &UnorderedMap<K, V>) -> Vec<(&K, &V)> {
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
