//! Hashing-based collection aliases configured with a specific hasher, used
//! throughout the registry and host fixtures.

/// [`indexmap::IndexMap`] configured with a specific hasher.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

/// [`std::collections::HashMap`] configured with a specific hasher.
pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
