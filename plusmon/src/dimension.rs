//! Ordered dimension sets attached to every emitted metric.
//!
//! A [`DimensionSet`] keeps its keys unique. Inserting a key that is already
//! present replaces the value in place, so when sets are merged the set applied
//! last wins any collision. Global dimensions are always merged last for this
//! reason.

use std::fmt;

/// Mapping from dimension name to value, unique by name, in first-insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionSet {
    inner: Vec<(String, String)>,
}

impl DimensionSet {
    /// Create an empty [`DimensionSet`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` with `value`, overwriting any existing value for `key`.
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.inner.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.inner.push((key, value));
        }
    }

    /// Apply every entry of `other` on top of this set.
    pub fn merge(&mut self, other: &DimensionSet) {
        for (key, value) in &other.inner {
            self.insert(key.as_str(), value.as_str());
        }
    }

    /// Return a new set made of `self` with `other` applied on top.
    #[must_use]
    pub fn merged(&self, other: &DimensionSet) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Look up the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of dimensions in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the set holds no dimensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for DimensionSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = DimensionSet::new();
        for (key, value) in iter {
            set.insert(key, value);
        }
        set
    }
}

impl fmt::Display for DimensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn insert_overwrites_in_place() {
        let mut dims = DimensionSet::new();
        dims.insert("upstream.name", "backend");
        dims.insert("upstream.peer.name", "10.0.0.1:80");
        dims.insert("upstream.name", "frontend");

        assert_eq!(dims.len(), 2);
        assert_eq!(dims.get("upstream.name"), Some("frontend"));
        let keys: Vec<&str> = dims.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["upstream.name", "upstream.peer.name"]);
    }

    #[test]
    fn later_set_wins_collisions() {
        let container: DimensionSet = [("server.zone.name", "hg.nginx.org"), ("env", "auto")]
            .into_iter()
            .collect();
        let global: DimensionSet = [("env", "prod"), ("nginx.version", "1.13.4")]
            .into_iter()
            .collect();

        let merged = container.merged(&global);
        assert_eq!(merged.get("env"), Some("prod"));
        assert_eq!(merged.get("server.zone.name"), Some("hg.nginx.org"));
        assert_eq!(merged.get("nginx.version"), Some("1.13.4"));
        assert_eq!(merged.len(), 3);

        let reversed = global.merged(&container);
        assert_eq!(reversed.get("env"), Some("auto"));
    }

    #[test]
    fn display_keeps_insertion_order() {
        let dims: DimensionSet = [("nginx.version", "1.11.10"), ("cache.name", "http_cache")]
            .into_iter()
            .collect();
        assert_eq!(dims.to_string(), "nginx.version=1.11.10,cache.name=http_cache");
        assert_eq!(DimensionSet::new().to_string(), "");
    }

    fn entries() -> impl Strategy<Value = Vec<(String, String)>> {
        proptest::collection::vec(("[a-c]", "[a-z]{1,4}"), 0..6)
    }

    proptest! {
        #[test]
        fn last_set_containing_a_key_wins(a in entries(), b in entries(), c in entries()) {
            let sets: Vec<DimensionSet> = [&a, &b, &c]
                .into_iter()
                .map(|entries| entries.iter().cloned().collect())
                .collect();

            let mut merged = DimensionSet::new();
            for set in &sets {
                merged.merge(set);
            }

            for key in ["a", "b", "c"] {
                let expected = sets.iter().rev().find_map(|set| set.get(key));
                prop_assert_eq!(merged.get(key), expected);
            }
        }

        #[test]
        fn merging_is_associative_in_application_order(a in entries(), b in entries(), c in entries()) {
            let a: DimensionSet = a.into_iter().collect();
            let b: DimensionSet = b.into_iter().collect();
            let c: DimensionSet = c.into_iter().collect();

            let left = a.merged(&b).merged(&c);
            let right = a.merged(&b.merged(&c));
            prop_assert_eq!(left, right);
        }
    }
}
