//! Module that allows to (de-)serialize a `HashMap` with non-string keys as a list of entries,
//! sorted by key, such that the same map always produces the same output.

use std::{collections::HashMap, hash::Hash};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Helper struct that allows (de-)serialization of a `HashMap` as this type.
///
/// Example:
/// ```ignore
/// serde_json::to_string_pretty(&SortedMap::from(hashmap)).unwrap();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortedMap<K, V>(
    #[serde(with = "crate::serde::sorted_map")]
    #[serde(bound(
        deserialize = "K: Hash + Eq, for<'de_k> K: Deserialize<'de_k>, for<'de_v> V: Deserialize<'de_v>",
        serialize = "K: Serialize + Ord, V: Serialize",
    ))]
    pub HashMap<K, V>,
);

impl<K: Hash + Eq, V: PartialEq> PartialEq for SortedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K, V> Default for SortedMap<K, V> {
    fn default() -> Self {
        Self(HashMap::new())
    }
}

impl<K, V> From<HashMap<K, V>> for SortedMap<K, V> {
    fn from(map: HashMap<K, V>) -> Self {
        Self(map)
    }
}

impl<K, V> From<SortedMap<K, V>> for HashMap<K, V> {
    fn from(val: SortedMap<K, V>) -> Self {
        val.0
    }
}

#[derive(Deserialize, Serialize)]
struct Entry<K, V> {
    key: K,
    val: V,
}

/// Serialize a `HashMap` as a sequence of `{key, val}` entries in ascending key order.
pub fn serialize<K: Serialize + Ord, V: Serialize, S: Serializer>(
    map: &HashMap<K, V>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut entries: Vec<(&K, &V)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    serializer.collect_seq(entries.into_iter().map(|(key, val)| Entry { key, val }))
}

/// Deserialize a `HashMap` from a sequence of `{key, val}` entries. Later entries replace earlier
/// ones with the same key.
pub fn deserialize<'de, K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de>, D>(
    deserializer: D,
) -> Result<HashMap<K, V>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<Entry<K, V>>::deserialize(deserializer)
        .map(|v| v.into_iter().map(|e| (e.key, e.val)).collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn output_is_sorted_by_key() {
        let map: HashMap<(usize, usize), f64> =
            [((2, 3), 1.5), ((0, 1), 10.0), ((1, 2), 0.0)].into_iter().collect();
        let s = serde_json::to_string(&SortedMap::from(map.clone())).unwrap();
        assert_eq!(
            s,
            r#"[{"key":[0,1],"val":10.0},{"key":[1,2],"val":0.0},{"key":[2,3],"val":1.5}]"#
        );
        let back: SortedMap<(usize, usize), f64> = serde_json::from_str(&s).unwrap();
        assert_eq!(back.0, map);
    }
}
