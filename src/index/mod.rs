//! Secondary indexes: unique maps from a column value to the record id
//! holding it. Keys are the integer-comparable types widened to `i64`; the
//! ordered variant additionally answers range probes.

use crate::errors::Error;
use crate::tuple::Rid;
use crate::types::Value;
use anyhow::{bail, Result};
use chrono::Datelike;
use core::fmt::Debug;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Widens an indexable value to the key domain. Strings, doubles, bools
/// and NULLs are not indexable.
pub fn key_of(value: &Value) -> Result<i64> {
    match value {
        Value::Int(v) => Ok(*v as i64),
        Value::BigInt(v) => Ok(*v),
        Value::UInt(v) => Ok(*v as i64),
        Value::Date(d) => Ok(d.num_days_from_ce() as i64),
        other => bail!(Error::TypeMismatch(
            format!("{other}"),
            "an indexable column type".into()
        )),
    }
}

pub trait Index: Send + Sync + Debug {
    fn insert(&mut self, key: i64, rid: Rid) -> Result<()>;
    fn remove(&mut self, key: i64) -> Option<Rid>;
    fn get(&self, key: i64) -> Option<Rid>;
    /// Record ids for keys inside the bounds, ascending.
    fn range(&self, from: Bound<i64>, to: Bound<i64>) -> Result<Vec<Rid>>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct OrderedIndex {
    name: String,
    entries: BTreeMap<i64, Rid>,
}

impl OrderedIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: BTreeMap::new(),
        }
    }
}

impl Index for OrderedIndex {
    fn insert(&mut self, key: i64, rid: Rid) -> Result<()> {
        if self.entries.contains_key(&key) {
            bail!(Error::DuplicateKey(key.to_string(), format!("index {}", self.name)));
        }
        self.entries.insert(key, rid);
        Ok(())
    }

    fn remove(&mut self, key: i64) -> Option<Rid> {
        self.entries.remove(&key)
    }

    fn get(&self, key: i64) -> Option<Rid> {
        self.entries.get(&key).copied()
    }

    fn range(&self, from: Bound<i64>, to: Bound<i64>) -> Result<Vec<Rid>> {
        if range_is_empty(&from, &to) {
            return Ok(Vec::new());
        }
        Ok(self.entries.range((from, to)).map(|(_, rid)| *rid).collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// `BTreeMap::range` panics on inverted bounds; an inverted probe is just
/// an empty result.
fn range_is_empty(from: &Bound<i64>, to: &Bound<i64>) -> bool {
    match (from, to) {
        (Bound::Included(a), Bound::Included(b)) => a > b,
        (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b)) => a > b,
        (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
        _ => false,
    }
}

#[derive(Debug, Default)]
pub struct HashIndex {
    name: String,
    entries: HashMap<i64, Rid>,
}

impl HashIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }
}

impl Index for HashIndex {
    fn insert(&mut self, key: i64, rid: Rid) -> Result<()> {
        if self.entries.contains_key(&key) {
            bail!(Error::DuplicateKey(key.to_string(), format!("index {}", self.name)));
        }
        self.entries.insert(key, rid);
        Ok(())
    }

    fn remove(&mut self, key: i64) -> Option<Rid> {
        self.entries.remove(&key)
    }

    fn get(&self, key: i64) -> Option<Rid> {
        self.entries.get(&key).copied()
    }

    fn range(&self, _from: Bound<i64>, _to: Bound<i64>) -> Result<Vec<Rid>> {
        bail!(Error::Internal(
            "index".into(),
            format!("hash index {} does not support range probes", self.name)
        ))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_insert() -> Result<()> {
        let mut index = OrderedIndex::new("idx_id");
        index.insert(5, (1, 0))?;
        assert!(index.insert(5, (1, 1)).is_err());
        assert_eq!(index.get(5), Some((1, 0)));
        assert_eq!(index.remove(5), Some((1, 0)));
        assert_eq!(index.get(5), None);
        Ok(())
    }

    #[test]
    fn test_range_probe() -> Result<()> {
        let mut index = OrderedIndex::new("idx_id");
        for key in [1i64, 3, 5, 7] {
            index.insert(key, (1, key as u16))?;
        }

        let rids = index.range(Bound::Included(3), Bound::Excluded(7))?;
        assert_eq!(rids, vec![(1, 3), (1, 5)]);

        let all = index.range(Bound::Unbounded, Bound::Unbounded)?;
        assert_eq!(all.len(), 4);
        Ok(())
    }

    #[test]
    fn test_hash_index_rejects_range() -> Result<()> {
        let mut index = HashIndex::new("h");
        index.insert(1, (1, 0))?;
        assert_eq!(index.get(1), Some((1, 0)));
        assert!(index.range(Bound::Unbounded, Bound::Unbounded).is_err());
        Ok(())
    }

    #[test]
    fn test_key_widening() -> Result<()> {
        assert_eq!(key_of(&Value::Int(-3))?, -3);
        assert_eq!(key_of(&Value::UInt(3))?, 3);
        assert!(key_of(&Value::Char("a".into())).is_err());
        assert!(key_of(&Value::Null).is_err());
        Ok(())
    }
}
