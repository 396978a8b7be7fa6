/*!
 * Registries
 * Name reservations and id indices shared by concurrent provisioning calls
 */

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tracing::debug;

/// Registry operation result
pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("the name {name:?} is already reserved by {holder:?}")]
    NameReserved { name: String, holder: String },

    #[error("name or id must not be empty")]
    Empty,

    #[error("id {0} already exists in the index")]
    IdExists(String),

    #[error("no such id: {0}")]
    NotFound(String),

    #[error("multiple ids match the prefix {0}")]
    Ambiguous(String),
}

/// Name → holder-id reservations; the first reserver wins
#[derive(Debug)]
pub struct NameRegistry {
    names: DashMap<String, String, RandomState>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self {
            names: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Reserve `name` for `holder`; a second reservation is rejected
    pub fn reserve(&self, name: &str, holder: &str) -> RegistryResult<()> {
        if name.is_empty() || holder.is_empty() {
            return Err(RegistryError::Empty);
        }
        match self.names.entry(name.to_string()) {
            Entry::Occupied(existing) => Err(RegistryError::NameReserved {
                name: name.to_string(),
                holder: existing.get().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(holder.to_string());
                debug!(name, holder, "name reserved");
                Ok(())
            }
        }
    }

    /// Release a reservation; releasing an unknown name is a no-op
    pub fn release(&self, name: &str) {
        if self.names.remove(name).is_some() {
            debug!(name, "name released");
        }
    }

    pub fn holder(&self, name: &str) -> Option<String> {
        self.names.get(name).map(|h| h.value().clone())
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Set of ids addressable by unique prefix
#[derive(Debug)]
pub struct IdIndex {
    ids: DashSet<String, RandomState>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self {
            ids: DashSet::with_hasher(RandomState::new()),
        }
    }

    pub fn add(&self, id: &str) -> RegistryResult<()> {
        if id.is_empty() {
            return Err(RegistryError::Empty);
        }
        if !self.ids.insert(id.to_string()) {
            return Err(RegistryError::IdExists(id.to_string()));
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> RegistryResult<()> {
        self.ids
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Full id for a unique prefix
    pub fn get(&self, prefix: &str) -> RegistryResult<String> {
        if prefix.is_empty() {
            return Err(RegistryError::Empty);
        }
        if self.ids.contains(prefix) {
            return Ok(prefix.to_string());
        }

        let mut matches = self.ids.iter().filter(|id| id.starts_with(prefix));
        let first = matches
            .next()
            .map(|id| id.key().clone())
            .ok_or_else(|| RegistryError::NotFound(prefix.to_string()))?;
        if matches.next().is_some() {
            return Err(RegistryError::Ambiguous(prefix.to_string()));
        }
        Ok(first)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for IdIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_reserver_wins() {
        let names = NameRegistry::new();
        names.reserve("k8s_web", "id1").unwrap();
        let err = names.reserve("k8s_web", "id2").unwrap_err();
        assert_eq!(
            err,
            RegistryError::NameReserved {
                name: "k8s_web".into(),
                holder: "id1".into()
            }
        );

        names.release("k8s_web");
        names.reserve("k8s_web", "id2").unwrap();
        assert_eq!(names.holder("k8s_web").as_deref(), Some("id2"));
    }

    #[test]
    fn test_concurrent_reservations() {
        let names = Arc::new(NameRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let names = Arc::clone(&names);
                thread::spawn(move || names.reserve("contended", &format!("id{}", i)).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_id_index_prefix() {
        let index = IdIndex::new();
        index.add("abcdef").unwrap();
        index.add("abd123").unwrap();
        assert!(matches!(index.add("abcdef"), Err(RegistryError::IdExists(_))));

        assert_eq!(index.get("abc").unwrap(), "abcdef");
        assert!(matches!(index.get("ab"), Err(RegistryError::Ambiguous(_))));
        assert!(matches!(index.get("zz"), Err(RegistryError::NotFound(_))));

        index.delete("abcdef").unwrap();
        assert!(index.delete("abcdef").is_err());
        assert_eq!(index.get("ab").unwrap(), "abd123");
    }
}
