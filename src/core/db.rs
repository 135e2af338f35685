use serde::de::DeserializeOwned;
use serde::Serialize;
use spin_sdk::key_value::Store;
use std::collections::HashMap;
use std::sync::Mutex;

/// Raw byte-level contract the managers run against. The Spin key-value
/// store backs it in production; `MemStore` backs it in tests and local
/// tooling.
pub trait KeyValue {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
}

impl KeyValue for Store {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(Store::get(self, key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(Store::set(self, key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(Store::delete(self, key)?)
    }
}

#[derive(Default)]
pub struct MemStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl KeyValue for MemStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

pub fn get_json<T: DeserializeOwned>(store: &impl KeyValue, key: &str) -> anyhow::Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub fn set_json<T: Serialize>(store: &impl KeyValue, key: &str, value: &T) -> anyhow::Result<()> {
    store.set(key, &serde_json::to_vec(value)?)
}

/// Add an id to a set-semantics list. Returns false when already present.
pub fn set_insert(set: &mut Vec<String>, id: &str) -> bool {
    if set.iter().any(|existing| existing == id) {
        return false;
    }
    set.push(id.to_string());
    true
}

/// Remove an id from a set-semantics list. Returns false when absent.
pub fn set_remove(set: &mut Vec<String>, id: &str) -> bool {
    let before = set.len();
    set.retain(|existing| existing != id);
    set.len() != before
}

/// Multi-document transaction over the store. Each key is snapshotted before
/// its first write; `rollback` restores the snapshots in reverse order so a
/// partial failure leaves no document half-updated.
pub struct Txn<'a, S: KeyValue> {
    store: &'a S,
    undo: Vec<(String, Option<Vec<u8>>)>,
}

impl<'a, S: KeyValue> Txn<'a, S> {
    pub fn begin(store: &'a S) -> Self {
        Txn { store, undo: Vec::new() }
    }

    fn snapshot(&mut self, key: &str) -> anyhow::Result<()> {
        if self.undo.iter().any(|(recorded, _)| recorded == key) {
            return Ok(());
        }
        let prior = self.store.get(key)?;
        self.undo.push((key.to_string(), prior));
        Ok(())
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        self.snapshot(key)?;
        set_json(self.store, key, value)
    }

    pub fn delete(&mut self, key: &str) -> anyhow::Result<()> {
        self.snapshot(key)?;
        self.store.delete(key)
    }

    pub fn commit(self) {}

    pub fn rollback(self) {
        for (key, prior) in self.undo.into_iter().rev() {
            let restored = match prior {
                Some(bytes) => self.store.set(&key, &bytes),
                None => self.store.delete(&key),
            };
            if let Err(err) = restored {
                log::warn!("rollback could not restore key {}: {}", key, err);
            }
        }
    }
}
