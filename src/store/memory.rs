use crate::error::PersistError;
use crate::store::Persistence;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// An in-memory `Persistence` backend. An optional capacity (total bytes across all keys) makes
/// it report `PersistError::Full`, the way a browser's storage quota or a full disk would.
#[derive(Debug, Default)]
pub struct MemorySlots {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Vec<u8>>,
    capacity: Option<usize>,
}

impl MemorySlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let slots = Self::default();
        slots.set_capacity(Some(capacity));
        slots
    }

    /// Changes the byte limit. `None` removes it.
    pub fn set_capacity(&self, capacity: Option<usize>) {
        self.lock().capacity = capacity;
    }

    /// Puts raw bytes into a slot regardless of capacity, e.g. to plant corrupted data.
    pub fn insert_raw(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().slots.insert(key.to_string(), bytes.into());
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().slots.get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a half-written map entry.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Persistence for MemorySlots {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.lock().slots.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), PersistError> {
        let mut inner = self.lock();
        if let Some(capacity) = inner.capacity {
            let others: usize = inner
                .slots
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + bytes.len() > capacity {
                return Err(PersistError::Full {
                    key: key.to_string(),
                });
            }
        }
        inner.slots.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.lock().slots.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_counts_other_keys() {
        let slots = MemorySlots::with_capacity(10);
        slots.set("a", b"12345").unwrap();
        slots.set("b", b"12345").unwrap();
        // Replacing "a" with a same-sized value still fits.
        slots.set("a", b"abcde").unwrap();
        let err = slots.set("b", b"123456").unwrap_err();
        assert!(matches!(err, PersistError::Full { .. }));
        assert_eq!(slots.raw("b").unwrap(), b"12345");
    }
}
