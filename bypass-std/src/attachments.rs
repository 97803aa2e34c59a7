//! Attachment registry.
//!
//! Stores auxiliary objects for one model by string key. Cloning the registry
//! copies the key map but not the objects. Models share one registry between
//! their clones instead of cloning it.

use bypass_core::{Attachment, AttachmentError, Attachments};
use std::{
    any::{Any, type_name},
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Per-model attachment storage.
#[derive(Default)]
pub struct AttachmentRegistry {
    entries: Mutex<HashMap<String, Attachment>>,
}

impl AttachmentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attachment of type `T`.
    ///
    /// Returns `Ok(None)` when the key is absent and an error when the stored
    /// value has a different type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, AttachmentError> {
        match self.get_attachment(key) {
            Some(value) => downcast(key, value).map(Some),
            None => Ok(None),
        }
    }

    /// Look up an attachment of type `T`, storing `init()` first if absent.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Result<Arc<T>, AttachmentError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut entries = self.lock();
        if let Some(value) = entries.get(key) {
            return downcast(key, value.clone());
        }
        let value = Arc::new(init());
        entries.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of attachments.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every attachment.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Attachment>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn downcast<T: Any + Send + Sync>(key: &str, value: Attachment) -> Result<Arc<T>, AttachmentError> {
    value.downcast::<T>().map_err(|_| AttachmentError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    })
}

impl Attachments for AttachmentRegistry {
    fn get_attachment(&self, key: &str) -> Option<Attachment> {
        self.lock().get(key).cloned()
    }

    fn set_attachment(&self, key: &str, value: Attachment) -> Option<Attachment> {
        self.lock().insert(key.to_string(), value)
    }

    fn remove_attachment(&self, key: &str) -> Option<Attachment> {
        self.lock().remove(key)
    }
}

impl Clone for AttachmentRegistry {
    fn clone(&self) -> Self {
        Self {
            entries: Mutex::new(self.lock().clone()),
        }
    }
}

impl std::fmt::Debug for AttachmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_repeated_lookup_preserves_identity() {
        let registry = AttachmentRegistry::new();
        registry.set_attachment("counter", Arc::new(Mutex::new(0u32)));

        let a = registry.get::<Mutex<u32>>("counter").unwrap().unwrap();
        let b = registry.get::<Mutex<u32>>("counter").unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        *a.lock().unwrap() += 1;
        assert_eq!(*b.lock().unwrap(), 1);
    }

    #[test]
    fn test_get_or_insert_with_initialises_once() {
        let registry = AttachmentRegistry::new();
        let mut calls = 0;
        let a = registry
            .get_or_insert_with("v", || {
                calls += 1;
                String::from("first")
            })
            .unwrap();
        let b = registry
            .get_or_insert_with("v", || String::from("second"))
            .unwrap();
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.as_str(), "first");
    }

    #[test]
    fn test_type_mismatch() {
        let registry = AttachmentRegistry::new();
        registry.set_attachment("v", Arc::new(1u8));
        let err = registry.get::<String>("v").unwrap_err();
        assert!(matches!(err, AttachmentError::TypeMismatch { ref key, .. } if key == "v"));
    }

    #[test]
    fn test_clone_shares_instances() {
        let registry = AttachmentRegistry::new();
        registry.set_attachment("v", Arc::new(7u64));
        let cloned = registry.clone();

        let a = registry.get::<u64>("v").unwrap().unwrap();
        let b = cloned.get::<u64>("v").unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // The key maps are independent.
        cloned.remove_attachment("v");
        assert!(registry.contains("v"));
        assert!(!cloned.contains("v"));
    }

    #[test]
    fn test_set_returns_replaced() {
        let registry = AttachmentRegistry::new();
        assert!(registry.set_attachment("v", Arc::new(1u8)).is_none());
        let old = registry.set_attachment("v", Arc::new(2u8)).unwrap();
        assert_eq!(*old.downcast::<u8>().unwrap(), 1);
        assert_eq!(registry.keys(), vec!["v".to_string()]);
    }
}
