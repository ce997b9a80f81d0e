//! An in-memory `BlobStore`.
//!
//! Note: this is compiled even in the "production" version of this app. It stands in for the
//! remote folder in testing mode so that the whole app can run without Google Drive.

use crate::store::{BlobStore, ContentType};
use crate::Result;
use anyhow::bail;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Holds blobs in a shared map. Clones share the same blobs, so a test can keep a handle to a
/// store that it has given away.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<BTreeMap<String, String>>>,
    update_only: bool,
    unreachable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that, like the remote folder, refuses to write a blob that does not exist yet.
    pub fn update_only() -> Self {
        Self {
            update_only: true,
            ..Self::default()
        }
    }

    /// While set, every operation fails as if the store could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Puts a blob in place without going through `write`.
    pub fn insert(&self, name: impl Into<String>, content: impl Into<String>) {
        self.lock().insert(name.into(), content.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            bail!("The in-memory store is unreachable");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryStore {
    fn describe(&self) -> String {
        String::from("in-memory store")
    }

    async fn read(&self, name: &str) -> Result<Option<String>> {
        self.check_reachable()?;
        Ok(self.get(name))
    }

    async fn write(&self, name: &str, content: &str, _content_type: ContentType) -> Result<()> {
        self.check_reachable()?;
        let mut blobs = self.lock();
        if self.update_only && !blobs.contains_key(name) {
            bail!("Blob '{name}' does not exist and this store does not create blobs");
        }
        blobs.insert(name.to_string(), content.to_string());
        Ok(())
    }

    async fn create(&self, name: &str, content: &str, _content_type: ContentType) -> Result<()> {
        self.check_reachable()?;
        self.insert(name, content);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.lock().contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.check_reachable()?;
        self.lock().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_only() {
        let store = MemoryStore::update_only();
        assert!(store.write("a.csv", "1", ContentType::Csv).await.is_err());
        store.insert("a.csv", "");
        store.write("a.csv", "1", ContentType::Csv).await.unwrap();
        assert_eq!(store.read("a.csv").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let store = MemoryStore::new();
        let handle = store.clone();
        handle.set_unreachable(true);
        assert!(store.read("a.csv").await.is_err());
        assert!(store.exists("a.csv").await.is_err());
        handle.set_unreachable(false);
        assert!(!store.exists("a.csv").await.unwrap());
        store.delete("a.csv").await.unwrap();
    }
}
