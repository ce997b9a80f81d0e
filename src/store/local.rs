use crate::store::{BlobStore, ContentType};
use crate::{utils, Result};
use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Stores blobs as files in one directory. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            bail!("Invalid blob name '{name}'");
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalStore {
    fn describe(&self) -> String {
        format!("local directory {}", self.dir.display())
    }

    async fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.path(name)?;
        trace!("Reading {}", path.display());
        utils::read_optional(&path).await
    }

    async fn write(&self, name: &str, content: &str, _content_type: ContentType) -> Result<()> {
        let path = self.path(name)?;
        utils::make_dir(&self.dir).await?;

        // Write next to the target and move it into place so readers never see a partial blob.
        let partial = self.dir.join(format!(".{name}.partial"));
        utils::write(&partial, content).await?;
        utils::rename(&partial, &path)
            .await
            .with_context(|| format!("Unable to store blob '{name}'"))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path(name)?;
        utils::exists(&path).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        utils::remove(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_directory_on_first_write() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path().join("nested").join("cache"));
        assert!(!store.exists("transactions.csv").await.unwrap());
        assert_eq!(store.read("transactions.csv").await.unwrap(), None);

        store
            .write("transactions.csv", "a,b\n1,2", ContentType::Csv)
            .await
            .unwrap();
        assert!(store.dir().is_dir());
        assert!(store.exists("transactions.csv").await.unwrap());
        assert_eq!(
            store.read("transactions.csv").await.unwrap().as_deref(),
            Some("a,b\n1,2")
        );
    }

    #[tokio::test]
    async fn test_names_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());
        store.write("metadata.json", "{}", ContentType::Json).await.unwrap();
        assert!(store.exists("metadata.json").await.unwrap());
        assert!(!store.exists("budgets-metadata.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path().join("cache"));
        store.delete("budgets.csv").await.unwrap();
        store.write("budgets.csv", "x", ContentType::Csv).await.unwrap();
        store.delete("budgets.csv").await.unwrap();
        assert!(!store.exists("budgets.csv").await.unwrap());
        store.delete("budgets.csv").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());
        assert!(store.read("../secret").await.is_err());
        assert!(store.write("a/b", "x", ContentType::Csv).await.is_err());
    }
}
