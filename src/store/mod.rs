//! Blob stores that hold cached datasets. A blob is a named piece of text: the encoded records of
//! a domain or its metadata JSON.

mod drive;
mod local;
mod memory;

use crate::Result;
use std::fmt::Debug;

pub use drive::DriveStore;
pub use local::LocalStore;
pub use memory::MemoryStore;

/// The media type a blob is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Csv,
    Json,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Csv => "text/csv",
            ContentType::Json => "application/json",
        }
    }
}

/// Storage for named blobs. Names are case-sensitive.
#[async_trait::async_trait]
pub trait BlobStore: Debug + Send + Sync {
    /// A short description used in log messages, e.g. the directory or folder id.
    fn describe(&self) -> String;

    /// Returns `None` when the blob does not exist.
    async fn read(&self, name: &str) -> Result<Option<String>>;

    async fn write(&self, name: &str, content: &str, content_type: ContentType) -> Result<()>;

    /// Writes `name`, creating it first if the store only updates existing blobs.
    async fn create(&self, name: &str, content: &str, content_type: ContentType) -> Result<()> {
        self.write(name, content, content_type).await
    }

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Deleting a blob that does not exist succeeds.
    async fn delete(&self, name: &str) -> Result<()>;
}
