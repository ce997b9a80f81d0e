//! A `BlobStore` over a Google Drive folder. Blobs are files in the folder, found by name.
//!
//! Writes only update existing files. New files are added with `BlobStore::create`.

use crate::api::SharedTokenProvider;
use crate::store::{BlobStore, ContentType};
use crate::Result;
use anyhow::{bail, Context};
use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::fmt::{self, Debug, Formatter};
use tracing::{debug, trace};

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

pub struct DriveStore {
    folder_id: String,
    token_provider: SharedTokenProvider,
    http: Client,
}

impl Debug for DriveStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveStore")
            .field("folder_id", &self.folder_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

impl DriveStore {
    pub fn new(folder_id: impl Into<String>, token_provider: SharedTokenProvider) -> Self {
        Self {
            folder_id: folder_id.into(),
            token_provider,
            http: Client::new(),
        }
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self
            .token_provider
            .lock()
            .await
            .token_with_refresh()
            .await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Finds the id of the file called `name` in the folder.
    async fn find(&self, name: &str) -> Result<Option<String>> {
        let q = list_query(&self.folder_id, name);
        trace!("Drive files.list q={q}");
        let response = self
            .request(Method::GET, FILES_URL)
            .await?
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
                ("corpora", "allDrives"),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to search Drive for '{name}'"))?;
        let text = checked_text(response, name).await?;
        let list: FileList = serde_json::from_str(&text)
            .with_context(|| format!("Unexpected response when searching for '{name}'"))?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn upload(&self, id: &str, name: &str, content: &str, content_type: ContentType) -> Result<()> {
        let response = self
            .request(Method::PATCH, &format!("{UPLOAD_URL}/{id}"))
            .await?
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .header(header::CONTENT_TYPE, content_type.mime())
            .body(content.to_string())
            .send()
            .await
            .with_context(|| format!("Failed to upload '{name}' to Drive"))?;
        checked_text(response, name).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStore for DriveStore {
    fn describe(&self) -> String {
        format!("drive folder {}", self.folder_id)
    }

    async fn read(&self, name: &str) -> Result<Option<String>> {
        let Some(id) = self.find(name).await? else {
            return Ok(None);
        };
        let response = self
            .request(Method::GET, &format!("{FILES_URL}/{id}"))
            .await?
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .with_context(|| format!("Failed to download '{name}' from Drive"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(checked_text(response, name).await?))
    }

    async fn write(&self, name: &str, content: &str, content_type: ContentType) -> Result<()> {
        let Some(id) = self.find(name).await? else {
            bail!(
                "'{name}' does not exist in Drive folder {}. Run 'finmirror cache init-remote' first.",
                self.folder_id
            );
        };
        self.upload(&id, name, content, content_type).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.find(name).await?.is_some())
    }

    /// Creates `name` in the folder with `content`, or updates it if it already exists.
    async fn create(&self, name: &str, content: &str, content_type: ContentType) -> Result<()> {
        let id = match self.find(name).await? {
            Some(id) => id,
            None => {
                let metadata = serde_json::json!({
                    "name": name,
                    "parents": [self.folder_id],
                    "mimeType": content_type.mime(),
                });
                let response = self
                    .request(Method::POST, FILES_URL)
                    .await?
                    .query(&[("supportsAllDrives", "true"), ("fields", "id,name")])
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(metadata.to_string())
                    .send()
                    .await
                    .with_context(|| format!("Failed to create '{name}' in Drive"))?;
                let text = checked_text(response, name).await?;
                let file: DriveFile = serde_json::from_str(&text)
                    .with_context(|| format!("Unexpected response when creating '{name}'"))?;
                debug!("Created '{}' in Drive folder {}", file.name, self.folder_id);
                file.id
            }
        };
        self.upload(&id, name, content, content_type).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let Some(id) = self.find(name).await? else {
            return Ok(());
        };
        let response = self
            .request(Method::DELETE, &format!("{FILES_URL}/{id}"))
            .await?
            .query(&[("supportsAllDrives", "true")])
            .send()
            .await
            .with_context(|| format!("Failed to delete '{name}' from Drive"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        checked_text(response, name).await?;
        Ok(())
    }
}

/// Returns the body of a successful response, or an error carrying the status and body.
async fn checked_text(response: reqwest::Response, name: &str) -> Result<String> {
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("Failed to read the Drive response for '{name}'"))?;
    if !status.is_success() {
        bail!("Drive returned {status} for '{name}': {text}");
    }
    Ok(text)
}

/// The files.list query for a file called `name` directly inside `folder_id`.
fn list_query(folder_id: &str, name: &str) -> String {
    format!(
        "'{}' in parents and name = '{}' and trashed = false",
        escape(folder_id),
        escape(name)
    )
}

/// Drive query strings are single-quoted; backslashes and quotes are escaped.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query() {
        assert_eq!(
            list_query("abc123", "transactions.csv"),
            "'abc123' in parents and name = 'transactions.csv' and trashed = false"
        );
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("o'brien.csv"), "o\\'brien.csv");
        assert_eq!(escape("a\\b"), "a\\\\b");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_file_list_parse() {
        let list: FileList =
            serde_json::from_str(r#"{"files":[{"id":"f1","name":"metadata.json"}]}"#).unwrap();
        assert_eq!(list.files[0].id, "f1");
        let empty: FileList = serde_json::from_str("{}").unwrap();
        assert!(empty.files.is_empty());
    }
}
