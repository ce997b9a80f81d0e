//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::config::Environment;
use crate::{utils, Config};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

/// Test environment that sets up a finmirror home directory with a Config.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub(crate) struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// A development environment, local cache only, with the people `Alex` and `Sam`.
    pub(crate) async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Like `new`, but `edit` may change the config JSON before it is loaded.
    pub(crate) async fn with_config(edit: impl FnOnce(&mut serde_json::Value)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("finmirror");
        let secret_path = temp_dir.path().join("client_secret.json");

        // Create minimal client_secret.json
        let secret_content = r#"{
            "installed": {
                "client_id": "test-client-id",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost"],
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token"
            }
        }"#;
        std::fs::write(&secret_path, secret_content).unwrap();

        let rand = Uuid::new_v4().to_string().replace('-', "");
        let sheet_url = format!("https://docs.google.com/spreadsheets/d/{}/edit", rand);
        let created = Config::create(&root, &secret_path, &sheet_url, None, Environment::Development)
            .await
            .unwrap();

        let mut value: serde_json::Value =
            utils::deserialize(created.config_path()).await.unwrap();
        value["people"] = json!([
            { "name": "Alex", "patterns": ["alex"] },
            { "name": "Sam", "patterns": ["sam"] }
        ]);
        edit(&mut value);
        utils::write(
            created.config_path(),
            serde_json::to_string_pretty(&value).unwrap(),
        )
        .await
        .unwrap();

        let config = Config::load(&root).await.unwrap();
        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub(crate) fn config(&self) -> Config {
        self.config.clone()
    }
}
