//! Configuration file handling.
//!
//! The configuration file is stored at `$FINMIRROR_HOME/config.json` and contains the Google Sheet
//! URL, cache settings, the optional remote cache folder, person attribution patterns and the
//! authentication file paths.

use crate::cache::FallbackPolicy;
use crate::model::Domain;
use crate::person::Person;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "finmirror";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const CACHE: &str = "cache";
const CLIENT_SECRET_JSON: &str = "client_secret.json";
const TOKEN_JSON: &str = "token.json";
const CONFIG_JSON: &str = "config.json";
const DEFAULT_TTL_MINUTES: u32 = 60;

/// Whether the cache may fall back to local files when the remote folder fails.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

serde_plain::derive_display_from_serialize!(Environment);
serde_plain::derive_fromstr_from_deserialize!(Environment);

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$FINMIRROR_HOME` and from there it loads `$FINMIRROR_HOME/config.json`. It
/// provides paths to other items that are either configurable or are expected in a certain
/// location within the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    cache_dir: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    spreadsheet_id: String,
}

impl Config {
    /// Creates the home directory, its subdirectories and:
    /// - Creates an initial `config.json` file using `sheet_url` along with default settings
    /// - Moves `secret_file` into its default location in the secrets directory
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of the home directory, e.g. `$HOME/finmirror`
    /// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON
    /// - `sheet_url` - The URL of the Google Sheet holding the financial data, e.g.
    ///   https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    /// - `drive_folder_id` - The Google Drive folder that holds the remote cache, if any
    /// - `environment` - Selects the fallback policy
    pub async fn create(
        dir: impl Into<PathBuf>,
        secret_file: &Path,
        sheet_url: &str,
        drive_folder_id: Option<&str>,
        environment: Environment,
    ) -> Result<Self> {
        // Validate before touching the filesystem
        let spreadsheet_id = extract_spreadsheet_id(sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;
        let cache_dir = root.join(CACHE);
        utils::make_dir(&cache_dir).await?;

        utils::rename(secret_file, secrets.join(CLIENT_SECRET_JSON)).await?;

        let config_path = root.join(CONFIG_JSON);
        let config_file = ConfigFile {
            sheet_url: sheet_url.to_string(),
            drive_folder_id: drive_folder_id
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            environment,
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            secrets,
            cache_dir,
            config_path,
            config_file,
            spreadsheet_id,
        })
    }

    /// This will
    /// - validate that the home directory and the config file exist
    /// - load the config file
    /// - validate that the secrets directory exists
    /// - return the loaded configuration object
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The home directory is missing. Run 'finmirror init' first.")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let spreadsheet_id = extract_spreadsheet_id(&config_file.sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let config = Self {
            root: root.clone(),
            secrets: root.join(SECRETS),
            cache_dir: root.join(CACHE),
            config_path,
            config_file,
            spreadsheet_id,
        };
        if !config.secrets.is_dir() {
            bail!(
                "The secrets directory is missing '{}'",
                config.secrets.display()
            )
        }
        Ok(config)
    }

    /// Overrides the environment from the file, e.g. with `--environment`.
    pub fn with_environment(mut self, environment: Option<Environment>) -> Self {
        if let Some(environment) = environment {
            self.config_file.environment = environment;
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    /// The directory used by the local cache tier.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn sheet_url(&self) -> &str {
        &self.config_file.sheet_url
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn environment(&self) -> Environment {
        self.config_file.environment
    }

    /// Only development may serve or write local files when the remote folder fails.
    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy {
            allow_local_fallback: self.environment() == Environment::Development,
        }
    }

    pub fn cache(&self) -> &CacheSettings {
        &self.config_file.cache
    }

    pub fn drive_folder_id(&self) -> Option<&str> {
        self.config_file.drive_folder_id.as_deref()
    }

    pub fn people(&self) -> &[Person] {
        &self.config_file.people
    }

    /// The A1 range that holds the records of `domain`, header row included.
    pub fn sheet_range(&self, domain: Domain) -> String {
        match domain {
            Domain::Transactions => match self.config_file.transactions_tab.as_deref() {
                Some(tab) => format!("{tab}!A1:H"),
                None => String::from("A1:H"),
            },
            Domain::Budgets => String::from("Budgets!A1:G"),
            Domain::BudgetTemplates => String::from("Budget_Templates!A1:F"),
        }
    }

    /// Returns the stored `client_secret_path` if it is absolute, otherwise resolves the relative path.
    pub fn client_secret_path(&self) -> PathBuf {
        self.resolve_path(self.config_file.client_secret_path())
    }

    /// Returns the stored `token_path` if it is absolute, otherwise resolves the relative path.
    pub fn token_path(&self) -> PathBuf {
        self.resolve_path(self.config_file.token_path())
    }

    fn resolve_path(&self, p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }
}

/// Cache behavior. `auto_refresh` is advisory: it is reported by `cache status` but schedules
/// nothing.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_minutes: u32,
    pub auto_refresh: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_minutes: DEFAULT_TTL_MINUTES,
            auto_refresh: false,
        }
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "finmirror",
///   "config_version": 1,
///   "sheet_url": "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
///   "environment": "production",
///   "cache": { "enabled": true, "ttl_minutes": 60, "auto_refresh": false },
///   "drive_folder_id": "1AbCdEfGhIjKlMnOp",
///   "people": [ { "name": "Alex", "patterns": ["alex"] } ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    app_name: String,

    config_version: u8,

    sheet_url: String,

    #[serde(default)]
    environment: Environment,

    #[serde(default)]
    cache: CacheSettings,

    /// The Google Drive folder holding the remote cache. Absent means local only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    drive_folder_id: Option<String>,

    /// The tab holding transactions. Absent means the first tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transactions_tab: Option<String>,

    #[serde(default)]
    people: Vec<Person>,

    /// Path to the OAuth 2.0 client credentials file (relative to the home directory or absolute).
    /// Defaults to $FINMIRROR_HOME/.secrets/client_secret.json
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret_path: Option<PathBuf>,

    /// Path to the OAuth token file (relative to the home directory or absolute).
    /// Defaults to $FINMIRROR_HOME/.secrets/token.json
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sheet_url: String::new(),
            environment: Environment::default(),
            cache: CacheSettings::default(),
            drive_folder_id: None,
            transactions_tab: None,
            people: Vec::new(),
            client_secret_path: None,
            token_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from `path` and checks its `app_name`.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }

    fn client_secret_path(&self) -> PathBuf {
        self.client_secret_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON))
    }

    fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(TOKEN_JSON))
    }
}

/// Extracts the spreadsheet ID from a Google Sheets URL
///
/// # Arguments
/// * `url` - The Google Sheets URL (e.g., "https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...")
///
/// # Returns
/// The spreadsheet ID or an error if the URL format is invalid. Returns an empty string if the URL is empty.
fn extract_spreadsheet_id(url: &str) -> Result<&str> {
    if url.is_empty() {
        return Ok(url);
    }

    // URL format: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...
    // or: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID?foo=bar
    let mut parts = url.split('/');
    while let Some(part) = parts.next() {
        if part == "d" {
            if let Some(id_part) = parts.next() {
                let id = id_part.split(['?', '#']).next().unwrap_or(id_part);
                if !id.is_empty() {
                    return Ok(id);
                }
            }
        }
    }
    bail!(
        "Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str =
        "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL/edit";

    #[tokio::test]
    async fn test_config_create_and_load() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("finmirror_home");
        let secret_source_file = dir.path().join("x.txt");
        utils::write(&secret_source_file, "12345").await.unwrap();

        let config = Config::create(
            &home_dir,
            &secret_source_file,
            URL,
            Some("folder-1"),
            Environment::Development,
        )
        .await
        .unwrap();

        assert_eq!(URL, config.sheet_url());
        assert_eq!(
            "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
            config.spreadsheet_id()
        );
        let found_secret_content = utils::read(&config.client_secret_path()).await.unwrap();
        assert_eq!("12345", found_secret_content);
        assert!(config.secrets().is_dir());
        assert!(config.cache_dir().is_dir());

        let loaded = Config::load(&home_dir).await.unwrap();
        assert_eq!(loaded.drive_folder_id(), Some("folder-1"));
        assert_eq!(loaded.environment(), Environment::Development);
        assert!(loaded.fallback_policy().allow_local_fallback);
        assert_eq!(loaded.cache(), &CacheSettings::default());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_url_before_moving_secret() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("secret.json");
        utils::write(&secret, "{}").await.unwrap();
        let result = Config::create(
            dir.path().join("home"),
            &secret,
            "https://example.com/invalid",
            None,
            Environment::Production,
        )
        .await;
        assert!(result.is_err());
        assert!(secret.is_file());
    }

    #[tokio::test]
    async fn test_environment_override() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("secret.json");
        utils::write(&secret, "{}").await.unwrap();
        let config = Config::create(dir.path().join("home"), &secret, URL, None, Environment::Production)
            .await
            .unwrap();
        assert!(!config.fallback_policy().allow_local_fallback);
        let config = config.with_environment(Some(Environment::Development));
        assert!(config.fallback_policy().allow_local_fallback);
        let config = config.with_environment(None);
        assert_eq!(config.environment(), Environment::Development);
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "finmirror",
            "config_version": 1,
            "sheet_url": "https://docs.google.com/spreadsheets/d/minimal"
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_minutes, 60);
        assert!(config.people.is_empty());
        assert_eq!(
            config.client_secret_path(),
            PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON)
        );
        assert_eq!(config.token_path(), PathBuf::from(SECRETS).join(TOKEN_JSON));
    }

    #[tokio::test]
    async fn test_config_file_full_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "finmirror",
            "config_version": 1,
            "sheet_url": "https://docs.google.com/spreadsheets/d/abc",
            "environment": "development",
            "cache": { "enabled": false, "ttl_minutes": 15, "auto_refresh": true },
            "drive_folder_id": "folder",
            "transactions_tab": "Ledger",
            "people": [ { "name": "Alex", "patterns": ["alex", "a. smith"] } ]
        }"#;
        utils::write(&path, json).await.unwrap();
        let original = ConfigFile::load(&path).await.unwrap();
        assert_eq!(original.cache.ttl_minutes, 15);
        assert!(original.cache.auto_refresh);
        assert_eq!(original.people[0].patterns.len(), 2);

        original.save(&path).await.unwrap();
        let read = ConfigFile::load(&path).await.unwrap();
        assert_eq!(original, read);
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "wrong_app",
            "config_version": 1,
            "sheet_url": "https://docs.google.com/spreadsheets/d/test"
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let result = ConfigFile::load(&config_path).await;
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[test]
    fn test_config_file_serialization_omits_none_fields() {
        let json = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(!json.contains("client_secret_path"));
        assert!(!json.contains("drive_folder_id"));
    }

    #[tokio::test]
    async fn test_sheet_ranges() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("secret.json");
        utils::write(&secret, "{}").await.unwrap();
        let mut config =
            Config::create(dir.path().join("home"), &secret, URL, None, Environment::Production)
                .await
                .unwrap();
        assert_eq!(config.sheet_range(Domain::Transactions), "A1:H");
        assert_eq!(config.sheet_range(Domain::Budgets), "Budgets!A1:G");
        assert_eq!(
            config.sheet_range(Domain::BudgetTemplates),
            "Budget_Templates!A1:F"
        );
        config.config_file.transactions_tab = Some("Ledger".to_string());
        assert_eq!(config.sheet_range(Domain::Transactions), "Ledger!A1:H");
    }

    #[test]
    fn test_extract_spreadsheet_id() {
        let id = extract_spreadsheet_id(URL).unwrap();
        assert_eq!(id, "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL");

        let url = "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL?foo=bar";
        let id = extract_spreadsheet_id(url).unwrap();
        assert_eq!(id, "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL");

        let id = extract_spreadsheet_id("https://docs.google.com/spreadsheets/d/ABC123#gid=0").unwrap();
        assert_eq!(id, "ABC123");

        assert!(extract_spreadsheet_id("https://example.com/invalid").is_err());
        assert!(extract_spreadsheet_id("https://example.com/d/").is_err());
        assert_eq!(extract_spreadsheet_id("").unwrap(), "");
    }
}
