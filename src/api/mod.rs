//! Access to the Google APIs: the spreadsheet that is the source of truth, and OAuth.

mod files;
mod oauth;
mod sheet;
mod sheet_test_client;
mod tab;

use crate::model::SheetRecord;
use crate::{Config, Result};
use anyhow::{bail, Context};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use oauth::TokenProvider;
pub use sheet::GoogleSheet;
pub use sheet_test_client::TestSheet;
pub use tab::{SheetTab, TabRow};

/// Scopes requested during consent. Drive is needed because the remote cache folder is updated in
/// place.
pub(crate) const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// The message Google returns when a range names a tab that does not exist.
const MISSING_TAB: &str = "Unable to parse range";

/// The environment variable that selects `Mode::Testing`.
pub const TEST_MODE_ENV: &str = "FINMIRROR_IN_TEST_MODE";

/// A token provider shared by the spreadsheet client and the remote folder store.
pub type SharedTokenProvider = Arc<Mutex<TokenProvider>>;

/// Selects real Google APIs or in-memory stand-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Google,
    Testing,
}

impl Mode {
    /// `Mode::Testing` when `FINMIRROR_IN_TEST_MODE` is set and non-empty, otherwise
    /// `Mode::Google`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Testing,
            _ => Mode::Google,
        }
    }
}

/// Values destined for one range of the spreadsheet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SheetRange {
    pub range: String,
    pub values: Vec<Vec<String>>,
}

/// The few spreadsheet operations this program needs.
#[async_trait::async_trait]
pub trait Sheet {
    /// Returns the rows of `range`, in A1 notation. Trailing empty cells may be omitted.
    async fn get(&mut self, range: &str) -> Result<Vec<Vec<String>>>;

    /// Adds an empty tab named `title`.
    async fn add_sheet(&mut self, title: &str) -> Result<()>;

    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()>;
}

/// Creates the spreadsheet client for `mode`. `token` is only used by `Mode::Google`.
pub fn sheet(
    config: &Config,
    mode: Mode,
    token: Option<SharedTokenProvider>,
) -> Result<Box<dyn Sheet + Send>> {
    match mode {
        Mode::Google => {
            let token = token.context("A token provider is required to reach Google Sheets")?;
            Ok(Box::new(GoogleSheet::new(config.clone(), token)))
        }
        Mode::Testing => Ok(Box::new(TestSheet::default())),
    }
}

/// Loads the OAuth tokens named in `config` into a shareable provider.
pub async fn token_provider(config: &Config) -> Result<SharedTokenProvider> {
    let provider = TokenProvider::load(config.client_secret_path(), config.token_path())
        .await
        .context(
            "Unable to use the existing tokens found in the token JSON file. \n\n\
            You should run 'finmirror auth' first.",
        )?;
    Ok(Arc::new(Mutex::new(provider)))
}

/// Reads every record of type `R` from `range`. The first row is the header row. Empty rows and
/// rows that do not describe a usable record are skipped. A missing tab yields no records when
/// `R::OPTIONAL_TAB` is set.
pub async fn fetch<R: SheetRecord>(sheet: &mut (dyn Sheet + Send), range: &str) -> Result<Vec<R>> {
    let tab = SheetTab::<R>::read(sheet, range).await?;
    if !tab.exists() {
        if R::OPTIONAL_TAB {
            info!(domain = %R::DOMAIN, "The tab for '{range}' does not exist yet");
            return Ok(Vec::new());
        }
        bail!("Failed to fetch {} from '{range}': the tab does not exist", R::DOMAIN);
    }
    let records = tab.into_records();
    debug!(domain = %R::DOMAIN, count = records.len(), "Fetched records from the sheet");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Budget, Transaction};
    use std::collections::HashMap;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_skips_empty_rows() {
        let mut tabs = HashMap::new();
        tabs.insert(
            "Transactions".to_string(),
            rows(&[
                Transaction::SHEET_HEADERS,
                &["t1", "2025-01-15", "Nubank", "Food", "Lunch", "-20", "", ""],
                &["", "", ""],
                &[],
                &["t2", "2025-01-16", "Nubank", "Food", "Dinner", "-30", "", ""],
            ]),
        );
        let mut sheet = TestSheet::new(tabs);
        let records: Vec<Transaction> = fetch(&mut sheet, "A1:H").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].transaction_id, "t2");
    }

    #[tokio::test]
    async fn test_missing_optional_tab_is_empty() {
        let mut sheet = TestSheet::new(HashMap::new());
        let budgets: Vec<Budget> = fetch(&mut sheet, "Budgets!A1:G").await.unwrap();
        assert!(budgets.is_empty());
        assert!(fetch::<Transaction>(&mut sheet, "A1:H").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_header_is_an_error() {
        let mut tabs = HashMap::new();
        tabs.insert(
            "Budgets".to_string(),
            rows(&[&["Category", "Person", "Amount"], &["Food", "Juliana", "10"]]),
        );
        let mut sheet = TestSheet::new(tabs);
        let err = fetch::<Budget>(&mut sheet, "Budgets!A1:G").await.unwrap_err();
        let schema = err.downcast_ref::<crate::error::SchemaError>().unwrap();
        assert!(schema.missing().contains(&"Month".to_string()));
    }

    #[test]
    fn test_mode_default() {
        assert_eq!(Mode::default(), Mode::Google);
    }
}
