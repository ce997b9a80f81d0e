use crate::commands::Out;
use crate::config::Environment;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the home directory, its subdirectories and:
/// - Creates an initial `config.json` file using `sheet_url` along with default settings
/// - Moves `secret_file` into its default location in the home directory.
///
/// # Arguments
/// - `home` - The directory that will be the root of the home directory, e.g. `$HOME/finmirror`
/// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON needed to start the Google
///   OAuth workflow.
/// - `sheet_url` - The URL of the Google Sheet where the financial data is stored.
/// - `drive_folder_id` - The Google Drive folder for the remote cache, if any.
/// - `environment` - `development` allows falling back to the local cache.
///
/// # Errors
/// - Returns an error if the sheet URL is invalid or any file operations fail.
pub async fn init(
    home: &Path,
    secret_file: &Path,
    sheet_url: &str,
    drive_folder_id: Option<&str>,
    environment: Environment,
) -> Result<Out<()>> {
    let config = Config::create(home, secret_file, sheet_url, drive_folder_id, environment)
        .await
        .context("Unable to create the home directory and configs")
        .pub_result(ErrorType::Config)?;
    Ok(format!(
        "Successfully created the finmirror directory at {}. Run 'finmirror auth' next.",
        config.root().display()
    )
    .into())
}
