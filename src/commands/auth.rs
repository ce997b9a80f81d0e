//! Authentication command handlers for the OAuth flow.
//!
//! This module implements the CLI commands for:
//! - `finmirror auth` - Initial OAuth consent flow
//! - `finmirror auth --verify` - Verify and refresh authentication

use crate::api::TokenProvider;
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;

/// Handles the `finmirror auth` command - runs the OAuth consent flow.
///
/// This is the ONLY command that prompts for OAuth consent. It:
/// 1. Loads the client secret that `finmirror init` stored
/// 2. Prints the authorization URL and reads the redirect URL back from the terminal
/// 3. Saves tokens to token.json with the spreadsheets and drive scopes
///
/// # Errors
/// Returns an error if the OAuth flow fails or if client_secret.json is missing.
pub async fn auth(config: &Config) -> Result<Out<()>> {
    TokenProvider::initialize(config.client_secret_path(), config.token_path())
        .await
        .pub_result(ErrorType::Auth)?;
    Ok(format!(
        "Authorization succeeded. Tokens were saved to {}",
        config.token_path().display()
    )
    .into())
}

/// Handles the `finmirror auth --verify` command - verifies authentication.
///
/// This command NEVER prompts. It loads the existing tokens and refreshes the access token. If
/// the token is missing, invalid, or has the wrong scopes, this command fails with an error
/// message telling the user to run `finmirror auth`.
pub async fn auth_verify(config: &Config) -> Result<Out<()>> {
    let mut token_provider = TokenProvider::load(config.client_secret_path(), config.token_path())
        .await
        .context(
            "Unable to use the existing tokens found in the token JSON file. \n\n\
            You should run 'finmirror auth' (without the --verify flag).",
        )
        .pub_result(ErrorType::Auth)?;
    token_provider
        .refresh()
        .await
        .context("Unable to refresh the token")
        .pub_result(ErrorType::Auth)?;
    Ok("Your OAuth token is valid!".into())
}
