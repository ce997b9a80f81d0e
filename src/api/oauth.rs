//! OAuth 2.0 for the Google Sheets and Drive APIs.
//!
//! - Loads the client credentials from `client_secret.json`
//! - Runs the consent flow (with PKCE) and stores the tokens in `token.json`
//! - Refreshes the access token when it is about to expire

use crate::api::files::{File, SecretFile, TokenFile, REDIRECT};
use crate::api::OAUTH_SCOPES;
use crate::Result;
use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use url::Url;

type OAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Holds the OAuth client and the current tokens, refreshing and persisting them as needed.
#[derive(Debug)]
pub struct TokenProvider {
    client: OAuthClient,
    http: reqwest::Client,
    token: File<TokenFile>,
}

impl TokenProvider {
    /// Loads existing credentials and tokens. Never prompts.
    pub async fn load(secret_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Result<Self> {
        let secret = File::<SecretFile>::load(secret_path)
            .await
            .context("Unable to load the OAuth client secret file")?;
        let token = File::<TokenFile>::load(token_path)
            .await
            .context("Unable to load the OAuth token file")?;
        token.data().validate_scopes()?;
        Ok(Self {
            client: oauth_client(secret.data())?,
            http: http_client()?,
            token,
        })
    }

    /// Runs the interactive consent flow: prints the authorization URL, reads the redirect URL
    /// (or the bare code) from stdin, exchanges it for tokens and saves them to `token_path`.
    pub async fn initialize(
        secret_path: impl Into<PathBuf>,
        token_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let secret = File::<SecretFile>::load(secret_path)
            .await
            .context("Unable to load the OAuth client secret file")?;
        let client = oauth_client(secret.data())?;
        let http = http_client()?;

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(OAUTH_SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(challenge)
            .url();

        info!("Open this URL in your browser and grant access:\n\n{auth_url}\n");
        info!(
            "Your browser will then fail to load a page on {REDIRECT}. That is expected: copy the \
            full URL from the address bar and paste it here."
        );

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("Unable to read the redirect URL from stdin")?;
        let code = extract_code(&line, csrf.secret())?;

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(&http)
            .await
            .context("Unable to exchange the authorization code for tokens")?;

        let refresh_token = response
            .refresh_token()
            .map(|t| t.secret().to_string())
            .context("Google did not return a refresh token")?;
        let scopes = granted_scopes(&response);
        let expires_at = Utc::now() + expires_in(&response);
        let token = File::new(
            token_path,
            TokenFile::new(
                scopes,
                response.access_token().secret().to_string(),
                refresh_token,
                expires_at,
            ),
        );
        token.data().validate_scopes()?;
        token.save().await?;
        info!("Tokens saved to {}", token.path().display());

        Ok(Self {
            client,
            http,
            token,
        })
    }

    /// The current access token, which may be expired.
    pub fn token(&self) -> &str {
        self.token.data().access_token()
    }

    /// Returns an access token that is valid for at least a few more minutes, refreshing it first
    /// if needed.
    pub async fn token_with_refresh(&mut self) -> Result<String> {
        if self.token.data().expires_soon(Utc::now()) {
            self.refresh().await?;
        }
        Ok(self.token().to_string())
    }

    /// Exchanges the refresh token for a new access token and saves it.
    pub async fn refresh(&mut self) -> Result<()> {
        debug!("Refreshing the OAuth access token");
        let refresh_token = RefreshToken::new(self.token.data().refresh_token().to_string());
        let response = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
            .context("The refresh token was rejected. Run 'finmirror auth' to sign in again.")?;

        let expires_at = Utc::now() + expires_in(&response);
        self.token.data_mut().update(
            response.access_token().secret().to_string(),
            expires_at,
            response.refresh_token().map(|t| t.secret().to_string()),
        );
        self.token.save().await
    }
}

fn oauth_client(secret: &SecretFile) -> Result<OAuthClient> {
    Ok(BasicClient::new(ClientId::new(secret.client_id().to_string()))
        .set_client_secret(ClientSecret::new(secret.client_secret().to_string()))
        .set_auth_uri(AuthUrl::new(secret.auth_uri().to_string()).context("Invalid auth_uri")?)
        .set_token_uri(TokenUrl::new(secret.token_uri().to_string()).context("Invalid token_uri")?)
        .set_redirect_uri(RedirectUrl::new(REDIRECT.to_string()).context("Invalid redirect")?))
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Unable to build the HTTP client")
}

fn expires_in(response: &BasicTokenResponse) -> Duration {
    response
        .expires_in()
        .and_then(|d| Duration::from_std(d).ok())
        .unwrap_or_else(|| Duration::hours(1))
}

fn granted_scopes(response: &BasicTokenResponse) -> Vec<String> {
    match response.scopes() {
        Some(scopes) => scopes.iter().map(|s| s.to_string()).collect(),
        None => OAUTH_SCOPES.iter().map(|s| s.to_string()).collect(),
    }
}

/// Accepts either the full redirect URL or just the value of its `code` parameter. When a URL is
/// given, its `state` must match `expected_state`.
fn extract_code(input: &str, expected_state: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        bail!("No authorization code was entered");
    }
    let url = match Url::parse(input) {
        Ok(url) => url,
        Err(_) => return Ok(input.to_string()),
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => bail!("Authorization was denied: {value}"),
            _ => {}
        }
    }
    if state.as_deref() != Some(expected_state) {
        bail!("The state parameter of the redirect URL does not match this sign-in attempt");
    }
    code.context("The redirect URL has no 'code' parameter")
}
