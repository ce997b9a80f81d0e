//! The OAuth files kept in the secrets directory:
//! - `client_secret.json`: the OAuth 2.0 desktop-app credentials downloaded from Google Cloud
//! - `token.json`: the access and refresh tokens we obtained, in our own format

use crate::api::OAUTH_SCOPES;
use crate::{utils, Result};
use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use serde::de::{DeserializeOwned, Error};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// The redirect that must be registered for the credentials. Nothing listens on it: after
/// consent the browser fails to load it and the user pastes the URL back into the terminal.
pub(super) const REDIRECT: &str = "http://localhost";

/// How close to expiry a token may get before it is refreshed.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// A JSON file held in memory together with the path it was loaded from, so that it can be
/// modified and saved back.
#[derive(Default, Debug, Clone)]
pub(super) struct File<F>
where
    F: Serialize + DeserializeOwned + Clone + Debug,
{
    path: PathBuf,
    data: F,
}

impl<F> File<F>
where
    F: Serialize + DeserializeOwned + Clone + Debug,
{
    pub(super) async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data: F = utils::deserialize(&path).await?;
        Ok(Self { path, data })
    }

    pub(super) fn new(path: impl Into<PathBuf>, data: F) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    /// Writes the data as pretty JSON. The file is only readable by its owner.
    pub(super) async fn save(&self) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.data).context("Failed to serialize data to JSON")?;
        utils::write(&self.path, json).await?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, Permissions::from_mode(0o600))
                .await
                .with_context(|| format!("Failed to set permissions on {}", self.path.display()))?;
        }

        Ok(())
    }

    pub(super) fn data(&self) -> &F {
        &self.data
    }

    pub(super) fn data_mut(&mut self) -> &mut F {
        &mut self.data
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }
}

/// The structure of `client_secret.json` as downloaded from Google Cloud Console. Desktop-app
/// credentials are wrapped in an `installed` object:
///
/// ```json
/// {
///   "installed": {
///     "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
///     "client_secret": "YOUR_CLIENT_SECRET",
///     "redirect_uris": ["http://localhost"],
///     "auth_uri": "https://accounts.google.com/o/oauth2/auth",
///     "token_uri": "https://oauth2.googleapis.com/token"
///   }
/// }
/// ```
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(super) struct SecretFile {
    installed: InstalledCredentials,
}

impl SecretFile {
    pub(super) fn client_id(&self) -> &str {
        &self.installed.client_id
    }

    pub(super) fn client_secret(&self) -> &str {
        &self.installed.client_secret
    }

    pub(super) fn auth_uri(&self) -> &str {
        &self.installed.auth_uri
    }

    pub(super) fn token_uri(&self) -> &str {
        &self.installed.token_uri
    }
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
    #[serde(deserialize_with = "redirect_uris")]
    redirect_uris: Vec<String>,
    auth_uri: String,
    token_uri: String,
}

fn redirect_uris<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let uris = Vec::<String>::deserialize(deserializer)?;
    if !uris.iter().any(|s| s == REDIRECT || s == "http://127.0.0.1") {
        return Err(D::Error::custom(format!(
            "At least one of the redirects needs to be {REDIRECT}, but this was not found. \
            When creating the OAuth client in Google Cloud, you must include '{REDIRECT}'"
        )));
    }
    Ok(uris)
}

/// The tokens we received from Google, saved in a shape that is easy to inspect by hand.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(super) struct TokenFile {
    scopes: Vec<String>,
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl TokenFile {
    pub(super) fn new(
        scopes: Vec<String>,
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scopes,
            access_token,
            refresh_token,
            expires_at,
        }
    }

    /// Checks that every scope this program needs was granted.
    pub(super) fn validate_scopes(&self) -> Result<()> {
        let found: HashSet<&str> = self.scopes.iter().map(|s| s.as_str()).collect();
        for &required in OAUTH_SCOPES {
            if !found.contains(required) {
                bail!("OAuth scope '{required}' is missing.");
            }
        }
        Ok(())
    }

    pub(super) fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(super) fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// True when the token has expired or will within the next five minutes.
    pub(super) fn expires_soon(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::minutes(EXPIRY_BUFFER_MINUTES)
    }

    /// Google only sends a new refresh token occasionally; the old one is kept otherwise.
    pub(super) fn update(
        &mut self,
        access_token: String,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
    ) {
        self.access_token = access_token;
        self.expires_at = expires_at;
        if let Some(rt) = refresh_token {
            self.refresh_token = rt;
        }
    }
}
