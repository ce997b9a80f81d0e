//! The tiered cache. A `Coordinator` owns the ordered list of blob stores that mirror one domain of
//! the spreadsheet and decides which store is read, which is written and when the cached copy is
//! still good.
//!
//! Tier order is remote first (when a remote folder is configured), then local. Whether a failing
//! remote tier may be replaced by the local one is decided by the `FallbackPolicy`, never by
//! looking at the environment directly.

use crate::codec::{self, Record};
use crate::model::{CacheMetadata, CacheStatus, Domain};
use crate::store::{BlobStore, ContentType};
use crate::Result;
use anyhow::{anyhow, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether the local tier may stand in for a failing remote tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub allow_local_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    Remote,
    Local,
}

impl Display for TierKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TierKind::Remote => write!(f, "remote"),
            TierKind::Local => write!(f, "local"),
        }
    }
}

/// One blob store in the preference order.
#[derive(Debug, Clone)]
pub struct Tier {
    pub kind: TierKind,
    pub store: Arc<dyn BlobStore>,
}

/// Coordinates the cache tiers of the domain that `R` belongs to.
#[derive(Debug)]
pub struct Coordinator<R: Record> {
    tiers: Vec<Tier>,
    policy: FallbackPolicy,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for Coordinator<R> {
    fn clone(&self) -> Self {
        Self {
            tiers: self.tiers.clone(),
            policy: self.policy,
            _record: PhantomData,
        }
    }
}

impl<R: Record> Coordinator<R> {
    /// Orders the tiers: `remote` first when present, then `local`.
    pub fn new(
        remote: Option<Arc<dyn BlobStore>>,
        local: Arc<dyn BlobStore>,
        policy: FallbackPolicy,
    ) -> Self {
        let mut tiers = Vec::with_capacity(2);
        if let Some(store) = remote {
            tiers.push(Tier {
                kind: TierKind::Remote,
                store,
            });
        }
        tiers.push(Tier {
            kind: TierKind::Local,
            store: local,
        });
        Self {
            tiers,
            policy,
            _record: PhantomData,
        }
    }

    pub fn domain(&self) -> Domain {
        R::DOMAIN
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// True when metadata exists, its recorded status is `fresh` and `now` is before `expiresAt`.
    /// Missing or unreadable metadata is never valid.
    pub async fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.metadata()
            .await
            .is_some_and(|metadata| metadata.is_valid_at(now))
    }

    pub async fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now()).await
    }

    /// Whether the primary tier holds the data blob. Other tiers are only asked when the primary
    /// fails and the policy allows local fallback.
    pub async fn exists(&self) -> bool {
        let name = R::DOMAIN.data_blob();
        for (ix, tier) in self.tiers.iter().enumerate() {
            match tier.store.exists(name).await {
                Ok(exists) => return exists,
                Err(e) => {
                    warn!(
                        domain = %R::DOMAIN,
                        tier = %tier.kind,
                        "Unable to check for '{name}' in {}: {e:#}",
                        tier.store.describe()
                    );
                    if !self.may_fall_through(ix) {
                        return false;
                    }
                }
            }
        }
        false
    }

    /// Reads and decodes the data blob from the first tier that has it. Returns no records when
    /// no allowed tier has it.
    pub async fn read(&self) -> Vec<R> {
        match self.read_blob(R::DOMAIN.data_blob()).await {
            Some(text) => {
                let records = codec::decode::<R>(&text);
                debug!(domain = %R::DOMAIN, count = records.len(), "Read records from the cache");
                records
            }
            None => Vec::new(),
        }
    }

    /// Encodes `records` once and stores them.
    pub async fn write(&self, records: &[R]) -> Result<()> {
        let text = codec::encode(records)
            .with_context(|| format!("Unable to encode {} for the cache", R::DOMAIN))?;
        self.write_blob(R::DOMAIN.data_blob(), &text, ContentType::Csv)
            .await
    }

    /// The stored metadata, or `None` when it is missing or cannot be parsed.
    pub async fn metadata(&self) -> Option<CacheMetadata> {
        self.read_metadata().await.ok().flatten()
    }

    pub async fn refresh_metadata(
        &self,
        record_count: u64,
        status: CacheStatus,
        source_id: &str,
        ttl_minutes: u32,
    ) -> Result<CacheMetadata> {
        self.refresh_metadata_at(Utc::now(), record_count, status, source_id, ttl_minutes)
            .await
    }

    /// Records a refresh that happened at `now` and stores the metadata with the same tier rules as
    /// `write`.
    pub async fn refresh_metadata_at(
        &self,
        now: DateTime<Utc>,
        record_count: u64,
        status: CacheStatus,
        source_id: &str,
        ttl_minutes: u32,
    ) -> Result<CacheMetadata> {
        let metadata = CacheMetadata::new(now, record_count, status, source_id, ttl_minutes);
        let json = serde_json::to_string_pretty(&metadata)
            .context("Unable to serialize cache metadata")?;
        self.write_blob(R::DOMAIN.metadata_blob(), &json, ContentType::Json)
            .await?;
        Ok(metadata)
    }

    /// Deletes the data and metadata blobs from every tier. Failures are logged and skipped.
    pub async fn clear(&self) {
        for tier in &self.tiers {
            for name in [R::DOMAIN.data_blob(), R::DOMAIN.metadata_blob()] {
                if let Err(e) = tier.store.delete(name).await {
                    warn!(
                        domain = %R::DOMAIN,
                        tier = %tier.kind,
                        "Unable to delete '{name}' from {}: {e:#}",
                        tier.store.describe()
                    );
                }
            }
        }
        info!(domain = %R::DOMAIN, "Cleared the cache");
    }

    /// Creates the blobs that the remote tier is missing: a header-only data blob and metadata
    /// marked `missing`. Returns the names that were created.
    pub async fn init_remote(&self, source_id: &str) -> Result<Vec<String>> {
        let Some(remote) = self.tiers.iter().find(|t| t.kind == TierKind::Remote) else {
            return Ok(Vec::new());
        };
        let placeholder = CacheMetadata::new(Utc::now(), 0, CacheStatus::Missing, source_id, 0);
        let blobs = [
            (R::DOMAIN.data_blob(), codec::encode::<R>(&[])?, ContentType::Csv),
            (
                R::DOMAIN.metadata_blob(),
                serde_json::to_string_pretty(&placeholder)?,
                ContentType::Json,
            ),
        ];

        let mut created = Vec::new();
        for (name, content, content_type) in blobs {
            if remote.store.exists(name).await? {
                debug!(domain = %R::DOMAIN, "'{name}' already exists in {}", remote.store.describe());
                continue;
            }
            remote
                .store
                .create(name, &content, content_type)
                .await
                .with_context(|| format!("Unable to create '{name}' in {}", remote.store.describe()))?;
            info!(domain = %R::DOMAIN, "Created '{name}' in {}", remote.store.describe());
            created.push(name.to_string());
        }
        Ok(created)
    }

    /// Describes the cache as of `now`. `source_id` fills the report when there is no metadata.
    pub async fn status_at(
        &self,
        now: DateTime<Utc>,
        auto_refresh: bool,
        source_id: &str,
    ) -> CacheStatusReport {
        let placeholder = |status| CacheMetadata {
            last_update: now,
            status,
            record_count: 0,
            expires_at: now,
            source_id: source_id.to_string(),
            version: 1,
        };

        if !self.exists().await {
            return CacheStatusReport {
                domain: R::DOMAIN,
                metadata: placeholder(CacheStatus::Missing),
                is_valid: false,
                next_refresh: None,
                time_until_expiry: None,
                message: String::from("The cache does not exist. Refresh to create it."),
            };
        }

        let mut metadata = match self.read_metadata().await {
            Ok(Some(metadata)) => metadata,
            Ok(None) | Err(_) => {
                return CacheStatusReport {
                    domain: R::DOMAIN,
                    metadata: placeholder(CacheStatus::Error),
                    is_valid: false,
                    next_refresh: None,
                    time_until_expiry: None,
                    message: String::from("Unable to read the cache metadata."),
                }
            }
        };

        let remaining = (metadata.expires_at - now).num_milliseconds();
        if remaining <= 0 {
            metadata.status = CacheStatus::Stale;
            CacheStatusReport {
                domain: R::DOMAIN,
                metadata,
                is_valid: false,
                next_refresh: auto_refresh
                    .then(|| now.to_rfc3339_opts(SecondsFormat::Millis, true)),
                time_until_expiry: Some(0),
                message: String::from("The cache has expired. It will be refreshed on the next load."),
            }
        } else {
            metadata.status = CacheStatus::Fresh;
            let minutes = remaining / 1000 / 60;
            CacheStatusReport {
                domain: R::DOMAIN,
                metadata,
                is_valid: true,
                next_refresh: None,
                time_until_expiry: Some(remaining),
                message: format!("The cache is valid. It expires in {minutes} minutes."),
            }
        }
    }

    /// The metadata of the first tier that has it. `Err` means a metadata blob was found but could
    /// not be parsed.
    async fn read_metadata(&self) -> Result<Option<CacheMetadata>> {
        let name = R::DOMAIN.metadata_blob();
        let Some(json) = self.read_blob(name).await else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheMetadata>(&json) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                warn!(domain = %R::DOMAIN, "Unable to parse '{name}': {e}");
                Err(anyhow!(e).context(format!("Unable to parse '{name}'")))
            }
        }
    }

    async fn read_blob(&self, name: &str) -> Option<String> {
        for (ix, tier) in self.tiers.iter().enumerate() {
            match tier.store.read(name).await {
                Ok(Some(content)) => {
                    debug!(domain = %R::DOMAIN, tier = %tier.kind, "Read '{name}'");
                    return Some(content);
                }
                Ok(None) => {
                    debug!(domain = %R::DOMAIN, tier = %tier.kind, "'{name}' is absent");
                }
                Err(e) => {
                    warn!(
                        domain = %R::DOMAIN,
                        tier = %tier.kind,
                        "Unable to read '{name}' from {}: {e:#}",
                        tier.store.describe()
                    );
                }
            }
            if !self.may_fall_through(ix) {
                return None;
            }
        }
        None
    }

    async fn write_blob(&self, name: &str, content: &str, content_type: ContentType) -> Result<()> {
        let (primary, rest) = match self.tiers.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };

        match primary.store.write(name, content, content_type).await {
            Ok(()) => {
                debug!(domain = %R::DOMAIN, tier = %primary.kind, "Wrote '{name}'");
                if self.policy.allow_local_fallback {
                    for tier in rest {
                        if let Err(e) = tier.store.write(name, content, content_type).await {
                            warn!(
                                domain = %R::DOMAIN,
                                tier = %tier.kind,
                                "Unable to mirror '{name}' to {}: {e:#}",
                                tier.store.describe()
                            );
                        }
                    }
                }
                Ok(())
            }
            Err(e) if rest.is_empty() || !self.policy.allow_local_fallback => Err(e).with_context(
                || format!("Unable to write '{name}' to {}", primary.store.describe()),
            ),
            Err(e) => {
                warn!(
                    domain = %R::DOMAIN,
                    tier = %primary.kind,
                    "Unable to write '{name}' to {}, falling back: {e:#}",
                    primary.store.describe()
                );
                let mut last_error = e;
                for tier in rest {
                    match tier.store.write(name, content, content_type).await {
                        Ok(()) => {
                            info!(domain = %R::DOMAIN, tier = %tier.kind, "Wrote '{name}' to the fallback tier");
                            return Ok(());
                        }
                        Err(e) => last_error = e,
                    }
                }
                Err(last_error).with_context(|| format!("Unable to write '{name}' to any cache tier"))
            }
        }
    }

    /// Whether a lookup that came up empty on tier `ix` may continue to the next tier.
    fn may_fall_through(&self, ix: usize) -> bool {
        ix + 1 < self.tiers.len() && self.policy.allow_local_fallback
    }
}

/// What `cache status` reports for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatusReport {
    pub domain: Domain,
    #[serde(flatten)]
    pub metadata: CacheMetadata,
    pub is_valid: bool,
    pub next_refresh: Option<String>,
    /// Milliseconds until `expiresAt`, zero once expired.
    pub time_until_expiry: Option<i64>,
    pub message: String,
}
