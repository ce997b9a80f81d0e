use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// The three independently cached datasets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    Transactions,
    Budgets,
    BudgetTemplates,
}

serde_plain::derive_display_from_serialize!(Domain);
serde_plain::derive_fromstr_from_deserialize!(Domain);

impl Domain {
    pub const ALL: [Domain; 3] = [
        Domain::Transactions,
        Domain::Budgets,
        Domain::BudgetTemplates,
    ];

    /// Name of the blob holding the encoded records.
    pub fn data_blob(&self) -> &'static str {
        match self {
            Domain::Transactions => "transactions.csv",
            Domain::Budgets => "budgets.csv",
            Domain::BudgetTemplates => "budget-templates.csv",
        }
    }

    /// Name of the blob holding the `CacheMetadata` JSON.
    pub fn metadata_blob(&self) -> &'static str {
        match self {
            Domain::Transactions => "metadata.json",
            Domain::Budgets => "budgets-metadata.json",
            Domain::BudgetTemplates => "budget-templates-metadata.json",
        }
    }
}

/// The recorded state of a cached dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Fresh,
    Stale,
    Error,
    #[default]
    Missing,
}

serde_plain::derive_display_from_serialize!(CacheStatus);
serde_plain::derive_fromstr_from_deserialize!(CacheStatus);

/// Bookkeeping stored next to each data blob. `status` is what was recorded at the last refresh;
/// live validity is decided by comparing the current time with `expires_at`.
///
/// Older metadata files used `transactionCount` and `spreadsheetId`; both are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    #[serde(with = "millis")]
    pub last_update: DateTime<Utc>,
    pub status: CacheStatus,
    #[serde(alias = "transactionCount")]
    pub record_count: u64,
    #[serde(with = "millis")]
    pub expires_at: DateTime<Utc>,
    #[serde(alias = "spreadsheetId")]
    pub source_id: String,
    pub version: u32,
}

impl CacheMetadata {
    /// Metadata for a refresh that happened at `now`. Timestamps are kept at millisecond
    /// precision, which is what the JSON form stores.
    pub fn new(
        now: DateTime<Utc>,
        record_count: u64,
        status: CacheStatus,
        source_id: impl Into<String>,
        ttl_minutes: u32,
    ) -> Self {
        let last_update = now.trunc_subsecs(3);
        Self {
            last_update,
            status,
            record_count,
            expires_at: last_update + Duration::minutes(i64::from(ttl_minutes)),
            source_id: source_id.into(),
            version: 1,
        }
    }

    /// True when the recorded status is `fresh` and `now` is strictly before `expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CacheStatus::Fresh && now < self.expires_at
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix, e.g. `2025-01-15T10:30:00.000Z`.
mod millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_expiry_is_last_update_plus_ttl() {
        let meta = CacheMetadata::new(now(), 10, CacheStatus::Fresh, "sheet-1", 60);
        assert_eq!(meta.expires_at, now() + Duration::minutes(60));
        assert_eq!(meta.version, 1);
    }

    #[test]
    fn test_ttl_boundary() {
        let meta = CacheMetadata::new(now(), 10, CacheStatus::Fresh, "sheet-1", 60);
        assert!(meta.is_valid_at(meta.expires_at - Duration::milliseconds(1)));
        assert!(!meta.is_valid_at(meta.expires_at));
    }

    #[test]
    fn test_recorded_status_must_be_fresh() {
        let meta = CacheMetadata::new(now(), 10, CacheStatus::Stale, "sheet-1", 60);
        assert!(!meta.is_valid_at(now()));
    }

    #[test]
    fn test_json_shape() {
        let meta = CacheMetadata::new(now(), 3, CacheStatus::Fresh, "sheet-1", 90);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["lastUpdate"], "2025-01-15T10:30:00.000Z");
        assert_eq!(json["expiresAt"], "2025-01-15T12:00:00.000Z");
        assert_eq!(json["status"], "fresh");
        assert_eq!(json["recordCount"], 3);
        assert_eq!(json["sourceId"], "sheet-1");
        assert_eq!(json["version"], 1);
    }

    #[test]
    fn test_legacy_field_names() {
        let json = r#"{
            "lastUpdate": "2025-01-15T10:30:00.000Z",
            "status": "fresh",
            "transactionCount": 42,
            "expiresAt": "2025-01-15T11:30:00.000Z",
            "spreadsheetId": "abc",
            "version": 1
        }"#;
        let meta: CacheMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.record_count, 42);
        assert_eq!(meta.source_id, "abc");
        assert_eq!(meta.expires_at, now() + Duration::hours(1));
    }

    #[test]
    fn test_domain_blob_names() {
        assert_eq!(Domain::Transactions.data_blob(), "transactions.csv");
        assert_eq!(Domain::Transactions.metadata_blob(), "metadata.json");
        assert_eq!(
            Domain::BudgetTemplates.metadata_blob(),
            "budget-templates-metadata.json"
        );
        assert_eq!(Domain::BudgetTemplates.to_string(), "budget-templates");
    }
}
