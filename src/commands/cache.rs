//! The `finmirror cache` subcommands.

use crate::api::Mode;
use crate::cache::CacheStatusReport;
use crate::commands::Out;
use crate::model::{CacheMetadata, Domain};
use crate::pipeline::Pipeline;
use crate::{Config, Result};
use chrono::Utc;

/// Reports the state of every cached domain. Nothing is fetched from the sheet.
pub async fn cache_status(config: Config, mode: Mode) -> Result<Out<Vec<CacheStatusReport>>> {
    let pipeline = Pipeline::connect(config, mode).await?;
    let reports = pipeline.status(Utc::now()).await;
    let valid = reports.iter().filter(|r| r.is_valid).count();
    Ok(Out::new(
        format!("{valid} of {} cached domains are valid", reports.len()),
        reports,
    ))
}

/// Replaces the cache of `domain`, or of every domain, with the sheet contents.
pub async fn cache_refresh(
    config: Config,
    mode: Mode,
    domain: Option<Domain>,
) -> Result<Out<Vec<CacheMetadata>>> {
    let pipeline = Pipeline::connect(config, mode).await?;
    let mut refreshed = Vec::new();
    for domain in domain.map_or(Domain::ALL.to_vec(), |d| vec![d]) {
        refreshed.push(pipeline.refresh_domain(domain).await?);
    }
    let records: u64 = refreshed.iter().map(|m| m.record_count).sum();
    Ok(Out::new(
        format!("Refreshed {} domain(s) with {records} records", refreshed.len()),
        refreshed,
    ))
}

pub async fn cache_clear(config: Config, mode: Mode, domain: Option<Domain>) -> Result<Out<()>> {
    let pipeline = Pipeline::connect(config, mode).await?;
    pipeline.clear(domain).await;
    Ok(match domain {
        Some(domain) => format!("Cleared the {domain} cache").into(),
        None => "Cleared the cache".into(),
    })
}

/// Creates the cache files that the Google Drive folder does not have yet.
pub async fn cache_init_remote(config: Config, mode: Mode) -> Result<Out<Vec<String>>> {
    let pipeline = Pipeline::connect(config, mode).await?;
    let created = pipeline.init_remote().await?;
    let message = if created.is_empty() {
        String::from("The remote cache folder already has every cache file")
    } else {
        format!("Created {} file(s) in the remote cache folder", created.len())
    };
    Ok(Out::new(message, created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CacheStatus;
    use crate::test::TestEnv;
    use serde_json::json;

    #[tokio::test]
    async fn test_refresh_then_status_then_clear() {
        let env = TestEnv::new().await;
        let out = cache_refresh(env.config(), Mode::Testing, None).await.unwrap();
        let refreshed = out.structure().unwrap();
        assert_eq!(refreshed.len(), 3);
        assert_eq!(refreshed[0].record_count, 10);
        assert!(env.config().cache_dir().join("transactions.csv").is_file());

        let out = cache_status(env.config(), Mode::Testing).await.unwrap();
        assert_eq!(out.message(), "3 of 3 cached domains are valid");

        cache_clear(env.config(), Mode::Testing, Some(Domain::Budgets))
            .await
            .unwrap();
        let out = cache_status(env.config(), Mode::Testing).await.unwrap();
        let reports = out.structure().unwrap();
        assert_eq!(reports[1].metadata.status, CacheStatus::Missing);
        assert_eq!(reports[2].metadata.status, CacheStatus::Fresh);
    }

    #[tokio::test]
    async fn test_init_remote_in_testing_mode() {
        let env = TestEnv::with_config(|v| v["drive_folder_id"] = json!("folder")).await;
        let out = cache_init_remote(env.config(), Mode::Testing).await.unwrap();
        assert_eq!(out.structure().unwrap().len(), 6);
    }
}
