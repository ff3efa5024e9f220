//! Filter List Ingestion
//!
//! Downloads lists and feeds them to the parser. Sources are fetched
//! concurrently and fail independently: one slow or broken list never
//! delays or cancels the others.

use crate::client::{FetchError, HttpClient};
use crate::config::FilterListSource;
use crate::filter_list;
use crate::rule_store::RuleStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of one ingestion pass over several sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Names of sources that downloaded and parsed
    pub succeeded: Vec<String>,
    /// `(name, error)` for each source that failed
    pub failed: Vec<(String, String)>,
    /// New rules added across all sources
    pub added: usize,
}

impl IngestSummary {
    pub fn any_succeeded(&self) -> bool {
        !self.succeeded.is_empty()
    }
}

/// Fetches lists into a shared rule store
#[derive(Debug, Clone)]
pub struct Ingestor {
    client: HttpClient,
    store: Arc<RuleStore>,
}

impl Ingestor {
    pub fn new(client: HttpClient, store: Arc<RuleStore>) -> Self {
        Self { client, store }
    }

    /// Download one list and parse it into the store.
    ///
    /// Returns the number of rules that were not already present.
    pub async fn fetch_list(&self, url: &str) -> Result<usize, FetchError> {
        let start = Instant::now();
        let text = self.client.get_text(url).await?;

        // Large lists take a while to parse; keep that off the async workers
        let store = self.store.clone();
        let stats = tokio::task::spawn_blocking(move || filter_list::parse(&text, &store))
            .await
            .map_err(|e| FetchError::Parse {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            url,
            lines = stats.lines,
            added = stats.added,
            elapsed = ?start.elapsed(),
            "Filter list ingested"
        );
        Ok(stats.added)
    }

    /// Fetch every source concurrently and wait for all of them
    pub async fn fetch_all(&self, sources: &[FilterListSource]) -> IngestSummary {
        let start = Instant::now();
        let mut tasks = JoinSet::new();

        for source in sources {
            let ingestor = self.clone();
            let source = source.clone();
            tasks.spawn(async move {
                let result = ingestor.fetch_list(&source.url).await;
                (source.name, result)
            });
        }

        let mut summary = IngestSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(added))) => {
                    summary.added += added;
                    summary.succeeded.push(name);
                }
                Ok((name, Err(e))) => {
                    warn!("Filter list {} failed: {}", name, e);
                    summary.failed.push((name, e.to_string()));
                }
                Err(e) => {
                    warn!("Filter list task aborted: {}", e);
                    summary.failed.push(("<task>".to_string(), e.to_string()));
                }
            }
        }

        summary.succeeded.sort();
        summary.failed.sort();

        info!(
            "Filter lists refreshed: {}/{} sources, {} new rules in {:?}",
            summary.succeeded.len(),
            sources.len(),
            summary.added,
            start.elapsed()
        );
        summary
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClientConfig;
    use crate::test_support::{Route, TestServer};
    use std::time::Duration;

    fn ingestor(timeout: Duration) -> Ingestor {
        let client = HttpClient::new(HttpClientConfig {
            timeout,
            ..HttpClientConfig::default()
        });
        Ingestor::new(client, Arc::new(RuleStore::new()))
    }

    #[tokio::test]
    async fn test_fetch_list_populates_store() {
        let server = TestServer::start(&[(
            "/hosts",
            Route::body("# comment\n0.0.0.0 ads.example.net\n||tracker.example^\nexample.org##.banner\n"),
        )])
        .await;
        let ingestor = ingestor(Duration::from_secs(2));

        let added = ingestor.fetch_list(&server.url("/hosts")).await.unwrap();
        assert_eq!(added, 3);
        assert!(ingestor.store().domains.contains("ads.example.net"));
        assert!(ingestor.store().domains.contains("tracker.example"));
        assert!(ingestor.store().cosmetic.selectors_for("www.example.org").contains(".banner"));

        // Same list again adds nothing
        assert_eq!(ingestor.fetch_list(&server.url("/hosts")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_all_isolates_failures() {
        let server = TestServer::start(&[
            ("/good", Route::body("0.0.0.0 good.example\n")),
            ("/also-good", Route::body("||other.example^\n")),
            ("/broken", Route::Status(500)),
            ("/slow", Route::Stall),
        ])
        .await;
        let ingestor = ingestor(Duration::from_millis(500));

        let sources = vec![
            FilterListSource::new("good", &server.url("/good")),
            FilterListSource::new("broken", &server.url("/broken")),
            FilterListSource::new("slow", &server.url("/slow")),
            FilterListSource::new("also-good", &server.url("/also-good")),
        ];

        let summary = ingestor.fetch_all(&sources).await;
        assert_eq!(summary.succeeded, vec!["also-good".to_string(), "good".to_string()]);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.failed[0].0, "broken");
        assert_eq!(summary.failed[1].0, "slow");
        assert_eq!(summary.added, 2);
        assert!(summary.any_succeeded());
        assert!(ingestor.store().domains.contains("good.example"));
        assert!(ingestor.store().domains.contains("other.example"));
    }

    #[tokio::test]
    async fn test_fetch_all_runs_sources_concurrently() {
        let server = TestServer::start(&[
            ("/slow-a", Route::Stall),
            ("/slow-b", Route::Stall),
            ("/slow-c", Route::Stall),
        ])
        .await;
        let timeout = Duration::from_millis(300);
        let ingestor = ingestor(timeout);

        let sources: Vec<FilterListSource> = ["slow-a", "slow-b", "slow-c"]
            .iter()
            .map(|name| FilterListSource::new(name, &server.url(&format!("/{name}"))))
            .collect();

        let start = Instant::now();
        let summary = ingestor.fetch_all(&sources).await;
        let elapsed = start.elapsed();

        assert_eq!(summary.failed.len(), 3);
        assert!(
            elapsed < timeout * 2,
            "three stalled sources took {:?}; they were not fetched in parallel",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_fetch_all_empty() {
        let summary = ingestor(Duration::from_secs(1)).fetch_all(&[]).await;
        assert_eq!(summary, IngestSummary::default());
        assert!(!summary.any_succeeded());
    }
}
