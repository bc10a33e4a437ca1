//! Region statistics fetcher
//!
//! Runs every configured [`SectionSource`] concurrently for one region and
//! merges the results into a single [`RegionRecord`]. A failing section is
//! logged and left out of the merge; it never cancels its siblings.

use crate::error::{Result, StatsError};
use crate::metrics::StatsMetrics;
use crate::models::{RegionKey, RegionRecord};
use crate::source::SectionSource;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Result of one sub-fetch
#[derive(Debug, Clone)]
pub struct SectionOutcome {
    /// Name of the section the sub-fetch produces
    pub section: String,
    /// `Ok(None)` when the store had no data for the section
    pub result: Result<Option<Value>>,
}

/// Fetches and merges all sections of a region record
#[derive(Clone)]
pub struct StatsFetcher {
    sources: Vec<Arc<dyn SectionSource>>,
    metrics: Arc<StatsMetrics>,
}

impl StatsFetcher {
    /// Create a fetcher over `sources`
    ///
    /// The names of the sources are the expected sections of a complete record.
    pub fn new(sources: Vec<Arc<dyn SectionSource>>, metrics: Arc<StatsMetrics>) -> Self {
        Self { sources, metrics }
    }

    /// Sections a complete record carries
    pub fn expected_sections(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Whether `record` is missing any expected section
    pub fn is_degraded(&self, record: &RegionRecord) -> bool {
        !record.is_complete(&self.expected_sections())
    }

    /// Run every sub-fetch concurrently and return the individual outcomes
    ///
    /// Errors are returned as [`StatsError::SubFetchFailed`], including a
    /// sub-fetch task that panicked.
    pub async fn fetch_sections(&self, key: &RegionKey) -> Vec<SectionOutcome> {
        let mut tasks = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let source = Arc::clone(source);
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                let result = source.fetch(&key).await.map_err(|e| match e {
                    StatsError::SubFetchFailed { .. } => e,
                    other => StatsError::sub_fetch(source.name(), other.to_string()),
                });
                SectionOutcome {
                    section: source.name().to_string(),
                    result,
                }
            }));
        }

        join_all(tasks)
            .await
            .into_iter()
            .zip(&self.sources)
            .map(|(joined, source)| {
                joined.unwrap_or_else(|e| SectionOutcome {
                    section: source.name().to_string(),
                    result: Err(StatsError::sub_fetch(
                        source.name(),
                        format!("task join error: {}", e),
                    )),
                })
            })
            .collect()
    }

    /// Fetch the merged record for `key`
    ///
    /// # Returns
    /// * `Ok(record)` when at least one sub-fetch succeeded; failed sections
    ///   are omitted, so the record may be degraded
    /// * `Err(StatsError::FetchFailed)` when every sub-fetch failed
    pub async fn fetch(&self, key: &RegionKey) -> Result<RegionRecord> {
        let start = Instant::now();
        let outcomes = self.fetch_sections(key).await;

        let mut record = RegionRecord::new();
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(Some(value)) => {
                    record.insert_section(outcome.section, value);
                }
                Ok(None) => {
                    debug!("No data for section {} of {}", outcome.section, key);
                }
                Err(e) => {
                    warn!("Sub-fetch failed for {}: {}", key, e);
                    self.metrics.record_sub_fetch_failure();
                    failures.push(e.to_string());
                }
            }
        }

        let elapsed = start.elapsed();

        if !self.sources.is_empty() && failures.len() == self.sources.len() {
            self.metrics.record_fetch(false, elapsed);
            return Err(StatsError::FetchFailed {
                key: key.to_string(),
                message: failures.join("; "),
            });
        }

        self.metrics.record_fetch(true, elapsed);

        if self.is_degraded(&record) {
            self.metrics.record_degraded_record();
            warn!(
                "Degraded record for {}: missing sections {:?}",
                key,
                record.missing_sections(&self.expected_sections())
            );
        }

        debug!(
            "Fetched {} sections for {} in {:?}",
            record.len(),
            key,
            elapsed
        );
        Ok(record)
    }
}
