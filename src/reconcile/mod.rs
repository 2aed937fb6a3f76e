//! Reconciliation pipeline
//!
//! A run is two stages over one transaction:
//!
//! ```text
//!   region feed ──► reconcile_regions ──► RegionLookup
//!                                              │
//!   organisation feed ─────────────► reconcile_organisations
//! ```
//!
//! Both feeds are fetched before the transaction opens, so no database lock
//! is held across network I/O. Any error rolls the whole run back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::feed::{FeedSource, OrganisationFeed, RegionFeed};
use crate::models::Region;
use crate::progress::{ProgressSink, TracingProgress};
use crate::store::{RegistryStore, RegistryTransaction};

pub mod normalize;
pub mod organisations;
pub mod regions;
pub mod report;

pub use normalize::{normalize, NormalizedOrganisation};
pub use organisations::reconcile_organisations;
pub use regions::reconcile_regions;
pub use report::{OrganisationSummary, RegionSummary, SyncReport};

/// Regions indexed by id and by code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionLookup {
    pub by_id: HashMap<String, Region>,
    pub by_code: HashMap<String, Region>,
}

impl RegionLookup {
    pub fn from_regions(regions: impl IntoIterator<Item = Region>) -> Self {
        let mut lookup = Self::default();
        for region in regions {
            lookup.insert(region);
        }
        lookup
    }

    pub fn insert(&mut self, region: Region) {
        self.by_code.insert(region.code.clone(), region.clone());
        self.by_id.insert(region.id.clone(), region);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Whether a run keeps its changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Commit,
    /// Perform the full run, then roll back
    DryRun,
}

/// Runs reconciliation passes against a feed source and a store
pub struct SyncRunner<F, S> {
    feeds: F,
    store: S,
    progress: Arc<dyn ProgressSink>,
}

impl<F: FeedSource, S: RegistryStore> SyncRunner<F, S> {
    pub fn new(feeds: F, store: S) -> Self {
        Self {
            feeds,
            store,
            progress: Arc::new(TracingProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn feeds(&self) -> &F {
        &self.feeds
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one reconciliation pass now
    pub async fn run_once(&self) -> Result<SyncReport, SyncError> {
        self.run(RunMode::Commit).await
    }

    pub async fn run(&self, mode: RunMode) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        info!(?mode, "Starting reconciliation run");

        let (region_feed, organisation_feed) = self.fetch_feeds().await?;

        let mut tx = self.store.begin().await?;
        let outcome = self
            .reconcile(tx.as_mut(), &region_feed, &organisation_feed)
            .await;

        let (regions, organisations) = match outcome {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!(error = %e, "Reconciliation failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };

        let committed = match mode {
            RunMode::Commit => {
                tx.commit().await?;
                true
            }
            RunMode::DryRun => {
                tx.rollback().await?;
                self.progress.line("Dry run: all changes rolled back");
                false
            }
        };

        let report = SyncReport {
            regions,
            organisations,
            committed,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            committed = report.committed,
            duration_ms = report.duration_ms,
            "Reconciliation run finished"
        );
        Ok(report)
    }

    async fn fetch_feeds(&self) -> Result<(RegionFeed, OrganisationFeed), SyncError> {
        self.progress.line("Fetching region data...");
        let region_feed = match self.feeds.fetch_regions().await {
            Ok(entries) => RegionFeed::Published(entries),
            Err(e) if e.is_not_published() => {
                info!(error = %e, "Region feed not published yet");
                RegionFeed::NotPublished
            }
            Err(e) => return Err(e.into()),
        };

        self.progress.line("Fetching organisation data...");
        let organisation_feed = self.feeds.fetch_organisations().await?;

        info!(
            regions_published = region_feed.is_published(),
            organisations = organisation_feed.len(),
            "Feeds fetched"
        );
        Ok((region_feed, organisation_feed))
    }

    async fn reconcile(
        &self,
        tx: &mut dyn RegistryTransaction,
        region_feed: &RegionFeed,
        organisation_feed: &OrganisationFeed,
    ) -> Result<(RegionSummary, OrganisationSummary), SyncError> {
        let progress = self.progress.as_ref();

        progress.stage("Refreshing region data");
        let (lookup, regions) = reconcile_regions(tx, region_feed, progress).await?;
        progress.line("Done!");

        progress.stage("Refreshing organisation data");
        let organisations =
            reconcile_organisations(tx, organisation_feed, &lookup, progress).await?;
        progress.line("Done!");

        Ok((regions, organisations))
    }
}
