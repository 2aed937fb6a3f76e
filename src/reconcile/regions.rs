//! Region reconciliation
//!
//! Upserts every region in the feed by id, then replaces each region's
//! predecessor set with the feed's predecessor ids that resolved locally.

use std::collections::BTreeSet;
use tracing::{debug, info};

use super::report::RegionSummary;
use super::RegionLookup;
use crate::error::SyncError;
use crate::feed::{RegionFeed, RegionFeedEntry};
use crate::models::Region;
use crate::progress::ProgressSink;
use crate::store::RegistryTransaction;

/// Reconcile regions and return the lookup tables for the organisation stage
pub async fn reconcile_regions(
    tx: &mut dyn RegistryTransaction,
    feed: &RegionFeed,
    progress: &dyn ProgressSink,
) -> Result<(RegionLookup, RegionSummary), SyncError> {
    let entries = match feed {
        RegionFeed::Published(entries) => entries,
        RegionFeed::NotPublished => {
            progress.line("regions.json is not live yet, so skipping for now");
            let lookup = RegionLookup::from_regions(tx.all_regions().await?);
            info!(regions = lookup.len(), "Region feed not published, using local regions");
            let summary = RegionSummary {
                feed_published: false,
                known: lookup.len(),
                ..Default::default()
            };
            return Ok((lookup, summary));
        }
    };

    let mut lookup = RegionLookup::default();
    let mut summary = RegionSummary {
        feed_published: true,
        ..Default::default()
    };

    progress.line("Updating region data...");
    for entry in entries {
        let upsert = tx.upsert_region(&region_from_entry(entry)).await?;
        if upsert.created {
            summary.created += 1;
            progress.line(&format!("Added new region: {}", upsert.region));
        } else {
            summary.updated += 1;
            progress.line(&format!("Updated existing region: {}", upsert.region));
        }
        lookup.insert(upsert.region);
    }
    summary.known = lookup.len();

    progress.line("Setting region predecessor values...");
    for entry in entries {
        let (resolved, dropped) = resolve_predecessors(entry, &lookup);
        if dropped > 0 {
            debug!(
                region = %entry.code,
                dropped,
                "Ignoring predecessor ids with no matching region"
            );
        }

        let names: Vec<String> = resolved
            .iter()
            .filter_map(|id| lookup.by_id.get(id))
            .map(|r| r.to_string())
            .collect();
        progress.line(&format!(
            "Setting predecessors for {} to: [{}]",
            entry.code,
            names.join(", ")
        ));

        tx.set_region_predecessors(&entry.id, &resolved).await?;
        summary.predecessor_links += resolved.len();
        summary.predecessors_dropped += dropped;
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        predecessor_links = summary.predecessor_links,
        "Region data refreshed"
    );
    Ok((lookup, summary))
}

fn region_from_entry(entry: &RegionFeedEntry) -> Region {
    Region {
        id: entry.id.clone(),
        code: entry.code.clone(),
        name: entry.name.clone(),
        is_active: entry.is_active,
    }
}

/// Predecessor ids known to the lookup (deduplicated), plus how many were dropped
fn resolve_predecessors(entry: &RegionFeedEntry, lookup: &RegionLookup) -> (Vec<String>, usize) {
    let mut dropped = 0;
    let mut resolved = BTreeSet::new();
    for id in &entry.predecessor_ids {
        if lookup.by_id.contains_key(id) {
            resolved.insert(id.clone());
        } else {
            dropped += 1;
        }
    }
    (resolved.into_iter().collect(), dropped)
}
