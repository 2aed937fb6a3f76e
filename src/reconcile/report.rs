//! Run report types

use serde::Serialize;
use std::fmt;

/// Region stage outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionSummary {
    /// False when the region feed answered 404 and local data was reused
    pub feed_published: bool,
    pub created: usize,
    pub updated: usize,
    /// Regions loaded from the store (equals the lookup size)
    pub known: usize,
    pub predecessor_links: usize,
    /// Predecessor ids in the feed that matched no region
    pub predecessors_dropped: usize,
}

/// Organisation stage outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganisationSummary {
    pub created: usize,
    pub updated: usize,
    /// Existing organisations whose fields already matched the feed
    pub unchanged: usize,
    pub successors_set: usize,
    /// Successor codes that matched no organisation
    pub successors_unresolved: usize,
}

/// Whole-run outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub regions: RegionSummary,
    pub organisations: OrganisationSummary,
    /// False for a dry run, which rolls back instead of committing
    pub committed: bool,
    pub duration_ms: u64,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.regions;
        let o = &self.organisations;
        if r.feed_published {
            writeln!(
                f,
                "Regions: {} created, {} updated, {} predecessor links ({} dropped)",
                r.created, r.updated, r.predecessor_links, r.predecessors_dropped
            )?;
        } else {
            writeln!(
                f,
                "Regions: feed not published, reused {} local regions",
                r.known
            )?;
        }
        writeln!(
            f,
            "Organisations: {} created, {} updated, {} unchanged",
            o.created, o.updated, o.unchanged
        )?;
        writeln!(
            f,
            "Successors: {} set, {} unresolved",
            o.successors_set, o.successors_unresolved
        )?;
        write!(
            f,
            "{} in {}ms",
            if self.committed {
                "Committed"
            } else {
                "Rolled back (dry run)"
            },
            self.duration_ms
        )
    }
}
