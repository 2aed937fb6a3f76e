//! Upstream feed payloads
//!
//! The region feed is a flat, well-typed array. The organisation feed is kept
//! as raw JSON per record, since its nesting is loose and the normalizer
//! decides what is mandatory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of the region feed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegionFeedEntry {
    pub id: String,
    pub code: String,
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub predecessor_ids: Vec<String>,
}

/// The organisation feed: organisation code -> upstream record
///
/// Ordered by code so that a run processes entries deterministically.
pub type OrganisationFeed = BTreeMap<String, serde_json::Value>;

/// Region feed as seen by the region reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionFeed {
    Published(Vec<RegionFeedEntry>),
    /// The endpoint answered 404; keep whatever regions exist locally.
    NotPublished,
}

impl RegionFeed {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}
