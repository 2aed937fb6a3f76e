//! Upstream feed integration
//!
//! - Payload types for the region and organisation feeds
//! - `FeedSource` trait and its HTTP implementation

pub mod client;
pub mod types;

pub use client::{FeedSource, HttpFeedClient};
pub use types::{OrganisationFeed, RegionFeed, RegionFeedEntry};
