//! orgsync - keeps a local registry of NHS organisations and regions in step
//! with the upstream organisation and region feeds.
//!
//! A run fetches both feeds, then inside one transaction:
//!
//! 1. upserts regions by id and rebuilds their predecessor links
//! 2. creates or updates organisations by code, then resolves successors
//!
//! Records are never deleted. Closure and succession are stored as state.
//!
//! # Usage
//!
//! ```ignore
//! use orgsync::{HttpFeedClient, PostgresStore, SyncConfig, SyncRunner};
//!
//! let config = SyncConfig::from_env()?;
//! let feeds = HttpFeedClient::new(&config.feeds)?;
//! let store = PostgresStore::connect(&config.database).await?;
//!
//! let report = SyncRunner::new(feeds, store).run_once().await?;
//! println!("{report}");
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod store;

pub use config::SyncConfig;
pub use error::{ConfigError, FetchError, MalformedRecordError, StoreError, SyncError};
pub use feed::{FeedSource, HttpFeedClient, OrganisationFeed, RegionFeed, RegionFeedEntry};
pub use models::{NewOrganisation, Organisation, OrganisationFields, OrganisationType, Region};
pub use progress::{CollectingProgress, ConsoleProgress, ProgressSink, TracingProgress};
pub use reconcile::{RegionLookup, RunMode, SyncReport, SyncRunner};
pub use store::{MemoryStore, RegistrySnapshot, RegistryStore, RegistryTransaction};

#[cfg(feature = "database")]
pub use store::PostgresStore;
