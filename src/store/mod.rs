//! Registry persistence
//!
//! The reconcilers only talk to a [`RegistryTransaction`]. One transaction
//! covers one full run; dropping it without `commit` rolls it back.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::{NewOrganisation, Organisation, Region};

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::{MemoryStore, RegistrySnapshot};
#[cfg(feature = "database")]
pub use postgres::PostgresStore;

/// Outcome of a region upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionUpsert {
    pub region: Region,
    pub created: bool,
}

/// Entry point for opening a run's transaction
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn RegistryTransaction>, StoreError>;
}

/// Operations available inside one all-or-nothing transaction
#[async_trait]
pub trait RegistryTransaction: Send {
    /// Create or overwrite the region with `region.id`
    async fn upsert_region(&mut self, region: &Region) -> Result<RegionUpsert, StoreError>;

    /// All persisted regions, ordered by name
    async fn all_regions(&mut self) -> Result<Vec<Region>, StoreError>;

    /// Replace the predecessor set of a region
    async fn set_region_predecessors(
        &mut self,
        region_id: &str,
        predecessor_ids: &[String],
    ) -> Result<(), StoreError>;

    async fn region_predecessors(&mut self, region_id: &str) -> Result<Vec<String>, StoreError>;

    /// Every organisation, keyed by code, in a single read
    async fn organisations_by_code(&mut self) -> Result<HashMap<String, Organisation>, StoreError>;

    /// Organisations whose code is in `codes`
    async fn organisations_with_codes(
        &mut self,
        codes: &[String],
    ) -> Result<Vec<Organisation>, StoreError>;

    /// Insert a batch of new organisations. Returns the number inserted.
    async fn create_organisations(
        &mut self,
        batch: &[NewOrganisation],
    ) -> Result<usize, StoreError>;

    /// Persist every mutable field of an existing organisation
    async fn save_organisation(&mut self, organisation: &Organisation) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}
