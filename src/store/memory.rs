//! In-memory registry store
//!
//! A transaction takes the store lock for its whole lifetime and works on a
//! private copy of the registry; `commit` publishes the copy, anything else
//! discards it. Unique keys and references are checked the way the database
//! schema checks them.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{RegionUpsert, RegistryStore, RegistryTransaction};
use crate::error::StoreError;
use crate::models::{NewOrganisation, Organisation, OrganisationFields, Region};

/// Full contents of the in-memory registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub regions: BTreeMap<String, Region>,
    /// region id -> predecessor region ids
    pub predecessors: BTreeMap<String, BTreeSet<String>>,
    /// store key -> organisation
    pub organisations: BTreeMap<i64, Organisation>,
}

impl RegistrySnapshot {
    pub fn region_by_code(&self, code: &str) -> Option<&Region> {
        self.regions.values().find(|r| r.code == code)
    }

    pub fn organisation(&self, code: &str) -> Option<&Organisation> {
        self.organisations.values().find(|o| o.code == code)
    }

    pub fn predecessors_of(&self, region_id: &str) -> Vec<String> {
        self.predecessors
            .get(region_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn insert_region(&mut self, region: Region) {
        self.regions.insert(region.id.clone(), region);
    }

    /// Insert an organisation directly, returning its store key
    pub fn insert_organisation(&mut self, code: &str, fields: OrganisationFields) -> i64 {
        let id = self.next_organisation_id();
        self.organisations.insert(id, build_organisation(id, code, fields));
        id
    }

    fn next_organisation_id(&self) -> i64 {
        self.organisations.keys().next_back().map_or(1, |id| id + 1)
    }

    fn check_region_exists(&self, region_id: &str) -> Result<(), StoreError> {
        if self.regions.contains_key(region_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                entity: "region",
                key: region_id.to_string(),
            })
        }
    }

    fn check_organisation_refs(&self, fields: &OrganisationFields) -> Result<(), StoreError> {
        match &fields.region_id {
            Some(region_id) => self.check_region_exists(region_id),
            None => Ok(()),
        }
    }
}

fn build_organisation(id: i64, code: &str, fields: OrganisationFields) -> Organisation {
    Organisation {
        id,
        code: code.to_string(),
        name: fields.name,
        organisation_type: fields.organisation_type,
        region_id: fields.region_id,
        closure_date: fields.closure_date,
        created_at: fields.created_at,
        last_updated_at: fields.last_updated_at,
        successor_id: None,
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<RegistrySnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(snapshot)),
        }
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn RegistryTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
        }))
    }
}

pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<RegistrySnapshot>>,
    working: RegistrySnapshot,
}

impl MemoryTransaction {
    fn state(&mut self) -> Result<&mut RegistrySnapshot, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl RegistryTransaction for MemoryTransaction {
    async fn upsert_region(&mut self, region: &Region) -> Result<RegionUpsert, StoreError> {
        let state = self.state()?;

        if state
            .regions
            .values()
            .any(|r| r.code == region.code && r.id != region.id)
        {
            return Err(StoreError::Conflict {
                entity: "region",
                key: region.code.clone(),
            });
        }

        let created = state
            .regions
            .insert(region.id.clone(), region.clone())
            .is_none();

        Ok(RegionUpsert {
            region: region.clone(),
            created,
        })
    }

    async fn all_regions(&mut self) -> Result<Vec<Region>, StoreError> {
        let state = self.state()?;
        let mut regions: Vec<Region> = state.regions.values().cloned().collect();
        regions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(regions)
    }

    async fn set_region_predecessors(
        &mut self,
        region_id: &str,
        predecessor_ids: &[String],
    ) -> Result<(), StoreError> {
        let state = self.state()?;
        state.check_region_exists(region_id)?;
        for predecessor_id in predecessor_ids {
            state.check_region_exists(predecessor_id)?;
        }

        let ids: BTreeSet<String> = predecessor_ids.iter().cloned().collect();
        if ids.is_empty() {
            state.predecessors.remove(region_id);
        } else {
            state.predecessors.insert(region_id.to_string(), ids);
        }
        Ok(())
    }

    async fn region_predecessors(&mut self, region_id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state()?;
        Ok(state.predecessors_of(region_id))
    }

    async fn organisations_by_code(&mut self) -> Result<HashMap<String, Organisation>, StoreError> {
        let state = self.state()?;
        Ok(state
            .organisations
            .values()
            .map(|o| (o.code.clone(), o.clone()))
            .collect())
    }

    async fn organisations_with_codes(
        &mut self,
        codes: &[String],
    ) -> Result<Vec<Organisation>, StoreError> {
        let state = self.state()?;
        let wanted: BTreeSet<&str> = codes.iter().map(String::as_str).collect();
        let mut found: Vec<Organisation> = state
            .organisations
            .values()
            .filter(|o| wanted.contains(o.code.as_str()))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(found)
    }

    async fn create_organisations(
        &mut self,
        batch: &[NewOrganisation],
    ) -> Result<usize, StoreError> {
        let state = self.state()?;

        let mut seen: BTreeSet<&str> = state
            .organisations
            .values()
            .map(|o| o.code.as_str())
            .collect();
        for new in batch {
            if !seen.insert(new.code.as_str()) {
                return Err(StoreError::Conflict {
                    entity: "organisation",
                    key: new.code.clone(),
                });
            }
            state.check_organisation_refs(&new.fields)?;
        }

        for new in batch {
            state.insert_organisation(&new.code, new.fields.clone());
        }
        Ok(batch.len())
    }

    async fn save_organisation(&mut self, organisation: &Organisation) -> Result<(), StoreError> {
        let state = self.state()?;

        if !state.organisations.contains_key(&organisation.id) {
            return Err(StoreError::NotFound {
                entity: "organisation",
                key: organisation.id.to_string(),
            });
        }
        if state
            .organisations
            .values()
            .any(|o| o.code == organisation.code && o.id != organisation.id)
        {
            return Err(StoreError::Conflict {
                entity: "organisation",
                key: organisation.code.clone(),
            });
        }
        state.check_organisation_refs(&organisation.fields())?;
        if let Some(successor_id) = organisation.successor_id {
            if !state.organisations.contains_key(&successor_id) {
                return Err(StoreError::NotFound {
                    entity: "organisation",
                    key: successor_id.to_string(),
                });
            }
        }

        state
            .organisations
            .insert(organisation.id, organisation.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        drop(self.guard.take().ok_or(StoreError::TransactionClosed)?);
        self.working = RegistrySnapshot::default();
        Ok(())
    }
}
