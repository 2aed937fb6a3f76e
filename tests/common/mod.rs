//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use orgsync::{FeedSource, FetchError, OrganisationFeed, RegionFeedEntry};

/// What a scripted endpoint answers
#[derive(Debug, Clone)]
pub enum Response<T> {
    Ok(T),
    NotFound,
    Status(u16),
}

impl<T: Clone> Response<T> {
    fn answer(&self, url: &str) -> Result<T, FetchError> {
        match self {
            Response::Ok(body) => Ok(body.clone()),
            Response::NotFound => Err(FetchError::NotPublished {
                url: url.to_string(),
            }),
            Response::Status(status) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
        }
    }
}

/// Feed source with canned answers that tests can swap between runs
pub struct ScriptedFeed {
    regions: Mutex<Response<Vec<RegionFeedEntry>>>,
    organisations: Mutex<Response<OrganisationFeed>>,
}

impl ScriptedFeed {
    pub fn new(regions: Response<Vec<RegionFeedEntry>>, organisations: Value) -> Self {
        Self {
            regions: Mutex::new(regions),
            organisations: Mutex::new(Response::Ok(org_feed(organisations))),
        }
    }

    pub fn set_regions(&self, regions: Response<Vec<RegionFeedEntry>>) {
        *self.regions.lock().unwrap() = regions;
    }

    pub fn set_organisations(&self, organisations: Response<OrganisationFeed>) {
        *self.organisations.lock().unwrap() = organisations;
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_regions(&self) -> Result<Vec<RegionFeedEntry>, FetchError> {
        self.regions.lock().unwrap().answer("scripted://regions.json")
    }

    async fn fetch_organisations(&self) -> Result<OrganisationFeed, FetchError> {
        self.organisations
            .lock()
            .unwrap()
            .answer("scripted://organisations.json")
    }
}

pub fn region(id: &str, code: &str, name: &str, predecessors: &[&str]) -> RegionFeedEntry {
    RegionFeedEntry {
        id: id.to_string(),
        code: code.to_string(),
        name: name.to_string(),
        is_active: true,
        predecessor_ids: predecessors.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn org_feed(value: Value) -> OrganisationFeed {
    serde_json::from_value(value).unwrap()
}

/// The 2019 region reorganisation, in feed form
pub fn region_feed() -> Vec<RegionFeedEntry> {
    vec![
        region("a1f0", "Y54", "North of England", &[]),
        region("b2e1", "Y55", "Midlands and East of England", &[]),
        region("c3d2", "Y60", "Midlands", &["b2e1"]),
        region("d4c3", "Y61", "East of England", &["b2e1", "gone-id"]),
        region("e5b4", "Y58", "South West", &[]),
    ]
}
