//! Organisation reconciliation
//!
//! Matches feed entries to local organisations by code. Existing ones are
//! updated in place, new ones are bulk-inserted, and successor references
//! are resolved last so a successor created in the same run is found.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::normalize::normalize;
use super::report::OrganisationSummary;
use super::RegionLookup;
use crate::error::SyncError;
use crate::feed::OrganisationFeed;
use crate::models::{NewOrganisation, Organisation};
use crate::progress::ProgressSink;
use crate::store::RegistryTransaction;

pub async fn reconcile_organisations(
    tx: &mut dyn RegistryTransaction,
    feed: &OrganisationFeed,
    regions: &RegionLookup,
    progress: &dyn ProgressSink,
) -> Result<OrganisationSummary, SyncError> {
    let mut existing = tx.organisations_by_code().await?;
    debug!(existing = existing.len(), "Loaded local organisations");

    let mut summary = OrganisationSummary::default();
    let mut to_create: Vec<NewOrganisation> = Vec::new();
    // organisation code -> successor organisation code
    let mut successors: BTreeMap<String, String> = BTreeMap::new();

    progress.line("Updating organisation data...");
    for (code, record) in feed {
        let normalized = normalize(code, record, regions)?;
        progress.line(&format!("{} ({})", normalized.fields.name, code));

        if let Some(successor_code) = normalized.successor_org_code {
            successors.insert(code.clone(), successor_code);
        }

        match existing.get_mut(code) {
            Some(organisation) => {
                progress.line("Updating local copy");
                if organisation.apply(normalized.fields) {
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
                tx.save_organisation(organisation).await?;
            }
            None => {
                progress.line("Creating a local copy");
                to_create.push(NewOrganisation {
                    code: code.clone(),
                    fields: normalized.fields,
                });
            }
        }
    }

    if !to_create.is_empty() {
        progress.line(&format!("Saving {} new organisations...", to_create.len()));
        summary.created = tx.create_organisations(&to_create).await?;
    }

    if !successors.is_empty() {
        progress.line("Setting successor organisations for merged orgs...");
        let (set, unresolved) = resolve_successors(tx, &successors).await?;
        summary.successors_set = set;
        summary.successors_unresolved = unresolved;
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        unchanged = summary.unchanged,
        successors_set = summary.successors_set,
        "Organisation data refreshed"
    );
    Ok(summary)
}

/// Point each pending organisation at its successor.
///
/// Both sides are reloaded by code: organisations created earlier in this
/// run only have store keys once the bulk insert has happened.
async fn resolve_successors(
    tx: &mut dyn RegistryTransaction,
    successors: &BTreeMap<String, String>,
) -> Result<(usize, usize), SyncError> {
    let mut target_codes: Vec<String> = successors.values().cloned().collect();
    target_codes.sort();
    target_codes.dedup();
    let targets: HashMap<String, Organisation> = tx
        .organisations_with_codes(&target_codes)
        .await?
        .into_iter()
        .map(|o| (o.code.clone(), o))
        .collect();

    let pending_codes: Vec<String> = successors.keys().cloned().collect();
    let pending = tx.organisations_with_codes(&pending_codes).await?;

    let mut set = 0;
    let mut unresolved = 0;
    for mut organisation in pending {
        let Some(successor_code) = successors.get(&organisation.code) else {
            continue;
        };
        match targets.get(successor_code) {
            Some(successor) => {
                organisation.successor_id = Some(successor.id);
                tx.save_organisation(&organisation).await?;
                set += 1;
            }
            None => {
                warn!(
                    organisation = %organisation.code,
                    successor = %successor_code,
                    "Successor organisation not found, leaving unset"
                );
                unresolved += 1;
            }
        }
    }
    Ok((set, unresolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrganisationFields, OrganisationType};
    use crate::progress::CollectingProgress;
    use crate::store::{MemoryStore, RegistrySnapshot, RegistryStore};
    use serde_json::json;

    fn feed(entries: serde_json::Value) -> OrganisationFeed {
        serde_json::from_value(entries).unwrap()
    }

    fn fields(name: &str) -> OrganisationFields {
        OrganisationFields {
            name: name.to_string(),
            organisation_type: OrganisationType::Provider,
            region_id: None,
            closure_date: None,
            created_at: None,
            last_updated_at: None,
        }
    }

    async fn run(
        store: &MemoryStore,
        feed: &OrganisationFeed,
    ) -> Result<OrganisationSummary, SyncError> {
        let mut tx = store.begin().await?;
        let summary = reconcile_organisations(
            tx.as_mut(),
            feed,
            &RegionLookup::default(),
            &CollectingProgress::new(),
        )
        .await?;
        tx.commit().await?;
        Ok(summary)
    }

    #[tokio::test]
    async fn test_existing_code_is_updated_in_place() {
        let mut snapshot = RegistrySnapshot::default();
        let id = snapshot.insert_organisation("X", fields("Old"));
        let store = MemoryStore::from_snapshot(snapshot);

        let summary = run(
            &store,
            &feed(json!({"X": {"name": "Foo", "organisation_type": {"code": "provider"}}})),
        )
        .await
        .unwrap();

        assert_eq!((summary.created, summary.updated), (0, 1));
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.organisations.len(), 1);
        let org = snapshot.organisation("X").unwrap();
        assert_eq!(org.id, id);
        assert_eq!(org.name, "Foo");
    }

    #[tokio::test]
    async fn test_successor_created_in_same_run() {
        let store = MemoryStore::new();
        let summary = run(
            &store,
            &feed(json!({
                "OLD": {
                    "name": "Old Trust",
                    "organisation_type": {"code": "provider"},
                    "closure_date": "2020-03-31",
                    "successor_organisation": {"code": "NEW"}
                },
                "NEW": {"name": "New Trust", "organisation_type": {"code": "provider"}}
            })),
        )
        .await
        .unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.successors_set, 1);

        let snapshot = store.snapshot().await;
        let new = snapshot.organisation("NEW").unwrap();
        let old = snapshot.organisation("OLD").unwrap();
        assert_eq!(old.successor_id, Some(new.id));
        assert!(old.is_closed());
    }

    #[tokio::test]
    async fn test_dangling_successor_is_skipped() {
        let store = MemoryStore::new();
        let summary = run(
            &store,
            &feed(json!({
                "OLD": {
                    "name": "Old Trust",
                    "organisation_type": {"code": "provider"},
                    "successor_organisation": {"code": "NOWHERE"}
                }
            })),
        )
        .await
        .unwrap();

        assert_eq!(summary.successors_set, 0);
        assert_eq!(summary.successors_unresolved, 1);
        assert_eq!(
            store.snapshot().await.organisation("OLD").unwrap().successor_id,
            None
        );
    }

    #[tokio::test]
    async fn test_successor_resolves_against_existing_store() {
        let mut snapshot = RegistrySnapshot::default();
        let target = snapshot.insert_organisation("RH8", fields("Established Trust"));
        let store = MemoryStore::from_snapshot(snapshot);

        run(
            &store,
            &feed(json!({
                "RBZ": {
                    "name": "Merged Trust",
                    "organisation_type": {"code": "provider"},
                    "successor_organisation": {"code": "RH8"}
                }
            })),
        )
        .await
        .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.organisation("RBZ").unwrap().successor_id, Some(target));
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let store = MemoryStore::new();
        let feed = feed(json!({
            "OLD": {
                "name": "Old Trust",
                "organisation_type": {"code": "provider"},
                "successor_organisation": {"code": "NEW"}
            },
            "NEW": {"name": "New Trust", "organisation_type": {"code": "commissioner"}}
        }));

        run(&store, &feed).await.unwrap();
        let after_first = store.snapshot().await;

        let summary = run(&store, &feed).await.unwrap();
        assert_eq!(summary.created, 0);
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.unchanged, 2);
        assert_eq!(store.snapshot().await, after_first);
    }

    #[tokio::test]
    async fn test_malformed_record_aborts() {
        let store = MemoryStore::new();
        let err = run(
            &store,
            &feed(json!({
                "AAA": {"name": "Fine", "organisation_type": {"code": "provider"}},
                "BBB": {"organisation_type": {"code": "provider"}}
            })),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::MalformedRecord(ref e) if e.code == "BBB"));
        assert!(store.snapshot().await.organisations.is_empty());
    }

    #[tokio::test]
    async fn test_empty_feed_creates_nothing() {
        let store = MemoryStore::new();
        let summary = run(&store, &OrganisationFeed::new()).await.unwrap();
        assert_eq!(summary, OrganisationSummary::default());
    }
}
