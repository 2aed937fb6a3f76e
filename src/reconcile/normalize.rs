//! Organisation record normalization
//!
//! Flattens one upstream organisation record into local fields. Only `name`
//! and `organisation_type.code` are mandatory; the nested region and
//! successor objects are read leniently.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde_json::Value;

use super::RegionLookup;
use crate::error::MalformedRecordError;
use crate::models::{OrganisationFields, OrganisationType};

/// Normalized record plus the successor code held back for the deferred pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedOrganisation {
    pub fields: OrganisationFields,
    pub successor_org_code: Option<String>,
}

/// Normalize the upstream record for organisation `code`
pub fn normalize(
    code: &str,
    record: &Value,
    regions: &RegionLookup,
) -> Result<NormalizedOrganisation, MalformedRecordError> {
    let name = record
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedRecordError::missing(code, "name"))?;

    let type_code = record
        .get("organisation_type")
        .and_then(|t| t.get("code"))
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedRecordError::missing(code, "organisation_type.code"))?;

    let fields = OrganisationFields {
        name: name.to_string(),
        organisation_type: OrganisationType::from_code(type_code),
        region_id: resolve_region(record.get("region"), regions),
        closure_date: optional_date(code, record, "closure_date")?,
        created_at: optional_timestamp(code, record, "created_at")?,
        last_updated_at: optional_timestamp(code, record, "last_updated_at")?,
    };

    Ok(NormalizedOrganisation {
        fields,
        successor_org_code: successor_code(record),
    })
}

/// `successor_organisation.code`, or None for anything else
fn successor_code(record: &Value) -> Option<String> {
    record
        .get("successor_organisation")
        .and_then(|s| s.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Resolve the embedded region object: by id first, then by code.
///
/// The code fallback applies both when the object has no id and when the
/// id is unknown locally.
fn resolve_region(region: Option<&Value>, regions: &RegionLookup) -> Option<String> {
    let region = region?.as_object().filter(|r| !r.is_empty())?;

    let by_id = region
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| regions.by_id.get(id));

    by_id
        .or_else(|| {
            region
                .get("code")
                .and_then(Value::as_str)
                .and_then(|code| regions.by_code.get(code))
        })
        .map(|r| r.id.clone())
}

fn optional_str<'a>(
    code: &str,
    record: &'a Value,
    field: &'static str,
) -> Result<Option<&'a str>, MalformedRecordError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(MalformedRecordError::invalid(
            code,
            field,
            format!("expected a string, got {}", other),
        )),
    }
}

fn optional_date(
    code: &str,
    record: &Value,
    field: &'static str,
) -> Result<Option<NaiveDate>, MalformedRecordError> {
    optional_str(code, record, field)?
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|e| MalformedRecordError::invalid(code, field, e))
        })
        .transpose()
}

/// Offset-aware forms tried after RFC 3339
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M%:z"];

/// Naive forms, read as UTC
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Timestamps as the feed writes them, truncated to microseconds.
///
/// A bare date is midnight UTC. Postgres keeps microseconds, so anything
/// finer would compare unequal on the next run.
fn optional_timestamp(
    code: &str,
    record: &Value,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, MalformedRecordError> {
    optional_str(code, record, field)?
        .map(|raw| {
            parse_timestamp(raw.trim())
                .map(|dt| dt.trunc_subsecs(6))
                .ok_or_else(|| {
                    MalformedRecordError::invalid(
                        code,
                        field,
                        format!("unrecognised timestamp '{raw}'"),
                    )
                })
        })
        .transpose()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Region;
    use chrono::TimeZone;
    use serde_json::json;

    fn lookup() -> RegionLookup {
        RegionLookup::from_regions([
            Region {
                id: "sw-id".to_string(),
                code: "Y58".to_string(),
                name: "South West".to_string(),
                is_active: true,
            },
            Region {
                id: "ld-id".to_string(),
                code: "Y56".to_string(),
                name: "London".to_string(),
                is_active: true,
            },
        ])
    }

    fn full_record() -> Value {
        json!({
            "name": "Royal Devon University Healthcare",
            "organisation_type": {"code": "provider", "name": "Provider"},
            "region": {"id": "sw-id", "code": "Y58"},
            "closure_date": "2022-03-31",
            "created_at": "2018-04-04T10:32:49.520Z",
            "last_updated_at": "2022-04-01T09:00:00+01:00",
            "successor_organisation": {"code": "RH8", "name": "Successor"}
        })
    }

    #[test]
    fn test_normalize_full_record() {
        let normalized = normalize("RBZ", &full_record(), &lookup()).unwrap();
        let fields = &normalized.fields;

        assert_eq!(fields.name, "Royal Devon University Healthcare");
        assert_eq!(fields.organisation_type, OrganisationType::Provider);
        assert_eq!(fields.region_id.as_deref(), Some("sw-id"));
        assert_eq!(fields.closure_date, NaiveDate::from_ymd_opt(2022, 3, 31));
        assert_eq!(
            fields.last_updated_at,
            Some(Utc.with_ymd_and_hms(2022, 4, 1, 8, 0, 0).unwrap())
        );
        assert!(fields.created_at.is_some());
        assert_eq!(normalized.successor_org_code.as_deref(), Some("RH8"));
    }

    #[test]
    fn test_region_falls_back_to_code_when_id_unknown() {
        let record = json!({
            "name": "Org",
            "organisation_type": {"code": "provider"},
            "region": {"id": "unknown-id", "code": "Y58"}
        });
        let normalized = normalize("RXX", &record, &lookup()).unwrap();
        assert_eq!(normalized.fields.region_id.as_deref(), Some("sw-id"));
    }

    #[test]
    fn test_region_falls_back_to_code_when_id_absent() {
        let record = json!({
            "name": "Org",
            "organisation_type": {"code": "provider"},
            "region": {"code": "Y56"}
        });
        let normalized = normalize("RXX", &record, &lookup()).unwrap();
        assert_eq!(normalized.fields.region_id.as_deref(), Some("ld-id"));
    }

    #[test]
    fn test_unresolvable_or_missing_region_is_none() {
        let lookup = lookup();
        for region in [
            json!({"id": "nope", "code": "Z99"}),
            json!({}),
            json!(null),
            json!("Y58"),
        ] {
            let record = json!({
                "name": "Org",
                "organisation_type": {"code": "provider"},
                "region": region
            });
            let normalized = normalize("RXX", &record, &lookup).unwrap();
            assert_eq!(normalized.fields.region_id, None);
        }

        let record = json!({"name": "Org", "organisation_type": {"code": "provider"}});
        assert_eq!(normalize("RXX", &record, &lookup).unwrap().fields.region_id, None);
    }

    #[test]
    fn test_malformed_successor_nesting_is_ignored() {
        for successor in [json!(null), json!("RH8"), json!({"name": "no code"}), json!([1])] {
            let record = json!({
                "name": "Org",
                "organisation_type": {"code": "provider"},
                "successor_organisation": successor
            });
            let normalized = normalize("RXX", &record, &lookup()).unwrap();
            assert_eq!(normalized.successor_org_code, None);
        }
    }

    #[test]
    fn test_missing_mandatory_fields() {
        let record = json!({"organisation_type": {"code": "provider"}});
        let err = normalize("RXX", &record, &lookup()).unwrap_err();
        assert_eq!(err.field, "name");
        assert_eq!(err.code, "RXX");

        let record = json!({"name": "Org", "organisation_type": {"name": "Provider"}});
        let err = normalize("RXX", &record, &lookup()).unwrap_err();
        assert_eq!(err.field, "organisation_type.code");
    }

    #[test]
    fn test_unknown_type_code_maps_to_other() {
        let record = json!({"name": "Org", "organisation_type": {"code": "ambulance-trust"}});
        let normalized = normalize("RXX", &record, &lookup()).unwrap();
        assert_eq!(normalized.fields.organisation_type, OrganisationType::Other);
    }

    #[test]
    fn test_null_and_blank_dates_are_none() {
        let record = json!({
            "name": "Org",
            "organisation_type": {"code": "gp-practice"},
            "closure_date": null,
            "created_at": "",
        });
        let normalized = normalize("RXX", &record, &lookup()).unwrap();
        assert_eq!(normalized.fields.closure_date, None);
        assert_eq!(normalized.fields.created_at, None);
        assert_eq!(normalized.fields.last_updated_at, None);
    }

    #[test]
    fn test_naive_timestamp_taken_as_utc() {
        let record = json!({
            "name": "Org",
            "organisation_type": {"code": "dentist"},
            "created_at": "2019-02-05T14:34:00",
        });
        let normalized = normalize("RXX", &record, &lookup()).unwrap();
        assert_eq!(
            normalized.fields.created_at,
            Some(Utc.with_ymd_and_hms(2019, 2, 5, 14, 34, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable_date_is_malformed() {
        let record = json!({
            "name": "Org",
            "organisation_type": {"code": "provider"},
            "closure_date": "31/03/2022",
        });
        let err = normalize("RXX", &record, &lookup()).unwrap_err();
        assert_eq!(err.field, "closure_date");
    }

    #[test]
    fn test_timestamp_forms_accepted() {
        let at = |h, m, s| Some(Utc.with_ymd_and_hms(2019, 2, 5, h, m, s).unwrap());
        let with_millis = at(14, 34, 0).map(|t| t + chrono::Duration::milliseconds(250));
        for (raw, expected) in [
            ("2019-02-05 14:34:00", at(14, 34, 0)),
            ("2019-02-05 14:34:00.250", with_millis),
            ("2019-02-05T14:34", at(14, 34, 0)),
            ("2019-02-05 14:34", at(14, 34, 0)),
            ("2019-02-05 15:34:00+01:00", at(14, 34, 0)),
            ("2019-02-05", at(0, 0, 0)),
        ] {
            let record = json!({
                "name": "Org",
                "organisation_type": {"code": "provider"},
                "created_at": raw,
            });
            let normalized = normalize("RA7", &record, &lookup()).unwrap();
            assert_eq!(normalized.fields.created_at, expected, "parsing {raw}");
        }
    }

    #[test]
    fn test_timestamp_truncated_to_microseconds() {
        let record = json!({
            "name": "Org",
            "organisation_type": {"code": "provider"},
            "last_updated_at": "2019-02-05T14:34:00.123456789Z",
        });
        let normalized = normalize("RA7", &record, &lookup()).unwrap();
        let expected = Utc.with_ymd_and_hms(2019, 2, 5, 14, 34, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(normalized.fields.last_updated_at, Some(expected));
    }

    #[test]
    fn test_unparseable_timestamp_is_malformed() {
        let record = json!({
            "name": "Org",
            "organisation_type": {"code": "provider"},
            "created_at": "last Tuesday",
        });
        let err = normalize("RXX", &record, &lookup()).unwrap_err();
        assert_eq!(err.field, "created_at");
    }
}
