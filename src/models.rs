//! Local registry models
//!
//! Regions and organisations as persisted by the store. Neither is ever
//! deleted: regions retire through `is_active`, organisations through
//! `closure_date` and `successor_id`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Regions
// =============================================================================

/// A region, keyed by its upstream-assigned id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    /// ODS code, e.g. "Y58"
    pub code: String,
    /// e.g. "South West"
    pub name: String,
    pub is_active: bool,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

// =============================================================================
// Organisation types
// =============================================================================

/// Closed set of organisation categories
///
/// Unrecognised upstream codes map to [`OrganisationType::Other`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrganisationType {
    Provider,
    Commissioner,
    /// Arm's Length Body
    #[serde(rename = "alb")]
    ArmsLengthBody,
    IndependentProvider,
    CommunityProvider,
    LocalAuthority,
    /// Pathology Joint Venture
    #[serde(rename = "pathology-jv")]
    PathologyJointVenture,
    GpPractice,
    Dentist,
    Pharmacy,
    #[default]
    Other,
}

impl OrganisationType {
    pub const ALL: [OrganisationType; 11] = [
        Self::Provider,
        Self::Commissioner,
        Self::ArmsLengthBody,
        Self::IndependentProvider,
        Self::CommunityProvider,
        Self::LocalAuthority,
        Self::PathologyJointVenture,
        Self::GpPractice,
        Self::Dentist,
        Self::Pharmacy,
        Self::Other,
    ];

    /// Parse an upstream type code, falling back to `Other`
    pub fn from_code(code: &str) -> Self {
        match code {
            "provider" => Self::Provider,
            "commissioner" => Self::Commissioner,
            "alb" => Self::ArmsLengthBody,
            "independent-provider" => Self::IndependentProvider,
            "community-provider" => Self::CommunityProvider,
            "local-authority" => Self::LocalAuthority,
            "pathology-jv" => Self::PathologyJointVenture,
            "gp-practice" => Self::GpPractice,
            "dentist" => Self::Dentist,
            "pharmacy" => Self::Pharmacy,
            _ => Self::Other,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Commissioner => "commissioner",
            Self::ArmsLengthBody => "alb",
            Self::IndependentProvider => "independent-provider",
            Self::CommunityProvider => "community-provider",
            Self::LocalAuthority => "local-authority",
            Self::PathologyJointVenture => "pathology-jv",
            Self::GpPractice => "gp-practice",
            Self::Dentist => "dentist",
            Self::Pharmacy => "pharmacy",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for OrganisationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

// =============================================================================
// Organisations
// =============================================================================

/// The fields of an organisation that come straight from the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationFields {
    pub name: String,
    pub organisation_type: OrganisationType,
    pub region_id: Option<String>,
    pub closure_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// A persisted organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    /// Store-assigned key
    pub id: i64,
    /// Upstream business code, the join key
    pub code: String,
    pub name: String,
    pub organisation_type: OrganisationType,
    pub region_id: Option<String>,
    pub closure_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub successor_id: Option<i64>,
}

impl Organisation {
    pub fn fields(&self) -> OrganisationFields {
        OrganisationFields {
            name: self.name.clone(),
            organisation_type: self.organisation_type,
            region_id: self.region_id.clone(),
            closure_date: self.closure_date,
            created_at: self.created_at,
            last_updated_at: self.last_updated_at,
        }
    }

    /// Overwrite the feed-sourced fields. Returns true if anything changed.
    ///
    /// `id`, `code` and `successor_id` are left alone.
    pub fn apply(&mut self, fields: OrganisationFields) -> bool {
        let changed = self.fields() != fields;
        self.name = fields.name;
        self.organisation_type = fields.organisation_type;
        self.region_id = fields.region_id;
        self.closure_date = fields.closure_date;
        self.created_at = fields.created_at;
        self.last_updated_at = fields.last_updated_at;
        changed
    }

    pub fn is_closed(&self) -> bool {
        self.closure_date.is_some()
    }
}

impl fmt::Display for Organisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// An organisation staged for bulk creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrganisation {
    pub code: String,
    pub fields: OrganisationFields,
}
