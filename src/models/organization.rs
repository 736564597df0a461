use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrgStatus {
    Active,
    Inactive,
    Pending,
}

impl OrgStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgStatus::Active => "Active",
            OrgStatus::Inactive => "Inactive",
            OrgStatus::Pending => "Pending",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Inactive" => OrgStatus::Inactive,
            "Pending" => OrgStatus::Pending,
            _ => OrgStatus::Active,
        }
    }
}

impl Default for OrgStatus {
    fn default() -> Self {
        OrgStatus::Active
    }
}

/// A charity/nonprofit profile. Serialized form (camelCase) is exactly the
/// stored node property set; fields marked `skip` are derived at query time
/// from relationships and never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Organization {
    #[serde(skip)]
    pub id: Option<i64>,
    pub name: String,
    /// URL-friendly unique identifier derived from the name.
    pub slug: String,
    pub description: String,
    pub mission: Option<String>,
    pub vision: Option<String>,

    // Contact information
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub website: Option<String>,

    // Address
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    // Organization details
    pub organization_type: Option<String>,
    pub tax_id: Option<String>,
    pub founded_date: Option<NaiveDateTime>,
    pub logo_url: Option<String>,
    pub cover_image_url: Option<String>,

    // Social media
    pub facebook_url: Option<String>,
    pub twitter_url: Option<String>,
    pub instagram_url: Option<String>,
    pub linked_in_url: Option<String>,

    // Categories and tags
    pub focus_areas: Vec<String>,
    pub tags: Vec<String>,

    pub created_by: String,
    pub created_date: Option<DateTime<Utc>>,
    pub last_modified_date: Option<DateTime<Utc>>,

    pub status: OrgStatus,
    pub is_verified: bool,

    // Derived statistics, not stored
    #[serde(skip)]
    pub member_count: i64,
    #[serde(skip)]
    pub event_count: i64,
    #[serde(skip)]
    pub volunteer_count: i64,

    // Viewer-specific flags, not stored
    #[serde(skip)]
    pub is_user_admin: bool,
    #[serde(skip)]
    pub is_user_member: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationMember {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub joined_date: Option<DateTime<Utc>>,
    /// GoodWorks this member created under the organization.
    pub contributed_events: i64,
}
