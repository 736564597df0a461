use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// How demanding a volunteer opportunity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffortLevel {
    Easy,
    Moderate,
    Challenging,
}

impl EffortLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffortLevel::Easy => "Easy",
            EffortLevel::Moderate => "Moderate",
            EffortLevel::Challenging => "Challenging",
        }
    }

    /// Unknown strings fall back to Moderate, the historical default.
    pub fn parse(s: &str) -> Self {
        match s {
            "Easy" => EffortLevel::Easy,
            "Challenging" => EffortLevel::Challenging,
            _ => EffortLevel::Moderate,
        }
    }
}

impl Default for EffortLevel {
    fn default() -> Self {
        EffortLevel::Moderate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkStatus {
    Active,
    Cancelled,
    Completed,
    Full,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Active => "Active",
            WorkStatus::Cancelled => "Cancelled",
            WorkStatus::Completed => "Completed",
            WorkStatus::Full => "Full",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Cancelled" => WorkStatus::Cancelled,
            "Completed" => WorkStatus::Completed,
            "Full" => WorkStatus::Full,
            _ => WorkStatus::Active,
        }
    }
}

impl Default for WorkStatus {
    fn default() -> Self {
        WorkStatus::Active
    }
}

/// A single volunteer opportunity. Identity is the graph node id; related
/// entities (contact, category, location, tags, skills) live as linked nodes
/// and are denormalized onto this struct by the mappers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoodWork {
    pub id: Option<i64>,
    pub name: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub description: String,
    pub detailed_description: Option<String>,

    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,

    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub estimated_duration_minutes: Option<i64>,

    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,

    pub effort_level: EffortLevel,
    pub is_accessible: bool,
    pub is_virtual: bool,

    // Capacity management
    pub max_participants: Option<i64>,
    pub current_participants: i64,

    // Skills and requirements
    pub required_skills: Vec<String>,
    pub tags: Vec<String>,

    // Age restrictions
    pub minimum_age: Option<i64>,
    pub family_friendly: bool,

    // Recurring event support
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub recurrence_end_date: Option<NaiveDateTime>,

    // Organization details
    pub organization_name: Option<String>,
    pub organization_website: Option<String>,

    // Logistics
    pub parking_available: bool,
    pub public_transit_accessible: bool,
    pub special_instructions: Option<String>,
    pub what_to_bring: Vec<String>,

    // Impact tracking
    pub impact_description: Option<String>,
    pub estimated_people_helped: Option<i64>,

    pub status: WorkStatus,

    // Engagement aggregates, derived from relationships at query time
    pub interested_count: i64,
    pub signed_up_count: i64,
    pub is_user_interested: bool,
    pub is_user_signed_up: bool,

    // Weather considerations
    pub outdoor_activity: bool,
    pub weather_dependent: bool,

    pub created_by: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub last_modified_date: Option<DateTime<Utc>>,
}

/// Search filter input. Every field is optional; unset fields add no
/// predicate.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub tags: Vec<String>,
    pub center_latitude: Option<f64>,
    pub center_longitude: Option<f64>,
    pub radius_miles: Option<f64>,
    pub start_date_from: Option<NaiveDateTime>,
    pub start_date_to: Option<NaiveDateTime>,
    pub effort_level: Option<EffortLevel>,
    pub is_virtual: Option<bool>,
    pub is_accessible: Option<bool>,
    pub family_friendly: Option<bool>,
    pub required_skills: Vec<String>,
    pub has_available_spots: Option<bool>,
    pub search_text: Option<String>,
}

/// Which per-user listing to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Created,
    Interested,
    SignedUp,
}
