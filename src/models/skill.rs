use serde::{Deserialize, Serialize};

/// A skill node. `usage_count` is the number of inbound REQUIRES_SKILL or
/// HAS_SKILL relationships, computed at query time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub usage_count: i64,
}
