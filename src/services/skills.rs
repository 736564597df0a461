// Skill catalog: normalized, deduplicated skill nodes shared between good
// works (REQUIRES_SKILL) and user profiles (HAS_SKILL). Usage counts are
// derived from inbound edges at query time, never stored.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use sqlx::Row;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::graph::{GraphStore, MergeKey, NodeId};
use crate::models::Skill;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const SEARCH_LIMIT: i64 = 50;

const USAGE_COUNT_SUBQUERY: &str = "(SELECT COUNT(*) FROM edges e
       WHERE e.target_id = n.id
         AND e.edge_type IN ('REQUIRES_SKILL', 'HAS_SKILL'))";

/// Normalize a skill name for matching: lowercase, trimmed, inner
/// whitespace collapsed to single spaces. The stored name keeps its
/// original casing.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    WHITESPACE_RUN.replace_all(lowered.trim(), " ").into_owned()
}

pub struct SkillService {
    store: Arc<GraphStore>,
}

impl SkillService {
    pub fn new(store: Arc<GraphStore>) -> Self {
        SkillService { store }
    }

    /// All skills with usage counts, most used first, ties by name.
    pub async fn all_skills(&self) -> AppResult<Vec<Skill>> {
        let sql = format!(
            "SELECT n.props, {USAGE_COUNT_SUBQUERY} AS usage_count
             FROM nodes n
             WHERE n.label = 'Skill'
             ORDER BY usage_count DESC, lower(json_extract(n.props, '$.name')) ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(self.store.pool()).await?;

        rows.iter().map(skill_from_row).collect()
    }

    /// Skills grouped by category, "Other" last.
    pub async fn skills_by_category(&self) -> AppResult<Vec<(String, Vec<Skill>)>> {
        let skills = self.all_skills().await?;

        let mut groups: Vec<(String, Vec<Skill>)> = Vec::new();
        for skill in skills {
            let category = skill.category.clone().unwrap_or_else(|| "Other".to_string());
            match groups.iter_mut().find(|(name, _)| *name == category) {
                Some((_, members)) => members.push(skill),
                None => groups.push((category, vec![skill])),
            }
        }
        groups.sort_by_key(|(name, _)| (name == "Other", name.clone()));

        Ok(groups)
    }

    /// Match-or-create by case-insensitive name. A created skill stores the
    /// trimmed original casing.
    pub async fn get_or_create(
        &self,
        name: &str,
        category: Option<&str>,
        description: Option<&str>,
    ) -> AppResult<Skill> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("skill name cannot be empty".to_string()));
        }
        let normalized = normalize_name(name);

        let mut tx = self.store.begin().await?;

        let sql = format!(
            "SELECT n.props, {USAGE_COUNT_SUBQUERY} AS usage_count
             FROM nodes n
             WHERE n.label = 'Skill' AND lower(json_extract(n.props, '$.name')) = ?
             LIMIT 1"
        );
        if let Some(row) = sqlx::query(&sql)
            .bind(&normalized)
            .fetch_optional(&mut *tx)
            .await?
        {
            let skill = skill_from_row(&row)?;
            tx.commit().await?;
            return Ok(skill);
        }

        let props = json!({
            "name": name.trim(),
            "description": description,
            "category": category,
            "createdDate": chrono::Utc::now().to_rfc3339(),
        });
        GraphStore::create_node(&mut *tx, "Skill", &props).await?;
        tx.commit().await?;

        Ok(Skill {
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            category: category.map(str::to_string),
            usage_count: 0,
        })
    }

    /// Substring search over name and description, capped at 50 results.
    /// A blank term falls back to the full catalog.
    pub async fn search(&self, term: &str) -> AppResult<Vec<Skill>> {
        if term.trim().is_empty() {
            return self.all_skills().await;
        }
        let needle = format!("%{}%", term.trim().to_lowercase());

        let sql = format!(
            "SELECT n.props, {USAGE_COUNT_SUBQUERY} AS usage_count
             FROM nodes n
             WHERE n.label = 'Skill'
               AND (lower(json_extract(n.props, '$.name')) LIKE ?
                    OR lower(coalesce(json_extract(n.props, '$.description'), '')) LIKE ?)
             ORDER BY usage_count DESC, lower(json_extract(n.props, '$.name')) ASC
             LIMIT {SEARCH_LIMIT}"
        );
        let rows = sqlx::query(&sql)
            .bind(&needle)
            .bind(&needle)
            .fetch_all(self.store.pool())
            .await?;

        rows.iter().map(skill_from_row).collect()
    }

    /// Attach a skill to a user's profile, creating both the skill and the
    /// user node on first touch. Returns true when the link is new.
    pub async fn add_user_skill(&self, user_id: &str, skill_name: &str) -> AppResult<bool> {
        let skill = self.get_or_create(skill_name, None, None).await?;

        let mut tx = self.store.begin().await?;
        let user_node = GraphStore::merge_node(
            &mut *tx,
            "User",
            &[MergeKey::new("userId", user_id)],
            &json!({ "userId": user_id }),
        )
        .await?;
        let skill_node = match Self::find_skill_node(&mut *tx, &skill.name).await? {
            Some(id) => id,
            None => {
                tx.rollback().await?;
                return Err(AppError::Internal(format!(
                    "skill '{}' disappeared after upsert",
                    skill.name
                )));
            }
        };
        let added = GraphStore::merge_edge(&mut *tx, user_node, skill_node, "HAS_SKILL", None).await?;
        tx.commit().await?;

        Ok(added)
    }

    /// Detach a skill from a user's profile. Returns true when a link was
    /// actually removed.
    pub async fn remove_user_skill(&self, user_id: &str, skill_name: &str) -> AppResult<bool> {
        let mut tx = self.store.begin().await?;

        let user_row = sqlx::query(
            "SELECT id FROM nodes WHERE label = 'User' AND json_extract(props, '$.userId') = ?",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let skill_node = Self::find_skill_node(&mut *tx, skill_name).await?;

        let removed = match (user_row, skill_node) {
            (Some(user_row), Some(skill_node)) => {
                let user_node: NodeId = user_row.get("id");
                GraphStore::delete_edge(&mut *tx, user_node, skill_node, "HAS_SKILL").await?
            }
            _ => false,
        };
        tx.commit().await?;

        Ok(removed)
    }

    /// Names of a user's skills, alphabetical.
    pub async fn user_skills(&self, user_id: &str) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT json_extract(s.props, '$.name') AS name
             FROM nodes u
             JOIN edges e ON e.source_id = u.id AND e.edge_type = 'HAS_SKILL'
             JOIN nodes s ON s.id = e.target_id AND s.label = 'Skill'
             WHERE u.label = 'User' AND json_extract(u.props, '$.userId') = ?
             ORDER BY lower(name) ASC",
        )
        .bind(user_id)
        .fetch_all(self.store.pool())
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get::<Option<String>, _>("name"))
            .collect())
    }

    /// Seed the built-in skill catalog. Per-item failures are logged and
    /// skipped so one bad entry never aborts the batch.
    pub async fn init_predefined(&self) -> AppResult<()> {
        let mut seeded = 0usize;
        for (category, names) in predefined_skills() {
            for name in names {
                match self.get_or_create(name, Some(category), None).await {
                    Ok(_) => seeded += 1,
                    Err(err) => warn!("skipping predefined skill '{}': {}", name, err),
                }
            }
        }
        info!("predefined skill catalog ready ({} entries)", seeded);
        Ok(())
    }

    async fn find_skill_node(
        conn: &mut sqlx::SqliteConnection,
        name: &str,
    ) -> AppResult<Option<NodeId>> {
        let row = sqlx::query(
            "SELECT id FROM nodes
             WHERE label = 'Skill' AND lower(json_extract(props, '$.name')) = lower(?)",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.map(|row| row.get("id")))
    }
}

fn skill_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<Skill> {
    let props: String = row.get("props");
    let props: Value = serde_json::from_str(&props)?;
    Ok(Skill {
        name: props["name"].as_str().unwrap_or_default().to_string(),
        description: props["description"].as_str().map(str::to_string),
        category: props["category"].as_str().map(str::to_string),
        usage_count: row.get("usage_count"),
    })
}

/// Suggested skills by category, seeded on startup.
pub fn predefined_skills() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (
            "Physical",
            vec![
                "Manual Labor",
                "Lifting & Moving",
                "Construction",
                "Gardening",
                "Cleaning",
                "Painting",
                "Landscaping",
                "Driving",
                "Sports & Fitness",
            ],
        ),
        (
            "Technical",
            vec![
                "Computer Skills",
                "Web Development",
                "Graphic Design",
                "Video Editing",
                "Photography",
                "Social Media Management",
                "Data Entry",
                "IT Support",
                "Software Development",
            ],
        ),
        (
            "Social",
            vec![
                "Public Speaking",
                "Teaching & Tutoring",
                "Customer Service",
                "Event Planning",
                "Team Leadership",
                "Mentoring",
                "Counseling",
                "Networking",
                "Community Outreach",
            ],
        ),
        (
            "Creative",
            vec![
                "Writing & Editing",
                "Arts & Crafts",
                "Music",
                "Cooking & Baking",
                "Event Decoration",
                "Content Creation",
                "Marketing",
                "Storytelling",
                "Design Thinking",
            ],
        ),
        (
            "Administrative",
            vec![
                "Organization",
                "Scheduling",
                "Record Keeping",
                "Phone Skills",
                "Email Management",
                "Bookkeeping",
                "Project Management",
                "Filing & Documentation",
                "Office Management",
            ],
        ),
        (
            "Healthcare",
            vec![
                "First Aid",
                "CPR Certified",
                "Medical Knowledge",
                "Elderly Care",
                "Child Care",
                "Mental Health Support",
                "Nutrition",
                "Physical Therapy",
                "Patient Care",
            ],
        ),
        (
            "Language",
            vec![
                "Spanish",
                "French",
                "Mandarin",
                "Sign Language",
                "Translation",
                "Multilingual",
                "ESL Teaching",
                "Interpretation",
            ],
        ),
        (
            "Specialized",
            vec![
                "Legal Knowledge",
                "Financial Planning",
                "Fundraising",
                "Grant Writing",
                "Research",
                "Environmental Science",
                "Animal Care",
                "Emergency Response",
                "Disaster Relief",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_folds_case_and_whitespace() {
        assert_eq!(normalize_name("  Web   Development "), "web development");
        assert_eq!(normalize_name("First\tAid"), "first aid");
        assert_eq!(normalize_name("spanish"), "spanish");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn predefined_catalog_has_no_duplicate_names() {
        let mut seen = std::collections::HashSet::new();
        for (_, names) in predefined_skills() {
            for name in names {
                assert!(seen.insert(normalize_name(name)), "duplicate skill {}", name);
            }
        }
    }
}
