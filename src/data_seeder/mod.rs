// Sample-data loader: a built-in catalog of volunteer opportunities seeded
// on demand, every item tagged with a marker so it can be counted and wiped
// later. Per-item failures are logged and skipped.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::Row;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::graph::{GraphStore, NodeId};
use crate::models::{EffortLevel, GoodWork};
use crate::services::GoodWorksService;

/// Tag attached to every seeded record.
pub const SAMPLE_MARKER: &str = "SAMPLE_DATA";

pub struct DataSeeder {
    store: Arc<GraphStore>,
    good_works: Arc<GoodWorksService>,
}

impl DataSeeder {
    pub fn new(store: Arc<GraphStore>, good_works: Arc<GoodWorksService>) -> Self {
        DataSeeder { store, good_works }
    }

    /// Import the sample catalog under the given creator. One bad item
    /// never aborts the batch; the count of successful imports is returned.
    pub async fn seed(&self, user_id: &str) -> AppResult<usize> {
        let mut imported = 0usize;
        for mut work in sample_works() {
            if !work.tags.iter().any(|t| t == SAMPLE_MARKER) {
                work.tags.push(SAMPLE_MARKER.to_string());
            }
            match self.good_works.create(&work, user_id).await {
                Ok(_) => imported += 1,
                Err(err) => warn!("skipping sample '{}': {}", work.name, err),
            }
        }
        info!("seeded {} sample good works", imported);
        Ok(imported)
    }

    /// How many records in the store carry the sample marker.
    pub async fn count_samples(&self) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM nodes g
             WHERE g.label = 'GoodWork' AND EXISTS (
                 SELECT 1 FROM edges e JOIN nodes t ON t.id = e.target_id
                 WHERE e.source_id = g.id AND e.edge_type = 'TAGGED_WITH'
                   AND t.label = 'Tag' AND json_extract(t.props, '$.name') = ?)",
        )
        .bind(SAMPLE_MARKER)
        .fetch_one(self.store.pool())
        .await?;
        Ok(row.get("total"))
    }

    /// Detach-delete every seeded record. Returns the number removed.
    pub async fn remove_samples(&self) -> AppResult<usize> {
        let mut tx = self.store.begin().await?;
        let rows = sqlx::query(
            "SELECT g.id FROM nodes g
             WHERE g.label = 'GoodWork' AND EXISTS (
                 SELECT 1 FROM edges e JOIN nodes t ON t.id = e.target_id
                 WHERE e.source_id = g.id AND e.edge_type = 'TAGGED_WITH'
                   AND t.label = 'Tag' AND json_extract(t.props, '$.name') = ?)",
        )
        .bind(SAMPLE_MARKER)
        .fetch_all(&mut *tx)
        .await?;

        let mut removed = 0usize;
        for row in &rows {
            let id: NodeId = row.get("id");
            if GraphStore::delete_node_detach(&mut *tx, id).await? {
                removed += 1;
            }
        }
        tx.commit().await?;

        info!("removed {} sample good works", removed);
        Ok(removed)
    }
}

/// A spread of opportunities around central Austin: varied categories,
/// efforts and schedules, coordinates jittered a little so map views don't
/// stack pins.
pub fn sample_works() -> Vec<GoodWork> {
    let mut rng = rand::rng();
    let mut jitter = |base: f64| base + rng.random_range(-0.02..0.02);
    let next_week = Utc::now().naive_utc() + Duration::days(7);

    let mut works = vec![
        GoodWork {
            name: "River Walk Cleanup".to_string(),
            category: "Environment".to_string(),
            description: "Pick up litter along the river trail.".to_string(),
            latitude: jitter(30.2672),
            longitude: jitter(-97.7431),
            contact_name: "Dana Reyes".to_string(),
            contact_email: "dana@riverkeepers.org".to_string(),
            contact_phone: "512-555-0101".to_string(),
            effort_level: EffortLevel::Moderate,
            tags: vec!["outdoors".to_string(), "cleanup".to_string()],
            required_skills: vec!["Manual Labor".to_string()],
            family_friendly: true,
            outdoor_activity: true,
            weather_dependent: true,
            max_participants: Some(30),
            estimated_duration_minutes: Some(180),
            ..Default::default()
        },
        GoodWork {
            name: "Community Garden Workday".to_string(),
            category: "Environment".to_string(),
            sub_category: Some("Gardening".to_string()),
            description: "Weed beds and plant fall vegetables.".to_string(),
            latitude: jitter(30.29),
            longitude: jitter(-97.72),
            contact_name: "Miguel Santos".to_string(),
            contact_email: "miguel@eastsidegardens.org".to_string(),
            contact_phone: "512-555-0102".to_string(),
            effort_level: EffortLevel::Easy,
            tags: vec!["outdoors".to_string(), "gardening".to_string()],
            required_skills: vec!["Gardening".to_string()],
            family_friendly: true,
            outdoor_activity: true,
            is_recurring: true,
            recurrence_pattern: Some("WEEKLY:1:SAT".to_string()),
            estimated_duration_minutes: Some(120),
            ..Default::default()
        },
        GoodWork {
            name: "Food Bank Sorting Shift".to_string(),
            category: "Hunger Relief".to_string(),
            description: "Sort and box donated groceries.".to_string(),
            latitude: jitter(30.23),
            longitude: jitter(-97.76),
            contact_name: "Priya Nair".to_string(),
            contact_email: "volunteers@centralfoodbank.org".to_string(),
            contact_phone: "512-555-0103".to_string(),
            effort_level: EffortLevel::Moderate,
            tags: vec!["indoors".to_string(), "food".to_string()],
            max_participants: Some(40),
            is_accessible: true,
            estimated_duration_minutes: Some(240),
            estimated_people_helped: Some(500),
            ..Default::default()
        },
        GoodWork {
            name: "Senior Center Tech Help Desk".to_string(),
            category: "Education".to_string(),
            description: "One-on-one phone and laptop help for seniors.".to_string(),
            latitude: jitter(30.31),
            longitude: jitter(-97.74),
            contact_name: "Alice Wong".to_string(),
            contact_email: "alice@silverlink.org".to_string(),
            contact_phone: "512-555-0104".to_string(),
            effort_level: EffortLevel::Easy,
            tags: vec!["indoors".to_string(), "seniors".to_string()],
            required_skills: vec!["Computer Skills".to_string(), "Teaching & Tutoring".to_string()],
            is_accessible: true,
            is_recurring: true,
            recurrence_pattern: Some("WEEKLY:1:TUE,THU".to_string()),
            estimated_duration_minutes: Some(90),
            ..Default::default()
        },
        GoodWork {
            name: "Virtual ESL Conversation Hour".to_string(),
            category: "Education".to_string(),
            description: "Practice English conversation over video call.".to_string(),
            latitude: jitter(30.27),
            longitude: jitter(-97.75),
            contact_name: "Tom Delgado".to_string(),
            contact_email: "tom@opendoors.org".to_string(),
            contact_phone: "512-555-0105".to_string(),
            effort_level: EffortLevel::Easy,
            is_virtual: true,
            tags: vec!["virtual".to_string(), "language".to_string()],
            required_skills: vec!["ESL Teaching".to_string()],
            estimated_duration_minutes: Some(60),
            ..Default::default()
        },
        GoodWork {
            name: "Trail Build Weekend".to_string(),
            category: "Environment".to_string(),
            sub_category: Some("Trail Work".to_string()),
            description: "Cut new singletrack with hand tools.".to_string(),
            detailed_description: Some(
                "Two full days of bench cutting. Tools and training provided; bring water and sturdy boots.".to_string(),
            ),
            latitude: jitter(30.35),
            longitude: jitter(-97.8),
            contact_name: "Sam Okafor".to_string(),
            contact_email: "sam@hillcountrytrails.org".to_string(),
            contact_phone: "512-555-0106".to_string(),
            effort_level: EffortLevel::Challenging,
            tags: vec!["outdoors".to_string(), "trails".to_string()],
            required_skills: vec!["Manual Labor".to_string(), "Construction".to_string()],
            minimum_age: Some(16),
            outdoor_activity: true,
            weather_dependent: true,
            max_participants: Some(20),
            estimated_duration_minutes: Some(480),
            ..Default::default()
        },
    ];

    for work in &mut works {
        if work.start_time.is_none() {
            work.start_time = Some(next_week);
            work.end_time = work
                .estimated_duration_minutes
                .map(|m| next_week + Duration::minutes(m));
        }
    }
    works
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_complete_enough_to_create() {
        for work in sample_works() {
            assert!(!work.name.is_empty());
            assert!(!work.category.is_empty());
            assert!(!work.description.is_empty());
            assert!(!work.contact_name.is_empty());
            assert!(!work.contact_email.is_empty());
            assert!(work.start_time.is_some());
        }
    }
}
