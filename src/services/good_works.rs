// Graph repository for the GoodWork entity family. Creates fan out to the
// related nodes (contact, category, location, tags, skills) inside one
// transaction; reads come back as heterogeneous records and are rebuilt
// through the projection layer.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::graph::{
    bind_params, build_criteria, compile, row_to_record, GraphStore, MergeKey, NodeId, Projection,
};
use crate::models::{EffortLevel, GoodWork, ListKind, SearchCriteria, WorkStatus};
use crate::services::geocoding::Geocoder;

const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DEFAULT_SIMILAR_LIMIT: usize = 10;

/// Columns holding JSON documents in the full select, parsed before
/// projection.
const JSON_COLUMNS: &[&str] = &["g", "c", "l", "Tags", "RequiredSkills"];

/// The relationship-aware select: the raw GoodWork/Contact/Location
/// documents plus flat aliased columns for linked names and engagement
/// aggregates. Callers append further conditions and ordering.
const FULL_SELECT: &str = "
    SELECT g.id AS Id, g.props AS g, c.props AS c, l.props AS l,
           json_extract(cat.props, '$.name') AS Category,
           json_extract(sub.props, '$.name') AS SubCategory,
           (SELECT COUNT(*) FROM edges i
             WHERE i.target_id = g.id AND i.edge_type = 'INTERESTED_IN')
             AS InterestedCount,
           (SELECT COUNT(*) FROM edges s
             WHERE s.target_id = g.id AND s.edge_type = 'SIGNED_UP_FOR')
             AS SignedUpCount,
           (SELECT json_group_array(json_extract(t.props, '$.name'))
              FROM edges te JOIN nodes t ON t.id = te.target_id
             WHERE te.source_id = g.id AND te.edge_type = 'TAGGED_WITH')
             AS Tags,
           (SELECT json_group_array(json_extract(sk.props, '$.name'))
              FROM edges se JOIN nodes sk ON sk.id = se.target_id
             WHERE se.source_id = g.id AND se.edge_type = 'REQUIRES_SKILL')
             AS RequiredSkills
    FROM nodes g
    LEFT JOIN edges ce ON ce.source_id = g.id AND ce.edge_type = 'HAS_CONTACT'
    LEFT JOIN nodes c ON c.id = ce.target_id
    LEFT JOIN edges le ON le.source_id = g.id AND le.edge_type = 'LOCATED_IN'
    LEFT JOIN nodes l ON l.id = le.target_id
    LEFT JOIN edges be ON be.source_id = g.id AND be.edge_type = 'BELONGS_TO'
    LEFT JOIN nodes cat ON cat.id = be.target_id
    LEFT JOIN edges sube ON sube.source_id = g.id AND sube.edge_type = 'HAS_SUBCATEGORY'
    LEFT JOIN nodes sub ON sub.id = sube.target_id
    WHERE g.label = 'GoodWork'";

pub struct GoodWorksService {
    store: Arc<GraphStore>,
    geocoder: Arc<dyn Geocoder>,
    result_cap: i64,
}

impl GoodWorksService {
    pub fn new(store: Arc<GraphStore>, geocoder: Arc<dyn Geocoder>, result_cap: i64) -> Self {
        GoodWorksService {
            store,
            geocoder,
            result_cap,
        }
    }

    /// Identifiers arrive from the caller as strings; anything non-numeric
    /// is a validation failure, not a missing record.
    pub fn parse_id(id: &str) -> AppResult<NodeId> {
        id.trim()
            .parse::<NodeId>()
            .map_err(|_| AppError::Validation(format!("malformed good work id '{id}'")))
    }

    /// Create a GoodWork together with all of its mandatory relations in one
    /// transaction. The coordinates are reverse-geocoded first; a geocoding
    /// failure aborts the create and nothing is committed.
    pub async fn create(&self, work: &GoodWork, creator_id: &str) -> AppResult<NodeId> {
        validate_for_create(work)?;

        let location = self
            .geocoder
            .resolve(work.latitude, work.longitude)
            .await?;

        let mut record = work.clone();
        record.status = WorkStatus::Active;
        record.current_participants = 0;
        record.created_by = Some(creator_id.to_string());
        record.created_date = Some(Utc::now());
        record.last_modified_date = None;

        let mut tx = self.store.begin().await?;

        let work_node = GraphStore::create_node(&mut *tx, "GoodWork", &work_props(&record)).await?;

        let contact_node = GraphStore::merge_node(
            &mut *tx,
            "Contact",
            &[MergeKey::new("email", &record.contact_email)],
            &json!({
                "email": record.contact_email,
                "name": record.contact_name,
                "phone": record.contact_phone,
            }),
        )
        .await?;
        GraphStore::merge_edge(&mut *tx, work_node, contact_node, "HAS_CONTACT", None).await?;

        let category_node = GraphStore::merge_node(
            &mut *tx,
            "Category",
            &[MergeKey::new("name", &record.category)],
            &json!({ "name": record.category }),
        )
        .await?;
        GraphStore::merge_edge(&mut *tx, work_node, category_node, "BELONGS_TO", None).await?;

        if let Some(sub) = record.sub_category.as_deref().filter(|s| !s.is_empty()) {
            let sub_node = GraphStore::merge_node(
                &mut *tx,
                "SubCategory",
                &[MergeKey::new("name", sub)],
                &json!({ "name": sub }),
            )
            .await?;
            GraphStore::merge_edge(&mut *tx, work_node, sub_node, "HAS_SUBCATEGORY", None).await?;
        }

        let location_node = GraphStore::merge_node(
            &mut *tx,
            "Location",
            &[
                MergeKey::new("city", &location.city),
                MergeKey::new("state", &location.state),
                MergeKey::new("country", &location.country),
                MergeKey::new("zip", &location.zip),
            ],
            &json!({
                "city": location.city,
                "state": location.state,
                "country": location.country,
                "zip": location.zip,
            }),
        )
        .await?;
        GraphStore::merge_edge(&mut *tx, work_node, location_node, "LOCATED_IN", None).await?;

        Self::link_names(&mut tx, work_node, "Tag", "TAGGED_WITH", &record.tags, false).await?;
        Self::link_names(
            &mut tx,
            work_node,
            "Skill",
            "REQUIRES_SKILL",
            &record.required_skills,
            true,
        )
        .await?;

        // Organization linkage is by display name; an unknown name stays a
        // plain property with no POSTED_BY edge.
        if let Some(org_name) = record.organization_name.as_deref().filter(|s| !s.is_empty()) {
            let org = sqlx::query(
                "SELECT id FROM nodes
                 WHERE label = 'Organization' AND json_extract(props, '$.name') = ?",
            )
            .bind(org_name)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(org) = org {
                GraphStore::merge_edge(&mut *tx, work_node, org.get("id"), "POSTED_BY", None)
                    .await?;
            }
        }

        tx.commit().await?;

        info!("created good work '{}' (id {})", record.name, work_node);
        Ok(work_node)
    }

    /// Full relationship-aware fetch: linked entities denormalized onto the
    /// model, engagement aggregates, and the viewer's own flags when a
    /// viewer id is given.
    pub async fn get_by_id(&self, id: &str, viewer_id: Option<&str>) -> AppResult<Option<GoodWork>> {
        let node_id = Self::parse_id(id)?;

        let sql = format!("{FULL_SELECT} AND g.id = ?");
        let row = sqlx::query(&sql)
            .bind(node_id)
            .fetch_optional(self.store.pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let record = row_to_record(&row, JSON_COLUMNS)?;
        let mut work = map_goodwork(&record);
        if let Some(viewer) = viewer_id {
            self.apply_viewer_flags(std::slice::from_mut(&mut work), viewer)
                .await?;
        }
        Ok(Some(work))
    }

    /// Criteria search over active records, capped and ordered by start
    /// time ascending.
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        viewer_id: Option<&str>,
    ) -> AppResult<Vec<GoodWork>> {
        let fragment = compile(&build_criteria(criteria));
        let sql = format!(
            "{FULL_SELECT} AND {}
             ORDER BY json_extract(g.props, '$.startTime') ASC
             LIMIT {}",
            fragment.where_clause(),
            self.result_cap
        );
        debug!("search over {} conditions", fragment.conditions.len());

        let rows = bind_params(sqlx::query(&sql), &fragment.params)
            .fetch_all(self.store.pool())
            .await?;

        let mut works = map_rows(&rows)?;
        if let Some(viewer) = viewer_id {
            self.apply_viewer_flags(&mut works, viewer).await?;
        }
        Ok(works)
    }

    /// Similarity-ranked related records: weighted overlap of linked
    /// entities, zero-score candidates excluded, ties broken by calendar
    /// proximity of start times. `limit` defaults to 10.
    pub async fn similar(
        &self,
        id: &str,
        viewer_id: Option<&str>,
        limit: Option<usize>,
    ) -> AppResult<Vec<GoodWork>> {
        let limit = limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
        let node_id = Self::parse_id(id)?;

        let Some(source) = self.link_profile(node_id).await? else {
            return Ok(Vec::new());
        };

        let candidates = self.active_link_profiles(node_id).await?;
        let mut scored: Vec<(i64, i64, NodeId)> = candidates
            .iter()
            .filter_map(|candidate| {
                let score = similarity_score(&source, candidate);
                if score == 0 {
                    return None;
                }
                Some((score, start_day_distance(&source, candidate), candidate.id))
            })
            .collect();
        scored.sort_by_key(|(score, distance, _)| (-score, *distance));
        scored.truncate(limit);

        let mut works = Vec::with_capacity(scored.len());
        for (_, _, candidate_id) in scored {
            if let Some(work) = self.get_by_node_id(candidate_id).await? {
                works.push(work);
            }
        }
        if let Some(viewer) = viewer_id {
            self.apply_viewer_flags(&mut works, viewer).await?;
        }
        Ok(works)
    }

    /// Toggle the viewer's interest. Turning on is idempotent and keeps the
    /// first assertion's timestamp; turning off on a missing relationship
    /// is a no-op.
    pub async fn set_interested(&self, user_id: &str, work_id: &str, on: bool) -> AppResult<()> {
        let node_id = Self::parse_id(work_id)?;
        let mut tx = self.store.begin().await?;

        if !Self::work_exists(&mut *tx, node_id).await? {
            tx.rollback().await?;
            return Ok(());
        }

        if on {
            let user_node = Self::merge_user(&mut *tx, user_id).await?;
            GraphStore::merge_edge(
                &mut *tx,
                user_node,
                node_id,
                "INTERESTED_IN",
                Some(&json!({ "since": Utc::now().to_rfc3339() })),
            )
            .await?;
        } else if let Some(user_node) = Self::find_user(&mut *tx, user_id).await? {
            GraphStore::delete_edge(&mut *tx, user_node, node_id, "INTERESTED_IN").await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Toggle the viewer's sign-up, adjusting `currentParticipants` in the
    /// same transaction. The count only moves when the relationship
    /// actually changed, and a decrement floors at zero. The cap is soft:
    /// concurrent sign-ups can race past `maxParticipants`.
    pub async fn set_signed_up(&self, user_id: &str, work_id: &str, on: bool) -> AppResult<()> {
        let node_id = Self::parse_id(work_id)?;
        let mut tx = self.store.begin().await?;

        if !Self::work_exists(&mut *tx, node_id).await? {
            tx.rollback().await?;
            return Ok(());
        }

        let delta = if on {
            let user_node = Self::merge_user(&mut *tx, user_id).await?;
            let created = GraphStore::merge_edge(
                &mut *tx,
                user_node,
                node_id,
                "SIGNED_UP_FOR",
                Some(&json!({ "since": Utc::now().to_rfc3339() })),
            )
            .await?;
            if created {
                1
            } else {
                0
            }
        } else {
            match Self::find_user(&mut *tx, user_id).await? {
                Some(user_node) => {
                    let removed =
                        GraphStore::delete_edge(&mut *tx, user_node, node_id, "SIGNED_UP_FOR")
                            .await?;
                    if removed {
                        -1
                    } else {
                        0
                    }
                }
                None => 0,
            }
        };

        if delta != 0 {
            sqlx::query(
                "UPDATE nodes
                 SET props = json_set(props, '$.currentParticipants',
                         max(0, coalesce(json_extract(props, '$.currentParticipants'), 0) + ?)),
                     updated = strftime('%s', 'now')
                 WHERE id = ?",
            )
            .bind(delta)
            .bind(node_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Records associated with a user: created by them, or carrying their
    /// interest/sign-up relationship.
    pub async fn list_by_user(&self, user_id: &str, kind: ListKind) -> AppResult<Vec<GoodWork>> {
        let sql = match kind {
            ListKind::Created => format!(
                "{FULL_SELECT} AND json_extract(g.props, '$.createdBy') = ?
                 ORDER BY json_extract(g.props, '$.createdDate') DESC"
            ),
            ListKind::Interested => engagement_listing("INTERESTED_IN"),
            ListKind::SignedUp => engagement_listing("SIGNED_UP_FOR"),
        };
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.store.pool())
            .await?;

        let mut works = map_rows(&rows)?;
        self.apply_viewer_flags(&mut works, user_id).await?;
        Ok(works)
    }

    /// Ownership-scoped update: re-writes the property document and
    /// re-points category/subcategory/location/tag/skill/contact
    /// relationships. A mismatched owner (or a missing id) affects zero
    /// records and returns without error.
    pub async fn update(&self, id: &str, work: &GoodWork, owner_id: &str) -> AppResult<()> {
        let node_id = Self::parse_id(id)?;
        validate_for_create(work)?;

        let location = self
            .geocoder
            .resolve(work.latitude, work.longitude)
            .await?;

        let mut tx = self.store.begin().await?;

        let owned = sqlx::query(
            "SELECT props FROM nodes
             WHERE id = ? AND label = 'GoodWork'
               AND json_extract(props, '$.createdBy') = ?",
        )
        .bind(node_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(owned) = owned else {
            tx.rollback().await?;
            return Ok(());
        };

        let stored: Value = serde_json::from_str(&owned.get::<String, _>("props"))?;
        let mut record = work.clone();
        record.created_by = Some(owner_id.to_string());
        record.last_modified_date = Some(Utc::now());
        let mut props = work_props(&record);
        // Provenance and engagement state carry over from the stored
        // document rather than the caller's copy.
        props["createdDate"] = stored["createdDate"].clone();
        props["status"] = stored["status"].clone();
        props["currentParticipants"] = stored["currentParticipants"].clone();
        GraphStore::update_node_props(&mut *tx, node_id, &props).await?;

        GraphStore::delete_edges_from(&mut *tx, node_id, "HAS_CONTACT").await?;
        let contact_node = GraphStore::merge_node(
            &mut *tx,
            "Contact",
            &[MergeKey::new("email", &record.contact_email)],
            &json!({
                "email": record.contact_email,
                "name": record.contact_name,
                "phone": record.contact_phone,
            }),
        )
        .await?;
        GraphStore::merge_edge(&mut *tx, node_id, contact_node, "HAS_CONTACT", None).await?;

        GraphStore::delete_edges_from(&mut *tx, node_id, "BELONGS_TO").await?;
        let category_node = GraphStore::merge_node(
            &mut *tx,
            "Category",
            &[MergeKey::new("name", &record.category)],
            &json!({ "name": record.category }),
        )
        .await?;
        GraphStore::merge_edge(&mut *tx, node_id, category_node, "BELONGS_TO", None).await?;

        GraphStore::delete_edges_from(&mut *tx, node_id, "HAS_SUBCATEGORY").await?;
        if let Some(sub) = record.sub_category.as_deref().filter(|s| !s.is_empty()) {
            let sub_node = GraphStore::merge_node(
                &mut *tx,
                "SubCategory",
                &[MergeKey::new("name", sub)],
                &json!({ "name": sub }),
            )
            .await?;
            GraphStore::merge_edge(&mut *tx, node_id, sub_node, "HAS_SUBCATEGORY", None).await?;
        }

        GraphStore::delete_edges_from(&mut *tx, node_id, "LOCATED_IN").await?;
        let location_node = GraphStore::merge_node(
            &mut *tx,
            "Location",
            &[
                MergeKey::new("city", &location.city),
                MergeKey::new("state", &location.state),
                MergeKey::new("country", &location.country),
                MergeKey::new("zip", &location.zip),
            ],
            &json!({
                "city": location.city,
                "state": location.state,
                "country": location.country,
                "zip": location.zip,
            }),
        )
        .await?;
        GraphStore::merge_edge(&mut *tx, node_id, location_node, "LOCATED_IN", None).await?;

        GraphStore::delete_edges_from(&mut *tx, node_id, "TAGGED_WITH").await?;
        Self::link_names(&mut tx, node_id, "Tag", "TAGGED_WITH", &record.tags, false).await?;

        GraphStore::delete_edges_from(&mut *tx, node_id, "REQUIRES_SKILL").await?;
        Self::link_names(
            &mut tx,
            node_id,
            "Skill",
            "REQUIRES_SKILL",
            &record.required_skills,
            true,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Ownership-scoped detach-delete: the node and every attached
    /// relationship go together. Mismatched owner or missing id is a
    /// silent no-op.
    pub async fn delete(&self, id: &str, owner_id: &str) -> AppResult<()> {
        let node_id = Self::parse_id(id)?;
        let mut tx = self.store.begin().await?;

        let owned = sqlx::query(
            "SELECT 1 FROM nodes
             WHERE id = ? AND label = 'GoodWork'
               AND json_extract(props, '$.createdBy') = ?",
        )
        .bind(node_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;
        if owned.is_none() {
            tx.rollback().await?;
            return Ok(());
        }

        GraphStore::delete_node_detach(&mut *tx, node_id).await?;
        tx.commit().await?;

        info!("deleted good work {}", node_id);
        Ok(())
    }

    /// Everything in a category, as lightweight map pins.
    pub async fn by_category(&self, category: &str) -> AppResult<Vec<GoodWork>> {
        let rows = sqlx::query(
            "SELECT json_extract(g.props, '$.name') AS Name,
                    json_extract(g.props, '$.description') AS Description,
                    json_extract(g.props, '$.latitude') AS Latitude,
                    json_extract(g.props, '$.longitude') AS Longitude
             FROM nodes g
             JOIN edges e ON e.source_id = g.id AND e.edge_type = 'BELONGS_TO'
             JOIN nodes cat ON cat.id = e.target_id AND cat.label = 'Category'
             WHERE g.label = 'GoodWork' AND json_extract(cat.props, '$.name') = ?",
        )
        .bind(category)
        .fetch_all(self.store.pool())
        .await?;

        map_pin_rows(&rows)
    }

    pub async fn by_zip(&self, zip: &str) -> AppResult<Vec<GoodWork>> {
        let rows = sqlx::query(
            "SELECT json_extract(g.props, '$.name') AS Name,
                    json_extract(g.props, '$.description') AS Description,
                    json_extract(g.props, '$.latitude') AS Latitude,
                    json_extract(g.props, '$.longitude') AS Longitude
             FROM nodes g
             JOIN edges e ON e.source_id = g.id AND e.edge_type = 'LOCATED_IN'
             JOIN nodes l ON l.id = e.target_id AND l.label = 'Location'
             WHERE g.label = 'GoodWork' AND json_extract(l.props, '$.zip') = ?",
        )
        .bind(zip)
        .fetch_all(self.store.pool())
        .await?;

        map_pin_rows(&rows)
    }

    pub async fn by_location(
        &self,
        city: &str,
        state: &str,
        country: &str,
    ) -> AppResult<Vec<GoodWork>> {
        let rows = sqlx::query(
            "SELECT json_extract(g.props, '$.name') AS Name,
                    json_extract(g.props, '$.description') AS Description,
                    json_extract(g.props, '$.latitude') AS Latitude,
                    json_extract(g.props, '$.longitude') AS Longitude
             FROM nodes g
             JOIN edges e ON e.source_id = g.id AND e.edge_type = 'LOCATED_IN'
             JOIN nodes l ON l.id = e.target_id AND l.label = 'Location'
             WHERE g.label = 'GoodWork'
               AND json_extract(l.props, '$.city') = ?
               AND json_extract(l.props, '$.state') = ?
               AND json_extract(l.props, '$.country') = ?",
        )
        .bind(city)
        .bind(state)
        .bind(country)
        .fetch_all(self.store.pool())
        .await?;

        map_pin_rows(&rows)
    }

    /// Everything inside an axis-aligned viewport, as lightweight map pins.
    pub async fn in_bounds(
        &self,
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
    ) -> AppResult<Vec<GoodWork>> {
        let rows = sqlx::query(
            "SELECT json_extract(g.props, '$.name') AS Name,
                    json_extract(g.props, '$.description') AS Description,
                    json_extract(g.props, '$.latitude') AS Latitude,
                    json_extract(g.props, '$.longitude') AS Longitude
             FROM nodes g
             WHERE g.label = 'GoodWork'
               AND json_extract(g.props, '$.latitude') >= ?
               AND json_extract(g.props, '$.latitude') <= ?
               AND json_extract(g.props, '$.longitude') >= ?
               AND json_extract(g.props, '$.longitude') <= ?",
        )
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_lng)
        .bind(max_lng)
        .fetch_all(self.store.pool())
        .await?;

        map_pin_rows(&rows)
    }

    /// Every record with its relationships denormalized, for exports and
    /// the sitemap.
    pub async fn all_with_relationships(&self) -> AppResult<Vec<GoodWork>> {
        let sql = format!("{FULL_SELECT} ORDER BY g.id ASC");
        let rows = sqlx::query(&sql).fetch_all(self.store.pool()).await?;
        map_rows(&rows)
    }

    async fn get_by_node_id(&self, node_id: NodeId) -> AppResult<Option<GoodWork>> {
        let sql = format!("{FULL_SELECT} AND g.id = ?");
        let row = sqlx::query(&sql)
            .bind(node_id)
            .fetch_optional(self.store.pool())
            .await?;
        match row {
            Some(row) => {
                let record = row_to_record(&row, JSON_COLUMNS)?;
                Ok(Some(map_goodwork(&record)))
            }
            None => Ok(None),
        }
    }

    /// Fill `is_user_interested`/`is_user_signed_up` for a batch with one
    /// engagement query.
    async fn apply_viewer_flags(&self, works: &mut [GoodWork], viewer_id: &str) -> AppResult<()> {
        if works.is_empty() {
            return Ok(());
        }
        let rows = sqlx::query(
            "SELECT e.target_id, e.edge_type
             FROM edges e
             JOIN nodes u ON u.id = e.source_id AND u.label = 'User'
             WHERE json_extract(u.props, '$.userId') = ?
               AND e.edge_type IN ('INTERESTED_IN', 'SIGNED_UP_FOR')",
        )
        .bind(viewer_id)
        .fetch_all(self.store.pool())
        .await?;

        let mut interested = HashSet::new();
        let mut signed_up = HashSet::new();
        for row in &rows {
            let target: NodeId = row.get("target_id");
            match row.get::<String, _>("edge_type").as_str() {
                "INTERESTED_IN" => {
                    interested.insert(target);
                }
                _ => {
                    signed_up.insert(target);
                }
            }
        }

        for work in works {
            if let Some(id) = work.id {
                work.is_user_interested = interested.contains(&id);
                work.is_user_signed_up = signed_up.contains(&id);
            }
        }
        Ok(())
    }

    async fn link_profile(&self, node_id: NodeId) -> AppResult<Option<LinkProfile>> {
        let sql = format!("{} AND g.id = ?", LINK_PROFILE_SELECT);
        let row = sqlx::query(&sql)
            .bind(node_id)
            .fetch_optional(self.store.pool())
            .await?;
        match row {
            Some(row) => Ok(Some(link_profile_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn active_link_profiles(&self, exclude: NodeId) -> AppResult<Vec<LinkProfile>> {
        let sql = format!(
            "{} AND g.id <> ? AND json_extract(g.props, '$.status') = 'Active'",
            LINK_PROFILE_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(exclude)
            .fetch_all(self.store.pool())
            .await?;
        rows.iter().map(link_profile_from_row).collect()
    }

    async fn link_names(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        source: NodeId,
        label: &str,
        edge_type: &str,
        names: &[String],
        fold_case: bool,
    ) -> AppResult<()> {
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let key = if fold_case {
                MergeKey::folded("name", name)
            } else {
                MergeKey::new("name", name)
            };
            let node =
                GraphStore::merge_node(&mut *tx, label, &[key], &json!({ "name": name })).await?;
            GraphStore::merge_edge(&mut *tx, source, node, edge_type, None).await?;
        }
        Ok(())
    }

    async fn work_exists(conn: &mut sqlx::SqliteConnection, node_id: NodeId) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM nodes WHERE id = ? AND label = 'GoodWork'")
            .bind(node_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    async fn merge_user(conn: &mut sqlx::SqliteConnection, user_id: &str) -> AppResult<NodeId> {
        GraphStore::merge_node(
            conn,
            "User",
            &[MergeKey::new("userId", user_id)],
            &json!({ "userId": user_id }),
        )
        .await
    }

    async fn find_user(
        conn: &mut sqlx::SqliteConnection,
        user_id: &str,
    ) -> AppResult<Option<NodeId>> {
        let row = sqlx::query(
            "SELECT id FROM nodes WHERE label = 'User' AND json_extract(props, '$.userId') = ?",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.map(|row| row.get("id")))
    }
}

fn engagement_listing(edge_type: &str) -> String {
    format!(
        "{FULL_SELECT} AND EXISTS (
             SELECT 1 FROM edges ue
             JOIN nodes u ON u.id = ue.source_id AND u.label = 'User'
             WHERE ue.target_id = g.id AND ue.edge_type = '{edge_type}'
               AND json_extract(u.props, '$.userId') = ?)
         ORDER BY json_extract(g.props, '$.startTime') ASC"
    )
}

fn validate_for_create(work: &GoodWork) -> AppResult<()> {
    let missing = [
        ("name", work.name.trim().is_empty()),
        ("category", work.category.trim().is_empty()),
        ("description", work.description.trim().is_empty()),
        ("contact name", work.contact_name.trim().is_empty()),
        ("contact email", work.contact_email.trim().is_empty()),
    ]
    .into_iter()
    .find_map(|(field, empty)| empty.then_some(field));

    match missing {
        Some(field) => Err(AppError::Validation(format!("{field} is required"))),
        None => Ok(()),
    }
}

/// The stored property document for a GoodWork node. Tags and skills live
/// as linked nodes, not here; category and address are denormalized for the
/// lightweight queries.
fn work_props(work: &GoodWork) -> Value {
    json!({
        "name": work.name,
        "category": work.category,
        "subCategory": work.sub_category,
        "description": work.description,
        "detailedDescription": work.detailed_description,
        "latitude": work.latitude,
        "longitude": work.longitude,
        "address": work.address,
        "startTime": work.start_time.map(|t| t.format(EVENT_TIME_FORMAT).to_string()),
        "endTime": work.end_time.map(|t| t.format(EVENT_TIME_FORMAT).to_string()),
        "estimatedDuration": work.estimated_duration_minutes,
        "effortLevel": work.effort_level.as_str(),
        "isAccessible": work.is_accessible,
        "isVirtual": work.is_virtual,
        "maxParticipants": work.max_participants,
        "currentParticipants": work.current_participants,
        "minimumAge": work.minimum_age,
        "familyFriendly": work.family_friendly,
        "isRecurring": work.is_recurring,
        "recurrencePattern": work.recurrence_pattern,
        "recurrenceEndDate": work
            .recurrence_end_date
            .map(|t| t.format(EVENT_TIME_FORMAT).to_string()),
        "organizationName": work.organization_name,
        "organizationWebsite": work.organization_website,
        "parkingAvailable": work.parking_available,
        "publicTransitAccessible": work.public_transit_accessible,
        "specialInstructions": work.special_instructions,
        "whatToBring": work.what_to_bring,
        "impactDescription": work.impact_description,
        "estimatedPeopleHelped": work.estimated_people_helped,
        "status": work.status.as_str(),
        "outdoorActivity": work.outdoor_activity,
        "weatherDependent": work.weather_dependent,
        "createdBy": work.created_by,
        "createdDate": work.created_date.map(|t| t.to_rfc3339()),
        "lastModifiedDate": work.last_modified_date.map(|t| t.to_rfc3339()),
    })
}

fn map_rows(rows: &[SqliteRow]) -> AppResult<Vec<GoodWork>> {
    rows.iter()
        .map(|row| {
            let record = row_to_record(row, JSON_COLUMNS)?;
            Ok(map_goodwork(&record))
        })
        .collect()
}

/// Lightweight pin rows carry only flat columns; everything else falls to
/// type defaults.
fn map_pin_rows(rows: &[SqliteRow]) -> AppResult<Vec<GoodWork>> {
    rows.iter()
        .map(|row| {
            let record = row_to_record(row, &[])?;
            Ok(map_goodwork(&record))
        })
        .collect()
}

/// Rebuild the domain object from a heterogeneous record: flat aliased
/// column first, then the same field off the raw `g`/`c`/`l` document,
/// then the type default. Applied independently per field because
/// different queries populate different column subsets.
pub fn map_goodwork(record: &Map<String, Value>) -> GoodWork {
    let p = Projection::new(record);
    GoodWork {
        id: p.opt_int("Id", None),
        name: p.text("Name", Some(("g", "name"))),
        category: p.text("Category", Some(("g", "category"))),
        sub_category: p.opt_text("SubCategory", Some(("g", "subCategory"))),
        description: p.text("Description", Some(("g", "description"))),
        detailed_description: p.opt_text("DetailedDescription", Some(("g", "detailedDescription"))),
        latitude: p.real("Latitude", Some(("g", "latitude"))),
        longitude: p.real("Longitude", Some(("g", "longitude"))),
        address: p.opt_text("Address", Some(("g", "address"))),
        start_time: p.datetime("StartTime", Some(("g", "startTime"))),
        end_time: p.datetime("EndTime", Some(("g", "endTime"))),
        estimated_duration_minutes: p.opt_int("EstimatedDuration", Some(("g", "estimatedDuration"))),
        contact_name: p.text("ContactName", Some(("c", "name"))),
        contact_email: p.text("ContactEmail", Some(("c", "email"))),
        contact_phone: p.text("ContactPhone", Some(("c", "phone"))),
        effort_level: EffortLevel::parse(&p.text("EffortLevel", Some(("g", "effortLevel")))),
        is_accessible: p.boolean("IsAccessible", Some(("g", "isAccessible"))),
        is_virtual: p.boolean("IsVirtual", Some(("g", "isVirtual"))),
        max_participants: p.opt_int("MaxParticipants", Some(("g", "maxParticipants"))),
        current_participants: p.int("CurrentParticipants", Some(("g", "currentParticipants"))),
        required_skills: p.text_list("RequiredSkills", None),
        tags: p.text_list("Tags", None),
        minimum_age: p.opt_int("MinimumAge", Some(("g", "minimumAge"))),
        family_friendly: p.boolean("FamilyFriendly", Some(("g", "familyFriendly"))),
        is_recurring: p.boolean("IsRecurring", Some(("g", "isRecurring"))),
        recurrence_pattern: p.opt_text("RecurrencePattern", Some(("g", "recurrencePattern"))),
        recurrence_end_date: p.datetime("RecurrenceEndDate", Some(("g", "recurrenceEndDate"))),
        organization_name: p.opt_text("OrganizationName", Some(("g", "organizationName"))),
        organization_website: p.opt_text("OrganizationWebsite", Some(("g", "organizationWebsite"))),
        parking_available: p.boolean("ParkingAvailable", Some(("g", "parkingAvailable"))),
        public_transit_accessible: p.boolean(
            "PublicTransitAccessible",
            Some(("g", "publicTransitAccessible")),
        ),
        special_instructions: p.opt_text("SpecialInstructions", Some(("g", "specialInstructions"))),
        what_to_bring: p.text_list("WhatToBring", Some(("g", "whatToBring"))),
        impact_description: p.opt_text("ImpactDescription", Some(("g", "impactDescription"))),
        estimated_people_helped: p.opt_int(
            "EstimatedPeopleHelped",
            Some(("g", "estimatedPeopleHelped")),
        ),
        status: WorkStatus::parse(&p.text("Status", Some(("g", "status")))),
        interested_count: p.int("InterestedCount", None),
        signed_up_count: p.int("SignedUpCount", None),
        is_user_interested: false,
        is_user_signed_up: false,
        outdoor_activity: p.boolean("OutdoorActivity", Some(("g", "outdoorActivity"))),
        weather_dependent: p.boolean("WeatherDependent", Some(("g", "weatherDependent"))),
        created_by: p.opt_text("CreatedBy", Some(("g", "createdBy"))),
        created_date: p.datetime_utc("CreatedDate", Some(("g", "createdDate"))),
        last_modified_date: p.datetime_utc("LastModifiedDate", Some(("g", "lastModifiedDate"))),
    }
}

/// The linked-entity summary used by similarity scoring.
#[derive(Debug, Clone)]
struct LinkProfile {
    id: NodeId,
    category: Option<String>,
    tags: Vec<String>,
    skills: Vec<String>,
    location: Option<NodeId>,
    effort: String,
    start_time: Option<NaiveDateTime>,
}

const LINK_PROFILE_SELECT: &str = "
    SELECT g.id AS id,
           json_extract(g.props, '$.effortLevel') AS effort,
           json_extract(g.props, '$.startTime') AS start_time,
           json_extract(cat.props, '$.name') AS category,
           le.target_id AS location_id,
           (SELECT json_group_array(json_extract(t.props, '$.name'))
              FROM edges te JOIN nodes t ON t.id = te.target_id
             WHERE te.source_id = g.id AND te.edge_type = 'TAGGED_WITH') AS tags,
           (SELECT json_group_array(json_extract(sk.props, '$.name'))
              FROM edges se JOIN nodes sk ON sk.id = se.target_id
             WHERE se.source_id = g.id AND se.edge_type = 'REQUIRES_SKILL') AS skills
    FROM nodes g
    LEFT JOIN edges be ON be.source_id = g.id AND be.edge_type = 'BELONGS_TO'
    LEFT JOIN nodes cat ON cat.id = be.target_id
    LEFT JOIN edges le ON le.source_id = g.id AND le.edge_type = 'LOCATED_IN'
    WHERE g.label = 'GoodWork'";

fn link_profile_from_row(row: &SqliteRow) -> AppResult<LinkProfile> {
    let parse_names = |column: &str| -> AppResult<Vec<String>> {
        match row.get::<Option<String>, _>(column) {
            Some(text) => {
                let names: Vec<Option<String>> = serde_json::from_str(&text)?;
                Ok(names.into_iter().flatten().collect())
            }
            None => Ok(Vec::new()),
        }
    };

    Ok(LinkProfile {
        id: row.get("id"),
        category: row.get("category"),
        tags: parse_names("tags")?,
        skills: parse_names("skills")?,
        location: row.get("location_id"),
        effort: row.get::<Option<String>, _>("effort").unwrap_or_default(),
        start_time: row
            .get::<Option<String>, _>("start_time")
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, EVENT_TIME_FORMAT).ok()),
    })
}

fn overlap(a: &[String], b: &[String]) -> i64 {
    a.iter().filter(|item| b.contains(item)).count() as i64
}

/// Weighted count of shared linked entities:
/// `3*category + 2*tags + 2*skills + 2*location + 1*effort`.
fn similarity_score(source: &LinkProfile, candidate: &LinkProfile) -> i64 {
    let category = (source.category.is_some() && source.category == candidate.category) as i64;
    let location = (source.location.is_some() && source.location == candidate.location) as i64;
    let effort = (!source.effort.is_empty() && source.effort == candidate.effort) as i64;

    3 * category
        + 2 * overlap(&source.tags, &candidate.tags)
        + 2 * overlap(&source.skills, &candidate.skills)
        + 2 * location
        + effort
}

/// Absolute whole-day distance between start times, for tie-breaking.
/// Missing start times sort last.
fn start_day_distance(source: &LinkProfile, candidate: &LinkProfile) -> i64 {
    match (source.start_time, candidate.start_time) {
        (Some(a), Some(b)) => (b - a).num_days().abs(),
        _ => i64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn profile(id: NodeId) -> LinkProfile {
        LinkProfile {
            id,
            category: Some("Environment".to_string()),
            tags: vec!["outdoors".to_string(), "cleanup".to_string()],
            skills: vec!["Gardening".to_string()],
            location: Some(7),
            effort: "Moderate".to_string(),
            start_time: NaiveDate::from_ymd_opt(2024, 6, 1)
                .and_then(|d| d.and_hms_opt(9, 0, 0)),
        }
    }

    #[test]
    fn identical_profiles_score_full_weights() {
        let source = profile(1);
        let candidate = profile(2);
        // 3 + 2*2 tags + 2*1 skill + 2 location + 1 effort
        assert_eq!(similarity_score(&source, &candidate), 12);
    }

    #[test]
    fn disjoint_profiles_score_zero() {
        let source = profile(1);
        let candidate = LinkProfile {
            id: 2,
            category: Some("Education".to_string()),
            tags: vec!["indoors".to_string()],
            skills: vec!["Teaching & Tutoring".to_string()],
            location: Some(9),
            effort: "Easy".to_string(),
            start_time: None,
        };
        assert_eq!(similarity_score(&source, &candidate), 0);
    }

    #[test]
    fn missing_category_on_both_sides_is_not_a_match() {
        let mut source = profile(1);
        let mut candidate = profile(2);
        source.category = None;
        candidate.category = None;
        // Tags, skills, location and effort still match.
        assert_eq!(similarity_score(&source, &candidate), 9);
    }

    #[test]
    fn tag_overlap_counts_each_shared_tag() {
        let source = profile(1);
        let mut candidate = profile(2);
        candidate.tags = vec!["cleanup".to_string()];
        candidate.skills.clear();
        candidate.category = None;
        candidate.location = None;
        candidate.effort = String::new();
        assert_eq!(similarity_score(&source, &candidate), 2);
    }

    #[test]
    fn tie_break_prefers_closer_start_dates() {
        let source = profile(1);
        let mut near = profile(2);
        near.start_time = NaiveDate::from_ymd_opt(2024, 6, 3).and_then(|d| d.and_hms_opt(9, 0, 0));
        let mut far = profile(3);
        far.start_time = NaiveDate::from_ymd_opt(2024, 8, 1).and_then(|d| d.and_hms_opt(9, 0, 0));

        let mut scored = vec![
            (similarity_score(&source, &far), start_day_distance(&source, &far), far.id),
            (similarity_score(&source, &near), start_day_distance(&source, &near), near.id),
        ];
        scored.sort_by_key(|(score, distance, _)| (-score, *distance));
        assert_eq!(scored[0].2, 2);
    }

    #[test]
    fn pin_record_maps_with_defaults() {
        let mut record = Map::new();
        record.insert("Name".to_string(), Value::from("Park cleanup"));
        record.insert("Description".to_string(), Value::from("Trash pickup"));
        record.insert("Latitude".to_string(), Value::from(30.5));
        record.insert("Longitude".to_string(), Value::from(-97.8));

        let work = map_goodwork(&record);
        assert_eq!(work.name, "Park cleanup");
        assert_eq!(work.latitude, 30.5);
        assert_eq!(work.contact_email, "");
        assert_eq!(work.status, WorkStatus::Active);
        assert!(work.tags.is_empty());
        assert!(work.id.is_none());
    }

    #[test]
    fn malformed_id_is_a_validation_error() {
        assert!(matches!(
            GoodWorksService::parse_id("abc"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(GoodWorksService::parse_id(" 42 "), Ok(42)));
    }
}
