// Organization entity family: profiles, slugs, membership and admin roles.
// Derived counts (members, events, volunteers) are computed from edges at
// query time; the stored property document is exactly the serialized model.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use sqlx::Row;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::graph::{GraphStore, MergeKey, NodeId};
use crate::models::{Organization, OrganizationMember, OrgStatus};

static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static SLUG_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SLUG_HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

/// URL-friendly slug from a display name: lowercased, special characters
/// stripped, whitespace to hyphens, hyphen runs collapsed.
pub fn generate_slug(name: &str) -> String {
    let slug = name.to_lowercase();
    let slug = SLUG_STRIP.replace_all(slug.trim(), "");
    let slug = SLUG_SPACES.replace_all(&slug, "-");
    SLUG_HYPHENS.replace_all(&slug, "-").into_owned()
}

/// Suffixes tried before a slug collision becomes an error.
const SLUG_RETRY_LIMIT: i64 = 50;

const MEMBER_COUNT_SUBQUERY: &str = "(SELECT COUNT(DISTINCT m.source_id) FROM edges m
       WHERE m.target_id = n.id AND m.edge_type IN ('ADMIN_OF', 'MEMBER_OF'))";

const EVENT_COUNT_SUBQUERY: &str = "(SELECT COUNT(*) FROM edges p
       WHERE p.target_id = n.id AND p.edge_type = 'POSTED_BY')";

pub struct OrganizationService {
    store: Arc<GraphStore>,
}

impl OrganizationService {
    pub fn new(store: Arc<GraphStore>) -> Self {
        OrganizationService { store }
    }

    /// True when no organization holds the slug (optionally ignoring one
    /// node, for rename checks).
    pub async fn is_slug_available(
        &self,
        slug: &str,
        exclude_org_id: Option<NodeId>,
    ) -> AppResult<bool> {
        let row = match exclude_org_id {
            Some(exclude) => {
                sqlx::query(
                    "SELECT COUNT(*) AS hits FROM nodes
                     WHERE label = 'Organization'
                       AND json_extract(props, '$.slug') = ? AND id <> ?",
                )
                .bind(slug)
                .bind(exclude)
                .fetch_one(self.store.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT COUNT(*) AS hits FROM nodes
                     WHERE label = 'Organization' AND json_extract(props, '$.slug') = ?",
                )
                .bind(slug)
                .fetch_one(self.store.pool())
                .await?
            }
        };
        Ok(row.get::<i64, _>("hits") == 0)
    }

    /// Create an organization and make the creator its first admin. A blank
    /// slug is derived from the name and disambiguated with `-1`, `-2`, ...
    /// suffixes, up to 50 before the create fails with `Conflict`. The
    /// check-then-create loop is not atomic against concurrent creations; a
    /// simultaneous insert can slip past the availability check.
    pub async fn create(
        &self,
        mut organization: Organization,
        user_id: &str,
    ) -> AppResult<Organization> {
        if organization.name.trim().is_empty() {
            return Err(AppError::Validation(
                "organization name is required".to_string(),
            ));
        }

        if organization.slug.is_empty() {
            let base = generate_slug(&organization.name);
            let mut candidate = base.clone();
            let mut counter = 1;
            while !self.is_slug_available(&candidate, None).await? {
                if counter > SLUG_RETRY_LIMIT {
                    return Err(AppError::Conflict(format!(
                        "no free slug for '{base}' within {SLUG_RETRY_LIMIT} suffixes"
                    )));
                }
                candidate = format!("{base}-{counter}");
                counter += 1;
            }
            organization.slug = candidate;
        }

        organization.created_by = user_id.to_string();
        organization.created_date = Some(Utc::now());
        organization.status = OrgStatus::Active;

        let props = serde_json::to_value(&organization)?;

        let mut tx = self.store.begin().await?;
        let org_node = GraphStore::create_node(&mut *tx, "Organization", &props).await?;
        let user_node = GraphStore::merge_node(
            &mut *tx,
            "User",
            &[MergeKey::new("userId", user_id)],
            &json!({ "userId": user_id }),
        )
        .await?;
        GraphStore::merge_edge(
            &mut *tx,
            user_node,
            org_node,
            "ADMIN_OF",
            Some(&json!({ "since": Utc::now().to_rfc3339() })),
        )
        .await?;
        tx.commit().await?;

        organization.id = Some(org_node);
        info!(
            "created organization '{}' (slug {})",
            organization.name, organization.slug
        );
        Ok(organization)
    }

    /// Fetch by slug with derived counts. When a viewer is given, a second
    /// query fills the viewer's admin/member flags.
    pub async fn get_by_slug(
        &self,
        slug: &str,
        viewer_id: Option<&str>,
    ) -> AppResult<Option<Organization>> {
        let sql = format!(
            "SELECT n.id, n.props,
                    {MEMBER_COUNT_SUBQUERY} AS member_count,
                    {EVENT_COUNT_SUBQUERY} AS event_count,
                    (SELECT COUNT(DISTINCT s.source_id) FROM edges s
                       JOIN edges p ON p.source_id = s.target_id
                      WHERE s.edge_type = 'SIGNED_UP_FOR'
                        AND p.edge_type = 'POSTED_BY' AND p.target_id = n.id)
                      AS volunteer_count
             FROM nodes n
             WHERE n.label = 'Organization' AND json_extract(n.props, '$.slug') = ?"
        );
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(self.store.pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut org = organization_from_row(&row)?;
        org.volunteer_count = row.get("volunteer_count");

        if let Some(viewer) = viewer_id {
            let org_id = org.id.unwrap_or_default();
            let flags = sqlx::query(
                "SELECT
                    EXISTS(SELECT 1 FROM edges e JOIN nodes u ON u.id = e.source_id
                           WHERE e.target_id = ? AND e.edge_type = 'ADMIN_OF'
                             AND u.label = 'User'
                             AND json_extract(u.props, '$.userId') = ?) AS is_admin,
                    EXISTS(SELECT 1 FROM edges e JOIN nodes u ON u.id = e.source_id
                           WHERE e.target_id = ? AND e.edge_type = 'MEMBER_OF'
                             AND u.label = 'User'
                             AND json_extract(u.props, '$.userId') = ?) AS is_member",
            )
            .bind(org_id)
            .bind(viewer)
            .bind(org_id)
            .bind(viewer)
            .fetch_one(self.store.pool())
            .await?;

            org.is_user_admin = flags.get::<i64, _>("is_admin") != 0;
            org.is_user_member = org.is_user_admin || flags.get::<i64, _>("is_member") != 0;
        }

        Ok(Some(org))
    }

    /// Active organizations, newest first, optionally filtered by a search
    /// term over name/description/city.
    pub async fn list(
        &self,
        skip: i64,
        limit: i64,
        search_term: Option<&str>,
    ) -> AppResult<Vec<Organization>> {
        let (filter, needle) = search_filter(search_term);
        let sql = format!(
            "SELECT n.id, n.props,
                    {MEMBER_COUNT_SUBQUERY} AS member_count,
                    {EVENT_COUNT_SUBQUERY} AS event_count
             FROM nodes n
             WHERE n.label = 'Organization'
               AND json_extract(n.props, '$.status') = 'Active'{filter}
             ORDER BY json_extract(n.props, '$.createdDate') DESC
             LIMIT ? OFFSET ?"
        );

        let mut query = sqlx::query(&sql);
        if let Some(needle) = &needle {
            query = query.bind(needle).bind(needle).bind(needle);
        }
        let rows = query
            .bind(limit)
            .bind(skip)
            .fetch_all(self.store.pool())
            .await?;

        rows.iter().map(organization_from_row).collect()
    }

    pub async fn count(&self, search_term: Option<&str>) -> AppResult<i64> {
        let (filter, needle) = search_filter(search_term);
        let sql = format!(
            "SELECT COUNT(*) AS total FROM nodes n
             WHERE n.label = 'Organization'
               AND json_extract(n.props, '$.status') = 'Active'{filter}"
        );

        let mut query = sqlx::query(&sql);
        if let Some(needle) = &needle {
            query = query.bind(needle).bind(needle).bind(needle);
        }
        let row = query.fetch_one(self.store.pool()).await?;
        Ok(row.get("total"))
    }

    /// Active organizations the user belongs to, alphabetical, with the
    /// user's role derived from which relationship matched.
    pub async fn user_organizations(&self, user_id: &str) -> AppResult<Vec<Organization>> {
        let sql = format!(
            "SELECT n.id, n.props, e.edge_type,
                    {MEMBER_COUNT_SUBQUERY} AS member_count,
                    {EVENT_COUNT_SUBQUERY} AS event_count
             FROM edges e
             JOIN nodes u ON u.id = e.source_id AND u.label = 'User'
             JOIN nodes n ON n.id = e.target_id AND n.label = 'Organization'
             WHERE e.edge_type IN ('ADMIN_OF', 'MEMBER_OF')
               AND json_extract(u.props, '$.userId') = ?
               AND json_extract(n.props, '$.status') = 'Active'
             ORDER BY lower(json_extract(n.props, '$.name')) ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.store.pool())
            .await?;

        rows.iter()
            .map(|row| {
                let mut org = organization_from_row(row)?;
                org.is_user_admin = row.get::<String, _>("edge_type") == "ADMIN_OF";
                org.is_user_member = true;
                Ok(org)
            })
            .collect()
    }

    /// Add a member, creating the user node on first touch. Re-adding is a
    /// no-op that keeps the original role and joined date. Returns false
    /// when the organization does not exist.
    pub async fn add_member(
        &self,
        organization_id: NodeId,
        user_id: &str,
        role: &str,
    ) -> AppResult<bool> {
        let mut tx = self.store.begin().await?;

        let org_exists = sqlx::query("SELECT 1 FROM nodes WHERE id = ? AND label = 'Organization'")
            .bind(organization_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !org_exists {
            tx.rollback().await?;
            return Ok(false);
        }

        let user_node = GraphStore::merge_node(
            &mut *tx,
            "User",
            &[MergeKey::new("userId", user_id)],
            &json!({ "userId": user_id }),
        )
        .await?;
        GraphStore::merge_edge(
            &mut *tx,
            user_node,
            organization_id,
            "MEMBER_OF",
            Some(&json!({ "role": role, "joinedDate": Utc::now().to_rfc3339() })),
        )
        .await?;
        tx.commit().await?;

        Ok(true)
    }

    /// Remove a MEMBER_OF relationship. Returns true when one was removed;
    /// admins are untouched.
    pub async fn remove_member(&self, organization_id: NodeId, user_id: &str) -> AppResult<bool> {
        let mut tx = self.store.begin().await?;

        let removed = match Self::find_user_node(&mut *tx, user_id).await? {
            Some(user_node) => {
                GraphStore::delete_edge(&mut *tx, user_node, organization_id, "MEMBER_OF").await?
            }
            None => false,
        };
        tx.commit().await?;

        Ok(removed)
    }

    /// Members and admins with role, joined date and contributed-event
    /// count. Admins sort first, then by join date.
    pub async fn members(&self, organization_id: NodeId) -> AppResult<Vec<OrganizationMember>> {
        let rows = sqlx::query(
            "SELECT u.props AS user_props, e.edge_type, e.props AS edge_props,
                    COALESCE(json_extract(e.props, '$.since'),
                             json_extract(e.props, '$.joinedDate')) AS joined,
                    (SELECT COUNT(*) FROM edges p
                       JOIN nodes g ON g.id = p.source_id
                      WHERE p.edge_type = 'POSTED_BY' AND p.target_id = e.target_id
                        AND json_extract(g.props, '$.createdBy') =
                            json_extract(u.props, '$.userId')) AS contributed
             FROM edges e
             JOIN nodes u ON u.id = e.source_id AND u.label = 'User'
             WHERE e.target_id = ? AND e.edge_type IN ('ADMIN_OF', 'MEMBER_OF')
             ORDER BY e.edge_type ASC, joined ASC",
        )
        .bind(organization_id)
        .fetch_all(self.store.pool())
        .await?;

        let mut members = Vec::with_capacity(rows.len());
        for row in &rows {
            let user_props: String = row.get("user_props");
            let user_props: Value = serde_json::from_str(&user_props)?;
            let edge_props: Value = match row.get::<Option<String>, _>("edge_props") {
                Some(text) => serde_json::from_str(&text)?,
                None => Value::Null,
            };
            let is_admin = row.get::<String, _>("edge_type") == "ADMIN_OF";

            members.push(OrganizationMember {
                user_id: user_props["userId"].as_str().unwrap_or_default().to_string(),
                name: user_props["name"]
                    .as_str()
                    .unwrap_or("Unknown")
                    .to_string(),
                email: user_props["email"].as_str().unwrap_or_default().to_string(),
                phone: user_props["phone"].as_str().map(str::to_string),
                role: if is_admin {
                    "Admin".to_string()
                } else {
                    edge_props["role"].as_str().unwrap_or("Member").to_string()
                },
                joined_date: row
                    .get::<Option<String>, _>("joined")
                    .as_deref()
                    .and_then(parse_utc),
                contributed_events: row.get("contributed"),
            });
        }

        Ok(members)
    }

    pub async fn is_user_admin(&self, organization_id: NodeId, user_id: &str) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM edges e
             JOIN nodes u ON u.id = e.source_id AND u.label = 'User'
             WHERE e.target_id = ? AND e.edge_type = 'ADMIN_OF'
               AND json_extract(u.props, '$.userId') = ?",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(self.store.pool())
        .await?;
        Ok(row.is_some())
    }

    /// Promote a member to admin: drop MEMBER_OF, assert ADMIN_OF. The two
    /// statements are issued independently, not inside one transaction; a
    /// crash between them leaves the user with neither role.
    pub async fn promote_to_admin(&self, organization_id: NodeId, user_id: &str) -> AppResult<bool> {
        let mut conn = self.store.pool().acquire().await?;
        let user_node = match Self::find_user_node(&mut conn, user_id).await? {
            Some(id) => id,
            None => return Ok(false),
        };

        GraphStore::delete_edge(&mut conn, user_node, organization_id, "MEMBER_OF").await?;
        GraphStore::merge_edge(
            &mut conn,
            user_node,
            organization_id,
            "ADMIN_OF",
            Some(&json!({ "since": Utc::now().to_rfc3339() })),
        )
        .await?;

        Ok(true)
    }

    /// Update profile fields, stamping `lastModifiedDate`. Identity and
    /// provenance fields (slug, creator, created date, status, verified,
    /// tax id, founded date) are preserved from the stored document.
    pub async fn update(&self, organization: &Organization) -> AppResult<bool> {
        let Some(id) = organization.id else {
            return Err(AppError::Validation(
                "organization id is required for update".to_string(),
            ));
        };

        let mut tx = self.store.begin().await?;
        let row = sqlx::query("SELECT props FROM nodes WHERE id = ? AND label = 'Organization'")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let props: String = row.get("props");
        let mut stored: Organization = serde_json::from_str(&props)?;

        stored.name = organization.name.clone();
        stored.description = organization.description.clone();
        stored.mission = organization.mission.clone();
        stored.vision = organization.vision.clone();
        stored.contact_email = organization.contact_email.clone();
        stored.contact_phone = organization.contact_phone.clone();
        stored.website = organization.website.clone();
        stored.address = organization.address.clone();
        stored.city = organization.city.clone();
        stored.state = organization.state.clone();
        stored.country = organization.country.clone();
        stored.zip_code = organization.zip_code.clone();
        stored.latitude = organization.latitude;
        stored.longitude = organization.longitude;
        stored.organization_type = organization.organization_type.clone();
        stored.logo_url = organization.logo_url.clone();
        stored.cover_image_url = organization.cover_image_url.clone();
        stored.facebook_url = organization.facebook_url.clone();
        stored.twitter_url = organization.twitter_url.clone();
        stored.instagram_url = organization.instagram_url.clone();
        stored.linked_in_url = organization.linked_in_url.clone();
        stored.focus_areas = organization.focus_areas.clone();
        stored.tags = organization.tags.clone();
        stored.last_modified_date = Some(Utc::now());

        let updated =
            GraphStore::update_node_props(&mut *tx, id, &serde_json::to_value(&stored)?).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Soft delete: status flips to Inactive, the node and its
    /// relationships stay.
    pub async fn soft_delete(&self, organization_id: NodeId) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE nodes
             SET props = json_set(props, '$.status', 'Inactive'),
                 updated = strftime('%s', 'now')
             WHERE id = ? AND label = 'Organization'",
        )
        .bind(organization_id)
        .execute(self.store.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_user_node(
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

fn search_filter(search_term: Option<&str>) -> (&'static str, Option<String>) {
    match search_term.filter(|t| !t.trim().is_empty()) {
        Some(term) => (
            "
               AND (lower(json_extract(n.props, '$.name')) LIKE ?
                    OR lower(coalesce(json_extract(n.props, '$.description'), '')) LIKE ?
                    OR lower(coalesce(json_extract(n.props, '$.city'), '')) LIKE ?)",
            Some(format!("%{}%", term.trim().to_lowercase())),
        ),
        None => ("", None),
    }
}

fn organization_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<Organization> {
    let props: String = row.get("props");
    let mut org: Organization = serde_json::from_str(&props)?;
    org.id = Some(row.get("id"));
    org.member_count = row.get("member_count");
    org.event_count = row.get("event_count");
    Ok(org)
}

fn parse_utc(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_strips_and_hyphenates() {
        assert_eq!(generate_slug("River Walk Cleanup"), "river-walk-cleanup");
        assert_eq!(generate_slug("St. Mary's Food Bank!"), "st-marys-food-bank");
        assert_eq!(generate_slug("  Many    Spaces  "), "many-spaces");
        assert_eq!(generate_slug("already-a-slug"), "already-a-slug");
        assert_eq!(generate_slug("Dash -- Heavy -- Name"), "dash-heavy-name");
    }

    #[test]
    fn slug_of_pure_punctuation_is_empty() {
        assert_eq!(generate_slug("!!!"), "");
    }
}
