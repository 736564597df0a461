// Labeled property graph over SQLite: a nodes table and an edges table,
// node properties as a JSON column so predicates can be pushed into SQL.

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqliteConnection, Transaction};

use crate::error::AppResult;

/// Engine-assigned node identity. Stable for the lifetime of the node.
pub type NodeId = i64;

#[derive(Debug, Clone)]
pub struct NodeRow {
    pub id: NodeId,
    pub label: String,
    pub props: Value,
    pub created: i64,
    pub updated: i64,
}

/// One natural-key component for a merge (match-or-create) lookup.
pub struct MergeKey<'a> {
    pub prop: &'a str,
    pub value: &'a str,
    /// Case-insensitive match (used for Skill names).
    pub fold_case: bool,
}

impl<'a> MergeKey<'a> {
    pub fn new(prop: &'a str, value: &'a str) -> Self {
        MergeKey {
            prop,
            value,
            fold_case: false,
        }
    }

    pub fn folded(prop: &'a str, value: &'a str) -> Self {
        MergeKey {
            prop,
            value,
            fold_case: true,
        }
    }
}

/// Shared graph store around a single process-wide connection pool.
pub struct GraphStore {
    pool: SqlitePool,
}

impl GraphStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(GraphStore { pool })
    }

    pub async fn init(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL,
                props TEXT NOT NULL,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS edges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                edge_type TEXT NOT NULL,
                props TEXT,
                created INTEGER NOT NULL,
                UNIQUE(source_id, target_id, edge_type)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_edges_source_type ON edges(source_id, edge_type)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_edges_target_type ON edges(target_id, edge_type)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction - caller is responsible for commit/rollback.
    pub async fn begin(&self) -> AppResult<Transaction<'_, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Create a node inside the caller's transaction/connection.
    pub async fn create_node(
        conn: &mut SqliteConnection,
        label: &str,
        props: &Value,
    ) -> AppResult<NodeId> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO nodes (label, props, created, updated) VALUES (?, ?, ?, ?)",
        )
        .bind(label)
        .bind(props.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Merge (upsert-by-natural-key): match an existing node on label plus
    /// every key property, create with `create_props` when absent.
    pub async fn merge_node(
        conn: &mut SqliteConnection,
        label: &str,
        keys: &[MergeKey<'_>],
        create_props: &Value,
    ) -> AppResult<NodeId> {
        let mut sql = String::from("SELECT id FROM nodes WHERE label = ?");
        for key in keys {
            if key.fold_case {
                sql.push_str(&format!(
                    " AND lower(json_extract(props, '$.{}')) = lower(?)",
                    key.prop
                ));
            } else {
                sql.push_str(&format!(" AND json_extract(props, '$.{}') = ?", key.prop));
            }
        }

        let mut query = sqlx::query(&sql).bind(label);
        for key in keys {
            query = query.bind(key.value);
        }

        if let Some(row) = query.fetch_optional(&mut *conn).await? {
            return Ok(row.get::<i64, _>("id"));
        }

        Self::create_node(conn, label, create_props).await
    }

    pub async fn get_node(&self, id: NodeId) -> AppResult<Option<NodeRow>> {
        let row = sqlx::query("SELECT id, label, props, created, updated FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let props: String = row.get("props");
                Ok(Some(NodeRow {
                    id: row.get("id"),
                    label: row.get("label"),
                    props: serde_json::from_str(&props)?,
                    created: row.get("created"),
                    updated: row.get("updated"),
                }))
            }
            None => Ok(None),
        }
    }

    /// Replace a node's property document.
    pub async fn update_node_props(
        conn: &mut SqliteConnection,
        id: NodeId,
        props: &Value,
    ) -> AppResult<bool> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("UPDATE nodes SET props = ?, updated = ? WHERE id = ?")
            .bind(props.to_string())
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cascading detach-delete: the node and every attached relationship.
    pub async fn delete_node_detach(conn: &mut SqliteConnection, id: NodeId) -> AppResult<bool> {
        sqlx::query("DELETE FROM edges WHERE source_id = ? OR target_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        let result = sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Idempotent relationship merge. Re-asserting an existing edge is a
    /// no-op and preserves the original creation timestamp and properties.
    /// Returns true when the edge was newly created.
    pub async fn merge_edge(
        conn: &mut SqliteConnection,
        source: NodeId,
        target: NodeId,
        edge_type: &str,
        props: Option<&Value>,
    ) -> AppResult<bool> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO edges (source_id, target_id, edge_type, props, created)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(source)
        .bind(target)
        .bind(edge_type)
        .bind(props.map(|p| p.to_string()))
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every outgoing relationship of one type, for re-pointing a
    /// node at new targets. Returns the number removed.
    pub async fn delete_edges_from(
        conn: &mut SqliteConnection,
        source: NodeId,
        edge_type: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM edges WHERE source_id = ? AND edge_type = ?")
            .bind(source)
            .bind(edge_type)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete a relationship if present. Returns true when one was removed.
    pub async fn delete_edge(
        conn: &mut SqliteConnection,
        source: NodeId,
        target: NodeId,
        edge_type: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM edges WHERE source_id = ? AND target_id = ? AND edge_type = ?",
        )
        .bind(source)
        .bind(target)
        .bind(edge_type)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn edge_exists(
        conn: &mut SqliteConnection,
        source: NodeId,
        target: NodeId,
        edge_type: &str,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM edges WHERE source_id = ? AND target_id = ? AND edge_type = ?",
        )
        .bind(source)
        .bind(target)
        .bind(edge_type)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.is_some())
    }
}
