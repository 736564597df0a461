// Dual-path record mapping. Query results are heterogeneous: some queries
// return flat aliased scalar columns ("Name", "Latitude"), others return the
// raw related node's property document under a short alias ("c", "l"). The
// projection tries the flat column first, then the named property off the
// raw node, then a type-specific default - independently per field.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::AppResult;

/// Convert a row into a JSON record. Columns named in `json_columns` hold
/// serialized node property documents and are parsed into objects/arrays;
/// everything else is taken as a scalar.
pub fn row_to_record(row: &SqliteRow, json_columns: &[&str]) -> AppResult<Map<String, Value>> {
    let mut record = Map::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(idx)?),
                "REAL" => Value::from(row.try_get::<f64, _>(idx)?),
                "TEXT" => {
                    let text: String = row.try_get(idx)?;
                    if json_columns.contains(&column.name()) {
                        serde_json::from_str(&text)?
                    } else {
                        Value::String(text)
                    }
                }
                _ => Value::Null,
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

pub struct Projection<'a> {
    record: &'a Map<String, Value>,
}

impl<'a> Projection<'a> {
    pub fn new(record: &'a Map<String, Value>) -> Self {
        Projection { record }
    }

    /// Flat aliased column first, then the property off the raw node object.
    fn lookup(&self, column: &str, node: Option<(&str, &str)>) -> Option<&'a Value> {
        if let Some(value) = self.record.get(column) {
            if !value.is_null() {
                return Some(value);
            }
        }
        if let Some((alias, prop)) = node {
            if let Some(Value::Object(object)) = self.record.get(alias) {
                if let Some(value) = object.get(prop) {
                    if !value.is_null() {
                        return Some(value);
                    }
                }
            }
        }
        None
    }

    pub fn text(&self, column: &str, node: Option<(&str, &str)>) -> String {
        self.lookup(column, node)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn opt_text(&self, column: &str, node: Option<(&str, &str)>) -> Option<String> {
        self.lookup(column, node)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn int(&self, column: &str, node: Option<(&str, &str)>) -> i64 {
        self.lookup(column, node).and_then(Value::as_i64).unwrap_or(0)
    }

    pub fn opt_int(&self, column: &str, node: Option<(&str, &str)>) -> Option<i64> {
        self.lookup(column, node).and_then(Value::as_i64)
    }

    pub fn real(&self, column: &str, node: Option<(&str, &str)>) -> f64 {
        self.lookup(column, node).and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn opt_real(&self, column: &str, node: Option<(&str, &str)>) -> Option<f64> {
        self.lookup(column, node).and_then(Value::as_f64)
    }

    pub fn boolean(&self, column: &str, node: Option<(&str, &str)>) -> bool {
        match self.lookup(column, node) {
            Some(Value::Bool(b)) => *b,
            // SQLite surfaces JSON booleans as 0/1 integers.
            Some(value) => value.as_i64().map(|n| n != 0).unwrap_or(false),
            None => false,
        }
    }

    /// Event-local timestamps, stored as `%Y-%m-%dT%H:%M:%S`.
    pub fn datetime(&self, column: &str, node: Option<(&str, &str)>) -> Option<NaiveDateTime> {
        self.lookup(column, node)
            .and_then(Value::as_str)
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
    }

    /// Audit timestamps, stored as RFC 3339.
    pub fn datetime_utc(&self, column: &str, node: Option<(&str, &str)>) -> Option<DateTime<Utc>> {
        self.lookup(column, node)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn text_list(&self, column: &str, node: Option<(&str, &str)>) -> Vec<String> {
        self.lookup(column, node)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn flat_column_wins_over_raw_node() {
        let record = record(json!({
            "Name": "Flat name",
            "g": { "name": "Node name" }
        }));
        let p = Projection::new(&record);
        assert_eq!(p.text("Name", Some(("g", "name"))), "Flat name");
    }

    #[test]
    fn falls_back_to_raw_node_property() {
        let record = record(json!({
            "g": { "name": "Node name", "latitude": 41.5 }
        }));
        let p = Projection::new(&record);
        assert_eq!(p.text("Name", Some(("g", "name"))), "Node name");
        assert_eq!(p.real("Latitude", Some(("g", "latitude"))), 41.5);
    }

    #[test]
    fn defaults_when_neither_path_is_present() {
        let record = record(json!({ "g": {} }));
        let p = Projection::new(&record);
        assert_eq!(p.text("Name", Some(("g", "name"))), "");
        assert_eq!(p.real("Latitude", Some(("g", "latitude"))), 0.0);
        assert_eq!(p.int("InterestedCount", None), 0);
        assert!(!p.boolean("IsVirtual", Some(("g", "isVirtual"))));
    }

    #[test]
    fn fields_resolve_independently() {
        // One field present flat, another only on the node, a third absent.
        let record = record(json!({
            "Description": "flat",
            "g": { "name": "from node" }
        }));
        let p = Projection::new(&record);
        assert_eq!(p.text("Description", Some(("g", "description"))), "flat");
        assert_eq!(p.text("Name", Some(("g", "name"))), "from node");
        assert_eq!(p.text("Category", Some(("g", "category"))), "");
    }

    #[test]
    fn null_flat_column_does_not_shadow_the_node() {
        let record = record(json!({
            "Name": null,
            "g": { "name": "Node name" }
        }));
        let p = Projection::new(&record);
        assert_eq!(p.text("Name", Some(("g", "name"))), "Node name");
    }

    #[test]
    fn booleans_accept_sqlite_integers() {
        let record = record(json!({ "IsVirtual": 1, "g": { "isAccessible": true } }));
        let p = Projection::new(&record);
        assert!(p.boolean("IsVirtual", None));
        assert!(p.boolean("IsAccessible", Some(("g", "isAccessible"))));
    }

    #[test]
    fn timestamps_parse_per_storage_convention() {
        let record = record(json!({
            "g": {
                "startTime": "2024-06-01T09:30:00",
                "createdDate": "2024-05-01T12:00:00+00:00"
            }
        }));
        let p = Projection::new(&record);
        let start = p.datetime("StartTime", Some(("g", "startTime"))).unwrap();
        assert_eq!(start.format("%H:%M").to_string(), "09:30");
        assert!(p.datetime_utc("CreatedDate", Some(("g", "createdDate"))).is_some());
    }

    #[test]
    fn lists_come_back_as_strings() {
        let record = record(json!({ "Tags": ["a", "b"] }));
        let p = Projection::new(&record);
        assert_eq!(p.text_list("Tags", None), vec!["a", "b"]);
    }
}
