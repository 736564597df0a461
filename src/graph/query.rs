// Query criteria builder: search criteria become an ordered list of typed
// predicates, compiled at the edge into SQL condition fragments plus a
// parameter list. Conditions are always joined with AND; the Active-status
// predicate is always present.

use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

use crate::models::SearchCriteria;

/// One bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
}

/// A boolean condition over the GoodWork node (aliased `g` in every query
/// this fragment is spliced into).
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `status == Active`, always present.
    StatusActive,
    /// Scalar property comparison on the GoodWork node itself.
    PropEq { field: &'static str, value: Param },
    PropGte { field: &'static str, value: Param },
    PropLte { field: &'static str, value: Param },
    /// Linked node (via `edge_type`) whose `name` property equals the value.
    RelatedByName {
        edge_type: &'static str,
        label: &'static str,
        name: String,
    },
    /// Linked node whose `name` property is any of the values.
    RelatedAnyName {
        edge_type: &'static str,
        label: &'static str,
        names: Vec<String>,
    },
    /// Axis-aligned bounding box over latitude/longitude.
    BoundingBox {
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
    },
    /// Case-insensitive substring match ORed across the text-bearing fields
    /// (name, description, detailed description, contact email).
    TextSearch { term: String },
    /// `maxParticipants` unset or `currentParticipants < maxParticipants`.
    HasAvailableSpots,
}

impl Predicate {
    fn prop(field: &str) -> String {
        format!("json_extract(g.props, '$.{}')", field)
    }

    /// Compile to a SQL condition plus its parameters, in bind order.
    pub fn compile(&self) -> (String, Vec<Param>) {
        match self {
            Predicate::StatusActive => (
                format!("{} = ?", Self::prop("status")),
                vec![Param::Text("Active".to_string())],
            ),
            Predicate::PropEq { field, value } => {
                (format!("{} = ?", Self::prop(field)), vec![value.clone()])
            }
            Predicate::PropGte { field, value } => {
                (format!("{} >= ?", Self::prop(field)), vec![value.clone()])
            }
            Predicate::PropLte { field, value } => {
                (format!("{} <= ?", Self::prop(field)), vec![value.clone()])
            }
            Predicate::RelatedByName {
                edge_type,
                label,
                name,
            } => (
                format!(
                    "EXISTS (SELECT 1 FROM edges e JOIN nodes n ON n.id = e.target_id \
                     WHERE e.source_id = g.id AND e.edge_type = '{}' AND n.label = '{}' \
                     AND json_extract(n.props, '$.name') = ?)",
                    edge_type, label
                ),
                vec![Param::Text(name.clone())],
            ),
            Predicate::RelatedAnyName {
                edge_type,
                label,
                names,
            } => {
                let placeholders = vec!["?"; names.len()].join(", ");
                (
                    format!(
                        "EXISTS (SELECT 1 FROM edges e JOIN nodes n ON n.id = e.target_id \
                         WHERE e.source_id = g.id AND e.edge_type = '{}' AND n.label = '{}' \
                         AND json_extract(n.props, '$.name') IN ({}))",
                        edge_type, label, placeholders
                    ),
                    names.iter().map(|n| Param::Text(n.clone())).collect(),
                )
            }
            Predicate::BoundingBox {
                min_lat,
                max_lat,
                min_lng,
                max_lng,
            } => (
                format!(
                    "{lat} >= ? AND {lat} <= ? AND {lng} >= ? AND {lng} <= ?",
                    lat = Self::prop("latitude"),
                    lng = Self::prop("longitude")
                ),
                vec![
                    Param::Real(*min_lat),
                    Param::Real(*max_lat),
                    Param::Real(*min_lng),
                    Param::Real(*max_lng),
                ],
            ),
            Predicate::TextSearch { term } => {
                let like = |field: &str| {
                    format!("lower({}) LIKE '%' || lower(?) || '%'", Self::prop(field))
                };
                let contact = "EXISTS (SELECT 1 FROM edges e JOIN nodes n ON n.id = e.target_id \
                               WHERE e.source_id = g.id AND e.edge_type = 'HAS_CONTACT' \
                               AND lower(json_extract(n.props, '$.email')) LIKE '%' || lower(?) || '%')";
                (
                    format!(
                        "({} OR {} OR {} OR {})",
                        like("name"),
                        like("description"),
                        like("detailedDescription"),
                        contact
                    ),
                    vec![Param::Text(term.clone()); 4],
                )
            }
            Predicate::HasAvailableSpots => (
                format!(
                    "({max} IS NULL OR coalesce({cur}, 0) < {max})",
                    max = Self::prop("maxParticipants"),
                    cur = Self::prop("currentParticipants")
                ),
                vec![],
            ),
        }
    }
}

/// Compiled WHERE fragment: ordered conditions and their parameters.
#[derive(Debug, Clone)]
pub struct QueryFragment {
    pub conditions: Vec<String>,
    pub params: Vec<Param>,
}

impl QueryFragment {
    pub fn where_clause(&self) -> String {
        self.conditions.join(" AND ")
    }
}

/// Degrees of latitude per mile is roughly constant; degrees of longitude
/// shrink with the cosine of the latitude. The box is a deliberate
/// approximation of the radius, not a geodesic circle.
fn bounding_box(center_lat: f64, center_lng: f64, radius_miles: f64) -> Predicate {
    let lat_delta = radius_miles / 69.0;
    let lng_delta = radius_miles / (69.0 * center_lat.to_radians().cos());
    Predicate::BoundingBox {
        min_lat: center_lat - lat_delta,
        max_lat: center_lat + lat_delta,
        min_lng: center_lng - lng_delta,
        max_lng: center_lng + lng_delta,
    }
}

const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Translate search criteria into the ordered predicate list.
pub fn build_criteria(criteria: &SearchCriteria) -> Vec<Predicate> {
    let mut predicates = vec![Predicate::StatusActive];

    if let Some(category) = &criteria.category {
        predicates.push(Predicate::RelatedByName {
            edge_type: "BELONGS_TO",
            label: "Category",
            name: category.clone(),
        });
    }

    if let Some(sub) = &criteria.sub_category {
        predicates.push(Predicate::RelatedByName {
            edge_type: "HAS_SUBCATEGORY",
            label: "SubCategory",
            name: sub.clone(),
        });
    }

    if !criteria.tags.is_empty() {
        predicates.push(Predicate::RelatedAnyName {
            edge_type: "TAGGED_WITH",
            label: "Tag",
            names: criteria.tags.clone(),
        });
    }

    if let (Some(lat), Some(lng), Some(radius)) = (
        criteria.center_latitude,
        criteria.center_longitude,
        criteria.radius_miles,
    ) {
        predicates.push(bounding_box(lat, lng, radius));
    }

    if let Some(from) = criteria.start_date_from {
        predicates.push(Predicate::PropGte {
            field: "startTime",
            value: Param::Text(from.format(START_TIME_FORMAT).to_string()),
        });
    }

    if let Some(to) = criteria.start_date_to {
        predicates.push(Predicate::PropLte {
            field: "startTime",
            value: Param::Text(to.format(START_TIME_FORMAT).to_string()),
        });
    }

    if let Some(effort) = criteria.effort_level {
        predicates.push(Predicate::PropEq {
            field: "effortLevel",
            value: Param::Text(effort.as_str().to_string()),
        });
    }

    if let Some(is_virtual) = criteria.is_virtual {
        predicates.push(Predicate::PropEq {
            field: "isVirtual",
            value: Param::Bool(is_virtual),
        });
    }

    if let Some(accessible) = criteria.is_accessible {
        predicates.push(Predicate::PropEq {
            field: "isAccessible",
            value: Param::Bool(accessible),
        });
    }

    if let Some(family) = criteria.family_friendly {
        predicates.push(Predicate::PropEq {
            field: "familyFriendly",
            value: Param::Bool(family),
        });
    }

    if !criteria.required_skills.is_empty() {
        predicates.push(Predicate::RelatedAnyName {
            edge_type: "REQUIRES_SKILL",
            label: "Skill",
            names: criteria.required_skills.clone(),
        });
    }

    if criteria.has_available_spots == Some(true) {
        predicates.push(Predicate::HasAvailableSpots);
    }

    if let Some(text) = &criteria.search_text {
        let text = text.trim();
        if !text.is_empty() {
            predicates.push(Predicate::TextSearch {
                term: text.to_string(),
            });
        }
    }

    predicates
}

/// Compile an ordered predicate list into a WHERE fragment.
pub fn compile(predicates: &[Predicate]) -> QueryFragment {
    let mut conditions = Vec::with_capacity(predicates.len());
    let mut params = Vec::new();
    for predicate in predicates {
        let (condition, mut predicate_params) = predicate.compile();
        conditions.push(condition);
        params.append(&mut predicate_params);
    }
    QueryFragment { conditions, params }
}

/// Bind a parameter list, in order, onto a prepared query.
pub fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Param],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Param::Text(s) => query.bind(s.clone()),
            Param::Int(i) => query.bind(*i),
            Param::Real(f) => query.bind(*f),
            Param::Bool(b) => query.bind(*b),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EffortLevel;
    use chrono::NaiveDate;

    #[test]
    fn empty_criteria_is_active_only() {
        let predicates = build_criteria(&SearchCriteria::default());
        assert_eq!(predicates, vec![Predicate::StatusActive]);

        let fragment = compile(&predicates);
        assert_eq!(fragment.conditions.len(), 1);
        assert_eq!(fragment.params, vec![Param::Text("Active".to_string())]);
        assert!(fragment.where_clause().contains("$.status"));
    }

    #[test]
    fn bounding_box_converts_miles_to_degree_deltas() {
        // 69 miles at the equator is one degree in both axes.
        let criteria = SearchCriteria {
            center_latitude: Some(0.0),
            center_longitude: Some(10.0),
            radius_miles: Some(69.0),
            ..Default::default()
        };
        let predicates = build_criteria(&criteria);
        let bbox = predicates
            .iter()
            .find_map(|p| match p {
                Predicate::BoundingBox {
                    min_lat,
                    max_lat,
                    min_lng,
                    max_lng,
                } => Some((*min_lat, *max_lat, *min_lng, *max_lng)),
                _ => None,
            })
            .expect("bounding box predicate");

        assert!((bbox.0 - -1.0).abs() < 1e-9);
        assert!((bbox.1 - 1.0).abs() < 1e-9);
        assert!((bbox.2 - 9.0).abs() < 1e-9);
        assert!((bbox.3 - 11.0).abs() < 1e-9);
    }

    #[test]
    fn longitude_delta_widens_away_from_equator() {
        let criteria = SearchCriteria {
            center_latitude: Some(60.0),
            center_longitude: Some(0.0),
            radius_miles: Some(69.0),
            ..Default::default()
        };
        let predicates = build_criteria(&criteria);
        if let Some(Predicate::BoundingBox {
            min_lng, max_lng, ..
        }) = predicates.iter().find(|p| matches!(p, Predicate::BoundingBox { .. }))
        {
            // cos(60 deg) = 0.5, so the longitude half-width doubles.
            assert!((max_lng - min_lng - 4.0).abs() < 1e-9);
        } else {
            panic!("bounding box predicate missing");
        }
    }

    #[test]
    fn text_search_binds_the_term_once_per_field() {
        let predicate = Predicate::TextSearch {
            term: "River".to_string(),
        };
        let (condition, params) = predicate.compile();
        assert_eq!(params.len(), 4);
        assert!(params.iter().all(|p| *p == Param::Text("River".to_string())));
        assert!(condition.contains("lower("));
        assert_eq!(condition.matches(" OR ").count(), 3);
    }

    #[test]
    fn available_spots_has_no_parameters() {
        let (condition, params) = Predicate::HasAvailableSpots.compile();
        assert!(params.is_empty());
        assert!(condition.contains("maxParticipants"));
        assert!(condition.contains("IS NULL"));
    }

    #[test]
    fn full_criteria_keeps_declaration_order() {
        let criteria = SearchCriteria {
            category: Some("Environment".to_string()),
            tags: vec!["outdoors".to_string()],
            effort_level: Some(EffortLevel::Easy),
            is_virtual: Some(false),
            has_available_spots: Some(true),
            search_text: Some("cleanup".to_string()),
            start_date_from: Some(
                NaiveDate::from_ymd_opt(2024, 6, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            ),
            ..Default::default()
        };

        let predicates = build_criteria(&criteria);
        assert!(matches!(predicates[0], Predicate::StatusActive));
        assert!(matches!(predicates[1], Predicate::RelatedByName { edge_type: "BELONGS_TO", .. }));
        assert!(matches!(predicates[2], Predicate::RelatedAnyName { edge_type: "TAGGED_WITH", .. }));
        assert!(matches!(predicates[3], Predicate::PropGte { field: "startTime", .. }));
        assert!(matches!(predicates[4], Predicate::PropEq { field: "effortLevel", .. }));
        assert!(matches!(predicates[5], Predicate::PropEq { field: "isVirtual", .. }));
        assert!(matches!(predicates[6], Predicate::HasAvailableSpots));
        assert!(matches!(predicates[7], Predicate::TextSearch { .. }));
    }

    #[test]
    fn date_range_parameters_sort_lexicographically() {
        let from = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let criteria = SearchCriteria {
            start_date_from: Some(from),
            ..Default::default()
        };
        let fragment = compile(&build_criteria(&criteria));
        assert!(fragment
            .params
            .contains(&Param::Text("2024-06-01T09:30:00".to_string())));
    }
}
