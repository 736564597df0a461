// Reverse-geocoding gateway. The graph never stores raw coordinates as a
// Location node; creates/updates resolve them to (city, state, country, zip)
// through this adapter first, and a resolution failure aborts the write.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::GeocoderConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, latitude: f64, longitude: f64) -> AppResult<ResolvedLocation>;
}

/// Geocoder over a Google-geocode-shaped HTTP API.
pub struct HttpGeocoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpGeocoder {
    pub fn new(config: &GeocoderConfig) -> Self {
        HttpGeocoder {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn resolve(&self, latitude: f64, longitude: f64) -> AppResult<ResolvedLocation> {
        let url = format!(
            "{}?latlng={},{}&key={}",
            self.endpoint, latitude, longitude, self.api_key
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            AppError::ExternalDependency(format!("geocode request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalDependency(format!(
                "geocode request returned status {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(|e| {
            AppError::ExternalDependency(format!("geocode response was not JSON: {}", e))
        })?;

        parse_location(&payload)
    }
}

/// Extract a location from a geocode payload. Components missing from every
/// result stay "Unknown" rather than failing the lookup.
pub fn parse_location(payload: &Value) -> AppResult<ResolvedLocation> {
    let status = payload["status"].as_str().unwrap_or_default();
    if status != "OK" {
        return Err(AppError::ExternalDependency(format!(
            "geocode lookup failed with status {:?}",
            status
        )));
    }

    let mut location = ResolvedLocation {
        city: "Unknown".to_string(),
        state: "Unknown".to_string(),
        country: "Unknown".to_string(),
        zip: "Unknown".to_string(),
    };

    let empty = Vec::new();
    for result in payload["results"].as_array().unwrap_or(&empty) {
        let components = &result["address_components"];
        if let Some(city) = component(components, "locality") {
            location.city = city;
        }
        if let Some(state) = component(components, "administrative_area_level_1") {
            location.state = state;
        }
        if let Some(country) = component(components, "country") {
            location.country = country;
        }
        if let Some(zip) = component(components, "postal_code") {
            location.zip = zip;
        }

        let done = [&location.city, &location.state, &location.country, &location.zip]
            .iter()
            .all(|part| *part != "Unknown");
        if done {
            break;
        }
    }

    Ok(location)
}

fn component(components: &Value, kind: &str) -> Option<String> {
    components.as_array()?.iter().find_map(|component| {
        let matches = component["types"]
            .as_array()
            .map(|types| types.iter().any(|t| t == kind))
            .unwrap_or(false);
        if matches {
            component["long_name"].as_str().map(str::to_string)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_components_across_results() {
        let payload = json!({
            "status": "OK",
            "results": [
                {
                    "address_components": [
                        { "long_name": "Portland", "types": ["locality", "political"] },
                        { "long_name": "Oregon", "types": ["administrative_area_level_1"] }
                    ]
                },
                {
                    "address_components": [
                        { "long_name": "United States", "types": ["country"] },
                        { "long_name": "97201", "types": ["postal_code"] }
                    ]
                }
            ]
        });

        let location = parse_location(&payload).unwrap();
        assert_eq!(
            location,
            ResolvedLocation {
                city: "Portland".to_string(),
                state: "Oregon".to_string(),
                country: "United States".to_string(),
                zip: "97201".to_string(),
            }
        );
    }

    #[test]
    fn missing_components_stay_unknown() {
        let payload = json!({ "status": "OK", "results": [] });
        let location = parse_location(&payload).unwrap();
        assert_eq!(location.city, "Unknown");
        assert_eq!(location.zip, "Unknown");
    }

    #[test]
    fn non_ok_status_is_an_external_dependency_error() {
        let payload = json!({ "status": "ZERO_RESULTS", "results": [] });
        match parse_location(&payload) {
            Err(AppError::ExternalDependency(_)) => {}
            other => panic!("expected ExternalDependency, got {:?}", other.map(|_| ())),
        }
    }
}
