use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub geocoder: GeocoderConfig,
    pub search: SearchConfig,
    pub seed_sample_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Hard cap on rows returned by search-style queries.
    pub result_cap: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/goodworks.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            geocoder: GeocoderConfig {
                endpoint: env::var("GEOCODER_ENDPOINT").unwrap_or_else(|_| {
                    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
                }),
                api_key: env::var("GEOCODER_API_KEY").unwrap_or_default(),
            },
            search: SearchConfig {
                result_cap: env::var("SEARCH_RESULT_CAP")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
            },
            seed_sample_data: env::var("SEED_SAMPLE_DATA")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}
