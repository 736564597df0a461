use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use goodworks_graph::graph::GraphStore;
use goodworks_graph::models::GoodWork;
use goodworks_graph::services::{
    Geocoder, GoodWorksService, OrganizationService, ResolvedLocation, SkillService,
};
use goodworks_graph::AppResult;

/// Deterministic offline geocoder: coordinates rounding to the same whole
/// degree resolve to the same place, so tests control location identity
/// without touching the network.
pub struct StaticGeocoder;

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn resolve(&self, latitude: f64, longitude: f64) -> AppResult<ResolvedLocation> {
        let (lat, lng) = (latitude.round() as i64, longitude.round() as i64);
        Ok(ResolvedLocation {
            city: format!("Grid {lat} {lng}"),
            state: "TX".to_string(),
            country: "USA".to_string(),
            zip: format!("{:05}", (lat.abs() * 100 + lng.abs()).rem_euclid(100000)),
        })
    }
}

pub struct TestEnv {
    pub store: Arc<GraphStore>,
    pub works: Arc<GoodWorksService>,
    pub organizations: OrganizationService,
    pub skills: SkillService,
    // Keeps the backing SQLite file alive for the duration of the test.
    _dir: TempDir,
}

pub async fn setup() -> TestEnv {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("graph.db").display());

    let store = Arc::new(GraphStore::connect(&url, 5).await.expect("connect"));
    store.init().await.expect("schema");

    let works = Arc::new(GoodWorksService::new(
        store.clone(),
        Arc::new(StaticGeocoder),
        100,
    ));
    let organizations = OrganizationService::new(store.clone());
    let skills = SkillService::new(store.clone());

    TestEnv {
        store,
        works,
        organizations,
        skills,
        _dir: dir,
    }
}

pub fn sample_work(name: &str) -> GoodWork {
    GoodWork {
        name: name.to_string(),
        category: "Environment".to_string(),
        description: "Help out around the neighborhood.".to_string(),
        latitude: 30.2672,
        longitude: -97.7431,
        contact_name: "Dana Reyes".to_string(),
        contact_email: "dana@example.org".to_string(),
        contact_phone: "512-555-0101".to_string(),
        ..Default::default()
    }
}
