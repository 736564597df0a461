// GoodWorks graph service bootstrap

use std::sync::Arc;

use goodworks_graph::config::Config;
use goodworks_graph::data_seeder::DataSeeder;
use goodworks_graph::graph::GraphStore;
use goodworks_graph::services::{
    GoodWorksService, HttpGeocoder, OrganizationService, SkillService,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;

    // Bring up the graph store and schema
    let store = Arc::new(
        GraphStore::connect(&config.database.url, config.database.max_connections).await?,
    );
    store.init().await?;
    info!("graph store ready at {}", config.database.url);

    let geocoder = Arc::new(HttpGeocoder::new(&config.geocoder));
    let good_works = Arc::new(GoodWorksService::new(
        store.clone(),
        geocoder,
        config.search.result_cap,
    ));
    let organizations = OrganizationService::new(store.clone());
    let skills = SkillService::new(store.clone());

    // Seed the shared skill catalog; per-item failures are logged inside.
    skills.init_predefined().await?;

    if config.seed_sample_data {
        let seeder = DataSeeder::new(store.clone(), good_works.clone());
        let existing = seeder.count_samples().await?;
        if existing == 0 {
            seeder.seed("system").await?;
        } else {
            info!("sample data already present ({} records), skipping seed", existing);
        }
    }

    let active = organizations.count(None).await?;
    info!("startup complete: {} active organizations", active);

    Ok(())
}
