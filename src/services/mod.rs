pub mod geocoding;
pub mod good_works;
pub mod organizations;
pub mod recurrence;
pub mod skills;

pub use geocoding::{Geocoder, HttpGeocoder, ResolvedLocation};
pub use good_works::GoodWorksService;
pub use organizations::OrganizationService;
pub use skills::SkillService;
