pub mod good_work;
pub mod organization;
pub mod skill;

pub use good_work::{EffortLevel, GoodWork, ListKind, SearchCriteria, WorkStatus};
pub use organization::{OrgStatus, Organization, OrganizationMember};
pub use skill::Skill;
