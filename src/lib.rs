// GoodWorks graph core - query builders, mappers and services over a
// labeled property graph.

// Graph store primitives, criteria builder and record projection
pub mod graph;

// Domain models - GoodWork, Organization, Skill and friends
pub mod models;

// Graph repositories and pure computational services
pub mod services;

// Common utilities
pub mod config;
pub mod data_seeder;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
