pub mod projection;
pub mod query;
pub mod store;

pub use projection::{row_to_record, Projection};
pub use query::{bind_params, build_criteria, compile, Param, Predicate, QueryFragment};
pub use store::{GraphStore, MergeKey, NodeId, NodeRow};
