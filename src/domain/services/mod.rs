pub mod decision_policy;
pub mod domain_name;
pub mod geo_index;

pub use decision_policy::{DecisionPolicy, SignalCounts};
pub use geo_index::GeoIndex;
