//! rule-advisor Library
//!
//! Classifies domains as direct or proxy routes using DoH resolution with a
//! China client-subnet hint and a periodically refreshed geo index.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{AdvisorService, Classifier, DatasetRefresher, MultiProviderResolver};
pub use config::load_config;
pub use domain::entities::{ClassificationVerdict, ResolutionResult};
pub use domain::errors::{ClassifyError, DnsError, RefreshError};
pub use domain::ports::{DatasetSource, DnsProvider, DomainResolver, RuleStore};
pub use domain::services::GeoIndex;
pub use domain::value_objects::{ClassifyMode, Recommendation, RuleKind};
pub use infrastructure::{GeoIndexSlot, ShutdownController};
