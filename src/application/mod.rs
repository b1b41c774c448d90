//! Application Layer
//!
//! Use cases built on the domain ports: resolution, classification and
//! dataset refresh.

pub mod advisor_service;
pub mod classifier;
pub mod dataset_refresher;
pub mod resolver;

pub use advisor_service::{AdvisorService, AdvisorStats};
pub use classifier::Classifier;
pub use dataset_refresher::{DatasetRefresher, RefreshState};
pub use resolver::MultiProviderResolver;
