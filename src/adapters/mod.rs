//! Adapters Layer
//!
//! Outbound implementations of the domain ports: DoH providers, the HTTP
//! dataset source and the file-backed rule store.

pub mod outbound;
