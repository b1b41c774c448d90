//! Rule Store Port
//!
//! Defines the read-only interface to the maintained rule lists.
//! Persistence and commits are owned by the store, not by this crate.

use async_trait::async_trait;
use std::collections::HashSet;

/// Read access to the direct and proxy rule lists.
///
/// Domains are returned lowercase, one entry per rule. The classifier
/// only checks membership; it never writes back.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Domains currently routed directly.
    async fn list_direct_domains(&self) -> HashSet<String>;

    /// Domains currently routed via proxy, or `None` when no proxy list
    /// is configured.
    async fn list_proxy_domains(&self) -> Option<HashSet<String>>;
}
