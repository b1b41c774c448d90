//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod index_slot;
pub mod shutdown;

pub use index_slot::GeoIndexSlot;
pub use shutdown::{shutdown_signal, RequestGuard, ShutdownController};
