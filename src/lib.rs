//! ShopSync - Replicated Product Catalog
//!
//! An e-commerce catalog (products, orders, carts) served from a primary
//! document store and replicated to one or more secondaries.
//!
//! # Architecture
//!
//! Every write goes through the primary coordinator, which applies it to the
//! primary store, persists the primary snapshot and hands a change record to
//! the configured replication strategy:
//!
//! - **Synchronous mirroring**: the write is acknowledged only after every
//!   secondary has applied and persisted it.
//! - **Asynchronous replication**: the write is acknowledged once queued; a
//!   background worker per secondary drains its queue on a fixed interval.
//!
//! The primary is the source of truth and is never rolled back.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod replication;
pub mod store;

pub use config::ShopSyncConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ReplicationMode, ShopSyncConfig};
    pub use crate::coordinator::PrimaryCoordinator;
    pub use crate::error::{Error, Result};
    pub use crate::replication::{AsyncReplicator, ChangeRecord, ReplicationStrategy, SyncMirrorer};
    pub use crate::store::{DocumentStore, Product, ProductDraft, SharedStore};
}
