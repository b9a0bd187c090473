//! # Gridstore - Distributed Grid-Storage Inventory
//!
//! `gridstore` tracks and mutates the inventory of a distributed
//! grid-storage system — sites, groups, datasets, blocks and their physical
//! replicas — behind a consistency layer that serializes every mutation
//! through one store-wide reentrant lock:
//!
//! - **Entity graph** owned by a single arena with derived indices
//! - **Pluggable backends** behind one trait (in-memory and file-based
//!   implementations included)
//! - **Tagged snapshots** with three clear modes, restore and inspection
//! - **Global read-only mode** that suppresses mutations uniformly
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridstore::{InventoryStore, StoreConfig, LoadFlags, NameFilter, Result};
//! use gridstore::entity::{Dataset, Group, Site};
//!
//! # fn main() -> Result<()> {
//! let mut store = InventoryStore::open(&StoreConfig::memory())?;
//!
//! // Persist entities
//! store.save_sites(&[Site::new("T2_US_MIT", "se01.cmsaf.mit.edu")])?;
//! store.save_groups(&[Group::new("DataOps")])?;
//! store.save_datasets(&[Dataset::new("/A/B/RAW")])?;
//!
//! // Load a consistent view
//! let inventory = store.load_data(
//!     &NameFilter::all(),
//!     &NameFilter::all(),
//!     LoadFlags::default(),
//! )?;
//! println!("{} sites loaded", inventory.sites.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Snapshots
//!
//! ```rust,no_run
//! use gridstore::{InventoryStore, StoreConfig, SnapshotClear, Result};
//!
//! # fn main() -> Result<()> {
//! let mut store = InventoryStore::open(&StoreConfig::memory())?;
//!
//! // Tagged capture of the full inventory
//! let tag = store.make_snapshot(SnapshotClear::None, None)?;
//!
//! // ... mutate the live store ...
//!
//! // Roll everything back
//! store.recover_from(&tag)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod entity;
pub mod error;
pub mod history;
pub mod lock;
pub mod pattern;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use backend::{FileBackend, LoadFlags, MemoryBackend, PersistenceBackend, StoreImage};
pub use config::{BackendConfig, BackendKind, StoreConfig};
pub use entity::{
    Block, BlockId, BlockReplica, Dataset, DatasetReplica, DatasetStatus, Group, Inventory,
    Partition, ReplicaKey, Site,
};
pub use error::{Result, StoreError};
pub use history::{AccessMap, DatasetRequest, RequestMap};
pub use lock::LockCoordinator;
pub use pattern::{NameFilter, NamePattern};
pub use snapshot::{SnapshotClear, SnapshotSelector};
pub use store::InventoryStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
