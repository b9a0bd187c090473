//! Typed entity graph: sites, groups, partitions, datasets, blocks and
//! their physical replicas.

pub mod block;
pub mod dataset;
pub mod group;
pub mod inventory;
pub mod partition;
pub mod replica;
pub mod site;

pub use block::{Block, BlockId, FileRecord};
pub use dataset::{Dataset, DatasetStatus};
pub use group::Group;
pub use inventory::Inventory;
pub use partition::Partition;
pub use replica::{AccessClass, BlockReplica, DatasetReplica, ReplicaAccess, ReplicaKey};
pub use site::{Site, StorageType};
