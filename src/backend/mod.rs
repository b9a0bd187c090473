//! Persistence backend contract
//!
//! The backend trait abstracts the physical store. Every public operation of
//! [`InventoryStore`](crate::store::InventoryStore) maps 1:1 onto one or
//! more hooks here; a conforming backend implements all of them. Two
//! implementations ship with the crate: [`MemoryBackend`] (reference
//! implementation, used throughout the test suite) and [`FileBackend`]
//! (directory of serialized images with an advisory lock file).
//!
//! Hooks take `&self`; backends guard their state internally. The exclusive
//! lock pair is the real cross-process exclusion mechanism — the depth
//! counting that makes it reentrant lives in
//! [`LockCoordinator`](crate::lock::LockCoordinator), not here.

mod file;
mod image;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::entity::{
    Block, BlockId, BlockReplica, Dataset, DatasetReplica, DatasetStatus, FileRecord, Group,
    Inventory, ReplicaKey, Site,
};
use crate::error::Result;
use crate::history::{AccessMap, RequestMap};
use crate::pattern::NameFilter;
use crate::snapshot::{SnapshotClear, SnapshotSelector};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which parts of the hierarchy a load pulls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFlags {
    pub blocks: bool,
    pub files: bool,
    pub replicas: bool,
}

impl Default for LoadFlags {
    fn default() -> Self {
        LoadFlags {
            blocks: false,
            files: false,
            replicas: true,
        }
    }
}

impl LoadFlags {
    pub fn everything() -> Self {
        LoadFlags {
            blocks: true,
            files: true,
            replicas: true,
        }
    }

    pub fn entities_only() -> Self {
        LoadFlags {
            blocks: false,
            files: false,
            replicas: false,
        }
    }

    pub fn with_blocks(mut self) -> Self {
        self.blocks = true;
        self
    }

    pub fn with_files(mut self) -> Self {
        self.files = true;
        self
    }

    pub fn with_replicas(mut self) -> Self {
        self.replicas = true;
        self
    }
}

/// One full persisted image of the store: the entity graph plus the
/// historical accounting attached to it. Backends capture, clear, and
/// restore whole images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreImage {
    pub inventory: Inventory,

    /// Batch-system request history.
    pub requests: RequestMap,

    /// Day the access counters were last refreshed.
    pub access_last_update: Option<NaiveDate>,

    /// Unix timestamp the request history was last refreshed.
    pub request_last_update: i64,

    /// Unix timestamp of the most recent successful write.
    pub last_update: i64,
}

impl StoreImage {
    /// Strip replica-level content, keeping sites/groups/datasets as a
    /// skeleton.
    pub fn clear_replicas(&mut self) {
        let keys: Vec<ReplicaKey> = self.inventory.replicas().map(|r| r.key()).collect();
        for key in keys {
            self.inventory.unlink_replica(&key.dataset, &key.site);
        }
        self.access_last_update = None;
    }
}

/// Contract every physical inventory store satisfies.
///
/// Mutating hooks are only ever called with the exclusive lock held (the
/// façade guarantees this); they do not need to re-check. After
/// `switch_snapshot`, read hooks serve the attached snapshot while mutating
/// hooks keep targeting the live image.
pub trait PersistenceBackend: Send {
    // -- exclusive lock ----------------------------------------------------

    /// Take the store-wide exclusive lock. Non-blocking probes return
    /// `false` when the lock is held elsewhere; blocking calls wait.
    fn acquire_lock(&self, blocking: bool) -> Result<bool>;

    /// Release the exclusive lock. `force` releases even a lock this
    /// process does not hold (administrative recovery from a crashed
    /// holder).
    fn release_lock(&self, force: bool) -> Result<()>;

    // -- timestamp accounting ----------------------------------------------

    fn get_last_update(&self) -> Result<i64>;

    fn set_last_update(&self, ts: i64) -> Result<()>;

    // -- snapshot lifecycle ------------------------------------------------

    /// Capture the current persisted state under `tag`, then apply `clear`
    /// to the live store. A duplicate tag overwrites the earlier capture.
    fn make_snapshot(&self, tag: &str, clear: SnapshotClear) -> Result<()>;

    fn remove_snapshot(&self, selector: &SnapshotSelector) -> Result<()>;

    /// Tags of all snapshots, newest first. `timestamp_only` hides ad-hoc
    /// string tags.
    fn list_snapshots(&self, timestamp_only: bool) -> Result<Vec<String>>;

    /// Wipe the live store contents. Snapshots are untouched.
    fn clear(&self) -> Result<()>;

    /// Destructive restore of the live store from the named snapshot.
    fn recover_from(&self, tag: &str) -> Result<()>;

    /// Repoint read hooks at the named snapshot without touching live data.
    fn switch_snapshot(&self, tag: &str) -> Result<()>;

    // -- reads -------------------------------------------------------------

    /// Site names passing the filter, in deterministic (sorted) order.
    fn get_site_list(&self, filter: &NameFilter) -> Result<Vec<String>>;

    /// Load the entity graph for the matching sites and datasets.
    fn load_data(
        &self,
        sites: &NameFilter,
        datasets: &NameFilter,
        flags: LoadFlags,
    ) -> Result<Inventory>;

    /// Load one dataset; replicas are never attached here (the façade
    /// merges them into a scoped inventory instead).
    fn load_dataset(&self, name: &str, flags: LoadFlags) -> Result<Option<Dataset>>;

    fn load_replicas(&self, dataset: &str) -> Result<Vec<DatasetReplica>>;

    fn load_blocks(&self, dataset: &str) -> Result<Vec<Block>>;

    fn load_files(&self, dataset: &str) -> Result<Vec<FileRecord>>;

    /// Existence probe for one replica.
    fn replica_exists(&self, dataset: &str, site: &str) -> Result<bool>;

    /// Reverse lookup: which block of which candidate dataset owns the file
    /// at `path`.
    fn find_block_of(&self, path: &str, datasets: &[String]) -> Result<Option<(String, BlockId)>>;

    // -- history accounting ------------------------------------------------

    fn load_replica_accesses(
        &self,
        sites: &[String],
        datasets: &[String],
    ) -> Result<(Option<NaiveDate>, AccessMap)>;

    fn save_replica_accesses(&self, accesses: &AccessMap) -> Result<()>;

    fn load_dataset_requests(&self, datasets: &[String]) -> Result<(i64, RequestMap)>;

    fn save_dataset_requests(&self, requests: &RequestMap) -> Result<()>;

    // -- mutation primitives -----------------------------------------------

    fn save_sites(&self, sites: &[Site]) -> Result<()>;

    fn save_groups(&self, groups: &[Group]) -> Result<()>;

    fn save_datasets(&self, datasets: &[Dataset]) -> Result<()>;

    /// Delta synchronization: reconcile only the passed replicas (insert
    /// new, update changed), leaving everything else as-is.
    fn update_replicas(&self, replicas: &[DatasetReplica]) -> Result<()>;

    /// Full replacement: authoritative per (site, dataset) scope — block
    /// replicas absent from the passed replica are deleted.
    fn save_replicas(&self, replicas: &[DatasetReplica]) -> Result<()>;

    fn add_dataset_replicas(&self, replicas: &[DatasetReplica]) -> Result<()>;

    fn add_block_replicas(&self, replicas: &[(ReplicaKey, BlockReplica)]) -> Result<()>;

    fn delete_dataset(&self, name: &str) -> Result<()>;

    fn delete_datasets(&self, names: &[String]) -> Result<()>;

    /// Drop sites; replicas hosted there go with them.
    fn delete_sites(&self, names: &[String]) -> Result<()>;

    /// Drop groups; block replicas they owned become unowned.
    fn delete_groups(&self, names: &[String]) -> Result<()>;

    fn delete_block(&self, dataset: &str, block: BlockId) -> Result<()>;

    /// Drop every listed dataset's replica at one site; one call per site
    /// (the façade groups batches by owning site before dispatch).
    fn delete_dataset_replicas(
        &self,
        site: &str,
        datasets: &[String],
        delete_block_replicas: bool,
    ) -> Result<()>;

    fn delete_block_replicas(&self, replicas: &[(ReplicaKey, BlockId)]) -> Result<()>;

    fn update_block_replicas(&self, replicas: &[(ReplicaKey, BlockReplica)]) -> Result<()>;

    fn set_dataset_status(&self, dataset: &str, status: DatasetStatus) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_flags_default() {
        let flags = LoadFlags::default();
        assert!(!flags.blocks);
        assert!(!flags.files);
        assert!(flags.replicas);
    }

    #[test]
    fn test_clear_replicas_keeps_skeleton() {
        use crate::entity::{Dataset, DatasetReplica, Group, Site};

        let mut image = StoreImage::default();
        image.inventory.add_site(Site::new("T2_US_MIT", "x"));
        image.inventory.add_group(Group::new("DataOps"));
        image.inventory.add_dataset(Dataset::new("/A/B/RAW"));
        image
            .inventory
            .link_replica(DatasetReplica::new("/A/B/RAW", "T2_US_MIT"))
            .unwrap();

        image.clear_replicas();

        assert_eq!(image.inventory.sites.len(), 1);
        assert_eq!(image.inventory.groups.len(), 1);
        assert_eq!(image.inventory.datasets.len(), 1);
        assert_eq!(image.inventory.replica_count(), 0);
        image.inventory.verify_links().unwrap();
    }
}
