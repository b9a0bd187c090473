//! In-memory backend
//!
//! Reference implementation of [`PersistenceBackend`]: the whole store
//! image lives under one mutex, snapshots are tagged deep copies, and the
//! exclusive lock is a flag with a condvar. Volatile by nature — used by
//! the test suite and for staging runs that never need to survive the
//! process.

use crate::backend::{LoadFlags, PersistenceBackend, StoreImage};
use crate::entity::{
    Block, BlockId, BlockReplica, Dataset, DatasetReplica, DatasetStatus, FileRecord, Group,
    Inventory, ReplicaKey, Site,
};
use crate::error::{Result, StoreError};
use crate::history::{AccessMap, RequestMap};
use crate::pattern::NameFilter;
use crate::snapshot::{parse_tag, SnapshotClear, SnapshotSelector};
use chrono::{NaiveDate, Utc};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;

struct MemoryState {
    live: StoreImage,
    snapshots: BTreeMap<String, StoreImage>,
    /// Snapshot currently attached for reads; `None` means live.
    attached: Option<String>,
}

pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    lock_flag: Mutex<bool>,
    lock_cv: Condvar,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            state: Mutex::new(MemoryState {
                live: StoreImage::default(),
                snapshots: BTreeMap::new(),
                attached: None,
            }),
            lock_flag: Mutex::new(false),
            lock_cv: Condvar::new(),
        }
    }

    /// Pre-populated backend, bypassing the façade. Test helper.
    pub fn with_image(image: StoreImage) -> Self {
        let backend = Self::new();
        backend.state.lock().live = image;
        backend
    }

    /// Deep copy of the current live image. Test helper.
    pub fn live_image(&self) -> StoreImage {
        self.state.lock().live.clone()
    }

    /// Run `f` against the image reads currently resolve to.
    fn with_view<R>(&self, f: impl FnOnce(&StoreImage) -> R) -> R {
        let state = self.state.lock();
        let image = match &state.attached {
            Some(tag) => state.snapshots.get(tag).unwrap_or(&state.live),
            None => &state.live,
        };
        f(image)
    }

    /// Run `f` against the live image; mutations never follow the attached
    /// read view.
    fn with_live<R>(&self, f: impl FnOnce(&mut StoreImage) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state.live)
    }
}

impl PersistenceBackend for MemoryBackend {
    fn acquire_lock(&self, blocking: bool) -> Result<bool> {
        let mut held = self.lock_flag.lock();
        if *held {
            if !blocking {
                return Ok(false);
            }
            while *held {
                self.lock_cv.wait(&mut held);
            }
        }
        *held = true;
        Ok(true)
    }

    fn release_lock(&self, _force: bool) -> Result<()> {
        let mut held = self.lock_flag.lock();
        *held = false;
        self.lock_cv.notify_one();
        Ok(())
    }

    fn get_last_update(&self) -> Result<i64> {
        Ok(self.with_view(|image| image.last_update))
    }

    fn set_last_update(&self, ts: i64) -> Result<()> {
        self.with_live(|image| image.last_update = ts);
        Ok(())
    }

    fn make_snapshot(&self, tag: &str, clear: SnapshotClear) -> Result<()> {
        let mut state = self.state.lock();
        let capture = state.live.clone();
        state.snapshots.insert(tag.to_string(), capture);
        match clear {
            SnapshotClear::None => {}
            SnapshotClear::Replicas => state.live.clear_replicas(),
            SnapshotClear::All => state.live = StoreImage::default(),
        }
        Ok(())
    }

    fn remove_snapshot(&self, selector: &SnapshotSelector) -> Result<()> {
        let mut state = self.state.lock();
        state.snapshots.retain(|tag, _| !selector.matches(tag));
        if let Some(tag) = &state.attached {
            if !state.snapshots.contains_key(tag) {
                state.attached = None;
            }
        }
        Ok(())
    }

    fn list_snapshots(&self, timestamp_only: bool) -> Result<Vec<String>> {
        let state = self.state.lock();
        // BTreeMap iterates ascending; timestamp tags sort chronologically,
        // so reversing gives newest first
        let mut tags: Vec<String> = state
            .snapshots
            .keys()
            .filter(|tag| !timestamp_only || parse_tag(tag).is_some())
            .cloned()
            .collect();
        tags.reverse();
        Ok(tags)
    }

    fn clear(&self) -> Result<()> {
        self.with_live(|image| *image = StoreImage::default());
        Ok(())
    }

    fn recover_from(&self, tag: &str) -> Result<()> {
        let mut state = self.state.lock();
        let capture = state
            .snapshots
            .get(tag)
            .cloned()
            .ok_or_else(|| StoreError::Backend(format!("no snapshot {}", tag)))?;
        state.live = capture;
        state.attached = None;
        Ok(())
    }

    fn switch_snapshot(&self, tag: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.snapshots.contains_key(tag) {
            return Err(StoreError::Backend(format!("no snapshot {}", tag)));
        }
        state.attached = Some(tag.to_string());
        Ok(())
    }

    fn get_site_list(&self, filter: &NameFilter) -> Result<Vec<String>> {
        Ok(self.with_view(|image| image.site_list(filter)))
    }

    fn load_data(
        &self,
        sites: &NameFilter,
        datasets: &NameFilter,
        flags: LoadFlags,
    ) -> Result<Inventory> {
        self.with_view(|image| image.load_data(sites, datasets, flags))
    }

    fn load_dataset(&self, name: &str, flags: LoadFlags) -> Result<Option<Dataset>> {
        Ok(self.with_view(|image| image.load_dataset(name, flags)))
    }

    fn load_replicas(&self, dataset: &str) -> Result<Vec<DatasetReplica>> {
        Ok(self.with_view(|image| image.load_replicas(dataset)))
    }

    fn load_blocks(&self, dataset: &str) -> Result<Vec<Block>> {
        self.with_view(|image| image.load_blocks(dataset))
    }

    fn load_files(&self, dataset: &str) -> Result<Vec<FileRecord>> {
        self.with_view(|image| image.load_files(dataset))
    }

    fn replica_exists(&self, dataset: &str, site: &str) -> Result<bool> {
        Ok(self.with_view(|image| image.replica_exists(dataset, site)))
    }

    fn find_block_of(&self, path: &str, datasets: &[String]) -> Result<Option<(String, BlockId)>> {
        Ok(self.with_view(|image| image.find_block_of(path, datasets)))
    }

    fn load_replica_accesses(
        &self,
        sites: &[String],
        datasets: &[String],
    ) -> Result<(Option<NaiveDate>, AccessMap)> {
        Ok(self.with_view(|image| image.load_replica_accesses(sites, datasets)))
    }

    fn save_replica_accesses(&self, accesses: &AccessMap) -> Result<()> {
        self.with_live(|image| image.save_replica_accesses(accesses));
        Ok(())
    }

    fn load_dataset_requests(&self, datasets: &[String]) -> Result<(i64, RequestMap)> {
        Ok(self.with_view(|image| image.load_dataset_requests(datasets)))
    }

    fn save_dataset_requests(&self, requests: &RequestMap) -> Result<()> {
        let now = Utc::now().timestamp();
        self.with_live(|image| image.save_dataset_requests(requests, now));
        Ok(())
    }

    fn save_sites(&self, sites: &[Site]) -> Result<()> {
        self.with_live(|image| image.save_sites(sites));
        Ok(())
    }

    fn save_groups(&self, groups: &[Group]) -> Result<()> {
        self.with_live(|image| image.save_groups(groups));
        Ok(())
    }

    fn save_datasets(&self, datasets: &[Dataset]) -> Result<()> {
        self.with_live(|image| image.save_datasets(datasets));
        Ok(())
    }

    fn update_replicas(&self, replicas: &[DatasetReplica]) -> Result<()> {
        self.with_live(|image| image.update_replicas(replicas))
    }

    fn save_replicas(&self, replicas: &[DatasetReplica]) -> Result<()> {
        self.with_live(|image| image.save_replicas(replicas))
    }

    fn add_dataset_replicas(&self, replicas: &[DatasetReplica]) -> Result<()> {
        self.with_live(|image| image.add_dataset_replicas(replicas))
    }

    fn add_block_replicas(&self, replicas: &[(ReplicaKey, BlockReplica)]) -> Result<()> {
        self.with_live(|image| image.add_block_replicas(replicas))
    }

    fn delete_dataset(&self, name: &str) -> Result<()> {
        self.with_live(|image| image.delete_dataset(name));
        Ok(())
    }

    fn delete_datasets(&self, names: &[String]) -> Result<()> {
        self.with_live(|image| {
            for name in names {
                image.delete_dataset(name);
            }
        });
        Ok(())
    }

    fn delete_sites(&self, names: &[String]) -> Result<()> {
        self.with_live(|image| image.delete_sites(names));
        Ok(())
    }

    fn delete_groups(&self, names: &[String]) -> Result<()> {
        self.with_live(|image| image.delete_groups(names));
        Ok(())
    }

    fn delete_block(&self, dataset: &str, block: BlockId) -> Result<()> {
        self.with_live(|image| image.delete_block(dataset, block));
        Ok(())
    }

    fn delete_dataset_replicas(
        &self,
        site: &str,
        datasets: &[String],
        delete_block_replicas: bool,
    ) -> Result<()> {
        self.with_live(|image| image.delete_dataset_replicas(site, datasets, delete_block_replicas))
    }

    fn delete_block_replicas(&self, replicas: &[(ReplicaKey, BlockId)]) -> Result<()> {
        self.with_live(|image| image.delete_block_replicas(replicas));
        Ok(())
    }

    fn update_block_replicas(&self, replicas: &[(ReplicaKey, BlockReplica)]) -> Result<()> {
        self.with_live(|image| image.update_block_replicas(replicas))
    }

    fn set_dataset_status(&self, dataset: &str, status: DatasetStatus) -> Result<()> {
        self.with_live(|image| image.set_dataset_status(dataset, status));
        Ok(())
    }
}
