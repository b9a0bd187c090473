//! Inventory store façade
//!
//! The only entry point other subsystems use. Every operation follows one
//! template: a read-only guard for mutations (log the intended call, touch
//! nothing), lock acquisition, the corresponding backend hook(s), a
//! last-update bump on successful writes, and an unconditional lock release
//! on every exit path.

use crate::backend::{FileBackend, LoadFlags, MemoryBackend, PersistenceBackend};
use crate::config::{BackendKind, StoreConfig};
use crate::entity::{
    BlockId, BlockReplica, Dataset, DatasetReplica, DatasetStatus, Group, Inventory, ReplicaKey,
    Site,
};
use crate::error::{Result, StoreError};
use crate::history::{AccessMap, RequestMap};
use crate::lock::LockCoordinator;
use crate::pattern::NameFilter;
use crate::snapshot::{current_tag, SnapshotClear, SnapshotSelector};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Façade over one active persistence backend.
///
/// All mutating operations and all loads serialize through the store-wide
/// exclusive lock; the depth-counted [`LockCoordinator`] lets nested calls
/// within one call stack re-enter. With `read_only` set, every mutating
/// operation logs the intended call and returns without invoking a single
/// backend hook.
pub struct InventoryStore {
    backend: Box<dyn PersistenceBackend>,
    lock: LockCoordinator,
    read_only: bool,
    last_update: i64,
}

impl InventoryStore {
    /// Wrap an already constructed backend.
    pub fn new(backend: Box<dyn PersistenceBackend>, config: &StoreConfig) -> Self {
        InventoryStore {
            backend,
            lock: LockCoordinator::new(),
            read_only: config.read_only,
            last_update: 0,
        }
    }

    /// Construct the backend named by the configuration and wrap it.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let backend: Box<dyn PersistenceBackend> = match config.backend.kind {
            BackendKind::Memory => Box::new(MemoryBackend::new()),
            BackendKind::File => {
                let path = config.backend.path.as_ref().ok_or_else(|| {
                    StoreError::Config("file backend requires backend.path".to_string())
                })?;
                Box::new(FileBackend::open(path)?)
            }
        };
        Ok(Self::new(backend, config))
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Timestamp cached by the last `last_update`/`set_last_update` call.
    pub fn cached_last_update(&self) -> i64 {
        self.last_update
    }

    // -- locking -----------------------------------------------------------

    /// Take (or re-enter) the store-wide lock. Exposed for callers that
    /// need to hold it across several operations, and for the
    /// administrative `lock` command.
    pub fn acquire_lock(&mut self, blocking: bool) -> Result<bool> {
        self.lock.acquire(self.backend.as_ref(), blocking)
    }

    /// Release one lock level; `force` frees the backend lock regardless of
    /// depth (recovery from a crashed holder).
    pub fn release_lock(&mut self, force: bool) -> Result<()> {
        self.lock.release(self.backend.as_ref(), force)
    }

    pub fn lock_depth(&self) -> u32 {
        self.lock.depth()
    }

    /// Lock, run, unconditionally unlock. Release runs on the error path
    /// too; a release failure surfaces only when the operation itself
    /// succeeded.
    fn locked<T>(&mut self, f: impl FnOnce(&dyn PersistenceBackend) -> Result<T>) -> Result<T> {
        self.lock.acquire(self.backend.as_ref(), true)?;
        let result = f(self.backend.as_ref());
        let released = self.lock.release(self.backend.as_ref(), false);
        match result {
            Ok(value) => released.map(|_| value),
            Err(e) => Err(e),
        }
    }

    /// [`locked`](Self::locked) plus a last-update bump after a successful
    /// write. The bump re-enters the lock, exercising the depth counter on
    /// every write path.
    fn locked_write<T>(
        &mut self,
        f: impl FnOnce(&dyn PersistenceBackend) -> Result<T>,
    ) -> Result<T> {
        self.lock.acquire(self.backend.as_ref(), true)?;
        let result = match f(self.backend.as_ref()) {
            Ok(value) => self.set_last_update(None).map(|_| value),
            Err(e) => Err(e),
        };
        let released = self.lock.release(self.backend.as_ref(), false);
        match result {
            Ok(value) => released.map(|_| value),
            Err(e) => Err(e),
        }
    }

    // -- timestamp accounting ----------------------------------------------

    /// Timestamp of the most recent successful write.
    pub fn last_update(&mut self) -> Result<i64> {
        let ts = self.locked(|b| b.get_last_update())?;
        self.last_update = ts;
        Ok(ts)
    }

    /// Record a write timestamp; `None` means now.
    pub fn set_last_update(&mut self, ts: Option<i64>) -> Result<()> {
        let tm = ts.unwrap_or_else(|| Utc::now().timestamp());
        self.last_update = tm;

        if self.read_only {
            debug!("read-only: skipping set_last_update({})", tm);
            return Ok(());
        }

        self.locked(|b| b.set_last_update(tm))
    }

    // -- snapshots ---------------------------------------------------------

    /// Capture the current persisted state under `tag` (default: the
    /// current time as a sortable string) and return the tag used.
    pub fn make_snapshot(&mut self, clear: SnapshotClear, tag: Option<&str>) -> Result<String> {
        let tag = match tag {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => current_tag(),
        };

        if self.read_only {
            debug!("read-only: skipping make_snapshot({}, clear={})", tag, clear);
            return Ok(tag);
        }

        self.locked(|b| b.make_snapshot(&tag, clear))?;
        Ok(tag)
    }

    /// Remove snapshots; `None` removes everything older than now.
    pub fn remove_snapshot(&mut self, selector: Option<SnapshotSelector>) -> Result<()> {
        let selector = selector.unwrap_or_else(SnapshotSelector::everything_before_now);

        if self.read_only {
            debug!("read-only: skipping remove_snapshot({})", selector);
            return Ok(());
        }

        self.locked(|b| b.remove_snapshot(&selector))
    }

    /// Tags of all snapshots, newest first.
    pub fn list_snapshots(&mut self, timestamp_only: bool) -> Result<Vec<String>> {
        self.locked(|b| b.list_snapshots(timestamp_only))
    }

    /// Wipe the live store contents. Snapshots survive.
    pub fn clear(&mut self) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping clear()");
            return Ok(());
        }

        self.locked(|b| b.clear())
    }

    /// Resolve a tag, accepting `"last"` for the newest snapshot. A `None`
    /// return means there is nothing to act on (already logged).
    fn resolve_tag(&mut self, tag: &str, verb: &str) -> Result<Option<String>> {
        let tags = self.list_snapshots(tag == "last")?;
        if tags.is_empty() {
            info!("No snapshots taken.");
            return Ok(None);
        }

        if tag == "last" {
            info!("{} inventory store snapshot {}", verb, tags[0]);
            Ok(Some(tags[0].clone()))
        } else if tags.iter().any(|t| t == tag) {
            Ok(Some(tag.to_string()))
        } else {
            info!("Cannot {} snapshot {}", verb, tag);
            Ok(None)
        }
    }

    /// Destructive restore of the live store from a snapshot; `tag` can be
    /// `"last"`. Missing targets are logged and ignored.
    ///
    /// Drains the reentrant lock to depth 0 first: the operation replaces
    /// which backing data is live and must not interleave with a nested
    /// in-flight transaction. It is not additionally protected against
    /// another process taking the lock mid-recovery.
    pub fn recover_from(&mut self, tag: &str) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping recover_from({})", tag);
            return Ok(());
        }

        let resolved = match self.resolve_tag(tag, "recovering from")? {
            Some(t) => t,
            None => return Ok(()),
        };

        self.lock.drain(self.backend.as_ref())?;
        self.backend.recover_from(&resolved)
    }

    /// Repoint subsequent reads at a snapshot for inspection; `tag` can be
    /// `"last"`. Live data is untouched. Same lock-draining precaution as
    /// [`recover_from`](Self::recover_from).
    pub fn switch_snapshot(&mut self, tag: &str) -> Result<()> {
        let resolved = match self.resolve_tag(tag, "switching to")? {
            Some(t) => t,
            None => return Ok(()),
        };

        self.lock.drain(self.backend.as_ref())?;
        self.backend.switch_snapshot(&resolved)
    }

    // -- loads -------------------------------------------------------------

    /// Site names passing the include/exclude filter, deterministically
    /// ordered.
    pub fn site_list(&mut self, filter: &NameFilter) -> Result<Vec<String>> {
        debug!("site_list({:?})", filter.include_patterns());
        self.locked(|b| b.get_site_list(filter))
    }

    /// Load the entity graph for the matching sites and datasets.
    pub fn load_data(
        &mut self,
        sites: &NameFilter,
        datasets: &NameFilter,
        flags: LoadFlags,
    ) -> Result<Inventory> {
        debug!("load_data()");
        self.locked(|b| b.load_data(sites, datasets, flags))
    }

    /// Load one dataset without replicas. Requesting replicas here is a
    /// usage error: replicas need a scoped inventory to resolve their sites
    /// and groups — use [`load_dataset_into`](Self::load_dataset_into).
    pub fn load_dataset(&mut self, name: &str, flags: LoadFlags) -> Result<Option<Dataset>> {
        if flags.replicas {
            return Err(StoreError::Usage(
                "cannot load replicas without a sites/groups scope; use load_dataset_into"
                    .to_string(),
            ));
        }

        debug!("load_dataset({})", name);
        self.locked(|b| b.load_dataset(name, flags))
    }

    /// Load one dataset into a scoped inventory, optionally with its
    /// replicas resolved against the sites and groups already loaded there.
    pub fn load_dataset_into(
        &mut self,
        inventory: &mut Inventory,
        name: &str,
        flags: LoadFlags,
    ) -> Result<()> {
        if flags.replicas && (inventory.sites.is_empty() || inventory.groups.is_empty()) {
            return Err(StoreError::Usage(
                "cannot load replicas without sites or groups".to_string(),
            ));
        }

        debug!("load_dataset_into({})", name);

        self.lock.acquire(self.backend.as_ref(), true)?;
        let result: Result<()> = (|| {
            let dataset = self
                .backend
                .load_dataset(name, flags)?
                .ok_or_else(|| StoreError::UnknownDataset(name.to_string()))?;
            inventory.add_dataset(dataset);

            if flags.replicas {
                for replica in self.backend.load_replicas(name)? {
                    if inventory.sites.contains_key(&replica.site) {
                        inventory.link_replica(replica)?;
                    }
                }
            }
            Ok(())
        })();
        let released = self.lock.release(self.backend.as_ref(), false);
        result.and(released)
    }

    /// Load the replicas of one dataset into a scoped inventory. Fails fast
    /// when the inventory carries no sites or no groups to resolve against.
    pub fn load_replicas(&mut self, inventory: &mut Inventory, dataset: &str) -> Result<()> {
        if inventory.sites.is_empty() || inventory.groups.is_empty() {
            return Err(StoreError::Usage(
                "cannot load replicas without sites or groups".to_string(),
            ));
        }
        if !inventory.datasets.contains_key(dataset) {
            return Err(StoreError::Usage(format!(
                "dataset {} not loaded in the scope",
                dataset
            )));
        }

        debug!("load_replicas({})", dataset);

        self.lock.acquire(self.backend.as_ref(), true)?;
        let result: Result<()> = (|| {
            for replica in self.backend.load_replicas(dataset)? {
                if inventory.sites.contains_key(&replica.site) {
                    inventory.link_replica(replica)?;
                }
            }
            Ok(())
        })();
        let released = self.lock.release(self.backend.as_ref(), false);
        result.and(released)
    }

    /// Load the block list of one dataset into a scoped inventory.
    pub fn load_blocks(&mut self, inventory: &mut Inventory, dataset: &str) -> Result<()> {
        if !inventory.datasets.contains_key(dataset) {
            return Err(StoreError::Usage(format!(
                "dataset {} not loaded in the scope",
                dataset
            )));
        }

        debug!("load_blocks({})", dataset);

        let blocks = self.locked(|b| b.load_blocks(dataset))?;
        let ds = inventory.datasets.get_mut(dataset).expect("checked above");
        ds.blocks = blocks;
        ds.update_aggregates();
        Ok(())
    }

    /// Load the file records of one dataset into a scoped inventory.
    pub fn load_files(&mut self, inventory: &mut Inventory, dataset: &str) -> Result<()> {
        if !inventory.datasets.contains_key(dataset) {
            return Err(StoreError::Usage(format!(
                "dataset {} not loaded in the scope",
                dataset
            )));
        }

        debug!("load_files({})", dataset);

        let files = self.locked(|b| b.load_files(dataset))?;
        inventory.datasets.get_mut(dataset).expect("checked above").files = files;
        Ok(())
    }

    /// Existence probe for one replica.
    pub fn replica_exists(&mut self, dataset: &str, site: &str) -> Result<bool> {
        debug!("replica_exists({}, {})", dataset, site);
        self.locked(|b| b.replica_exists(dataset, site))
    }

    /// Reverse lookup: the dataset and block owning the file at `path`,
    /// searched across `datasets`.
    pub fn find_block_of(
        &mut self,
        path: &str,
        datasets: &[String],
    ) -> Result<Option<(String, BlockId)>> {
        debug!("find_block_of({})", path);
        self.locked(|b| b.find_block_of(path, datasets))
    }

    // -- history accounting ------------------------------------------------

    /// Per-day access counters for the replicas in scope; empty slices mean
    /// no restriction.
    pub fn load_replica_accesses(
        &mut self,
        sites: &[String],
        datasets: &[String],
    ) -> Result<(Option<NaiveDate>, AccessMap)> {
        debug!("load_replica_accesses()");
        self.locked(|b| b.load_replica_accesses(sites, datasets))
    }

    pub fn save_replica_accesses(&mut self, accesses: &AccessMap) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping save_replica_accesses({} replicas)",
                accesses.len()
            );
            return Ok(());
        }

        self.locked_write(|b| b.save_replica_accesses(accesses))
    }

    /// Batch-system request records for the datasets in scope.
    pub fn load_dataset_requests(&mut self, datasets: &[String]) -> Result<(i64, RequestMap)> {
        debug!("load_dataset_requests()");
        self.locked(|b| b.load_dataset_requests(datasets))
    }

    pub fn save_dataset_requests(&mut self, requests: &RequestMap) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping save_dataset_requests({} datasets)",
                requests.len()
            );
            return Ok(());
        }

        self.locked_write(|b| b.save_dataset_requests(requests))
    }

    // -- saves -------------------------------------------------------------

    /// Persist the whole inventory: entities first, then replicas either as
    /// a delta (reconcile only what is present) or a full replace
    /// (authoritative per (site, dataset) scope).
    pub fn save_data(
        &mut self,
        inventory: &Inventory,
        timestamp: Option<i64>,
        delta: bool,
    ) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping save_data({} sites, {} groups, {} datasets, delta={})",
                inventory.sites.len(),
                inventory.groups.len(),
                inventory.datasets.len(),
                delta
            );
            return Ok(());
        }

        let sites: Vec<Site> = inventory.sites.values().cloned().collect();
        let groups: Vec<Group> = inventory.groups.values().cloned().collect();
        let datasets: Vec<Dataset> = inventory.datasets.values().cloned().collect();
        let replicas: Vec<DatasetReplica> = inventory.replicas().cloned().collect();

        self.lock.acquire(self.backend.as_ref(), true)?;
        let result: Result<()> = (|| {
            self.backend.save_sites(&sites)?;
            self.backend.save_groups(&groups)?;
            self.backend.save_datasets(&datasets)?;
            if delta {
                self.backend.update_replicas(&replicas)?;
            } else {
                self.backend.save_replicas(&replicas)?;
            }
            Ok(())
        })();
        let result = match result {
            Ok(()) => self.set_last_update(timestamp),
            Err(e) => Err(e),
        };
        let released = self.lock.release(self.backend.as_ref(), false);
        result.and(released)
    }

    pub fn save_sites(&mut self, sites: &[Site]) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping save_sites({} sites)", sites.len());
            return Ok(());
        }

        self.locked_write(|b| b.save_sites(sites))
    }

    pub fn save_groups(&mut self, groups: &[Group]) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping save_groups({} groups)", groups.len());
            return Ok(());
        }

        self.locked_write(|b| b.save_groups(groups))
    }

    pub fn save_datasets(&mut self, datasets: &[Dataset]) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping save_datasets({} datasets)",
                datasets.len()
            );
            return Ok(());
        }

        self.locked_write(|b| b.save_datasets(datasets))
    }

    /// Insert a few dataset replicas instead of saving the full list.
    pub fn add_dataset_replicas(&mut self, replicas: &[DatasetReplica]) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping add_dataset_replicas({} replicas)",
                replicas.len()
            );
            return Ok(());
        }

        self.locked_write(|b| b.add_dataset_replicas(replicas))
    }

    /// Insert a few block replicas instead of saving the full list.
    pub fn add_block_replicas(&mut self, replicas: &[(ReplicaKey, BlockReplica)]) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping add_block_replicas({} replicas)",
                replicas.len()
            );
            return Ok(());
        }

        self.locked_write(|b| b.add_block_replicas(replicas))
    }

    /// Reconcile a few dataset replicas (delta semantics) without a full
    /// `save_data`.
    pub fn update_dataset_replicas(&mut self, replicas: &[DatasetReplica]) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping update_dataset_replicas({} replicas)",
                replicas.len()
            );
            return Ok(());
        }

        self.locked_write(|b| b.update_replicas(replicas))
    }

    // -- deletions ---------------------------------------------------------

    pub fn delete_sites(&mut self, sites: &[String]) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping delete_sites({} sites)", sites.len());
            return Ok(());
        }

        self.locked(|b| b.delete_sites(sites))
    }

    pub fn delete_groups(&mut self, groups: &[String]) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping delete_groups({} groups)", groups.len());
            return Ok(());
        }

        self.locked(|b| b.delete_groups(groups))
    }

    pub fn delete_dataset(&mut self, dataset: &str) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping delete_dataset({})", dataset);
            return Ok(());
        }

        self.locked(|b| b.delete_dataset(dataset))
    }

    pub fn delete_datasets(&mut self, datasets: &[String]) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping delete_datasets({} datasets)",
                datasets.len()
            );
            return Ok(());
        }

        self.locked(|b| b.delete_datasets(datasets))
    }

    pub fn delete_block(&mut self, dataset: &str, block: BlockId) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping delete_block({}#{})", dataset, block);
            return Ok(());
        }

        self.locked(|b| b.delete_block(dataset, block))
    }

    /// Delete one dataset replica, optionally cascading to its block
    /// replicas.
    pub fn delete_dataset_replica(
        &mut self,
        key: &ReplicaKey,
        delete_block_replicas: bool,
    ) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping delete_dataset_replica({})", key);
            return Ok(());
        }

        self.delete_dataset_replicas(std::slice::from_ref(key), delete_block_replicas)
    }

    /// Delete a set of dataset replicas. Deletions are grouped by owning
    /// site before dispatch, so the backend performs one exclusive
    /// operation per site.
    pub fn delete_dataset_replicas(
        &mut self,
        keys: &[ReplicaKey],
        delete_block_replicas: bool,
    ) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping delete_dataset_replicas({} replicas)",
                keys.len()
            );
            return Ok(());
        }

        let mut by_site: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for key in keys {
            by_site
                .entry(key.site.as_str())
                .or_default()
                .push(key.dataset.clone());
        }

        self.locked(|b| {
            for (site, datasets) in &by_site {
                b.delete_dataset_replicas(site, datasets, delete_block_replicas)?;
            }
            Ok(())
        })
    }

    pub fn delete_block_replica(&mut self, key: &ReplicaKey, block: BlockId) -> Result<()> {
        if self.read_only {
            debug!("read-only: skipping delete_block_replica({}#{})", key, block);
            return Ok(());
        }

        self.delete_block_replicas(&[(key.clone(), block)])
    }

    pub fn delete_block_replicas(&mut self, replicas: &[(ReplicaKey, BlockId)]) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping delete_block_replicas({} replicas)",
                replicas.len()
            );
            return Ok(());
        }

        self.locked(|b| b.delete_block_replicas(replicas))
    }

    pub fn update_block_replica(&mut self, key: &ReplicaKey, replica: BlockReplica) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping update_block_replica({}#{})",
                key, replica.block
            );
            return Ok(());
        }

        self.update_block_replicas(&[(key.clone(), replica)])
    }

    pub fn update_block_replicas(
        &mut self,
        replicas: &[(ReplicaKey, BlockReplica)],
    ) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping update_block_replicas({} replicas)",
                replicas.len()
            );
            return Ok(());
        }

        self.locked(|b| b.update_block_replicas(replicas))
    }

    /// Persist a dataset status transition.
    pub fn set_dataset_status(&mut self, dataset: &str, status: DatasetStatus) -> Result<()> {
        if self.read_only {
            debug!(
                "read-only: skipping set_dataset_status({}, {})",
                dataset, status
            );
            return Ok(());
        }

        self.locked(|b| b.set_dataset_status(dataset, status))
    }

    // -- test support ------------------------------------------------------

    /// The wrapped backend. Exposed for integration tests and
    /// administrative tooling that must talk past the façade.
    pub fn backend(&self) -> &dyn PersistenceBackend {
        self.backend.as_ref()
    }
}

/// Loaders shared by the CLI `show` commands: a fully scoped inventory for
/// one site/dataset pair of glob filters.
pub fn load_scoped(
    store: &mut InventoryStore,
    site_glob: &str,
    dataset_glob: &str,
) -> Result<Inventory> {
    let sites = NameFilter::from_globs(&[site_glob], &[])?;
    let datasets = NameFilter::from_globs(&[dataset_glob], &[])?;
    store.load_data(&sites, &datasets, LoadFlags::everything())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store(read_only: bool) -> InventoryStore {
        let mut config = StoreConfig::memory();
        config.read_only = read_only;
        InventoryStore::open(&config).unwrap()
    }

    #[test]
    fn test_load_dataset_with_replicas_is_usage_error() {
        let mut store = memory_store(false);
        let err = store
            .load_dataset("/A/B/RAW", LoadFlags::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
    }

    #[test]
    fn test_load_replicas_needs_scope() {
        let mut store = memory_store(false);
        let mut empty = Inventory::new();
        let err = store.load_replicas(&mut empty, "/A/B/RAW").unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
    }

    #[test]
    fn test_lock_released_after_error() {
        let mut store = memory_store(false);

        // the scope knows the dataset, the backend does not: the failure
        // happens inside the locked section
        let mut scope = Inventory::new();
        scope.add_dataset(Dataset::new("/NO/SUCH/SET"));
        let err = store.load_blocks(&mut scope, "/NO/SUCH/SET").unwrap_err();
        assert!(matches!(err, StoreError::UnknownDataset(_)));

        // the lock must be free again
        assert_eq!(store.lock_depth(), 0);
        assert!(store.acquire_lock(false).unwrap());
        store.release_lock(false).unwrap();
    }

    #[test]
    fn test_read_only_set_last_update_keeps_cache() {
        let mut store = memory_store(true);
        store.set_last_update(Some(1456833600)).unwrap();
        assert_eq!(store.cached_last_update(), 1456833600);
        // nothing reached the backend
        assert_eq!(store.backend().get_last_update().unwrap(), 0);
    }

    #[test]
    fn test_make_snapshot_returns_default_tag() {
        let mut store = memory_store(false);
        let tag = store.make_snapshot(SnapshotClear::None, None).unwrap();
        assert_eq!(tag.len(), 12);
        assert_eq!(store.list_snapshots(false).unwrap(), vec![tag]);
    }

    #[test]
    fn test_recover_with_no_snapshots_is_noop() {
        let mut store = memory_store(false);
        store.recover_from("last").unwrap();
        store.switch_snapshot("last").unwrap();
    }

    #[test]
    fn test_recover_unknown_tag_is_noop() {
        let mut store = memory_store(false);
        store.make_snapshot(SnapshotClear::None, Some("t1")).unwrap();
        store.save_groups(&[Group::new("DataOps")]).unwrap();

        store.recover_from("no-such-tag").unwrap();

        // live state untouched
        let inv = store
            .load_data(&NameFilter::all(), &NameFilter::all(), LoadFlags::default())
            .unwrap();
        assert_eq!(inv.groups.len(), 1);
    }
}
