//! Operations on a store image
//!
//! The image-level semantics shared by every image-based backend: queries
//! clone out of the graph, mutations keep the arena indices consistent.
//! Backends differ only in where the image lives (RAM, a directory) and how
//! the exclusive lock is realized.

use crate::backend::{LoadFlags, StoreImage};
use crate::entity::{
    Block, BlockId, BlockReplica, Dataset, DatasetReplica, DatasetStatus, FileRecord, Group,
    Inventory, ReplicaKey, Site,
};
use crate::error::{Result, StoreError};
use crate::history::{AccessMap, RequestMap};
use crate::pattern::NameFilter;
use chrono::NaiveDate;

fn copy_site_shell(site: &Site) -> Site {
    let mut shell = site.clone();
    shell.dataset_replicas.clear();
    shell.block_replicas.clear();
    shell
}

fn copy_dataset(dataset: &Dataset, flags: LoadFlags) -> Dataset {
    let mut copy = dataset.clone();
    copy.replica_sites.clear();
    if !flags.blocks {
        copy.blocks.clear();
    }
    if !flags.files {
        copy.files.clear();
    }
    copy
}

impl StoreImage {
    // -- queries -----------------------------------------------------------

    pub fn site_list(&self, filter: &NameFilter) -> Vec<String> {
        let mut names: Vec<String> = self
            .inventory
            .sites
            .keys()
            .filter(|name| filter.accepts(name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn load_data(
        &self,
        sites: &NameFilter,
        datasets: &NameFilter,
        flags: LoadFlags,
    ) -> Result<Inventory> {
        let mut loaded = Inventory::new();

        for partition in self.inventory.partitions.values() {
            loaded.add_partition(partition.clone());
        }
        for group in self.inventory.groups.values() {
            loaded.add_group(group.clone());
        }
        for site in self.inventory.sites.values() {
            if sites.accepts(&site.name) {
                loaded.add_site(copy_site_shell(site));
            }
        }
        for dataset in self.inventory.datasets.values() {
            if datasets.accepts(&dataset.name) {
                loaded.add_dataset(copy_dataset(dataset, flags));
            }
        }

        if flags.replicas {
            for replica in self.inventory.replicas() {
                if loaded.sites.contains_key(&replica.site)
                    && loaded.datasets.contains_key(&replica.dataset)
                {
                    loaded.link_replica(replica.clone())?;
                }
            }
        }

        Ok(loaded)
    }

    pub fn load_dataset(&self, name: &str, flags: LoadFlags) -> Option<Dataset> {
        self.inventory
            .datasets
            .get(name)
            .map(|ds| copy_dataset(ds, flags))
    }

    pub fn load_replicas(&self, dataset: &str) -> Vec<DatasetReplica> {
        self.inventory
            .replicas_of_dataset(dataset)
            .cloned()
            .collect()
    }

    pub fn load_blocks(&self, dataset: &str) -> Result<Vec<Block>> {
        self.inventory
            .datasets
            .get(dataset)
            .map(|ds| ds.blocks.clone())
            .ok_or_else(|| StoreError::UnknownDataset(dataset.to_string()))
    }

    pub fn load_files(&self, dataset: &str) -> Result<Vec<FileRecord>> {
        self.inventory
            .datasets
            .get(dataset)
            .map(|ds| ds.files.clone())
            .ok_or_else(|| StoreError::UnknownDataset(dataset.to_string()))
    }

    pub fn replica_exists(&self, dataset: &str, site: &str) -> bool {
        self.inventory.replica(dataset, site).is_some()
    }

    pub fn find_block_of(&self, path: &str, datasets: &[String]) -> Option<(String, BlockId)> {
        for name in datasets {
            if let Some(dataset) = self.inventory.datasets.get(name) {
                if let Some(record) = dataset.files.iter().find(|f| f.path == path) {
                    return Some((name.clone(), record.block));
                }
            }
        }
        None
    }

    pub fn load_replica_accesses(
        &self,
        sites: &[String],
        datasets: &[String],
    ) -> (Option<NaiveDate>, AccessMap) {
        let mut map = AccessMap::new();
        for replica in self.inventory.replicas() {
            let site_ok = sites.is_empty() || sites.iter().any(|s| s == &replica.site);
            let ds_ok = datasets.is_empty() || datasets.iter().any(|d| d == &replica.dataset);
            if site_ok && ds_ok && !replica.accesses.is_empty() {
                map.insert(replica.key(), replica.accesses.clone());
            }
        }
        (self.access_last_update, map)
    }

    pub fn load_dataset_requests(&self, datasets: &[String]) -> (i64, RequestMap) {
        let mut map = RequestMap::new();
        for (dataset, jobs) in &self.requests {
            if datasets.is_empty() || datasets.iter().any(|d| d == dataset) {
                map.insert(dataset.clone(), jobs.clone());
            }
        }
        (self.request_last_update, map)
    }

    // -- mutations ---------------------------------------------------------

    pub fn save_sites(&mut self, sites: &[Site]) {
        for site in sites {
            match self.inventory.sites.get_mut(&site.name) {
                Some(existing) => {
                    // entity rows are updated; derived indices stay
                    existing.host = site.host.clone();
                    existing.storage_type = site.storage_type;
                    existing.backend = site.backend.clone();
                    existing.capacity = site.capacity;
                    existing.used_total = site.used_total;
                    existing.quotas = site.quotas.clone();
                }
                None => {
                    self.inventory.add_site(copy_site_shell(site));
                }
            }
        }
    }

    pub fn save_groups(&mut self, groups: &[Group]) {
        for group in groups {
            self.inventory.add_group(group.clone());
        }
    }

    pub fn save_datasets(&mut self, datasets: &[Dataset]) {
        for dataset in datasets {
            match self.inventory.datasets.get_mut(&dataset.name) {
                Some(existing) => {
                    existing.size = dataset.size;
                    existing.num_files = dataset.num_files;
                    existing.status = dataset.status;
                    existing.on_tape = dataset.on_tape;
                    existing.is_open = dataset.is_open;
                    existing.last_update = dataset.last_update;
                    existing.blocks = dataset.blocks.clone();
                    existing.files = dataset.files.clone();
                }
                None => {
                    let mut copy = dataset.clone();
                    copy.replica_sites.clear();
                    self.inventory.add_dataset(copy);
                }
            }
        }
    }

    /// Delta synchronization: upsert the passed replicas and the block
    /// replicas they carry; everything unmentioned stays.
    pub fn update_replicas(&mut self, replicas: &[DatasetReplica]) -> Result<()> {
        for replica in replicas {
            match self.inventory.replica_mut(&replica.dataset, &replica.site) {
                Some(existing) => {
                    existing.is_complete = replica.is_complete;
                    existing.is_custodial = replica.is_custodial;
                    existing.last_block_created = replica.last_block_created;
                }
                None => {
                    let mut shell = replica.clone();
                    shell.block_replicas.clear();
                    self.inventory.link_replica(shell)?;
                }
            }
            for br in &replica.block_replicas {
                self.inventory
                    .upsert_block_replica(&replica.dataset, &replica.site, br.clone())?;
            }
        }
        Ok(())
    }

    /// Full replacement, authoritative per (site, dataset) scope.
    pub fn save_replicas(&mut self, replicas: &[DatasetReplica]) -> Result<()> {
        for replica in replicas {
            self.inventory
                .unlink_replica(&replica.dataset, &replica.site);
            self.inventory.link_replica(replica.clone())?;
        }
        Ok(())
    }

    pub fn add_dataset_replicas(&mut self, replicas: &[DatasetReplica]) -> Result<()> {
        for replica in replicas {
            self.inventory.link_replica(replica.clone())?;
        }
        Ok(())
    }

    pub fn add_block_replicas(&mut self, replicas: &[(ReplicaKey, BlockReplica)]) -> Result<()> {
        for (key, br) in replicas {
            self.inventory
                .upsert_block_replica(&key.dataset, &key.site, br.clone())?;
        }
        Ok(())
    }

    pub fn delete_dataset(&mut self, name: &str) {
        self.inventory.delete_dataset(name);
    }

    pub fn delete_sites(&mut self, names: &[String]) {
        for name in names {
            self.inventory.delete_site(name);
        }
    }

    pub fn delete_groups(&mut self, names: &[String]) {
        for name in names {
            self.inventory.delete_group(name);
        }
    }

    pub fn delete_block(&mut self, dataset: &str, block: BlockId) {
        let sites: Vec<String> = self
            .inventory
            .datasets
            .get(dataset)
            .map(|ds| ds.replica_sites.iter().cloned().collect())
            .unwrap_or_default();
        for site in sites {
            self.inventory.remove_block_replica(dataset, &site, block);
        }
        if let Some(ds) = self.inventory.datasets.get_mut(dataset) {
            ds.remove_block(block);
        }
    }

    pub fn delete_dataset_replicas(
        &mut self,
        site: &str,
        datasets: &[String],
        delete_block_replicas: bool,
    ) -> Result<()> {
        for dataset in datasets {
            let detached = self.inventory.unlink_replica(dataset, site);
            if !delete_block_replicas {
                // subscription row is gone; physical block replicas stay
                // behind under a bare shell
                if let Some(old) = detached {
                    let mut shell = DatasetReplica::new(dataset.clone(), site.to_string());
                    shell.block_replicas = old.block_replicas;
                    self.inventory.link_replica(shell)?;
                }
            }
        }
        Ok(())
    }

    pub fn delete_block_replicas(&mut self, replicas: &[(ReplicaKey, BlockId)]) {
        for (key, block) in replicas {
            self.inventory
                .remove_block_replica(&key.dataset, &key.site, *block);
        }
    }

    pub fn update_block_replicas(
        &mut self,
        replicas: &[(ReplicaKey, BlockReplica)],
    ) -> Result<()> {
        for (key, br) in replicas {
            self.inventory
                .upsert_block_replica(&key.dataset, &key.site, br.clone())?;
        }
        Ok(())
    }

    pub fn set_dataset_status(&mut self, dataset: &str, status: DatasetStatus) {
        if let Some(ds) = self.inventory.datasets.get_mut(dataset) {
            ds.status = status;
        }
    }

    pub fn save_replica_accesses(&mut self, accesses: &AccessMap) {
        let mut newest = self.access_last_update;
        for (key, classes) in accesses {
            if let Some(replica) = self.inventory.replica_mut(&key.dataset, &key.site) {
                for (class, days) in classes {
                    for (date, access) in days {
                        replica
                            .accesses
                            .entry(*class)
                            .or_default()
                            .insert(*date, *access);
                        if newest.map_or(true, |d| *date > d) {
                            newest = Some(*date);
                        }
                    }
                }
            }
        }
        self.access_last_update = newest;
    }

    pub fn save_dataset_requests(&mut self, requests: &RequestMap, now: i64) {
        for (dataset, jobs) in requests {
            let slot = self.requests.entry(dataset.clone()).or_default();
            for (job_id, request) in jobs {
                slot.insert(job_id.clone(), request.clone());
            }
        }
        self.request_last_update = now;
    }
}
