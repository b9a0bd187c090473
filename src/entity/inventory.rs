//! The in-memory entity graph
//!
//! A single arena owns every entity, keyed by stable name (or, for dataset
//! replicas, by `(dataset, site)`). Sites and datasets carry derived index
//! sets that hold keys, never owning references, so there is exactly one
//! ownership direction and no cycles. All linking and unlinking goes through
//! the arena methods here; mutating the indices directly breaks the
//! bidirectional-consistency invariant.

use crate::entity::block::BlockId;
use crate::entity::dataset::Dataset;
use crate::entity::group::Group;
use crate::entity::partition::Partition;
use crate::entity::replica::{BlockReplica, DatasetReplica, ReplicaKey};
use crate::entity::site::Site;
use crate::error::{Result, StoreError};
use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The full entity graph of one inventory image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub sites: HashMap<String, Site, RandomState>,
    pub groups: HashMap<String, Group, RandomState>,
    pub datasets: HashMap<String, Dataset, RandomState>,
    pub partitions: BTreeMap<String, Partition>,

    /// Arena-owned dataset replicas. Private: membership changes must go
    /// through the link/unlink methods to keep the site and dataset indices
    /// consistent.
    replicas: HashMap<ReplicaKey, DatasetReplica, RandomState>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    pub fn add_site(&mut self, site: Site) {
        self.sites.insert(site.name.clone(), site);
    }

    pub fn add_group(&mut self, group: Group) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn add_dataset(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.name.clone(), dataset);
    }

    pub fn add_partition(&mut self, partition: Partition) {
        self.partitions.insert(partition.name.clone(), partition);
    }

    pub fn replica(&self, dataset: &str, site: &str) -> Option<&DatasetReplica> {
        self.replicas.get(&ReplicaKey::new(dataset, site))
    }

    /// Mutable access to a replica. Block replica membership must still be
    /// changed through [`upsert_block_replica`](Self::upsert_block_replica) /
    /// [`remove_block_replica`](Self::remove_block_replica) so the site
    /// index stays consistent.
    pub fn replica_mut(&mut self, dataset: &str, site: &str) -> Option<&mut DatasetReplica> {
        self.replicas.get_mut(&ReplicaKey::new(dataset, site))
    }

    pub fn replicas(&self) -> impl Iterator<Item = &DatasetReplica> {
        self.replicas.values()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn replicas_of_dataset<'a>(
        &'a self,
        dataset: &'a str,
    ) -> impl Iterator<Item = &'a DatasetReplica> + 'a {
        self.replicas
            .values()
            .filter(move |r| r.dataset == dataset)
    }

    pub fn replicas_on_site<'a>(
        &'a self,
        site: &'a str,
    ) -> impl Iterator<Item = &'a DatasetReplica> + 'a {
        self.replicas.values().filter(move |r| r.site == site)
    }

    /// Attach a replica to the graph, indexing it from both its dataset and
    /// its site. The dataset and site must already exist. An existing
    /// replica under the same key is replaced wholesale.
    pub fn link_replica(&mut self, replica: DatasetReplica) -> Result<()> {
        if !self.datasets.contains_key(&replica.dataset) {
            return Err(StoreError::UnknownDataset(replica.dataset.clone()));
        }
        let site = self
            .sites
            .get_mut(&replica.site)
            .ok_or_else(|| StoreError::UnknownSite(replica.site.clone()))?;

        let key = replica.key();

        // drop the previous incarnation's block index entries first
        if let Some(old) = self.replicas.remove(&key) {
            for br in &old.block_replicas {
                site.block_replicas.remove(&(old.dataset.clone(), br.block));
            }
        }

        site.dataset_replicas.insert(replica.dataset.clone());
        for br in &replica.block_replicas {
            site.block_replicas
                .insert((replica.dataset.clone(), br.block));
        }

        self.datasets
            .get_mut(&replica.dataset)
            .expect("checked above")
            .replica_sites
            .insert(replica.site.clone());

        self.replicas.insert(key, replica);
        Ok(())
    }

    /// Detach a replica from the graph: removed from the dataset index, the
    /// site index, and the site's block replica index in one operation.
    /// Returns the detached replica, or `None` if there was nothing linked.
    pub fn unlink_replica(&mut self, dataset: &str, site: &str) -> Option<DatasetReplica> {
        let replica = self.replicas.remove(&ReplicaKey::new(dataset, site))?;

        if let Some(ds) = self.datasets.get_mut(dataset) {
            ds.replica_sites.remove(site);
        }
        if let Some(st) = self.sites.get_mut(site) {
            st.dataset_replicas.remove(dataset);
            for br in &replica.block_replicas {
                st.block_replicas.remove(&(dataset.to_string(), br.block));
            }
        }

        Some(replica)
    }

    /// Insert or replace one block replica under an existing dataset
    /// replica, keeping the site index current.
    pub fn upsert_block_replica(
        &mut self,
        dataset: &str,
        site: &str,
        block_replica: BlockReplica,
    ) -> Result<()> {
        let replica = self
            .replicas
            .get_mut(&ReplicaKey::new(dataset, site))
            .ok_or_else(|| {
                StoreError::Usage(format!("no replica {}:{} to attach a block to", site, dataset))
            })?;

        match replica.find_block_replica_mut(block_replica.block) {
            Some(existing) => *existing = block_replica.clone(),
            None => replica.block_replicas.push(block_replica.clone()),
        }

        if let Some(st) = self.sites.get_mut(site) {
            st.block_replicas
                .insert((dataset.to_string(), block_replica.block));
        }
        Ok(())
    }

    /// Remove one block replica, keeping the site index current.
    pub fn remove_block_replica(
        &mut self,
        dataset: &str,
        site: &str,
        block: BlockId,
    ) -> Option<BlockReplica> {
        let replica = self.replicas.get_mut(&ReplicaKey::new(dataset, site))?;
        let idx = replica
            .block_replicas
            .iter()
            .position(|r| r.block == block)?;
        let removed = replica.block_replicas.remove(idx);

        if let Some(st) = self.sites.get_mut(site) {
            st.block_replicas.remove(&(dataset.to_string(), block));
        }
        Some(removed)
    }

    /// Drop a site and every replica hosted there.
    pub fn delete_site(&mut self, name: &str) -> Option<Site> {
        let datasets: Vec<String> = self
            .sites
            .get(name)?
            .dataset_replicas
            .iter()
            .cloned()
            .collect();
        for dataset in datasets {
            self.unlink_replica(&dataset, name);
        }
        self.sites.remove(name)
    }

    /// Drop a group. Block replicas it owned become unowned rather than
    /// disappearing (ownership is attribution, not existence).
    pub fn delete_group(&mut self, name: &str) -> Option<Group> {
        let group = self.groups.remove(name)?;
        for replica in self.replicas.values_mut() {
            for br in &mut replica.block_replicas {
                if br.group.as_deref() == Some(name) {
                    br.group = None;
                }
            }
        }
        Some(group)
    }

    /// Drop a dataset and every replica of it.
    pub fn delete_dataset(&mut self, name: &str) -> Option<Dataset> {
        let sites: Vec<String> = self
            .datasets
            .get(name)?
            .replica_sites
            .iter()
            .cloned()
            .collect();
        for site in sites {
            self.unlink_replica(name, &site);
        }
        self.datasets.remove(name)
    }

    /// Check the bidirectional-consistency invariant; used by tests and the
    /// backends after a restore.
    pub fn verify_links(&self) -> Result<()> {
        for (key, replica) in &self.replicas {
            let ds = self
                .datasets
                .get(&key.dataset)
                .ok_or_else(|| StoreError::Corrupted(format!("replica {} has no dataset", key)))?;
            if !ds.replica_sites.contains(&key.site) {
                return Err(StoreError::Corrupted(format!(
                    "replica {} missing from dataset index",
                    key
                )));
            }
            let site = self
                .sites
                .get(&key.site)
                .ok_or_else(|| StoreError::Corrupted(format!("replica {} has no site", key)))?;
            if !site.dataset_replicas.contains(&key.dataset) {
                return Err(StoreError::Corrupted(format!(
                    "replica {} missing from site index",
                    key
                )));
            }
            for br in &replica.block_replicas {
                if !site
                    .block_replicas
                    .contains(&(key.dataset.clone(), br.block))
                {
                    return Err(StoreError::Corrupted(format!(
                        "block replica {}#{} missing from site index",
                        key, br.block
                    )));
                }
            }
        }

        for (name, ds) in &self.datasets {
            for site in &ds.replica_sites {
                if self.replica(name, site).is_none() {
                    return Err(StoreError::Corrupted(format!(
                        "dataset index {}:{} points at no replica",
                        site, name
                    )));
                }
            }
        }
        for (name, site) in &self.sites {
            for dataset in &site.dataset_replicas {
                if self.replica(dataset, name).is_none() {
                    return Err(StoreError::Corrupted(format!(
                        "site index {}:{} points at no replica",
                        name, dataset
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::block::Block;

    fn sample() -> Inventory {
        let mut inv = Inventory::new();
        inv.add_site(Site::new("T2_US_MIT", "se01.cmsaf.mit.edu"));
        inv.add_site(Site::new("T1_DE_KIT", "gridka.de"));
        inv.add_group(Group::new("DataOps"));

        let mut ds = Dataset::new("/A/B/RAW");
        ds.upsert_block(Block::new(BlockId(1), 100, 1, false));
        ds.upsert_block(Block::new(BlockId(2), 100, 1, false));
        inv.add_dataset(ds);
        inv
    }

    fn replica_with_blocks(dataset: &str, site: &str) -> DatasetReplica {
        let mut replica = DatasetReplica::new(dataset, site);
        replica
            .block_replicas
            .push(BlockReplica::new(BlockId(1), Some("DataOps".to_string()), 100));
        replica
            .block_replicas
            .push(BlockReplica::new(BlockId(2), Some("DataOps".to_string()), 100));
        replica
    }

    #[test]
    fn test_link_indexes_both_directions() {
        let mut inv = sample();
        inv.link_replica(replica_with_blocks("/A/B/RAW", "T2_US_MIT"))
            .unwrap();

        assert!(inv.datasets["/A/B/RAW"].replica_sites.contains("T2_US_MIT"));
        assert!(inv.sites["T2_US_MIT"].dataset_replicas.contains("/A/B/RAW"));
        assert_eq!(inv.sites["T2_US_MIT"].block_replicas.len(), 2);
        inv.verify_links().unwrap();
    }

    #[test]
    fn test_link_requires_endpoints() {
        let mut inv = sample();
        assert!(matches!(
            inv.link_replica(DatasetReplica::new("/NO/SUCH/SET", "T2_US_MIT")),
            Err(StoreError::UnknownDataset(_))
        ));
        assert!(matches!(
            inv.link_replica(DatasetReplica::new("/A/B/RAW", "T9_NOWHERE")),
            Err(StoreError::UnknownSite(_))
        ));
    }

    #[test]
    fn test_unlink_removes_everything() {
        let mut inv = sample();
        inv.link_replica(replica_with_blocks("/A/B/RAW", "T2_US_MIT"))
            .unwrap();

        let detached = inv.unlink_replica("/A/B/RAW", "T2_US_MIT").unwrap();
        assert_eq!(detached.block_replicas.len(), 2);

        assert!(inv.datasets["/A/B/RAW"].replica_sites.is_empty());
        assert!(inv.sites["T2_US_MIT"].dataset_replicas.is_empty());
        assert!(inv.sites["T2_US_MIT"].block_replicas.is_empty());
        assert_eq!(inv.replica_count(), 0);
        inv.verify_links().unwrap();
    }

    #[test]
    fn test_unlink_missing_is_none() {
        let mut inv = sample();
        assert!(inv.unlink_replica("/A/B/RAW", "T2_US_MIT").is_none());
    }

    #[test]
    fn test_relink_replaces_block_index() {
        let mut inv = sample();
        inv.link_replica(replica_with_blocks("/A/B/RAW", "T2_US_MIT"))
            .unwrap();

        // relink with only one block; the stale index entry must go away
        let mut thin = DatasetReplica::new("/A/B/RAW", "T2_US_MIT");
        thin.block_replicas
            .push(BlockReplica::new(BlockId(1), None, 100));
        inv.link_replica(thin).unwrap();

        assert_eq!(inv.sites["T2_US_MIT"].block_replicas.len(), 1);
        inv.verify_links().unwrap();
    }

    #[test]
    fn test_block_replica_upsert_and_remove() {
        let mut inv = sample();
        inv.link_replica(DatasetReplica::new("/A/B/RAW", "T2_US_MIT"))
            .unwrap();

        inv.upsert_block_replica(
            "/A/B/RAW",
            "T2_US_MIT",
            BlockReplica::new(BlockId(1), None, 40),
        )
        .unwrap();
        assert_eq!(
            inv.replica("/A/B/RAW", "T2_US_MIT").unwrap().size(None),
            40
        );

        // upsert again with the landed size
        inv.upsert_block_replica(
            "/A/B/RAW",
            "T2_US_MIT",
            BlockReplica::new(BlockId(1), None, 100),
        )
        .unwrap();
        assert_eq!(
            inv.replica("/A/B/RAW", "T2_US_MIT").unwrap().size(None),
            100
        );
        assert_eq!(inv.sites["T2_US_MIT"].block_replicas.len(), 1);

        inv.remove_block_replica("/A/B/RAW", "T2_US_MIT", BlockId(1))
            .unwrap();
        assert!(inv.sites["T2_US_MIT"].block_replicas.is_empty());
        inv.verify_links().unwrap();
    }

    #[test]
    fn test_delete_site_cascades() {
        let mut inv = sample();
        inv.link_replica(replica_with_blocks("/A/B/RAW", "T2_US_MIT"))
            .unwrap();

        inv.delete_site("T2_US_MIT").unwrap();

        assert!(!inv.sites.contains_key("T2_US_MIT"));
        assert_eq!(inv.replica_count(), 0);
        assert!(inv.datasets["/A/B/RAW"].replica_sites.is_empty());
        inv.verify_links().unwrap();
    }

    #[test]
    fn test_delete_group_orphans_block_replicas() {
        let mut inv = sample();
        inv.link_replica(replica_with_blocks("/A/B/RAW", "T2_US_MIT"))
            .unwrap();

        inv.delete_group("DataOps").unwrap();

        assert!(inv.groups.is_empty());
        let replica = inv.replica("/A/B/RAW", "T2_US_MIT").unwrap();
        assert!(replica.block_replicas.iter().all(|r| r.group.is_none()));
        // the replicas themselves survive
        assert_eq!(replica.block_replicas.len(), 2);
        inv.verify_links().unwrap();
    }

    #[test]
    fn test_delete_dataset_cascades() {
        let mut inv = sample();
        inv.link_replica(replica_with_blocks("/A/B/RAW", "T2_US_MIT"))
            .unwrap();
        inv.link_replica(replica_with_blocks("/A/B/RAW", "T1_DE_KIT"))
            .unwrap();

        inv.delete_dataset("/A/B/RAW").unwrap();

        assert!(inv.datasets.is_empty());
        assert_eq!(inv.replica_count(), 0);
        assert!(inv.sites["T2_US_MIT"].dataset_replicas.is_empty());
        assert!(inv.sites["T1_DE_KIT"].block_replicas.is_empty());
        inv.verify_links().unwrap();
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut inv = sample();
        inv.link_replica(replica_with_blocks("/A/B/RAW", "T2_US_MIT"))
            .unwrap();

        let json = serde_json::to_string(&inv).unwrap();
        let back: Inventory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inv);
        back.verify_links().unwrap();
    }
}
