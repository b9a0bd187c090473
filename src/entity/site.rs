//! Storage sites

use crate::entity::block::BlockId;
use crate::entity::partition::Partition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of storage a site fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Disk,
    /// Mass storage system (tape-backed).
    Mss,
    Buffer,
    Unknown,
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::Unknown
    }
}

/// A named storage endpoint.
///
/// The `dataset_replicas` and `block_replicas` sets are derived indices
/// maintained exclusively by [`Inventory`](crate::entity::Inventory)
/// link/unlink operations; code outside the arena treats them as read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,

    pub host: String,

    #[serde(default)]
    pub storage_type: StorageType,

    /// Transfer backend endpoint, e.g. an SRM or gridftp door.
    #[serde(default)]
    pub backend: String,

    /// Total capacity in bytes.
    #[serde(default)]
    pub capacity: u64,

    /// Bytes currently occupied, all partitions together.
    #[serde(default)]
    pub used_total: u64,

    /// Partition name -> quota in bytes. Only leaf partitions carry rows.
    #[serde(default)]
    pub quotas: BTreeMap<String, u64>,

    /// Names of datasets with a replica at this site.
    #[serde(default)]
    pub dataset_replicas: BTreeSet<String>,

    /// (dataset name, block id) pairs physically present at this site.
    #[serde(default)]
    pub block_replicas: BTreeSet<(String, BlockId)>,
}

impl Site {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Site {
            name: name.into(),
            host: host.into(),
            storage_type: StorageType::Unknown,
            backend: String::new(),
            capacity: 0,
            used_total: 0,
            quotas: BTreeMap::new(),
            dataset_replicas: BTreeSet::new(),
            block_replicas: BTreeSet::new(),
        }
    }

    pub fn with_storage(mut self, storage_type: StorageType, capacity: u64) -> Self {
        self.storage_type = storage_type;
        self.capacity = capacity;
        self
    }

    /// Set the quota row for a leaf partition.
    pub fn set_quota(&mut self, partition: &str, quota: u64) {
        self.quotas.insert(partition.to_string(), quota);
    }

    /// Effective quota of `partition` at this site (sums subpartitions for
    /// superpartitions).
    pub fn quota(&self, partition: &Partition, registry: &BTreeMap<String, Partition>) -> u64 {
        partition.quota(&self.quotas, registry)
    }

    /// Occupancy fraction against the effective quota; `None` when the
    /// quota is zero.
    pub fn occupancy(
        &self,
        partition: &Partition,
        registry: &BTreeMap<String, Partition>,
        used: u64,
    ) -> Option<f64> {
        let quota = self.quota(partition, registry);
        if quota == 0 {
            None
        } else {
            Some(used as f64 / quota as f64)
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Site {} (host={}, storage={:?}, capacity={}, {} dataset replicas, {} block replicas)",
            self.name,
            self.host,
            self.storage_type,
            self.capacity,
            self.dataset_replicas.len(),
            self.block_replicas.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::partition::link_subpartition;

    #[test]
    fn test_quota_lookup() {
        let mut site = Site::new("T2_US_MIT", "se01.cmsaf.mit.edu");
        site.set_quota("DataOps", 500);

        let mut reg = BTreeMap::new();
        reg.insert("DataOps".to_string(), Partition::new("DataOps"));

        let p = reg.get("DataOps").unwrap().clone();
        assert_eq!(site.quota(&p, &reg), 500);
    }

    #[test]
    fn test_occupancy() {
        let mut site = Site::new("T2_US_MIT", "se01.cmsaf.mit.edu");
        site.set_quota("DataOps", 1000);

        let mut reg = BTreeMap::new();
        reg.insert("DataOps".to_string(), Partition::new("DataOps"));
        let p = reg.get("DataOps").unwrap().clone();

        assert_eq!(site.occupancy(&p, &reg, 250), Some(0.25));

        let mut empty = Site::new("T2_EMPTY", "x");
        empty.set_quota("DataOps", 0);
        assert_eq!(empty.occupancy(&p, &reg, 250), None);
    }

    #[test]
    fn test_super_quota_through_site() {
        let mut reg = BTreeMap::new();
        for name in ["Physics", "DataOps", "AnalysisOps"] {
            reg.insert(name.to_string(), Partition::new(name));
        }
        link_subpartition(&mut reg, "Physics", "DataOps");
        link_subpartition(&mut reg, "Physics", "AnalysisOps");

        let mut site = Site::new("T1_DE_KIT", "gridka.de");
        site.set_quota("DataOps", 300);
        site.set_quota("AnalysisOps", 200);

        let physics = reg.get("Physics").unwrap().clone();
        assert_eq!(site.quota(&physics, &reg), 500);
    }
}
