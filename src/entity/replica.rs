//! Dataset and block replicas

use crate::entity::block::BlockId;
use crate::entity::dataset::Dataset;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable key of a dataset replica: one dataset at one site.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReplicaKey {
    pub dataset: String,
    pub site: String,
}

impl ReplicaKey {
    pub fn new(dataset: impl Into<String>, site: impl Into<String>) -> Self {
        ReplicaKey {
            dataset: dataset.into(),
            site: site.into(),
        }
    }
}

impl fmt::Display for ReplicaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.dataset)
    }
}

/// Locality class of a replica access.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessClass {
    Local,
    Remote,
}

/// One day's worth of accesses in one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicaAccess {
    pub num_accesses: u64,

    /// CPU seconds consumed by jobs reading the replica.
    pub cpu_time: f64,
}

/// A block physically present at a site.
///
/// `size` is the physical footprint and trails the block's nominal size
/// while a transfer is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReplica {
    pub block: BlockId,

    /// Owning group; `None` for unowned (orphaned) replicas.
    pub group: Option<String>,

    pub is_complete: bool,

    pub is_custodial: bool,

    pub size: u64,
}

impl BlockReplica {
    pub fn new(block: BlockId, group: Option<String>, size: u64) -> Self {
        BlockReplica {
            block,
            group,
            is_complete: false,
            is_custodial: false,
            size,
        }
    }

    pub fn completed(mut self) -> Self {
        self.is_complete = true;
        self
    }
}

impl fmt::Display for BlockReplica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockReplica {} (group={}, is_complete={}, is_custodial={}, size={})",
            self.block,
            self.group.as_deref().unwrap_or("-"),
            self.is_complete,
            self.is_custodial,
            self.size
        )
    }
}

/// One dataset subscribed to one site, with the block replicas that have
/// actually landed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReplica {
    pub dataset: String,

    pub site: String,

    /// Complete subscription. The replica can still be partial on disk.
    pub is_complete: bool,

    pub is_custodial: bool,

    /// Unix timestamp of the newest block creation seen for this replica.
    pub last_block_created: i64,

    pub block_replicas: Vec<BlockReplica>,

    /// Per-day access counters, split by locality class.
    #[serde(default)]
    pub accesses: BTreeMap<AccessClass, BTreeMap<NaiveDate, ReplicaAccess>>,
}

impl DatasetReplica {
    pub fn new(dataset: impl Into<String>, site: impl Into<String>) -> Self {
        DatasetReplica {
            dataset: dataset.into(),
            site: site.into(),
            is_complete: false,
            is_custodial: false,
            last_block_created: 0,
            block_replicas: Vec::new(),
            accesses: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> ReplicaKey {
        ReplicaKey::new(self.dataset.clone(), self.site.clone())
    }

    /// Complete and holding every block of the dataset.
    pub fn is_full(&self, dataset: &Dataset) -> bool {
        self.is_complete && self.block_replicas.len() == dataset.blocks.len()
    }

    /// Complete subscription but not all blocks on disk yet.
    pub fn is_partial(&self, dataset: &Dataset) -> bool {
        self.is_complete && self.block_replicas.len() != dataset.blocks.len()
    }

    /// Whether this is the only replica of its dataset anywhere.
    pub fn is_last_copy(&self, dataset: &Dataset) -> bool {
        dataset.replica_sites.len() == 1 && dataset.replica_sites.contains(&self.site)
    }

    pub fn find_block_replica(&self, block: BlockId) -> Option<&BlockReplica> {
        self.block_replicas.iter().find(|r| r.block == block)
    }

    pub fn find_block_replica_mut(&mut self, block: BlockId) -> Option<&mut BlockReplica> {
        self.block_replicas.iter_mut().find(|r| r.block == block)
    }

    /// Physical size on disk, optionally restricted to one owning group.
    pub fn size(&self, group: Option<&str>) -> u64 {
        self.block_replicas
            .iter()
            .filter(|r| group.is_none() || r.group.as_deref() == group)
            .map(|r| r.size)
            .sum()
    }

    /// Nominal size of the held blocks, resolved against the dataset.
    pub fn nominal_size(&self, dataset: &Dataset) -> u64 {
        if self.is_full(dataset) {
            return dataset.size;
        }
        self.block_replicas
            .iter()
            .filter_map(|r| dataset.find_block(r.block))
            .map(|b| b.size)
            .sum()
    }

    /// Most recent access date across both classes.
    pub fn last_access(&self) -> Option<NaiveDate> {
        self.accesses
            .values()
            .filter_map(|days| days.keys().next_back())
            .max()
            .copied()
    }

    /// Fold one day's accesses into the counters.
    pub fn record_access(&mut self, class: AccessClass, date: NaiveDate, access: ReplicaAccess) {
        let slot = self
            .accesses
            .entry(class)
            .or_default()
            .entry(date)
            .or_default();
        slot.num_accesses += access.num_accesses;
        slot.cpu_time += access.cpu_time;
    }
}

impl fmt::Display for DatasetReplica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self
            .accesses
            .get(&AccessClass::Local)
            .map_or(0, |m| m.len());
        let remote = self
            .accesses
            .get(&AccessClass::Remote)
            .map_or(0, |m| m.len());
        write!(
            f,
            "DatasetReplica {}:{} (is_complete={}, is_custodial={}, {} block_replicas, \
             #accesses[LOCAL]={}, #accesses[REMOTE]={})",
            self.site,
            self.dataset,
            self.is_complete,
            self.is_custodial,
            self.block_replicas.len(),
            local,
            remote
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::block::Block;

    fn dataset_with_blocks(n: u64) -> Dataset {
        let mut ds = Dataset::new("/A/B/RAW");
        for i in 0..n {
            ds.upsert_block(Block::new(BlockId(i as u128 + 1), 100, 1, false));
        }
        ds
    }

    #[test]
    fn test_full_vs_partial() {
        let ds = dataset_with_blocks(2);

        let mut replica = DatasetReplica::new("/A/B/RAW", "T2_US_MIT");
        replica.is_complete = true;
        replica.block_replicas.push(BlockReplica::new(BlockId(1), None, 100));

        assert!(replica.is_partial(&ds));
        assert!(!replica.is_full(&ds));

        replica.block_replicas.push(BlockReplica::new(BlockId(2), None, 100));
        assert!(replica.is_full(&ds));
        assert!(!replica.is_partial(&ds));
    }

    #[test]
    fn test_incomplete_is_neither_full_nor_partial() {
        let ds = dataset_with_blocks(1);
        let mut replica = DatasetReplica::new("/A/B/RAW", "T2_US_MIT");
        replica.block_replicas.push(BlockReplica::new(BlockId(1), None, 50));

        assert!(!replica.is_full(&ds));
        assert!(!replica.is_partial(&ds));
    }

    #[test]
    fn test_size_by_group() {
        let mut replica = DatasetReplica::new("/A/B/RAW", "T2_US_MIT");
        replica
            .block_replicas
            .push(BlockReplica::new(BlockId(1), Some("DataOps".to_string()), 100));
        replica
            .block_replicas
            .push(BlockReplica::new(BlockId(2), Some("AnalysisOps".to_string()), 40));
        replica.block_replicas.push(BlockReplica::new(BlockId(3), None, 7));

        assert_eq!(replica.size(None), 147);
        assert_eq!(replica.size(Some("DataOps")), 100);
        assert_eq!(replica.size(Some("AnalysisOps")), 40);
        assert_eq!(replica.size(Some("NoSuchGroup")), 0);
    }

    #[test]
    fn test_physical_size_trails_nominal() {
        let ds = dataset_with_blocks(1);
        let mut replica = DatasetReplica::new("/A/B/RAW", "T2_US_MIT");
        // transfer in flight: 60 of 100 bytes landed
        replica.block_replicas.push(BlockReplica::new(BlockId(1), None, 60));

        assert_eq!(replica.size(None), 60);
        assert_eq!(replica.nominal_size(&ds), 100);
    }

    #[test]
    fn test_access_accounting() {
        let mut replica = DatasetReplica::new("/A/B/RAW", "T2_US_MIT");
        let day1 = NaiveDate::from_ymd_opt(2016, 3, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2016, 3, 5).unwrap();

        replica.record_access(
            AccessClass::Local,
            day1,
            ReplicaAccess {
                num_accesses: 3,
                cpu_time: 120.0,
            },
        );
        replica.record_access(
            AccessClass::Local,
            day1,
            ReplicaAccess {
                num_accesses: 1,
                cpu_time: 30.0,
            },
        );
        replica.record_access(
            AccessClass::Remote,
            day2,
            ReplicaAccess {
                num_accesses: 5,
                cpu_time: 0.0,
            },
        );

        let local = &replica.accesses[&AccessClass::Local][&day1];
        assert_eq!(local.num_accesses, 4);
        assert!((local.cpu_time - 150.0).abs() < f64::EPSILON);
        assert_eq!(replica.last_access(), Some(day2));
    }
}
