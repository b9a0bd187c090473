//! Datasets

use crate::entity::block::{Block, BlockId, FileRecord};
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Dataset bookkeeping status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DatasetStatus {
    Unknown,
    Deleted,
    Deprecated,
    Invalid,
    Production,
    Valid,
    Ignored,
}

impl Default for DatasetStatus {
    fn default() -> Self {
        DatasetStatus::Unknown
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetStatus::Unknown => "UNKNOWN",
            DatasetStatus::Deleted => "DELETED",
            DatasetStatus::Deprecated => "DEPRECATED",
            DatasetStatus::Invalid => "INVALID",
            DatasetStatus::Production => "PRODUCTION",
            DatasetStatus::Valid => "VALID",
            DatasetStatus::Ignored => "IGNORED",
        };
        f.write_str(name)
    }
}

impl FromStr for DatasetStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "UNKNOWN" => Ok(DatasetStatus::Unknown),
            "DELETED" => Ok(DatasetStatus::Deleted),
            "DEPRECATED" => Ok(DatasetStatus::Deprecated),
            "INVALID" => Ok(DatasetStatus::Invalid),
            "PRODUCTION" => Ok(DatasetStatus::Production),
            "VALID" => Ok(DatasetStatus::Valid),
            "IGNORED" => Ok(DatasetStatus::Ignored),
            _ => Err(StoreError::InvalidStatus(s.to_string())),
        }
    }
}

/// A named collection of blocks.
///
/// `replica_sites` is a derived index maintained by the inventory arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,

    /// Aggregate nominal size in bytes.
    pub size: u64,

    pub num_files: u32,

    #[serde(default)]
    pub status: DatasetStatus,

    /// Whether an archival (tape) copy exists somewhere.
    #[serde(default)]
    pub on_tape: bool,

    /// Open datasets may still grow new blocks upstream.
    #[serde(default)]
    pub is_open: bool,

    /// Unix timestamp of the last upstream change.
    #[serde(default)]
    pub last_update: i64,

    #[serde(default)]
    pub blocks: Vec<Block>,

    /// Physical file records, used for reverse path lookups. Loaded on
    /// demand; an empty list means "not loaded", not "no files".
    #[serde(default)]
    pub files: Vec<FileRecord>,

    /// Names of sites holding a replica of this dataset.
    #[serde(default)]
    pub replica_sites: BTreeSet<String>,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Dataset {
            name: name.into(),
            size: 0,
            num_files: 0,
            status: DatasetStatus::Unknown,
            on_tape: false,
            is_open: false,
            last_update: 0,
            blocks: Vec::new(),
            files: Vec::new(),
            replica_sites: BTreeSet::new(),
        }
    }

    pub fn find_block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Block holding the file at `path`, if the file list is loaded.
    pub fn find_block_of(&self, path: &str) -> Option<&Block> {
        let record = self.files.iter().find(|f| f.path == path)?;
        self.find_block(record.block)
    }

    /// Recompute `size` and `num_files` from the block list.
    pub fn update_aggregates(&mut self) {
        self.size = self.blocks.iter().map(|b| b.size).sum();
        self.num_files = self.blocks.iter().map(|b| b.num_files).sum();
    }

    /// Replace or insert a block, keeping aggregates current.
    pub fn upsert_block(&mut self, block: Block) {
        match self.blocks.iter_mut().find(|b| b.id == block.id) {
            Some(existing) => *existing = block,
            None => self.blocks.push(block),
        }
        self.update_aggregates();
    }

    pub fn remove_block(&mut self, id: BlockId) -> Option<Block> {
        let idx = self.blocks.iter().position(|b| b.id == id)?;
        let block = self.blocks.remove(idx);
        self.files.retain(|f| f.block != id);
        self.update_aggregates();
        Some(block)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dataset {} (size={}, num_files={}, status={}, {} blocks, {} replicas)",
            self.name,
            self.size,
            self.num_files,
            self.status,
            self.blocks.len(),
            self.replica_sites.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DatasetStatus::Unknown,
            DatasetStatus::Deleted,
            DatasetStatus::Deprecated,
            DatasetStatus::Invalid,
            DatasetStatus::Production,
            DatasetStatus::Valid,
            DatasetStatus::Ignored,
        ] {
            let parsed: DatasetStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_parse_case_insensitive() {
        let s: DatasetStatus = "production".parse().unwrap();
        assert_eq!(s, DatasetStatus::Production);
        assert!("bogus".parse::<DatasetStatus>().is_err());
    }

    #[test]
    fn test_aggregates() {
        let mut ds = Dataset::new("/A/B/RAW");
        ds.upsert_block(Block::new(BlockId(1), 100, 2, false));
        ds.upsert_block(Block::new(BlockId(2), 250, 3, true));
        assert_eq!(ds.size, 350);
        assert_eq!(ds.num_files, 5);

        // replacing a block recomputes, not double-counts
        ds.upsert_block(Block::new(BlockId(1), 150, 2, false));
        assert_eq!(ds.size, 400);

        ds.remove_block(BlockId(2));
        assert_eq!(ds.size, 150);
        assert_eq!(ds.num_files, 2);
    }

    #[test]
    fn test_find_block_of() {
        let mut ds = Dataset::new("/A/B/RAW");
        ds.upsert_block(Block::new(BlockId(7), 100, 1, false));
        ds.files.push(FileRecord {
            path: "/store/data/a_b_raw_0001.root".to_string(),
            block: BlockId(7),
            size: 100,
        });

        let block = ds.find_block_of("/store/data/a_b_raw_0001.root").unwrap();
        assert_eq!(block.id, BlockId(7));
        assert!(ds.find_block_of("/store/data/missing.root").is_none());
    }
}
