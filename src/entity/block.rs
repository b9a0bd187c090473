//! Blocks and their 128-bit identifiers

use crate::error::{Result, StoreError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 128-bit block identifier.
///
/// The canonical rendering is 36 characters of grouped lowercase hex,
/// `8-4-4-4-12` digits. Formatting an id and parsing the result yields the
/// identical integer. Ids serialize in the canonical string form (the
/// integer does not fit JSON numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u128);

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

impl BlockId {
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = format!("{:032x}", self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl FromStr for BlockId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.chars().filter(|&c| c != '-').collect();
        if digits.len() != 32 {
            return Err(StoreError::InvalidBlockId(s.to_string()));
        }
        u128::from_str_radix(&digits, 16)
            .map(BlockId)
            .map_err(|_| StoreError::InvalidBlockId(s.to_string()))
    }
}

/// A block of a dataset. Immutable value; replacing any field means
/// replacing the block in the owning dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,

    /// Nominal size in bytes.
    pub size: u64,

    pub num_files: u32,

    /// Open blocks may still receive files upstream.
    pub is_open: bool,
}

impl Block {
    pub fn new(id: BlockId, size: u64, num_files: u32, is_open: bool) -> Self {
        Block {
            id,
            size,
            num_files,
            is_open,
        }
    }

    /// Copy with selected fields replaced.
    pub fn with_size(&self, size: u64, num_files: u32) -> Self {
        Block {
            id: self.id,
            size,
            num_files,
            is_open: self.is_open,
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {} (size={}, num_files={}, is_open={})",
            self.id, self.size, self.num_files, self.is_open
        )
    }
}

/// Physical file record: maps a storage path onto the block holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Full physical path.
    pub path: String,

    pub block: BlockId,

    pub size: u64,
}
