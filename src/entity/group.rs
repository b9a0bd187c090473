//! Ownership groups

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quota attribution tag attached to block replicas. A block replica with
/// no group is unowned and counts against no group's books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Group { name: name.into() }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group {}", self.name)
    }
}
