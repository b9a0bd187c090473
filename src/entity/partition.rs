//! Quota partitions
//!
//! Partitions scope site quotas. A partition may have subpartitions; the
//! superpartition carries no quota row of its own and its effective quota at
//! a site is the sum of its subpartitions' quotas there.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,

    pub parent: Option<String>,

    /// Names of direct subpartitions; empty for leaf partitions.
    pub subpartitions: Vec<String>,
}

impl Partition {
    pub fn new(name: impl Into<String>) -> Self {
        Partition {
            name: name.into(),
            parent: None,
            subpartitions: Vec::new(),
        }
    }

    pub fn is_super(&self) -> bool {
        !self.subpartitions.is_empty()
    }

    /// Effective quota in bytes given a site's per-partition quota table.
    /// Leaf partitions read their own row; superpartitions sum their
    /// subpartitions recursively through `registry`.
    pub fn quota(
        &self,
        quotas: &BTreeMap<String, u64>,
        registry: &BTreeMap<String, Partition>,
    ) -> u64 {
        if self.subpartitions.is_empty() {
            return quotas.get(&self.name).copied().unwrap_or(0);
        }

        self.subpartitions
            .iter()
            .filter_map(|sub| registry.get(sub))
            .map(|sub| sub.quota(quotas, registry))
            .sum()
    }
}

/// Attach `child` under `parent`, updating both sides.
pub fn link_subpartition(registry: &mut BTreeMap<String, Partition>, parent: &str, child: &str) {
    if let Some(p) = registry.get_mut(parent) {
        if !p.subpartitions.iter().any(|s| s == child) {
            p.subpartitions.push(child.to_string());
        }
    }
    if let Some(c) = registry.get_mut(child) {
        c.parent = Some(parent.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BTreeMap<String, Partition> {
        let mut reg = BTreeMap::new();
        for name in ["Physics", "DataOps", "AnalysisOps"] {
            reg.insert(name.to_string(), Partition::new(name));
        }
        link_subpartition(&mut reg, "Physics", "DataOps");
        link_subpartition(&mut reg, "Physics", "AnalysisOps");
        reg
    }

    #[test]
    fn test_leaf_quota() {
        let reg = registry();
        let mut quotas = BTreeMap::new();
        quotas.insert("DataOps".to_string(), 100);

        let dataops = reg.get("DataOps").unwrap();
        assert_eq!(dataops.quota(&quotas, &reg), 100);
    }

    #[test]
    fn test_super_quota_is_sum_of_subpartitions() {
        let reg = registry();
        let mut quotas = BTreeMap::new();
        quotas.insert("DataOps".to_string(), 100);
        quotas.insert("AnalysisOps".to_string(), 250);
        // a quota row on the superpartition itself is ignored
        quotas.insert("Physics".to_string(), 9999);

        let physics = reg.get("Physics").unwrap();
        assert!(physics.is_super());
        assert_eq!(physics.quota(&quotas, &reg), 350);
    }

    #[test]
    fn test_parent_links() {
        let reg = registry();
        assert_eq!(
            reg.get("DataOps").unwrap().parent.as_deref(),
            Some("Physics")
        );
        assert_eq!(reg.get("Physics").unwrap().subpartitions.len(), 2);
    }
}
