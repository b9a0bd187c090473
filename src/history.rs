//! Historical accounting records
//!
//! Read-mostly bookkeeping the policy engines consume: per-day replica
//! access counters and batch-system dataset requests. The store only loads
//! and saves these; scoring and scheduling live elsewhere.

use crate::entity::replica::{AccessClass, ReplicaAccess, ReplicaKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replica -> day -> counters, split by locality class.
pub type AccessMap = BTreeMap<ReplicaKey, BTreeMap<AccessClass, BTreeMap<NaiveDate, ReplicaAccess>>>;

/// Dataset name -> job id -> request record.
pub type RequestMap = BTreeMap<String, BTreeMap<String, DatasetRequest>>;

/// One batch-system request touching a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRequest {
    pub job_id: String,

    /// Unix timestamp the request entered the queue.
    pub queue_time: i64,

    /// Unix timestamp the request completed; 0 while still running.
    #[serde(default)]
    pub completion_time: i64,

    pub nodes_total: u32,

    #[serde(default)]
    pub nodes_done: u32,

    #[serde(default)]
    pub nodes_failed: u32,

    #[serde(default)]
    pub nodes_queued: u32,
}

impl DatasetRequest {
    pub fn is_complete(&self) -> bool {
        self.completion_time > 0
    }

    /// Fraction of nodes finished (done or failed); `None` for an empty
    /// request.
    pub fn progress(&self) -> Option<f64> {
        if self.nodes_total == 0 {
            return None;
        }
        Some((self.nodes_done + self.nodes_failed) as f64 / self.nodes_total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress() {
        let req = DatasetRequest {
            job_id: "160301_120000:user_task".to_string(),
            queue_time: 1456833600,
            completion_time: 0,
            nodes_total: 10,
            nodes_done: 4,
            nodes_failed: 1,
            nodes_queued: 5,
        };
        assert!(!req.is_complete());
        assert_eq!(req.progress(), Some(0.5));

        let empty = DatasetRequest {
            job_id: "x".to_string(),
            queue_time: 0,
            completion_time: 0,
            nodes_total: 0,
            nodes_done: 0,
            nodes_failed: 0,
            nodes_queued: 0,
        };
        assert_eq!(empty.progress(), None);
    }
}
