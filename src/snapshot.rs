//! Snapshot tags, clear modes and selectors
//!
//! A snapshot is a tagged, point-in-time capture of the full inventory held
//! by the backend. Tags are normally UTC timestamps rendered `%y%m%d%H%M%S`
//! but any unique string is accepted; only timestamp tags participate in
//! window-based cleanup and `timestamp_only` listings.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag rendering used for default snapshot tags; sortable, second
/// resolution.
pub const TAG_FORMAT: &str = "%y%m%d%H%M%S";

/// Render a timestamp as a snapshot tag.
pub fn format_tag(ts: DateTime<Utc>) -> String {
    ts.format(TAG_FORMAT).to_string()
}

/// Tag for the current time.
pub fn current_tag() -> String {
    format_tag(Utc::now())
}

/// Parse a tag back into a timestamp; `None` for ad-hoc string tags.
pub fn parse_tag(tag: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(tag, TAG_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// What to do with the live store after capturing a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotClear {
    /// Pure copy; the live store is untouched.
    None,
    /// Clear replica-level content, keep sites/groups/datasets as a
    /// skeleton.
    Replicas,
    /// Clear everything; the capture behaves as a move into the archive.
    All,
}

impl fmt::Display for SnapshotClear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotClear::None => "none",
            SnapshotClear::Replicas => "replicas",
            SnapshotClear::All => "all",
        };
        f.write_str(name)
    }
}

/// Which snapshots a removal targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSelector {
    /// One snapshot by exact tag.
    Tag(String),
    /// Every timestamp-tagged snapshot inside the open interval. `None`
    /// bounds are unbounded. Ad-hoc string tags never match a window.
    Window {
        newer_than: Option<DateTime<Utc>>,
        older_than: Option<DateTime<Utc>>,
    },
}

impl SnapshotSelector {
    /// The default cleanup target: every timestamp tag up to now.
    pub fn everything_before_now() -> Self {
        SnapshotSelector::Window {
            newer_than: None,
            older_than: Some(Utc::now()),
        }
    }

    pub fn matches(&self, tag: &str) -> bool {
        match self {
            SnapshotSelector::Tag(t) => t == tag,
            SnapshotSelector::Window {
                newer_than,
                older_than,
            } => match parse_tag(tag) {
                None => false,
                Some(ts) => {
                    newer_than.map_or(true, |bound| ts > bound)
                        && older_than.map_or(true, |bound| ts < bound)
                }
            },
        }
    }
}

impl fmt::Display for SnapshotSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSelector::Tag(tag) => write!(f, "tag {}", tag),
            SnapshotSelector::Window {
                newer_than,
                older_than,
            } => write!(
                f,
                "window ({:?}, {:?})",
                newer_than.map(format_tag),
                older_than.map(format_tag)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2016, 3, 1, 12, 30, 45).unwrap();
        let tag = format_tag(ts);
        assert_eq!(tag, "160301123045");
        assert_eq!(parse_tag(&tag), Some(ts));
    }

    #[test]
    fn test_parse_rejects_adhoc_tags() {
        assert!(parse_tag("before-migration").is_none());
        assert!(parse_tag("16030112").is_none());
    }

    #[test]
    fn test_tag_selector() {
        let sel = SnapshotSelector::Tag("before-migration".to_string());
        assert!(sel.matches("before-migration"));
        assert!(!sel.matches("160301123045"));
    }

    #[test]
    fn test_window_selector() {
        let lo = Utc.with_ymd_and_hms(2016, 3, 1, 0, 0, 0).unwrap();
        let hi = Utc.with_ymd_and_hms(2016, 4, 1, 0, 0, 0).unwrap();
        let sel = SnapshotSelector::Window {
            newer_than: Some(lo),
            older_than: Some(hi),
        };

        assert!(sel.matches("160315000000"));
        assert!(!sel.matches("160228235959"));
        assert!(!sel.matches("160401000000")); // open interval
        assert!(!sel.matches("before-migration")); // never by window
    }

    #[test]
    fn test_window_unbounded_sides() {
        let hi = Utc.with_ymd_and_hms(2016, 4, 1, 0, 0, 0).unwrap();
        let sel = SnapshotSelector::Window {
            newer_than: None,
            older_than: Some(hi),
        };
        assert!(sel.matches("000101000000"));
        assert!(!sel.matches("170101000000"));
    }
}
