//! File-based backend
//!
//! Store layout under one root directory:
//!
//! ```text
//! <root>/
//!   store.json        live image, serde_json
//!   snapshots/
//!     <tag>.snap      crc32 (4 bytes LE) + zstd(bincode(image))
//!   lock              advisory exclusive lock file
//!   attached          tag of the snapshot reads are repointed at, if any
//! ```
//!
//! The lock file is created with `create_new`, which is atomic on every
//! filesystem we care about; a crashed holder leaves the file behind, which
//! is what the forced release is for. Image writes go through a temp file
//! and a rename so readers never observe a half-written image.

use crate::backend::{LoadFlags, PersistenceBackend, StoreImage};
use crate::entity::{
    Block, BlockId, BlockReplica, Dataset, DatasetReplica, DatasetStatus, FileRecord, Group,
    Inventory, ReplicaKey, Site,
};
use crate::error::{Result, StoreError};
use crate::history::{AccessMap, RequestMap};
use crate::pattern::NameFilter;
use crate::snapshot::{parse_tag, SnapshotClear, SnapshotSelector};
use chrono::{NaiveDate, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Poll interval for blocking lock acquisition.
const LOCK_POLL: Duration = Duration::from_millis(100);

/// Zstd level for snapshot blobs.
const SNAPSHOT_ZSTD_LEVEL: i32 = 3;

pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open (creating directories as needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("snapshots"))?;
        Ok(FileBackend { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn live_path(&self) -> PathBuf {
        self.root.join("store.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join("lock")
    }

    fn attached_path(&self) -> PathBuf {
        self.root.join("attached")
    }

    fn snapshot_path(&self, tag: &str) -> PathBuf {
        self.root.join("snapshots").join(format!("{}.snap", tag))
    }

    fn read_live(&self) -> Result<StoreImage> {
        match fs::read_to_string(self.live_path()) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreImage::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_live(&self, image: &StoreImage) -> Result<()> {
        let tmp = self.root.join("store.json.tmp");
        fs::write(&tmp, serde_json::to_vec(image)?)?;
        fs::rename(&tmp, self.live_path())?;
        Ok(())
    }

    fn attached_tag(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.attached_path()) {
            Ok(tag) => {
                let tag = tag.trim().to_string();
                if tag.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(tag))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The image reads currently resolve to.
    fn read_view(&self) -> Result<StoreImage> {
        match self.attached_tag()? {
            Some(tag) if self.snapshot_path(&tag).exists() => self.read_snapshot(&tag),
            _ => self.read_live(),
        }
    }

    fn write_snapshot(&self, tag: &str, image: &StoreImage) -> Result<()> {
        let encoded = bincode::serialize(image)?;
        let compressed = zstd::encode_all(encoded.as_slice(), SNAPSHOT_ZSTD_LEVEL)?;

        let mut payload = Vec::with_capacity(compressed.len() + 4);
        payload.extend_from_slice(&crc32fast::hash(&compressed).to_le_bytes());
        payload.extend_from_slice(&compressed);

        let tmp = self.root.join("snapshots").join(format!("{}.tmp", tag));
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, self.snapshot_path(tag))?;
        Ok(())
    }

    fn read_snapshot(&self, tag: &str) -> Result<StoreImage> {
        let payload = fs::read(self.snapshot_path(tag))?;
        if payload.len() < 4 {
            return Err(StoreError::Corrupted(format!("snapshot {} truncated", tag)));
        }
        let (crc_bytes, compressed) = payload.split_at(4);
        let expected = u32::from_le_bytes(crc_bytes.try_into().expect("4 bytes"));
        if crc32fast::hash(compressed) != expected {
            return Err(StoreError::Corrupted(format!(
                "snapshot {} checksum mismatch",
                tag
            )));
        }

        let encoded = zstd::decode_all(compressed)
            .map_err(|e| StoreError::Corrupted(format!("snapshot {}: {}", tag, e)))?;
        bincode::deserialize(&encoded)
            .map_err(|e| StoreError::Corrupted(format!("snapshot {}: {}", tag, e)))
    }

    fn snapshot_tags(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        for entry in fs::read_dir(self.root.join("snapshots"))? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(tag) = name.strip_suffix(".snap") {
                tags.push(tag.to_string());
            }
        }
        tags.sort();
        Ok(tags)
    }

    /// Read-modify-write helper for mutating hooks.
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreImage) -> Result<R>) -> Result<R> {
        let mut image = self.read_live()?;
        let out = f(&mut image)?;
        self.write_live(&image)?;
        Ok(out)
    }
}

impl PersistenceBackend for FileBackend {
    fn acquire_lock(&self, blocking: bool) -> Result<bool> {
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.lock_path())
            {
                Ok(_) => return Ok(true),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !blocking {
                        return Ok(false);
                    }
                    debug!("lock at {:?} held elsewhere, waiting", self.lock_path());
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn release_lock(&self, _force: bool) -> Result<()> {
        // unlinking is release; releasing a lock nobody holds is a no-op
        match fs::remove_file(self.lock_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn get_last_update(&self) -> Result<i64> {
        Ok(self.read_view()?.last_update)
    }

    fn set_last_update(&self, ts: i64) -> Result<()> {
        self.mutate(|image| {
            image.last_update = ts;
            Ok(())
        })
    }

    fn make_snapshot(&self, tag: &str, clear: SnapshotClear) -> Result<()> {
        let mut live = self.read_live()?;
        self.write_snapshot(tag, &live)?;
        match clear {
            SnapshotClear::None => return Ok(()),
            SnapshotClear::Replicas => live.clear_replicas(),
            SnapshotClear::All => live = StoreImage::default(),
        }
        self.write_live(&live)
    }

    fn remove_snapshot(&self, selector: &SnapshotSelector) -> Result<()> {
        for tag in self.snapshot_tags()? {
            if selector.matches(&tag) {
                fs::remove_file(self.snapshot_path(&tag))?;
            }
        }
        if let Some(tag) = self.attached_tag()? {
            if !self.snapshot_path(&tag).exists() {
                let _ = fs::remove_file(self.attached_path());
            }
        }
        Ok(())
    }

    fn list_snapshots(&self, timestamp_only: bool) -> Result<Vec<String>> {
        let mut tags: Vec<String> = self
            .snapshot_tags()?
            .into_iter()
            .filter(|tag| !timestamp_only || parse_tag(tag).is_some())
            .collect();
        tags.reverse();
        Ok(tags)
    }

    fn clear(&self) -> Result<()> {
        self.write_live(&StoreImage::default())
    }

    fn recover_from(&self, tag: &str) -> Result<()> {
        if !self.snapshot_path(tag).exists() {
            return Err(StoreError::Backend(format!("no snapshot {}", tag)));
        }
        let image = self.read_snapshot(tag)?;
        self.write_live(&image)?;
        let _ = fs::remove_file(self.attached_path());
        Ok(())
    }

    fn switch_snapshot(&self, tag: &str) -> Result<()> {
        if !self.snapshot_path(tag).exists() {
            return Err(StoreError::Backend(format!("no snapshot {}", tag)));
        }
        fs::write(self.attached_path(), tag)?;
        Ok(())
    }

    fn get_site_list(&self, filter: &NameFilter) -> Result<Vec<String>> {
        Ok(self.read_view()?.site_list(filter))
    }

    fn load_data(
        &self,
        sites: &NameFilter,
        datasets: &NameFilter,
        flags: LoadFlags,
    ) -> Result<Inventory> {
        self.read_view()?.load_data(sites, datasets, flags)
    }

    fn load_dataset(&self, name: &str, flags: LoadFlags) -> Result<Option<Dataset>> {
        Ok(self.read_view()?.load_dataset(name, flags))
    }

    fn load_replicas(&self, dataset: &str) -> Result<Vec<DatasetReplica>> {
        Ok(self.read_view()?.load_replicas(dataset))
    }

    fn load_blocks(&self, dataset: &str) -> Result<Vec<Block>> {
        self.read_view()?.load_blocks(dataset)
    }

    fn load_files(&self, dataset: &str) -> Result<Vec<FileRecord>> {
        self.read_view()?.load_files(dataset)
    }

    fn replica_exists(&self, dataset: &str, site: &str) -> Result<bool> {
        Ok(self.read_view()?.replica_exists(dataset, site))
    }

    fn find_block_of(&self, path: &str, datasets: &[String]) -> Result<Option<(String, BlockId)>> {
        Ok(self.read_view()?.find_block_of(path, datasets))
    }

    fn load_replica_accesses(
        &self,
        sites: &[String],
        datasets: &[String],
    ) -> Result<(Option<NaiveDate>, AccessMap)> {
        Ok(self.read_view()?.load_replica_accesses(sites, datasets))
    }

    fn save_replica_accesses(&self, accesses: &AccessMap) -> Result<()> {
        self.mutate(|image| {
            image.save_replica_accesses(accesses);
            Ok(())
        })
    }

    fn load_dataset_requests(&self, datasets: &[String]) -> Result<(i64, RequestMap)> {
        Ok(self.read_view()?.load_dataset_requests(datasets))
    }

    fn save_dataset_requests(&self, requests: &RequestMap) -> Result<()> {
        let now = Utc::now().timestamp();
        self.mutate(|image| {
            image.save_dataset_requests(requests, now);
            Ok(())
        })
    }

    fn save_sites(&self, sites: &[Site]) -> Result<()> {
        self.mutate(|image| {
            image.save_sites(sites);
            Ok(())
        })
    }

    fn save_groups(&self, groups: &[Group]) -> Result<()> {
        self.mutate(|image| {
            image.save_groups(groups);
            Ok(())
        })
    }

    fn save_datasets(&self, datasets: &[Dataset]) -> Result<()> {
        self.mutate(|image| {
            image.save_datasets(datasets);
            Ok(())
        })
    }

    fn update_replicas(&self, replicas: &[DatasetReplica]) -> Result<()> {
        self.mutate(|image| image.update_replicas(replicas))
    }

    fn save_replicas(&self, replicas: &[DatasetReplica]) -> Result<()> {
        self.mutate(|image| image.save_replicas(replicas))
    }

    fn add_dataset_replicas(&self, replicas: &[DatasetReplica]) -> Result<()> {
        self.mutate(|image| image.add_dataset_replicas(replicas))
    }

    fn add_block_replicas(&self, replicas: &[(ReplicaKey, BlockReplica)]) -> Result<()> {
        self.mutate(|image| image.add_block_replicas(replicas))
    }

    fn delete_dataset(&self, name: &str) -> Result<()> {
        self.mutate(|image| {
            image.delete_dataset(name);
            Ok(())
        })
    }

    fn delete_datasets(&self, names: &[String]) -> Result<()> {
        self.mutate(|image| {
            for name in names {
                image.delete_dataset(name);
            }
            Ok(())
        })
    }

    fn delete_sites(&self, names: &[String]) -> Result<()> {
        self.mutate(|image| {
            image.delete_sites(names);
            Ok(())
        })
    }

    fn delete_groups(&self, names: &[String]) -> Result<()> {
        self.mutate(|image| {
            image.delete_groups(names);
            Ok(())
        })
    }

    fn delete_block(&self, dataset: &str, block: BlockId) -> Result<()> {
        self.mutate(|image| {
            image.delete_block(dataset, block);
            Ok(())
        })
    }

    fn delete_dataset_replicas(
        &self,
        site: &str,
        datasets: &[String],
        delete_block_replicas: bool,
    ) -> Result<()> {
        self.mutate(|image| image.delete_dataset_replicas(site, datasets, delete_block_replicas))
    }

    fn delete_block_replicas(&self, replicas: &[(ReplicaKey, BlockId)]) -> Result<()> {
        self.mutate(|image| {
            image.delete_block_replicas(replicas);
            Ok(())
        })
    }

    fn update_block_replicas(&self, replicas: &[(ReplicaKey, BlockReplica)]) -> Result<()> {
        self.mutate(|image| image.update_block_replicas(replicas))
    }

    fn set_dataset_status(&self, dataset: &str, status: DatasetStatus) -> Result<()> {
        self.mutate(|image| {
            image.set_dataset_status(dataset, status);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded(root: &Path) -> FileBackend {
        let backend = FileBackend::open(root).unwrap();
        backend
            .save_sites(&[Site::new("T2_US_MIT", "se01.cmsaf.mit.edu")])
            .unwrap();
        backend.save_groups(&[Group::new("DataOps")]).unwrap();
        backend.save_datasets(&[Dataset::new("/A/B/RAW")]).unwrap();
        backend
    }

    #[test]
    fn test_live_image_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let backend = seeded(dir.path());
            backend.set_last_update(1456833600).unwrap();
        }

        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.get_last_update().unwrap(), 1456833600);
        let inv = backend
            .load_data(&NameFilter::all(), &NameFilter::all(), LoadFlags::default())
            .unwrap();
        assert_eq!(inv.sites.len(), 1);
        assert_eq!(inv.datasets.len(), 1);
    }

    #[test]
    fn test_snapshot_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let backend = seeded(dir.path());

        backend.make_snapshot("t1", SnapshotClear::None).unwrap();
        backend.delete_dataset("/A/B/RAW").unwrap();
        backend.recover_from("t1").unwrap();

        assert!(backend
            .load_dataset("/A/B/RAW", LoadFlags::default())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_corrupted_snapshot_detected() {
        let dir = TempDir::new().unwrap();
        let backend = seeded(dir.path());
        backend.make_snapshot("t1", SnapshotClear::None).unwrap();

        // flip a byte past the checksum header
        let path = backend.snapshot_path("t1");
        let mut payload = fs::read(&path).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        fs::write(&path, payload).unwrap();

        match backend.read_snapshot("t1") {
            Err(StoreError::Corrupted(_)) => {}
            other => panic!("expected Corrupted, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_lock_file_exclusion() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let second = FileBackend::open(dir.path()).unwrap();

        assert!(backend.acquire_lock(false).unwrap());
        assert!(!second.acquire_lock(false).unwrap());

        // forced release clears a lock left by a crashed holder
        second.release_lock(true).unwrap();
        assert!(second.acquire_lock(false).unwrap());
        second.release_lock(false).unwrap();
    }

    #[test]
    fn test_switch_attaches_reads() {
        let dir = TempDir::new().unwrap();
        let backend = seeded(dir.path());
        backend.make_snapshot("t1", SnapshotClear::None).unwrap();
        backend.delete_dataset("/A/B/RAW").unwrap();

        backend.switch_snapshot("t1").unwrap();
        assert!(backend
            .load_dataset("/A/B/RAW", LoadFlags::default())
            .unwrap()
            .is_some());

        // removal of the attached snapshot falls back to live
        backend
            .remove_snapshot(&SnapshotSelector::Tag("t1".to_string()))
            .unwrap();
        assert!(backend
            .load_dataset("/A/B/RAW", LoadFlags::default())
            .unwrap()
            .is_none());
    }
}
