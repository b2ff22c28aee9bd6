//! Local filesystem snapshot store.
//!
//! A commit writes the snapshot file first and the `LATEST.json` pointer
//! second, both via temp file + rename. A crash between the two leaves an
//! orphan snapshot that no reader can reach; the next commit simply takes a
//! higher version.
//!
//! Reads are served from an in-memory map of `Arc<Snapshot>` that is swapped
//! only after the pointer is durable. A cold read loads the pointer, then the
//! file, and refuses to serve anything whose checksum does not match.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlReport, DatasetType, Record, Snapshot, SnapshotMeta, StoreConfig};
use crate::pipeline::{CircuitBreaker, CircuitBreakerConfig, validate_records};
use crate::storage::{DatasetStore, HistoryEntry, LatestPointer};

const ZSTD_LEVEL: i32 = 3;

/// SHA-256 hex over the canonical JSON of a record list.
pub fn checksum(records: &[Record]) -> Result<String> {
    let bytes = serde_json::to_vec(records)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn parse_version(file_name: &str, suffix: &str) -> Option<u64> {
    file_name.strip_prefix('v')?.strip_suffix(suffix)?.parse().ok()
}

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    config: StoreConfig,
    circuit_breaker: CircuitBreaker,
    min_records: HashMap<DatasetType, usize>,
    commit_lock: Mutex<()>,
    latest: RwLock<HashMap<DatasetType, Arc<Snapshot>>>,
}

impl LocalStore {
    /// Open the store, creating the per-dataset layout if needed.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let store = Self {
            root_dir: config.root_dir.clone(),
            config: config.clone(),
            circuit_breaker: CircuitBreaker::with_config(CircuitBreakerConfig {
                max_drop_percent: config.max_drop_percent,
                ..CircuitBreakerConfig::default()
            }),
            min_records: HashMap::new(),
            commit_lock: Mutex::new(()),
            latest: RwLock::new(HashMap::new()),
        };

        for dataset in DatasetType::ALL {
            for dir in ["snapshots", "archive"] {
                tokio::fs::create_dir_all(store.path(&format!("{dataset}/{dir}"))).await?;
            }
        }
        log::debug!("Opened snapshot store at {:?}", store.root_dir);
        Ok(store)
    }

    /// Open the store with each dataset's minimum record count from `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mut store = Self::open(&config.store).await?;
        for dataset in DatasetType::ALL {
            store = store.with_min_records(dataset, config.min_records(dataset));
        }
        Ok(store)
    }

    pub fn with_min_records(mut self, dataset: DatasetType, count: usize) -> Self {
        self.min_records.insert(dataset, count);
        self
    }

    fn min_records(&self, dataset: DatasetType) -> usize {
        self.min_records.get(&dataset).copied().unwrap_or(1)
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn snapshot_key(dataset: DatasetType, version: u64) -> String {
        format!("{dataset}/snapshots/v{version:08}.json")
    }

    fn archive_key(dataset: DatasetType, version: u64) -> String {
        format!("{dataset}/archive/v{version:08}.json.zst")
    }

    fn pointer_key(dataset: DatasetType) -> String {
        format!("{dataset}/LATEST.json")
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn versions_in(&self, dataset: DatasetType, dir: &str, suffix: &str) -> Result<Vec<u64>> {
        let mut entries = match tokio::fs::read_dir(self.path(&format!("{dataset}/{dir}"))).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(version) = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_version(name, suffix))
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Highest version ever written for `dataset`, orphans included.
    async fn last_version(&self, dataset: DatasetType) -> Result<u64> {
        let pointer: Option<LatestPointer> = self.read_json(&Self::pointer_key(dataset)).await?;
        let plain = self.versions_in(dataset, "snapshots", ".json").await?;
        let archived = self.versions_in(dataset, "archive", ".json.zst").await?;
        Ok(pointer
            .map(|p| p.version)
            .into_iter()
            .chain(plain.last().copied())
            .chain(archived.last().copied())
            .max()
            .unwrap_or(0))
    }

    /// Load and verify one version, plain or archived.
    pub async fn load_version(&self, dataset: DatasetType, version: u64) -> Result<Option<Snapshot>> {
        self.load_snapshot(dataset, version, None).await
    }

    async fn load_snapshot(
        &self,
        dataset: DatasetType,
        version: u64,
        expected_checksum: Option<&str>,
    ) -> Result<Option<Snapshot>> {
        let bytes = match self.read_bytes(&Self::snapshot_key(dataset, version)).await? {
            Some(bytes) => bytes,
            None => match self.read_bytes(&Self::archive_key(dataset, version)).await? {
                Some(compressed) => {
                    tokio::task::spawn_blocking(move || zstd::decode_all(compressed.as_slice()))
                        .await
                        .map_err(std::io::Error::other)??
                }
                None => return Ok(None),
            },
        };

        let corrupt = || AppError::SnapshotCorrupt { dataset, version };
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            log::error!("Snapshot {} v{} is unreadable: {}", dataset, version, e);
            corrupt()
        })?;

        let actual = checksum(&snapshot.records)?;
        let expected_ok = expected_checksum.is_none_or(|expected| expected == actual);
        if snapshot.meta.dataset != dataset
            || snapshot.meta.version != version
            || snapshot.meta.checksum != actual
            || !expected_ok
        {
            log::error!(
                "Snapshot {} v{} failed checksum validation (computed {})",
                dataset,
                version,
                actual
            );
            return Err(corrupt());
        }
        Ok(Some(snapshot))
    }

    async fn load_latest(&self, dataset: DatasetType) -> Result<Option<Snapshot>> {
        let Some(pointer) = self
            .read_json::<LatestPointer>(&Self::pointer_key(dataset))
            .await?
        else {
            return Ok(None);
        };
        match self
            .load_snapshot(dataset, pointer.version, Some(&pointer.checksum))
            .await?
        {
            Some(snapshot) => Ok(Some(snapshot)),
            None => {
                log::error!(
                    "LATEST for {} names v{} but {} is missing",
                    dataset,
                    pointer.version,
                    pointer.file
                );
                Err(AppError::SnapshotCorrupt {
                    dataset,
                    version: pointer.version,
                })
            }
        }
    }

    fn cached(&self, dataset: DatasetType) -> Option<Arc<Snapshot>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dataset)
            .cloned()
    }

    /// Cache `snapshot` unless a newer version is already cached; returns
    /// whichever snapshot the cache now serves.
    fn publish(&self, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        match latest.get(&snapshot.dataset()) {
            Some(cached) if cached.meta.version >= snapshot.meta.version => Arc::clone(cached),
            _ => {
                latest.insert(snapshot.dataset(), Arc::clone(&snapshot));
                snapshot
            }
        }
    }

    /// Record-set validation plus the circuit breaker against the previous count.
    async fn check_commit(&self, dataset: DatasetType, records: &[Record]) -> Result<()> {
        validate_records(dataset, records)?;

        let previous = match self.read(dataset).await {
            Ok(previous) => previous,
            Err(err @ AppError::SnapshotCorrupt { .. }) => {
                log::warn!("Ignoring unreadable previous snapshot: {}", err);
                None
            }
            Err(err) => return Err(err),
        };
        self.circuit_breaker.validate(
            records.len(),
            previous.map(|s| s.meta.record_count),
            self.min_records(dataset),
        )
    }

    /// Compress or delete plain snapshots beyond `retain`.
    async fn apply_retention(&self, dataset: DatasetType) -> Result<()> {
        let versions = self.versions_in(dataset, "snapshots", ".json").await?;
        let retain = self.config.retain.max(1);
        if versions.len() <= retain {
            return Ok(());
        }

        for &version in &versions[..versions.len() - retain] {
            let key = Self::snapshot_key(dataset, version);
            if self.config.archive_superseded {
                if let Some(bytes) = self.read_bytes(&key).await? {
                    let compressed = tokio::task::spawn_blocking(move || {
                        zstd::encode_all(bytes.as_slice(), ZSTD_LEVEL)
                    })
                    .await
                    .map_err(std::io::Error::other)??;
                    self.write_bytes(&Self::archive_key(dataset, version), &compressed)
                        .await?;
                    log::debug!("Archived {} v{}", dataset, version);
                }
            }
            tokio::fs::remove_file(self.path(&key)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetStore for LocalStore {
    async fn commit(
        &self,
        dataset: DatasetType,
        mut records: Vec<Record>,
        report: CrawlReport,
    ) -> Result<SnapshotMeta> {
        let _guard = self.commit_lock.lock().await;

        records.sort_by_cached_key(Record::natural_key);
        if let Err(err) = self.check_commit(dataset, &records).await {
            log::error!("Commit rejected for {}: {}", dataset, err);
            return Err(err);
        }

        let version = self.last_version(dataset).await? + 1;
        let meta = SnapshotMeta {
            dataset,
            version,
            committed_at: Utc::now(),
            checksum: checksum(&records)?,
            record_count: records.len(),
            complete: report.is_complete(),
            report,
        };
        let snapshot = Snapshot { meta, records };

        let file = format!("snapshots/v{version:08}.json");
        self.write_json(&Self::snapshot_key(dataset, version), &snapshot)
            .await?;
        let pointer = LatestPointer {
            version,
            checksum: snapshot.meta.checksum.clone(),
            file,
            committed_at: snapshot.meta.committed_at,
        };
        self.write_json(&Self::pointer_key(dataset), &pointer).await?;

        let meta = snapshot.meta.clone();
        self.publish(Arc::new(snapshot));
        log::info!(
            "Committed {} v{} ({} records, checksum {}{})",
            dataset,
            version,
            meta.record_count,
            meta.checksum.get(..12).unwrap_or(&meta.checksum),
            if meta.complete { "" } else { ", incomplete" }
        );

        if let Err(err) = self.apply_retention(dataset).await {
            log::warn!("Retention for {} failed: {}", dataset, err);
        }
        Ok(meta)
    }

    async fn read(&self, dataset: DatasetType) -> Result<Option<Arc<Snapshot>>> {
        if let Some(snapshot) = self.cached(dataset) {
            return Ok(Some(snapshot));
        }
        match self.load_latest(dataset).await? {
            Some(snapshot) => Ok(Some(self.publish(Arc::new(snapshot)))),
            None => Ok(None),
        }
    }

    async fn history(&self, dataset: DatasetType) -> Result<Vec<HistoryEntry>> {
        let plain = self.versions_in(dataset, "snapshots", ".json").await?;
        let archived = self.versions_in(dataset, "archive", ".json.zst").await?;
        let mut entries: Vec<HistoryEntry> = plain
            .into_iter()
            .map(|version| HistoryEntry {
                version,
                archived: false,
            })
            .chain(archived.into_iter().map(|version| HistoryEntry {
                version,
                archived: true,
            }))
            .collect();
        entries.sort_by_key(|e| (e.version, e.archived));
        entries.dedup_by_key(|e| e.version);
        Ok(entries)
    }
}
