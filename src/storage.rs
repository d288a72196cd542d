// Copyright 2025 Cowboy AI, LLC.

//! Storage collaborator seams
//!
//! The workflow engine drives external stores through these traits. Each
//! trait ships with an in-memory implementation for tests and embedding;
//! production deployments back them with a relational store and an object
//! store.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::errors::{DepositError, DepositResult};
use crate::identifiers::{BucketId, DepositId, RecordId};
use crate::model::{Deposit, Record};

/// Bucket quota configuration, passed explicitly rather than read from
/// ambient global state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Total bucket quota in bytes
    pub quota_size: u64,
    /// Maximum single file size in bytes
    pub max_file_size: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            quota_size: 50 * 1024 * 1024 * 1024,
            max_file_size: 50 * 1024 * 1024 * 1024,
        }
    }
}

/// Store for published records
pub trait RecordStore: Send + Sync {
    /// Load a record by id
    fn get(&self, recid: RecordId) -> Option<Record>;

    /// Save a record (insert or replace)
    fn save(&self, record: &Record) -> DepositResult<()>;

    /// Delete a record
    fn delete(&self, recid: RecordId) -> DepositResult<()>;
}

/// Store for mutable deposits
pub trait DepositStore: Send + Sync {
    /// Load a deposit by id
    fn get(&self, id: DepositId) -> Option<Deposit>;

    /// Load the deposit whose reserved record id is `recid`
    fn get_by_recid(&self, recid: RecordId) -> Option<Deposit>;

    /// Save a deposit (insert or replace)
    fn save(&self, deposit: &Deposit) -> DepositResult<()>;

    /// Delete a deposit
    fn delete(&self, id: DepositId) -> DepositResult<()>;
}

/// In-memory record store
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<RecordId, Record>>>,
}

impl InMemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, recid: RecordId) -> Option<Record> {
        self.records.read().ok()?.get(&recid).cloned()
    }

    fn save(&self, record: &Record) -> DepositResult<()> {
        self.records
            .write()
            .map_err(|_| store_poisoned("record-store"))?
            .insert(record.recid, record.clone());
        Ok(())
    }

    fn delete(&self, recid: RecordId) -> DepositResult<()> {
        self.records
            .write()
            .map_err(|_| store_poisoned("record-store"))?
            .remove(&recid)
            .map(|_| ())
            .ok_or_else(|| DepositError::NotFound(format!("record {recid}")))
    }
}

/// In-memory deposit store
#[derive(Clone, Default)]
pub struct InMemoryDepositStore {
    deposits: Arc<RwLock<HashMap<DepositId, Deposit>>>,
}

impl InMemoryDepositStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl DepositStore for InMemoryDepositStore {
    fn get(&self, id: DepositId) -> Option<Deposit> {
        self.deposits.read().ok()?.get(&id).cloned()
    }

    fn get_by_recid(&self, recid: RecordId) -> Option<Deposit> {
        self.deposits
            .read()
            .ok()?
            .values()
            .find(|d| d.recid == recid)
            .cloned()
    }

    fn save(&self, deposit: &Deposit) -> DepositResult<()> {
        self.deposits
            .write()
            .map_err(|_| store_poisoned("deposit-store"))?
            .insert(deposit.id, deposit.clone());
        Ok(())
    }

    fn delete(&self, id: DepositId) -> DepositResult<()> {
        self.deposits
            .write()
            .map_err(|_| store_poisoned("deposit-store"))?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DepositError::NotFound(format!("deposit {id}")))
    }
}

/// An object stored in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketObject {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

/// File bucket service
///
/// A locked bucket is immutable to new writes but may still be read and
/// snapshotted. Snapshots are independent buckets holding copies of the
/// source bucket's objects at the time of the snapshot.
pub trait BucketService: Send + Sync {
    /// Create a new unlocked bucket
    fn create(&self, quota: QuotaConfig) -> DepositResult<BucketId>;

    /// Snapshot a bucket into a fresh bucket, optionally locking the copy
    fn snapshot(&self, bucket: BucketId, lock: bool) -> DepositResult<BucketId>;

    /// Lock a bucket against further writes
    fn lock(&self, bucket: BucketId) -> DepositResult<()>;

    /// Check the lock flag
    fn is_locked(&self, bucket: BucketId) -> DepositResult<bool>;

    /// Permanently remove a bucket and its contents
    fn remove(&self, bucket: BucketId) -> DepositResult<()>;

    /// Write an object into an unlocked bucket
    fn put_object(&self, bucket: BucketId, key: &str, size: u64) -> DepositResult<()>;

    /// List the bucket's objects
    fn objects(&self, bucket: BucketId) -> DepositResult<Vec<BucketObject>>;

    /// Number of incomplete multipart uploads against the bucket
    fn multipart_count(&self, bucket: BucketId) -> DepositResult<usize>;

    /// Begin a multipart upload (left incomplete until aborted or finished)
    fn start_multipart(&self, bucket: BucketId, key: &str) -> DepositResult<()>;

    /// Abort all incomplete multipart uploads against the bucket
    fn abort_multiparts(&self, bucket: BucketId) -> DepositResult<()>;
}

#[derive(Debug, Clone, Default)]
struct BucketState {
    locked: bool,
    objects: IndexMap<String, u64>,
    multiparts: Vec<String>,
}

/// In-memory bucket service
#[derive(Clone, Default)]
pub struct InMemoryBucketService {
    buckets: Arc<RwLock<HashMap<BucketId, BucketState>>>,
}

impl InMemoryBucketService {
    /// Create an empty bucket service
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bucket<T>(
        &self,
        bucket: BucketId,
        f: impl FnOnce(&mut BucketState) -> DepositResult<T>,
    ) -> DepositResult<T> {
        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| store_poisoned("bucket-service"))?;
        let state = buckets
            .get_mut(&bucket)
            .ok_or_else(|| DepositError::NotFound(format!("bucket {bucket}")))?;
        f(state)
    }
}

impl BucketService for InMemoryBucketService {
    fn create(&self, _quota: QuotaConfig) -> DepositResult<BucketId> {
        let id = BucketId::new();
        self.buckets
            .write()
            .map_err(|_| store_poisoned("bucket-service"))?
            .insert(id, BucketState::default());
        debug!(bucket = %id, "created bucket");
        Ok(id)
    }

    fn snapshot(&self, bucket: BucketId, lock: bool) -> DepositResult<BucketId> {
        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| store_poisoned("bucket-service"))?;
        let objects = buckets
            .get(&bucket)
            .ok_or_else(|| DepositError::NotFound(format!("bucket {bucket}")))?
            .objects
            .clone();
        let id = BucketId::new();
        buckets.insert(
            id,
            BucketState {
                locked: lock,
                objects,
                multiparts: Vec::new(),
            },
        );
        debug!(source = %bucket, snapshot = %id, lock, "snapshotted bucket");
        Ok(id)
    }

    fn lock(&self, bucket: BucketId) -> DepositResult<()> {
        self.with_bucket(bucket, |state| {
            state.locked = true;
            Ok(())
        })
    }

    fn is_locked(&self, bucket: BucketId) -> DepositResult<bool> {
        self.with_bucket(bucket, |state| Ok(state.locked))
    }

    fn remove(&self, bucket: BucketId) -> DepositResult<()> {
        self.buckets
            .write()
            .map_err(|_| store_poisoned("bucket-service"))?
            .remove(&bucket)
            .map(|_| ())
            .ok_or_else(|| DepositError::NotFound(format!("bucket {bucket}")))
    }

    fn put_object(&self, bucket: BucketId, key: &str, size: u64) -> DepositResult<()> {
        self.with_bucket(bucket, |state| {
            if state.locked {
                return Err(DepositError::invalid_state("Locked", "put_object"));
            }
            state.objects.insert(key.to_string(), size);
            Ok(())
        })
    }

    fn objects(&self, bucket: BucketId) -> DepositResult<Vec<BucketObject>> {
        self.with_bucket(bucket, |state| {
            Ok(state
                .objects
                .iter()
                .map(|(key, size)| BucketObject {
                    key: key.clone(),
                    size: *size,
                })
                .collect())
        })
    }

    fn multipart_count(&self, bucket: BucketId) -> DepositResult<usize> {
        self.with_bucket(bucket, |state| Ok(state.multiparts.len()))
    }

    fn start_multipart(&self, bucket: BucketId, key: &str) -> DepositResult<()> {
        self.with_bucket(bucket, |state| {
            if state.locked {
                return Err(DepositError::invalid_state("Locked", "start_multipart"));
            }
            state.multiparts.push(key.to_string());
            Ok(())
        })
    }

    fn abort_multiparts(&self, bucket: BucketId) -> DepositResult<()> {
        self.with_bucket(bucket, |state| {
            state.multiparts.clear();
            Ok(())
        })
    }
}

/// Fire-and-forget asynchronous task runner
///
/// At-least-once delivery, no ordering guarantee across invocations, so
/// every enqueued task must be idempotent.
pub trait TaskRunner: Send + Sync {
    /// Enqueue a task by name with JSON arguments
    fn enqueue(&self, task: &str, args: Value) -> DepositResult<()>;
}

/// Task names dispatched by the lifecycle engine
pub mod tasks {
    /// Re-project every chain sibling to the search index
    pub const INDEX_SIBLINGS: &str = "index-siblings";
    /// Register a DOI with the external registration agency
    pub const DATACITE_REGISTER: &str = "datacite-register";
}

/// Task runner that records enqueued tasks for test verification
#[derive(Clone, Default)]
pub struct RecordingTaskRunner {
    enqueued: Arc<RwLock<Vec<(String, Value)>>>,
}

impl RecordingTaskRunner {
    /// Create a new recording task runner
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all enqueued tasks for verification
    pub fn enqueued(&self) -> Vec<(String, Value)> {
        self.enqueued.read().map(|v| v.clone()).unwrap_or_default()
    }

    /// Count enqueues of a given task name
    pub fn count(&self, task: &str) -> usize {
        self.enqueued().iter().filter(|(t, _)| t == task).count()
    }
}

impl TaskRunner for RecordingTaskRunner {
    fn enqueue(&self, task: &str, args: Value) -> DepositResult<()> {
        self.enqueued
            .write()
            .map_err(|_| store_poisoned("task-runner"))?
            .push((task.to_string(), args));
        Ok(())
    }
}

/// Usage statistics source
///
/// Queries may fail; the index projection builder swallows failures and
/// omits the corresponding fields.
pub trait StatisticsSource: Send + Sync {
    /// Run a named query with parameters
    fn run_query(&self, name: &str, params: &Value) -> DepositResult<Value>;
}

/// Statistics source returning fixed responses per query name
#[derive(Clone, Default)]
pub struct FixedStatisticsSource {
    responses: Arc<RwLock<HashMap<String, Value>>>,
}

impl FixedStatisticsSource {
    /// Create an empty source (every query fails as not found)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the response for a query name
    pub fn set(&self, name: &str, response: Value) {
        if let Ok(mut responses) = self.responses.write() {
            responses.insert(name.to_string(), response);
        }
    }

    /// Remove a query's response so it fails again
    pub fn unset(&self, name: &str) {
        if let Ok(mut responses) = self.responses.write() {
            responses.remove(name);
        }
    }
}

impl StatisticsSource for FixedStatisticsSource {
    fn run_query(&self, name: &str, _params: &Value) -> DepositResult<Value> {
        self.responses
            .read()
            .ok()
            .and_then(|r| r.get(name).cloned())
            .ok_or_else(|| DepositError::NotFound(format!("statistics query {name}")))
    }
}

fn store_poisoned(service: &str) -> DepositError {
    DepositError::ExternalService {
        service: service.to_string(),
        message: "lock poisoned".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_create_put_list() {
        let service = InMemoryBucketService::new();
        let bucket = service.create(QuotaConfig::default()).unwrap();

        service.put_object(bucket, "data.csv", 100).unwrap();
        service.put_object(bucket, "paper.pdf", 2000).unwrap();

        let objects = service.objects(bucket).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "data.csv");
    }

    #[test]
    fn test_locked_bucket_rejects_writes() {
        let service = InMemoryBucketService::new();
        let bucket = service.create(QuotaConfig::default()).unwrap();
        service.put_object(bucket, "data.csv", 100).unwrap();
        service.lock(bucket).unwrap();

        let err = service.put_object(bucket, "more.csv", 1).unwrap_err();
        assert!(matches!(err, DepositError::InvalidState { .. }));

        // Locked buckets may still be read and snapshotted
        assert_eq!(service.objects(bucket).unwrap().len(), 1);
        let snapshot = service.snapshot(bucket, false).unwrap();
        assert_eq!(service.objects(snapshot).unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let service = InMemoryBucketService::new();
        let bucket = service.create(QuotaConfig::default()).unwrap();
        service.put_object(bucket, "data.csv", 100).unwrap();

        let snapshot = service.snapshot(bucket, true).unwrap();
        assert!(service.is_locked(snapshot).unwrap());
        assert!(!service.is_locked(bucket).unwrap());

        // Writes to the source do not appear in the snapshot
        service.put_object(bucket, "late.csv", 5).unwrap();
        assert_eq!(service.objects(snapshot).unwrap().len(), 1);
    }

    #[test]
    fn test_multipart_tracking() {
        let service = InMemoryBucketService::new();
        let bucket = service.create(QuotaConfig::default()).unwrap();

        service.start_multipart(bucket, "big.bin").unwrap();
        assert_eq!(service.multipart_count(bucket).unwrap(), 1);

        service.abort_multiparts(bucket).unwrap();
        assert_eq!(service.multipart_count(bucket).unwrap(), 0);
    }

    #[test]
    fn test_bucket_remove() {
        let service = InMemoryBucketService::new();
        let bucket = service.create(QuotaConfig::default()).unwrap();
        service.remove(bucket).unwrap();

        assert!(service.objects(bucket).unwrap_err().is_not_found());
        assert!(service.remove(bucket).unwrap_err().is_not_found());
    }

    #[test]
    fn test_recording_task_runner() {
        let runner = RecordingTaskRunner::new();
        runner
            .enqueue(tasks::INDEX_SIBLINGS, serde_json::json!({"conceptrecid": 1}))
            .unwrap();
        runner
            .enqueue(tasks::INDEX_SIBLINGS, serde_json::json!({"conceptrecid": 2}))
            .unwrap();

        assert_eq!(runner.count(tasks::INDEX_SIBLINGS), 2);
        assert_eq!(runner.count(tasks::DATACITE_REGISTER), 0);
    }

    #[test]
    fn test_fixed_statistics_source() {
        let source = FixedStatisticsSource::new();
        source.set("record-view", serde_json::json!({"count": 7}));

        let result = source
            .run_query("record-view", &serde_json::json!({"recid": 1}))
            .unwrap();
        assert_eq!(result["count"], 7);

        assert!(source
            .run_query("record-download", &serde_json::json!({}))
            .unwrap_err()
            .is_not_found());
    }
}
