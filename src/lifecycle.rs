// Copyright 2025 Cowboy AI, LLC.

//! Deposit lifecycle engine
//!
//! The top-level state machine over a deposit: create, edit, publish,
//! delete, new-version and concept-DOI registration. Drives the version
//! chain manager and the community synchronizer and commits through the
//! storage collaborator seams.
//!
//! Single-record updates happen within one store write; propagation
//! across chain siblings is sequential and not atomic (see
//! [`crate::communities`]). Index re-projection and external DOI
//! registration are dispatched as fire-and-forget tasks after the owning
//! commit.

use indexmap::IndexSet;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::communities::{CommunityDirectory, CommunityPolicy, CommunitySynchronizer, InclusionRequests};
use crate::errors::{DepositError, DepositResult};
use crate::events::{DepositEvent, EventPublisher};
use crate::identifiers::{ConceptId, DepositId, Doi, PidStatus, PidType, RecordId, UserId};
use crate::model::{
    Deposit, DepositState, FileEntry, Record, RecordBuckets, PROTECTED_FIELDS,
};
use crate::registry::PidRegistry;
use crate::storage::{tasks, BucketService, DepositStore, QuotaConfig, RecordStore, TaskRunner};
use crate::version_chain::VersionChainManager;

/// Metadata keys dropped when seeding a new version from the latest record
const NEW_VERSION_DROPPED_KEYS: &[&str] =
    &["_deposit", "doi", "_oai", "_files", "_buckets", "$schema"];

/// Immutable engine configuration, passed in at construction
#[derive(Debug, Clone, Default)]
pub struct LifecycleConfig {
    /// Bucket quota for newly created deposits
    pub quota: QuotaConfig,
    /// Community auto-accept / auto-request policy
    pub community_policy: CommunityPolicy,
    /// Whether to enqueue external DOI registration tasks
    pub datacite_enabled: bool,
}

/// The deposit lifecycle engine
pub struct DepositLifecycle {
    registry: Arc<dyn PidRegistry>,
    chains: VersionChainManager,
    records: Arc<dyn RecordStore>,
    deposits: Arc<dyn DepositStore>,
    buckets: Arc<dyn BucketService>,
    directory: Arc<dyn CommunityDirectory>,
    synchronizer: CommunitySynchronizer,
    tasks: Arc<dyn TaskRunner>,
    events: Arc<dyn EventPublisher>,
    config: LifecycleConfig,
}

impl DepositLifecycle {
    /// Create an engine over the shared collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn PidRegistry>,
        chains: VersionChainManager,
        records: Arc<dyn RecordStore>,
        deposits: Arc<dyn DepositStore>,
        buckets: Arc<dyn BucketService>,
        directory: Arc<dyn CommunityDirectory>,
        requests: InclusionRequests,
        tasks: Arc<dyn TaskRunner>,
        events: Arc<dyn EventPublisher>,
        config: LifecycleConfig,
    ) -> Self {
        let synchronizer = CommunitySynchronizer::new(
            directory.clone(),
            requests,
            records.clone(),
            deposits.clone(),
            chains.clone(),
        );
        Self {
            registry,
            chains,
            records,
            deposits,
            buckets,
            directory,
            synchronizer,
            tasks,
            events,
            config,
        }
    }

    /// Access the community synchronizer (inclusion request queries)
    pub fn synchronizer(&self) -> &CommunitySynchronizer {
        &self.synchronizer
    }

    /// Access the version chain manager
    pub fn chains(&self) -> &VersionChainManager {
        &self.chains
    }

    /// Create a new deposit draft
    ///
    /// Allocates a concept id and record id (adjacent values from the
    /// registry), a deposit id and an empty working bucket, and registers
    /// the reserved record id as the chain's draft child.
    pub fn create(
        &self,
        owners: Vec<UserId>,
        metadata: serde_json::Map<String, serde_json::Value>,
        communities: IndexSet<crate::identifiers::CommunityId>,
    ) -> DepositResult<Deposit> {
        let concept_pid = self.registry.allocate(PidType::Recid)?;
        let recid_pid = self.registry.allocate(PidType::Recid)?;
        let depid_pid = self.registry.allocate(PidType::Depid)?;

        let conceptrecid = ConceptId::new(concept_pid.value);
        let recid = RecordId::new(recid_pid.value);
        let id = DepositId::new(depid_pid.value);

        let bucket = self.buckets.create(self.config.quota)?;
        self.chains.insert_draft_child(conceptrecid, recid)?;

        let now = chrono::Utc::now();
        let mut deposit = Deposit {
            id,
            recid,
            conceptrecid,
            owners,
            state: DepositState::DraftNew,
            metadata: serde_json::Map::new(),
            communities: None,
            doi: None,
            conceptdoi: None,
            published_recid: None,
            bucket: Some(bucket),
            created_at: now,
            updated_at: now,
        };
        deposit.apply_editor_metadata(metadata);
        deposit.set_communities(communities);
        self.deposits.save(&deposit)?;

        info!(deposit = %id, %recid, %conceptrecid, "created deposit");
        self.publish_event(DepositEvent::Created {
            deposit: id,
            recid,
            conceptrecid,
        });
        Ok(deposit)
    }

    /// Validate a deposit for publication
    ///
    /// Runs fully before the first write: a failing deposit is left
    /// completely untouched.
    pub fn validate_publish(&self, deposit: &Deposit) -> DepositResult<()> {
        let bucket = deposit.bucket.ok_or(DepositError::MissingFiles)?;

        if self.buckets.objects(bucket)?.is_empty() {
            return Err(DepositError::MissingFiles);
        }
        if self.buckets.multipart_count(bucket)? != 0 {
            return Err(DepositError::OngoingUpload);
        }

        let missing: Vec<_> = deposit
            .communities_set()
            .iter()
            .filter(|c| self.directory.get(c).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(DepositError::MissingCommunities(missing));
        }
        Ok(())
    }

    /// Publish a deposit: first publication of a new draft, or commit of
    /// an open edit of an already published record
    pub fn publish(&self, id: DepositId) -> DepositResult<(Deposit, Record)> {
        let deposit = self.load_deposit(id)?;
        if !deposit.state.can_transition_to(&DepositState::Published) {
            return Err(DepositError::invalid_state(deposit.state.name(), "publish"));
        }
        self.validate_publish(&deposit)?;

        match deposit.state {
            DepositState::DraftNew => self.publish_new(deposit),
            DepositState::DraftEditing => self.publish_edited(deposit),
            _ => Err(DepositError::invalid_state(deposit.state.name(), "publish")),
        }
    }

    fn publish_new(&self, mut deposit: Deposit) -> DepositResult<(Deposit, Record)> {
        let recid = deposit.recid;
        let conceptrecid = deposit.conceptrecid;
        let bucket = deposit.bucket.ok_or(DepositError::MissingFiles)?;

        // Previous communities come from the latest published sibling,
        // before this draft is promoted; empty on a chain's first publish.
        let previous_communities = match self.chains.last_child(conceptrecid) {
            Some(prev) => self
                .records
                .get(prev)
                .map(|r| r.communities_set())
                .unwrap_or_default(),
            None => IndexSet::new(),
        };

        self.buckets.lock(bucket)?;
        let snapshot = self.buckets.snapshot(bucket, true)?;
        let files = self.file_manifest(snapshot)?;

        let doi = deposit
            .doi
            .clone()
            .unwrap_or_else(|| Doi::for_record(recid));

        let now = chrono::Utc::now();
        let mut record = Record {
            recid,
            conceptrecid,
            // Owners are snapshotted at publish time
            owners: deposit.owners.clone(),
            revision: 0,
            metadata: deposit.metadata.clone(),
            communities: None,
            files,
            buckets: Some(RecordBuckets {
                deposit: Some(bucket),
                record: Some(snapshot),
            }),
            oai: None,
            internal: None,
            doi: Some(doi.clone()),
            conceptdoi: deposit.conceptdoi.clone(),
            created_at: now,
            updated_at: now,
        };

        self.chains.promote_draft_child(conceptrecid)?;

        let plan = self.synchronizer.plan(
            &deposit,
            &record,
            &previous_communities,
            &self.config.community_policy,
        );
        self.synchronizer.apply(&plan, &mut deposit, &mut record)?;

        self.records.save(&record)?;
        self.registry.mark_registered(PidType::Recid, recid.value())?;
        self.registry.mark_registered(PidType::Depid, deposit.id.value())?;

        self.chains.update_redirect(conceptrecid)?;
        self.registry
            .mark_redirected(PidType::Recid, conceptrecid.value())?;

        // The deposit no longer is the draft; it now tracks the record
        deposit.state = DepositState::Published;
        deposit.published_recid = Some(recid);
        deposit.doi = Some(doi);
        deposit.touch();
        self.deposits.save(&deposit)?;

        info!(deposit = %deposit.id, %recid, %conceptrecid, "published deposit");
        self.enqueue_sibling_reindex(conceptrecid);
        self.publish_event(DepositEvent::Published {
            deposit: deposit.id,
            recid,
            revision: record.revision,
        });
        Ok((deposit, record))
    }

    fn publish_edited(&self, mut deposit: Deposit) -> DepositResult<(Deposit, Record)> {
        let recid = deposit
            .published_recid
            .ok_or_else(|| DepositError::invalid_state(deposit.state.name(), "publish"))?;
        let previous = self
            .records
            .get(recid)
            .ok_or_else(|| DepositError::NotFound(format!("record {recid}")))?;
        // The record's own pre-edit state, not a sibling
        let previous_communities = previous.communities_set();

        let mut metadata = deposit.metadata.clone();
        for key in PROTECTED_FIELDS {
            metadata.remove(*key);
        }

        let doi = deposit
            .doi
            .clone()
            .unwrap_or_else(|| Doi::for_record(recid));

        let mut record = Record {
            recid,
            conceptrecid: deposit.conceptrecid,
            owners: deposit.owners.clone(),
            revision: previous.revision + 1,
            metadata,
            communities: None,
            // Record-only fields survive the edit regardless of the
            // editor's payload
            files: previous.files.clone(),
            buckets: previous.buckets,
            oai: previous.oai.clone(),
            internal: previous.internal.clone(),
            doi: Some(doi.clone()),
            conceptdoi: previous.conceptdoi.clone(),
            created_at: previous.created_at,
            updated_at: chrono::Utc::now(),
        };

        let plan = self.synchronizer.plan(
            &deposit,
            &record,
            &previous_communities,
            &self.config.community_policy,
        );
        self.synchronizer.apply(&plan, &mut deposit, &mut record)?;

        self.records.save(&record)?;

        deposit.state = DepositState::Published;
        deposit.doi = Some(doi);
        deposit.touch();
        self.deposits.save(&deposit)?;

        info!(deposit = %deposit.id, %recid, revision = record.revision, "published edited deposit");
        self.enqueue_sibling_reindex(deposit.conceptrecid);
        self.publish_event(DepositEvent::Published {
            deposit: deposit.id,
            recid,
            revision: record.revision,
        });
        Ok((deposit, record))
    }

    /// Check a published record out for editing
    ///
    /// Copies the record's fields back into the deposit (protected fields
    /// preserved) and extends the editable communities with every pending
    /// inclusion request against this record, deduplicated and sorted.
    pub fn edit(&self, id: DepositId) -> DepositResult<Deposit> {
        let mut deposit = self.load_deposit(id)?;
        if !deposit.state.can_transition_to(&DepositState::DraftEditing) {
            return Err(DepositError::invalid_state(deposit.state.name(), "edit"));
        }
        let recid = deposit
            .published_recid
            .ok_or_else(|| DepositError::invalid_state(deposit.state.name(), "edit"))?;
        let record = self
            .records
            .get(recid)
            .ok_or_else(|| DepositError::NotFound(format!("record {recid}")))?;

        let mut metadata = record.metadata.clone();
        for key in PROTECTED_FIELDS {
            metadata.remove(*key);
        }
        deposit.metadata = metadata;

        let mut communities = record.communities_set();
        for pending in self.synchronizer.requests().for_record(recid) {
            communities.insert(pending);
        }
        deposit.set_communities(communities);

        deposit.state = DepositState::DraftEditing;
        deposit.doi = record.doi.clone();
        deposit.touch();
        self.deposits.save(&deposit)?;

        info!(deposit = %id, %recid, "opened deposit for editing");
        self.publish_event(DepositEvent::EditOpened {
            deposit: id,
            recid,
        });
        Ok(deposit)
    }

    /// Delete a deposit
    ///
    /// Published deposits are only deletable with the explicit
    /// `delete_published` override. Releases the draft-child slot, the
    /// working bucket and any identifiers never promoted past reserved.
    pub fn delete(&self, id: DepositId, delete_published: bool) -> DepositResult<()> {
        let deposit = self.load_deposit(id)?;
        if deposit.state.is_terminal() {
            return Err(DepositError::invalid_state(deposit.state.name(), "delete"));
        }
        if deposit.is_published() && !delete_published {
            return Err(DepositError::invalid_state(deposit.state.name(), "delete"));
        }

        let conceptrecid = deposit.conceptrecid;
        if self.chains.draft_child(conceptrecid) == Some(deposit.recid) {
            self.chains.remove_draft_child(conceptrecid)?;
        }
        if self.chains.last_child(conceptrecid).is_some() {
            self.enqueue_sibling_reindex(conceptrecid);
        }

        // The record-bucket link is severed with the deposit row; only
        // then is the bucket (with any incomplete uploads) removed.
        if let Some(bucket) = deposit.bucket {
            self.buckets.abort_multiparts(bucket)?;
            self.buckets.remove(bucket)?;
        }

        self.registry.delete(PidType::Depid, deposit.id.value())?;
        self.delete_if_reserved(PidType::Recid, deposit.recid.value())?;
        self.delete_if_reserved(PidType::Recid, conceptrecid.value())?;

        self.deposits.delete(id)?;

        info!(deposit = %id, "deleted deposit");
        self.publish_event(DepositEvent::Deleted { deposit: id });
        Ok(())
    }

    /// Create a new version draft in the deposit's chain
    ///
    /// Copies the latest published record minus identifier, deposit, file
    /// and OAI fields; carries over the latest deposit's communities; and
    /// snapshots the latest record's bucket unlocked so the new draft can
    /// add and remove files independently.
    pub fn new_version(&self, id: DepositId) -> DepositResult<Deposit> {
        let deposit = self.load_deposit(id)?;
        if !deposit.is_published() {
            return Err(DepositError::invalid_state(deposit.state.name(), "newversion"));
        }
        let conceptrecid = deposit.conceptrecid;
        if self.chains.draft_child(conceptrecid).is_some() {
            return Err(DepositError::invalid_state(deposit.state.name(), "newversion"));
        }

        let latest_recid = self
            .chains
            .last_child(conceptrecid)
            .ok_or_else(|| DepositError::NotFound(format!("published version for {conceptrecid}")))?;
        let latest = self
            .records
            .get(latest_recid)
            .ok_or_else(|| DepositError::NotFound(format!("record {latest_recid}")))?;

        // Externally managed identifiers cannot be auto-versioned
        let locally_managed = latest
            .doi
            .as_ref()
            .map(|d| d.is_locally_managed())
            .unwrap_or(false);
        if !locally_managed {
            return Err(DepositError::invalid_state(deposit.state.name(), "newversion"));
        }

        let latest_deposit = self.deposits.get_by_recid(latest_recid);
        let carried_communities = latest_deposit
            .map(|d| d.communities_set())
            .unwrap_or_default();

        let recid_pid = self.registry.allocate(PidType::Recid)?;
        let depid_pid = self.registry.allocate(PidType::Depid)?;
        let new_recid = RecordId::new(recid_pid.value);
        let new_depid = DepositId::new(depid_pid.value);

        // A lost draft-slot race surfaces as an invalid state
        if let Err(err) = self.chains.insert_draft_child(conceptrecid, new_recid) {
            if err.is_conflict() {
                return Err(DepositError::invalid_state(
                    deposit.state.name(),
                    "newversion",
                ));
            }
            return Err(err);
        }

        let source_bucket = latest
            .buckets
            .and_then(|b| b.record)
            .ok_or_else(|| DepositError::NotFound(format!("bucket for record {latest_recid}")))?;
        let snapshot = self.buckets.snapshot(source_bucket, false)?;

        let mut metadata = latest.metadata.clone();
        for key in NEW_VERSION_DROPPED_KEYS {
            metadata.remove(*key);
        }

        let now = chrono::Utc::now();
        let mut new_deposit = Deposit {
            id: new_depid,
            recid: new_recid,
            conceptrecid,
            owners: latest.owners.clone(),
            state: DepositState::DraftNew,
            metadata,
            communities: None,
            // Pre-fill the local DOI so the draft cannot drift to a
            // custom identifier
            doi: Some(Doi::for_record(new_recid)),
            conceptdoi: latest.conceptdoi.clone(),
            published_recid: None,
            bucket: Some(snapshot),
            created_at: now,
            updated_at: now,
        };
        new_deposit.set_communities(carried_communities);
        self.deposits.save(&new_deposit)?;

        info!(deposit = %new_depid, recid = %new_recid, %conceptrecid, "created new version draft");
        self.enqueue_sibling_reindex(conceptrecid);
        self.publish_event(DepositEvent::NewVersionCreated {
            deposit: new_depid,
            recid: new_recid,
            conceptrecid,
        });
        Ok(new_deposit)
    }

    /// Mint and bind the concept DOI for a published deposit
    ///
    /// When external registration is enabled the actual registration runs
    /// as an at-least-once asynchronous task.
    pub fn register_concept_doi(&self, id: DepositId) -> DepositResult<Deposit> {
        let mut deposit = self.load_deposit(id)?;
        if !deposit.is_published() {
            let self_managed = deposit
                .doi
                .as_ref()
                .map(|d| d.is_locally_managed())
                .unwrap_or(true);
            if self_managed {
                return Err(DepositError::invalid_state(
                    deposit.state.name(),
                    "registerconceptdoi",
                ));
            }
        }
        let recid = deposit
            .published_recid
            .ok_or_else(|| DepositError::NotFound(format!("published record for deposit {id}")))?;
        let mut record = self
            .records
            .get(recid)
            .ok_or_else(|| DepositError::NotFound(format!("record {recid}")))?;

        let conceptdoi = Doi::for_concept(deposit.conceptrecid);
        record.conceptdoi = Some(conceptdoi.clone());
        record.updated_at = chrono::Utc::now();
        self.records.save(&record)?;

        deposit.conceptdoi = Some(conceptdoi.clone());
        deposit.touch();
        self.deposits.save(&deposit)?;

        if self.config.datacite_enabled {
            if let Err(err) = self.tasks.enqueue(
                tasks::DATACITE_REGISTER,
                json!({ "recid": recid.value(), "doi": conceptdoi.as_str() }),
            ) {
                warn!(%err, "failed to enqueue DOI registration task");
            }
        }

        info!(deposit = %id, conceptdoi = %conceptdoi, "registered concept DOI");
        self.publish_event(DepositEvent::ConceptDoiRegistered {
            deposit: id,
            conceptdoi,
        });
        Ok(deposit)
    }

    fn load_deposit(&self, id: DepositId) -> DepositResult<Deposit> {
        self.deposits
            .get(id)
            .ok_or_else(|| DepositError::NotFound(format!("deposit {id}")))
    }

    fn file_manifest(&self, snapshot: crate::identifiers::BucketId) -> DepositResult<Vec<FileEntry>> {
        Ok(self
            .buckets
            .objects(snapshot)?
            .into_iter()
            .map(|o| FileEntry {
                key: o.key,
                size: o.size,
                bucket: snapshot,
            })
            .collect())
    }

    fn delete_if_reserved(&self, pid_type: PidType, value: u64) -> DepositResult<()> {
        if let Some(pid) = self.registry.resolve(pid_type, value) {
            if pid.status == PidStatus::Reserved {
                self.registry.delete(pid_type, value)?;
            }
        }
        Ok(())
    }

    fn enqueue_sibling_reindex(&self, conceptrecid: ConceptId) {
        if let Err(err) = self.tasks.enqueue(
            tasks::INDEX_SIBLINGS,
            json!({ "conceptrecid": conceptrecid.value() }),
        ) {
            warn!(%conceptrecid, %err, "failed to enqueue sibling re-indexing");
        }
    }

    fn publish_event(&self, event: DepositEvent) {
        if let Err(err) = self.events.publish(event) {
            warn!(%err, "failed to publish deposit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communities::InMemoryCommunityDirectory;
    use crate::events::RecordingEventPublisher;
    use crate::registry::InMemoryPidRegistry;
    use crate::storage::{
        InMemoryBucketService, InMemoryDepositStore, InMemoryRecordStore, RecordingTaskRunner,
    };

    struct Harness {
        engine: DepositLifecycle,
        buckets: Arc<InMemoryBucketService>,
        tasks: Arc<RecordingTaskRunner>,
        events: Arc<RecordingEventPublisher>,
    }

    fn harness(config: LifecycleConfig) -> Harness {
        let buckets = Arc::new(InMemoryBucketService::new());
        let tasks = Arc::new(RecordingTaskRunner::new());
        let events = Arc::new(RecordingEventPublisher::new());
        let directory = Arc::new(InMemoryCommunityDirectory::new());
        let engine = DepositLifecycle::new(
            Arc::new(InMemoryPidRegistry::new()),
            VersionChainManager::new(),
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryDepositStore::new()),
            buckets.clone(),
            directory,
            InclusionRequests::new(),
            tasks.clone(),
            events.clone(),
            config,
        );
        Harness {
            engine,
            buckets,
            tasks,
            events,
        }
    }

    #[test]
    fn test_create_registers_draft_child() {
        let h = harness(LifecycleConfig::default());
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();

        assert_eq!(deposit.state, DepositState::DraftNew);
        assert_eq!(
            h.engine.chains().draft_child(deposit.conceptrecid),
            Some(deposit.recid)
        );
        // Concept id and record id are adjacent allocations
        assert_eq!(deposit.recid.value(), deposit.conceptrecid.value() + 1);
        assert_eq!(h.events.event_types(), vec!["DepositCreated"]);
    }

    #[test]
    fn test_publish_without_files_makes_no_writes() {
        let h = harness(LifecycleConfig::default());
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();

        let err = h.engine.publish(deposit.id).unwrap_err();
        assert!(matches!(err, DepositError::MissingFiles));

        // Still an unpublished draft, bucket still unlocked
        let reloaded = h.engine.load_deposit(deposit.id).unwrap();
        assert_eq!(reloaded.state, DepositState::DraftNew);
        assert!(!h.buckets.is_locked(deposit.bucket.unwrap()).unwrap());
        assert_eq!(h.tasks.count(tasks::INDEX_SIBLINGS), 0);
    }

    #[test]
    fn test_publish_with_ongoing_upload_fails() {
        let h = harness(LifecycleConfig::default());
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();
        let bucket = deposit.bucket.unwrap();
        h.buckets.put_object(bucket, "data.csv", 10).unwrap();
        h.buckets.start_multipart(bucket, "big.bin").unwrap();

        let err = h.engine.publish(deposit.id).unwrap_err();
        assert!(matches!(err, DepositError::OngoingUpload));
    }

    #[test]
    fn test_publish_unknown_community_fails() {
        let h = harness(LifecycleConfig::default());
        let mut communities = IndexSet::new();
        communities.insert(crate::identifiers::CommunityId::new("nonexistent"));
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), communities)
            .unwrap();
        h.buckets
            .put_object(deposit.bucket.unwrap(), "data.csv", 10)
            .unwrap();

        let err = h.engine.publish(deposit.id).unwrap_err();
        match err {
            DepositError::MissingCommunities(ids) => {
                assert_eq!(ids, vec![crate::identifiers::CommunityId::new("nonexistent")]);
            }
            other => panic!("expected MissingCommunities, got {other}"),
        }
    }

    #[test]
    fn test_first_publish_locks_bucket_and_redirects() {
        let h = harness(LifecycleConfig::default());
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();
        let bucket = deposit.bucket.unwrap();
        h.buckets.put_object(bucket, "data.csv", 10).unwrap();

        let (published, record) = h.engine.publish(deposit.id).unwrap();

        assert_eq!(published.state, DepositState::Published);
        assert_eq!(published.published_recid, Some(record.recid));
        assert!(h.buckets.is_locked(bucket).unwrap());
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.revision, 0);
        assert!(record.doi.as_ref().unwrap().is_locally_managed());

        let chain = h.engine.chains().chain(deposit.conceptrecid).unwrap();
        assert_eq!(chain.draft_child(), None);
        assert_eq!(chain.last_child(), Some(record.recid));
        assert_eq!(chain.redirect(), Some(record.recid));
        assert_eq!(h.tasks.count(tasks::INDEX_SIBLINGS), 1);
    }

    #[test]
    fn test_delete_published_requires_override() {
        let h = harness(LifecycleConfig::default());
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();
        h.buckets
            .put_object(deposit.bucket.unwrap(), "data.csv", 10)
            .unwrap();
        h.engine.publish(deposit.id).unwrap();

        let err = h.engine.delete(deposit.id, false).unwrap_err();
        assert!(matches!(err, DepositError::InvalidState { .. }));

        h.engine.delete(deposit.id, true).unwrap();
        assert!(h.engine.load_deposit(deposit.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_new_version_requires_publication() {
        let h = harness(LifecycleConfig::default());
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();

        let err = h.engine.new_version(deposit.id).unwrap_err();
        assert!(matches!(err, DepositError::InvalidState { .. }));
    }

    #[test]
    fn test_register_concept_doi_unpublished_fails() {
        let h = harness(LifecycleConfig::default());
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();

        let err = h.engine.register_concept_doi(deposit.id).unwrap_err();
        assert!(matches!(err, DepositError::InvalidState { .. }));
    }

    #[test]
    fn test_register_concept_doi_enqueues_when_enabled() {
        let h = harness(LifecycleConfig {
            datacite_enabled: true,
            ..LifecycleConfig::default()
        });
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();
        h.buckets
            .put_object(deposit.bucket.unwrap(), "data.csv", 10)
            .unwrap();
        h.engine.publish(deposit.id).unwrap();

        let updated = h.engine.register_concept_doi(deposit.id).unwrap();
        assert!(updated.conceptdoi.is_some());
        assert_eq!(h.tasks.count(tasks::DATACITE_REGISTER), 1);
    }

    #[test]
    fn test_register_concept_doi_without_datacite_skips_task() {
        let h = harness(LifecycleConfig::default());
        let deposit = h
            .engine
            .create(vec![UserId::new(1)], serde_json::Map::new(), IndexSet::new())
            .unwrap();
        h.buckets
            .put_object(deposit.bucket.unwrap(), "data.csv", 10)
            .unwrap();
        h.engine.publish(deposit.id).unwrap();

        h.engine.register_concept_doi(deposit.id).unwrap();
        assert_eq!(h.tasks.count(tasks::DATACITE_REGISTER), 0);
    }
}
