// Copyright 2025 Cowboy AI, LLC.

//! Community membership synchronization
//!
//! Publishing or editing a deposit reconciles the editor's declared
//! communities against the communities already accepted on the record.
//! The reconciled sets are then propagated to every sibling version in
//! the chain, inclusion requests are created for the still-pending
//! communities and obsolete requests are retracted.
//!
//! Reconciliation itself is a pure function of its inputs; application is
//! an explicit propagation plan, applied one entity at a time. The plan
//! is not atomic across the chain: a failure mid-propagation leaves later
//! siblings unsynchronized until the next publish or edit of any chain
//! member re-runs the synchronization.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::errors::{DepositError, DepositResult};
use crate::identifiers::{CommunityId, RecordId, UserId};
use crate::model::{Deposit, Record};
use crate::storage::{DepositStore, RecordStore};
use crate::version_chain::VersionChainManager;

/// A community known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    /// Community identifier
    pub id: CommunityId,
    /// Administrating user; submissions by this user are auto-accepted
    pub owner: UserId,
}

/// Directory of existing communities
pub trait CommunityDirectory: Send + Sync {
    /// Look up a community, `None` if it does not exist
    fn get(&self, id: &CommunityId) -> Option<Community>;

    /// Owner of a community, `None` if the community does not exist
    fn owner_of(&self, id: &CommunityId) -> Option<UserId> {
        self.get(id).map(|c| c.owner)
    }
}

/// In-memory community directory
#[derive(Clone, Default)]
pub struct InMemoryCommunityDirectory {
    communities: Arc<RwLock<HashMap<CommunityId, Community>>>,
}

impl InMemoryCommunityDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a community
    pub fn insert(&self, id: impl Into<CommunityId>, owner: UserId) {
        let id = id.into();
        if let Ok(mut communities) = self.communities.write() {
            communities.insert(id.clone(), Community { id, owner });
        }
    }
}

impl CommunityDirectory for InMemoryCommunityDirectory {
    fn get(&self, id: &CommunityId) -> Option<Community> {
        self.communities.read().ok()?.get(id).cloned()
    }
}

/// Auto-accept and auto-request policy, passed as an explicit value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunityPolicy {
    /// Master toggle for the automatic additions below
    pub auto_enabled: bool,
    /// Communities auto-accepted onto records carrying grants
    pub auto_add_if_grants: IndexSet<CommunityId>,
    /// Communities auto-requested for records carrying grants
    pub auto_request_if_grants: IndexSet<CommunityId>,
}

/// Result of reconciling declared against accepted communities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityReconciliation {
    /// Communities written to the record
    pub accepted: IndexSet<CommunityId>,
    /// Communities for which inclusion requests are (or remain) open
    pub pending: IndexSet<CommunityId>,
    /// Communities written to the deposits of the chain
    pub deposit_communities: IndexSet<CommunityId>,
}

/// Reconcile the editor's declared communities against the communities
/// previously accepted on the record.
///
/// Pure function of its inputs: communities already on the record stay,
/// newly-requested communities owned by a record owner or auto-added by
/// policy are accepted immediately, the rest become pending inclusion
/// requests.
pub fn reconcile(
    deposit_communities: &IndexSet<CommunityId>,
    record_communities: &IndexSet<CommunityId>,
    record_owners: &[UserId],
    has_grants: bool,
    policy: &CommunityPolicy,
    directory: &dyn CommunityDirectory,
) -> CommunityReconciliation {
    let owned: IndexSet<CommunityId> = deposit_communities
        .iter()
        .filter(|c| {
            directory
                .owner_of(c)
                .map(|owner| record_owners.contains(&owner))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    let auto_added: IndexSet<CommunityId> = if policy.auto_enabled && has_grants {
        policy.auto_add_if_grants.clone()
    } else {
        IndexSet::new()
    };

    let mut accepted: IndexSet<CommunityId> = deposit_communities
        .intersection(record_communities)
        .cloned()
        .collect();
    accepted.extend(owned);
    accepted.extend(auto_added);

    let auto_requested: IndexSet<CommunityId> = if policy.auto_enabled && has_grants {
        policy.auto_request_if_grants.clone()
    } else {
        IndexSet::new()
    };

    let mut pending: IndexSet<CommunityId> = deposit_communities
        .difference(&accepted)
        .cloned()
        .collect();
    pending.extend(auto_requested);

    let mut deposit_communities: IndexSet<CommunityId> = accepted.clone();
    deposit_communities.extend(pending.iter().cloned());

    CommunityReconciliation {
        accepted: sort_set(accepted),
        pending: sort_set(pending),
        deposit_communities: sort_set(deposit_communities),
    }
}

fn sort_set(set: IndexSet<CommunityId>) -> IndexSet<CommunityId> {
    let mut items: Vec<CommunityId> = set.into_iter().collect();
    items.sort();
    items.into_iter().collect()
}

/// A pending request for a record to join a community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionRequest {
    /// Requested community
    pub community: CommunityId,
    /// Record the request was filed against
    pub record: RecordId,
}

/// Store of pending inclusion requests
///
/// Requests are deduplicated at the chain level: a request for a
/// community against any version in a chain covers the whole chain.
#[derive(Clone, Default)]
pub struct InclusionRequests {
    requests: Arc<RwLock<Vec<InclusionRequest>>>,
}

impl InclusionRequests {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// File a request for `record` to join `community`
    pub fn create(&self, community: CommunityId, record: RecordId) -> DepositResult<()> {
        let mut requests = self.write()?;
        requests.push(InclusionRequest { community, record });
        Ok(())
    }

    /// Pending communities requested against a single record
    pub fn for_record(&self, record: RecordId) -> Vec<CommunityId> {
        self.requests
            .read()
            .map(|reqs| {
                reqs.iter()
                    .filter(|r| r.record == record)
                    .map(|r| r.community.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a request for `community` exists against any of `records`
    pub fn exists_for_any(&self, community: &CommunityId, records: &[RecordId]) -> bool {
        self.requests
            .read()
            .map(|reqs| {
                reqs.iter()
                    .any(|r| &r.community == community && records.contains(&r.record))
            })
            .unwrap_or(false)
    }

    /// Retract every chain-scoped request for a community not in `keep`
    pub fn retract_obsolete(
        &self,
        keep: &IndexSet<CommunityId>,
        records: &[RecordId],
    ) -> DepositResult<usize> {
        let mut requests = self.write()?;
        let before = requests.len();
        requests.retain(|r| !records.contains(&r.record) || keep.contains(&r.community));
        Ok(before - requests.len())
    }

    /// All pending requests
    pub fn all(&self) -> Vec<InclusionRequest> {
        self.requests.read().map(|r| r.clone()).unwrap_or_default()
    }

    fn write(&self) -> DepositResult<std::sync::RwLockWriteGuard<'_, Vec<InclusionRequest>>> {
        self.requests
            .write()
            .map_err(|_| DepositError::ExternalService {
                service: "inclusion-requests".to_string(),
                message: "lock poisoned".to_string(),
            })
    }
}

/// One entity update within a propagation plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationStep {
    /// Overwrite a sibling record's accepted communities
    SiblingRecord(RecordId),
    /// Overwrite a sibling deposit's declared communities
    SiblingDeposit(RecordId),
    /// Overwrite the chain's draft-child deposit communities
    DraftDeposit(RecordId),
}

/// Explicit plan for propagating reconciled communities across a chain
///
/// Computed in full before any write, then applied one entity at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationPlan {
    /// Reconciled sets being propagated
    pub reconciliation: CommunityReconciliation,
    /// Entity updates in application order
    pub steps: Vec<PropagationStep>,
    /// Communities to file new inclusion requests for
    pub create_requests: Vec<CommunityId>,
}

/// Synchronizes community membership across a version chain
pub struct CommunitySynchronizer {
    directory: Arc<dyn CommunityDirectory>,
    requests: InclusionRequests,
    records: Arc<dyn RecordStore>,
    deposits: Arc<dyn DepositStore>,
    chains: VersionChainManager,
}

impl CommunitySynchronizer {
    /// Create a synchronizer over the shared collaborators
    pub fn new(
        directory: Arc<dyn CommunityDirectory>,
        requests: InclusionRequests,
        records: Arc<dyn RecordStore>,
        deposits: Arc<dyn DepositStore>,
        chains: VersionChainManager,
    ) -> Self {
        Self {
            directory,
            requests,
            records,
            deposits,
            chains,
        }
    }

    /// Access the inclusion request store
    pub fn requests(&self) -> &InclusionRequests {
        &self.requests
    }

    /// Reconcile and compute the propagation plan for a record update
    ///
    /// `previous_record_communities` is the accepted set on the record
    /// being replaced (empty for the first publish of a concept).
    pub fn plan(
        &self,
        deposit: &Deposit,
        record: &Record,
        previous_record_communities: &IndexSet<CommunityId>,
        policy: &CommunityPolicy,
    ) -> PropagationPlan {
        let chain_members = self.chains.children(record.conceptrecid);
        let has_grants = deposit.has_grants() || self.any_chain_grants(&chain_members);

        let reconciliation = reconcile(
            &deposit.communities_set(),
            previous_record_communities,
            &record.owners,
            has_grants,
            policy,
            self.directory.as_ref(),
        );

        let mut steps = Vec::new();
        for member in &chain_members {
            if *member == record.recid {
                continue;
            }
            steps.push(PropagationStep::SiblingRecord(*member));
            steps.push(PropagationStep::SiblingDeposit(*member));
        }
        if let Some(draft) = self.chains.draft_child(record.conceptrecid) {
            if draft != deposit.recid && draft != record.recid {
                steps.push(PropagationStep::DraftDeposit(draft));
            }
        }

        let create_requests = reconciliation
            .pending
            .iter()
            .filter(|c| {
                !self.requests.exists_for_any(c, &chain_members)
                    && !record.communities_set().contains(*c)
            })
            .cloned()
            .collect();

        PropagationPlan {
            reconciliation,
            steps,
            create_requests,
        }
    }

    /// Apply a propagation plan
    ///
    /// The acting `deposit` and `record` are mutated in place and left for
    /// the caller to commit. Sibling updates are persisted here, one at a
    /// time; a sibling failure is logged and skipped rather than rolled
    /// back, favoring availability of the just-published version. The
    /// next publish or edit of any chain member re-synchronizes.
    pub fn apply(
        &self,
        plan: &PropagationPlan,
        deposit: &mut Deposit,
        record: &mut Record,
    ) -> DepositResult<()> {
        let reconciliation = &plan.reconciliation;

        record.set_communities(reconciliation.accepted.clone());
        deposit.set_communities(reconciliation.deposit_communities.clone());

        for step in &plan.steps {
            if let Err(err) = self.apply_step(step, reconciliation) {
                warn!(?step, %err, "community propagation step failed; sibling left unsynchronized");
            }
        }

        for community in &plan.create_requests {
            self.requests.create(community.clone(), record.recid)?;
            debug!(community = %community, record = %record.recid, "created inclusion request");
        }

        let chain_members = self.chains.children(record.conceptrecid);
        self.requests
            .retract_obsolete(&reconciliation.pending, &chain_members)?;

        Ok(())
    }

    fn apply_step(
        &self,
        step: &PropagationStep,
        reconciliation: &CommunityReconciliation,
    ) -> DepositResult<()> {
        match step {
            PropagationStep::SiblingRecord(recid) => {
                let mut record = self
                    .records
                    .get(*recid)
                    .ok_or_else(|| DepositError::NotFound(format!("record {recid}")))?;
                record.set_communities(reconciliation.accepted.clone());
                record.updated_at = chrono::Utc::now();
                self.records.save(&record)
            }
            PropagationStep::SiblingDeposit(recid) | PropagationStep::DraftDeposit(recid) => {
                let mut deposit = self
                    .deposits
                    .get_by_recid(*recid)
                    .ok_or_else(|| DepositError::NotFound(format!("deposit for record {recid}")))?;
                deposit.set_communities(reconciliation.deposit_communities.clone());
                deposit.touch();
                self.deposits.save(&deposit)
            }
        }
    }

    fn any_chain_grants(&self, members: &[RecordId]) -> bool {
        members
            .iter()
            .filter_map(|recid| self.records.get(*recid))
            .any(|record| record.has_grants())
    }
}
