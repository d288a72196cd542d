//! # CIM Deposit
//!
//! A deposit-to-record publication workflow engine. Draft deposits are
//! mutable working copies; published records are immutable versions
//! linked into a per-concept version chain with locally minted
//! identifiers and community membership that stays reconciled across
//! every version.
//!
//! The main building blocks:
//! - **Deposit / Record**: the mutable draft and its immutable published form
//! - **Lifecycle**: create, publish, edit, delete, new-version, concept DOI
//! - **Version Chains**: ordered versions per concept with one draft slot
//! - **Communities**: membership reconciliation and chain-wide propagation
//! - **Registry**: reserved/registered/redirected identifier management
//! - **Projection**: the redacted, statistics-enriched index document
//!
//! ## Design Principles
//!
//! 1. **Validate before mutating**: a failing publish leaves no trace
//! 2. **Immutability**: published records change only through an edit cycle
//! 3. **Chain-level atomicity**: draft-slot uniqueness is store-enforced
//! 4. **Best-effort propagation**: sibling updates warn and continue,
//!    self-healing on the next publish
//! 5. **Seams as traits**: storage, registry, tasks and statistics are
//!    collaborator traits with in-memory implementations

#![warn(missing_docs)]

pub mod communities;
pub mod errors;
pub mod events;
pub mod identifiers;
pub mod lifecycle;
pub mod model;
pub mod projection;
pub mod registry;
pub mod storage;
pub mod version_chain;

// Re-export core types
pub use communities::{
    Community, CommunityDirectory, CommunityPolicy, CommunityReconciliation, CommunitySynchronizer,
    InMemoryCommunityDirectory, InclusionRequest, InclusionRequests, PropagationPlan,
    PropagationStep, reconcile,
};
pub use errors::{DepositError, DepositResult};
pub use events::{DepositEvent, EventPublisher, NoopEventPublisher, RecordingEventPublisher};
pub use identifiers::{
    BucketId, CommunityId, ConceptId, DepositId, Doi, PidStatus, PidType, RecordId, UserId,
    LOCAL_DOI_PREFIX,
};
pub use lifecycle::{DepositLifecycle, LifecycleConfig};
pub use model::{
    Deposit, DepositState, FileEntry, Record, RecordBuckets, normalize_communities,
    PROTECTED_FIELDS,
};
pub use projection::{project, RecordDocument, RecordStats, VersionRelation};
pub use registry::{InMemoryPidRegistry, Pid, PidRegistry};
pub use storage::{
    BucketObject, BucketService, DepositStore, FixedStatisticsSource, InMemoryBucketService,
    InMemoryDepositStore, InMemoryRecordStore, QuotaConfig, RecordStore, RecordingTaskRunner,
    StatisticsSource, TaskRunner,
};
pub use version_chain::{VersionChain, VersionChainManager};
