// Copyright 2025 Cowboy AI, LLC.

//! Deposit and record data model
//!
//! A [`Deposit`] is the mutable draft precursor to a published [`Record`].
//! Publication projects the deposit into an immutable record revision;
//! subsequent edits of the published record create new revisions under the
//! same record identifier, never a new identifier.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identifiers::{BucketId, CommunityId, ConceptId, DepositId, Doi, RecordId, UserId};

/// Metadata keys a draft edit may never overwrite
///
/// These carry identifier, ownership and bookkeeping state that only the
/// workflow engine itself is allowed to move.
pub const PROTECTED_FIELDS: &[&str] = &[
    "_deposit",
    "_buckets",
    "_files",
    "_internal",
    "_oai",
    "relations",
    "owners",
    "recid",
    "conceptrecid",
    "conceptdoi",
];

/// Lifecycle states of a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositState {
    /// Never published
    DraftNew,
    /// Published, currently checked out for edit
    DraftEditing,
    /// Published with no open edit
    Published,
    /// Terminal state
    Deleted,
}

impl DepositState {
    /// Get the name of this state for logging and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::DraftNew => "DraftNew",
            Self::DraftEditing => "DraftEditing",
            Self::Published => "Published",
            Self::Deleted => "Deleted",
        }
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Check if a transition to the target state is valid
    pub fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Get all valid target states from this state
    pub fn valid_transitions(&self) -> Vec<Self> {
        use DepositState::*;

        match self {
            DraftNew => vec![Published, Deleted],
            DraftEditing => vec![Published, Deleted],
            Published => vec![DraftEditing, Deleted],
            Deleted => vec![],
        }
    }
}

/// A mutable draft record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    /// Deposit identifier
    pub id: DepositId,
    /// Reserved (or published) record identifier for this version
    pub recid: RecordId,
    /// Concept identifier shared by all versions of the work
    pub conceptrecid: ConceptId,
    /// Owning users, copied onto the record at publish time
    pub owners: Vec<UserId>,
    /// Lifecycle state
    pub state: DepositState,
    /// Arbitrary editor-supplied metadata
    pub metadata: Map<String, Value>,
    /// Declared communities; absent rather than empty
    pub communities: Option<IndexSet<CommunityId>>,
    /// DOI for this version, minted at publish if not supplied
    pub doi: Option<Doi>,
    /// Concept DOI shared by all versions
    pub conceptdoi: Option<Doi>,
    /// Record identifier this deposit tracks once published
    pub published_recid: Option<RecordId>,
    /// Working file bucket
    pub bucket: Option<BucketId>,
    /// When this deposit was created
    pub created_at: DateTime<Utc>,
    /// When this deposit was last updated
    pub updated_at: DateTime<Utc>,
}

impl Deposit {
    /// Check if this deposit has been published at least once
    pub fn is_published(&self) -> bool {
        self.published_recid.is_some()
    }

    /// Check if this deposit carries a DOI minted under the local prefix
    pub fn has_minted_doi(&self) -> bool {
        self.is_published()
            && self
                .doi
                .as_ref()
                .map(|d| d.is_locally_managed())
                .unwrap_or(false)
    }

    /// Declared communities as an owned set (empty if absent)
    pub fn communities_set(&self) -> IndexSet<CommunityId> {
        self.communities.clone().unwrap_or_default()
    }

    /// Replace the communities attribute, removing it entirely when the
    /// set is empty (normalizes the storage representation)
    pub fn set_communities(&mut self, communities: IndexSet<CommunityId>) {
        self.communities = normalize_communities(communities);
    }

    /// Check if the deposit metadata declares any grants
    pub fn has_grants(&self) -> bool {
        has_grants(&self.metadata)
    }

    /// Apply editor-supplied metadata to the draft, dropping protected keys
    pub fn apply_editor_metadata(&mut self, mut data: Map<String, Value>) {
        for key in PROTECTED_FIELDS {
            data.remove(*key);
        }
        for (key, value) in data {
            self.metadata.insert(key, value);
        }
        self.updated_at = Utc::now();
    }

    /// Update the deposit's timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// File manifest entry on a published record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Object key within the bucket
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Bucket holding the snapshot object
    pub bucket: BucketId,
}

/// Bucket links carried by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBuckets {
    /// The deposit's working bucket at publish time
    pub deposit: Option<BucketId>,
    /// The locked snapshot backing the record's files
    pub record: Option<BucketId>,
}

/// An immutable-per-revision published record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier
    pub recid: RecordId,
    /// Concept identifier shared by all versions
    pub conceptrecid: ConceptId,
    /// Owning users at publish time
    pub owners: Vec<UserId>,
    /// Revision number, incremented by edited publishes
    pub revision: u64,
    /// Published metadata
    pub metadata: Map<String, Value>,
    /// Accepted communities; absent rather than empty
    pub communities: Option<IndexSet<CommunityId>>,
    /// File manifest taken from the locked snapshot
    pub files: Vec<FileEntry>,
    /// Bucket links
    pub buckets: Option<RecordBuckets>,
    /// OAI set bookkeeping, opaque to this engine
    pub oai: Option<Value>,
    /// Internal-only bookkeeping, stripped from index projections
    pub internal: Option<Value>,
    /// DOI for this version
    pub doi: Option<Doi>,
    /// Concept DOI shared by all versions
    pub conceptdoi: Option<Doi>,
    /// When this record was first published
    pub created_at: DateTime<Utc>,
    /// When this revision was committed
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Accepted communities as an owned set (empty if absent)
    pub fn communities_set(&self) -> IndexSet<CommunityId> {
        self.communities.clone().unwrap_or_default()
    }

    /// Replace the communities attribute, removing it entirely when the
    /// set is empty
    pub fn set_communities(&mut self, communities: IndexSet<CommunityId>) {
        self.communities = normalize_communities(communities);
    }

    /// Check if the record's access policy is fully open
    pub fn is_open_access(&self) -> bool {
        self.metadata
            .get("access_right")
            .and_then(Value::as_str)
            .map(|v| v == "open")
            .unwrap_or(false)
    }

    /// Check if the record metadata declares any grants
    pub fn has_grants(&self) -> bool {
        has_grants(&self.metadata)
    }
}

/// Sort a community set and drop it entirely when empty
pub fn normalize_communities(communities: IndexSet<CommunityId>) -> Option<IndexSet<CommunityId>> {
    if communities.is_empty() {
        None
    } else {
        let mut sorted: Vec<CommunityId> = communities.into_iter().collect();
        sorted.sort();
        Some(sorted.into_iter().collect())
    }
}

fn has_grants(metadata: &Map<String, Value>) -> bool {
    match metadata.get("grants") {
        Some(Value::Array(grants)) => !grants.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn sample_deposit() -> Deposit {
        Deposit {
            id: DepositId::new(1),
            recid: RecordId::new(2),
            conceptrecid: ConceptId::new(1),
            owners: vec![UserId::new(10)],
            state: DepositState::DraftNew,
            metadata: Map::new(),
            communities: None,
            doi: None,
            conceptdoi: None,
            published_recid: None,
            bucket: Some(BucketId::new()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test_case(DepositState::DraftNew, DepositState::Published, true; "new draft publishes")]
    #[test_case(DepositState::DraftNew, DepositState::Deleted, true; "new draft deletes")]
    #[test_case(DepositState::DraftNew, DepositState::DraftEditing, false; "new draft cannot open edit")]
    #[test_case(DepositState::Published, DepositState::DraftEditing, true; "published opens edit")]
    #[test_case(DepositState::DraftEditing, DepositState::Published, true; "edit republishes")]
    #[test_case(DepositState::Published, DepositState::DraftNew, false; "published never reverts")]
    #[test_case(DepositState::Deleted, DepositState::Published, false; "deleted is terminal")]
    fn test_state_transitions(from: DepositState, to: DepositState, allowed: bool) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn test_deleted_has_no_transitions() {
        assert!(DepositState::Deleted.is_terminal());
        assert!(DepositState::Deleted.valid_transitions().is_empty());
    }

    #[test]
    fn test_deposit_publication_flags() {
        let mut deposit = sample_deposit();
        assert!(!deposit.is_published());
        assert!(!deposit.has_minted_doi());

        deposit.published_recid = Some(deposit.recid);
        deposit.doi = Some(Doi::for_record(deposit.recid));
        assert!(deposit.is_published());
        assert!(deposit.has_minted_doi());

        deposit.doi = Some(Doi::new("10.1000/external"));
        assert!(!deposit.has_minted_doi());
    }

    #[test]
    fn test_set_communities_normalizes_empty() {
        let mut deposit = sample_deposit();
        deposit.set_communities(IndexSet::new());
        assert!(deposit.communities.is_none());

        let mut set = IndexSet::new();
        set.insert(CommunityId::new("openaire"));
        set.insert(CommunityId::new("astro"));
        deposit.set_communities(set);

        let stored: Vec<&str> = deposit
            .communities
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.as_str())
            .collect();
        assert_eq!(stored, vec!["astro", "openaire"]);
    }

    #[test]
    fn test_editor_metadata_cannot_touch_protected_fields() {
        let mut deposit = sample_deposit();
        deposit
            .metadata
            .insert("title".to_string(), json!("Original"));

        let mut edit = Map::new();
        edit.insert("title".to_string(), json!("Edited"));
        edit.insert("_files".to_string(), json!([{"key": "injected"}]));
        edit.insert("recid".to_string(), json!(999));
        deposit.apply_editor_metadata(edit);

        assert_eq!(deposit.metadata.get("title"), Some(&json!("Edited")));
        assert!(!deposit.metadata.contains_key("_files"));
        assert!(!deposit.metadata.contains_key("recid"));
    }

    #[test]
    fn test_record_access_and_grants() {
        let mut record = Record {
            recid: RecordId::new(2),
            conceptrecid: ConceptId::new(1),
            owners: vec![UserId::new(10)],
            revision: 0,
            metadata: Map::new(),
            communities: None,
            files: vec![],
            buckets: None,
            oai: None,
            internal: None,
            doi: None,
            conceptdoi: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        // Missing access_right is treated as closed
        assert!(!record.is_open_access());
        record
            .metadata
            .insert("access_right".to_string(), json!("open"));
        assert!(record.is_open_access());

        assert!(!record.has_grants());
        record.metadata.insert("grants".to_string(), json!([]));
        assert!(!record.has_grants());
        record
            .metadata
            .insert("grants".to_string(), json!([{"id": "10.13039/501100000780"}]));
        assert!(record.has_grants());
    }

    #[test]
    fn test_deposit_serde_roundtrip() {
        let deposit = sample_deposit();
        let json = serde_json::to_string(&deposit).unwrap();
        let back: Deposit = serde_json::from_str(&json).unwrap();
        assert_eq!(deposit, back);
    }
}
