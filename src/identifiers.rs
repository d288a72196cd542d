// Copyright 2025 Cowboy AI, LLC.

//! Identifier types for deposits, records and version chains
//!
//! Minted identifiers (record, concept, deposit) are small integers handed
//! out by the [`PidRegistry`](crate::registry::PidRegistry). Storage object
//! ids (buckets) are UUIDs. DOIs are strings with a locally-managed prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// DOI prefix under which this system mints and manages DOIs
pub const LOCAL_DOI_PREFIX: &str = "10.5072";

/// Record identifier - one per published version (and its draft precursor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    /// Create from a raw value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concept identifier - shared by every version of one logical work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConceptId(u64);

impl ConceptId {
    /// Create from a raw value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deposit identifier - one per mutable draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepositId(u64);

impl DepositId {
    /// Create from a raw value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Community identifier - human-readable slug
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommunityId(String);

impl CommunityId {
    /// Create from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommunityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CommunityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    /// Create from a raw value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bucket identifier - storage object id for a file bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketId(Uuid);

impl BucketId {
    /// Create a new random bucket ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BucketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digital Object Identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Doi(String);

impl Doi {
    /// Create from a string
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate the locally-managed DOI for a record identifier
    pub fn for_record(recid: RecordId) -> Self {
        Self(format!("{LOCAL_DOI_PREFIX}/deposit.{recid}"))
    }

    /// Generate the locally-managed concept DOI for a concept identifier
    pub fn for_concept(conceptrecid: ConceptId) -> Self {
        Self(format!("{LOCAL_DOI_PREFIX}/deposit.{conceptrecid}"))
    }

    /// Whether this DOI was minted under the local prefix and can be
    /// managed (versioned, re-registered) by this system
    pub fn is_locally_managed(&self) -> bool {
        self.0.starts_with(&format!("{LOCAL_DOI_PREFIX}/"))
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of persistent identifier tracked by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PidType {
    /// Record identifier (also used for concept ids)
    Recid,
    /// Deposit identifier
    Depid,
    /// Digital Object Identifier
    Doi,
}

/// Status of a persistent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PidStatus {
    /// Allocated but not yet promoted by a publish
    Reserved,
    /// Bound to a published object
    Registered,
    /// Resolution repointed to another identifier
    Redirected,
    /// Deleted, value retained for tombstoning
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_value() {
        let recid = RecordId::new(12345);
        assert_eq!(recid.value(), 12345);
        assert_eq!(format!("{recid}"), "12345");

        let conceptrecid = ConceptId::new(12344);
        assert_eq!(format!("{conceptrecid}"), "12344");

        let depid = DepositId::new(7);
        assert_eq!(depid.value(), 7);
    }

    #[test]
    fn test_community_id_from_str() {
        let c1: CommunityId = "ecfunded".into();
        let c2 = CommunityId::new("ecfunded");
        assert_eq!(c1, c2);
        assert_eq!(c1.as_str(), "ecfunded");
    }

    #[test]
    fn test_bucket_id_uniqueness() {
        let b1 = BucketId::new();
        let b2 = BucketId::new();
        assert_ne!(b1, b2);
        assert!(!b1.as_uuid().is_nil());
    }

    #[test]
    fn test_doi_generation() {
        let doi = Doi::for_record(RecordId::new(54321));
        assert_eq!(doi.as_str(), "10.5072/deposit.54321");
        assert!(doi.is_locally_managed());

        let conceptdoi = Doi::for_concept(ConceptId::new(54320));
        assert_eq!(conceptdoi.as_str(), "10.5072/deposit.54320");
    }

    #[test]
    fn test_doi_external() {
        let doi = Doi::new("10.1000/some.external");
        assert!(!doi.is_locally_managed());
    }

    #[test]
    fn test_id_serde_roundtrip() {
        let recid = RecordId::new(99);
        let json = serde_json::to_string(&recid).unwrap();
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(recid, back);

        let community = CommunityId::new("openaire");
        let json = serde_json::to_string(&community).unwrap();
        let back: CommunityId = serde_json::from_str(&json).unwrap();
        assert_eq!(community, back);
    }

    #[test]
    fn test_ids_as_keys() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        let r1 = RecordId::new(1);
        let r2 = RecordId::new(2);
        map.insert(r1, "first");
        map.insert(r2, "second");
        assert_eq!(map.get(&r1), Some(&"first"));
        assert_eq!(map.get(&r2), Some(&"second"));
    }
}
