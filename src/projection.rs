// Copyright 2025 Cowboy AI, LLC.

//! Index projection
//!
//! Turns a published [`Record`] into the document shape served to the
//! search index: restricted file listings redacted, aggregate file count
//! and size always present, the record's position in its version chain,
//! and usage statistics attached best-effort.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::model::{FileEntry, Record};
use crate::storage::StatisticsSource;
use crate::version_chain::VersionChain;

/// Usage statistics query names, resolved by the [`StatisticsSource`]
pub mod queries {
    /// Views of a single record
    pub const RECORD_VIEW: &str = "record-view";
    /// Downloads of a single record
    pub const RECORD_DOWNLOAD: &str = "record-download";
    /// Views across all versions of a concept
    pub const RECORD_VIEW_ALL_VERSIONS: &str = "record-view-all-versions";
    /// Downloads across all versions of a concept
    pub const RECORD_DOWNLOAD_ALL_VERSIONS: &str = "record-download-all-versions";
}

/// A record's position within its version chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRelation {
    /// Whether this record is the latest published version
    pub is_last: bool,
    /// Zero-based position among the published versions
    pub index: usize,
}

impl Default for VersionRelation {
    fn default() -> Self {
        // A record with no known chain is its own single version
        Self {
            is_last: true,
            index: 0,
        }
    }
}

/// Aggregated usage statistics for a record and its version chain
///
/// Each counter group comes from one statistics query; a failing query
/// leaves only its own fields absent, the other groups stay populated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct RecordStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_views: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_downloads: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_views: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_unique_views: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_downloads: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_unique_downloads: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_volume: Option<f64>,
}

impl RecordStats {
    /// Whether every counter group is absent
    pub fn is_empty(&self) -> bool {
        self.views.is_none()
            && self.downloads.is_none()
            && self.version_views.is_none()
            && self.version_downloads.is_none()
    }
}

/// The redacted, index-ready shape of a published record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDocument {
    /// The record's own identifier
    pub recid: crate::identifiers::RecordId,
    /// Identifier shared by every version of the record
    pub conceptrecid: crate::identifiers::ConceptId,
    /// Version-level DOI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<crate::identifiers::Doi>,
    /// Concept-level DOI, once registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conceptdoi: Option<crate::identifiers::Doi>,
    /// Owning users, copied at publish time
    pub owners: Vec<crate::identifiers::UserId>,
    /// Monotonic revision of the published record
    pub revision: u64,
    /// The descriptive metadata as published
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Accepted community memberships, sorted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communities: Option<Vec<crate::identifiers::CommunityId>>,
    /// Individual file entries, present only for open-access records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileEntry>>,
    /// Number of files, computed before any redaction
    pub filecount: usize,
    /// Total size in bytes, computed before any redaction
    pub size: u64,
    /// Position within the version chain
    pub relation: VersionRelation,
    /// Usage statistics; absent when the statistics backend is degraded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RecordStats>,
}

/// Project a record into its index document
///
/// Statistics retrieval never fails the projection: any query error
/// drops the whole `stats` block and the document is indexed without it.
pub fn project(
    record: &Record,
    chain: Option<&VersionChain>,
    stats: &dyn StatisticsSource,
) -> RecordDocument {
    // Aggregates are computed from the full manifest before the listing
    // itself is redacted for non-open records.
    let filecount = record.files.len();
    let size = record.files.iter().map(|f| f.size).sum();

    let files = if record.is_open_access() {
        Some(record.files.clone())
    } else {
        None
    };

    let relation = chain
        .and_then(|c| version_relation(record, c))
        .unwrap_or_default();

    let communities = record
        .communities
        .as_ref()
        .map(|set| set.iter().cloned().collect());

    RecordDocument {
        recid: record.recid,
        conceptrecid: record.conceptrecid,
        doi: record.doi.clone(),
        conceptdoi: record.conceptdoi.clone(),
        owners: record.owners.clone(),
        revision: record.revision,
        metadata: record.metadata.clone(),
        communities,
        files,
        filecount,
        size,
        relation,
        stats: build_stats(record, stats),
    }
}

fn version_relation(record: &Record, chain: &VersionChain) -> Option<VersionRelation> {
    let index = chain.version_index(record.recid)?;
    Some(VersionRelation {
        is_last: chain.last_child() == Some(record.recid),
        index,
    })
}

/// Query the statistics backend for a record's usage counters
///
/// Each query degrades independently: a failing query omits only its
/// own counter group. Download counters are never queried for records
/// that do not serve files openly. The block is omitted entirely only
/// when no query contributed anything.
pub fn build_stats(record: &Record, stats: &dyn StatisticsSource) -> Option<RecordStats> {
    let record_params = json!({ "recid": record.recid.value() });
    let version_params = json!({ "conceptrecid": record.conceptrecid.value() });

    let mut result = RecordStats::default();

    if let Some(views) = run_query(stats, queries::RECORD_VIEW, &record_params) {
        result.views = field(&views, "views");
        result.unique_views = field(&views, "unique_views");
    }
    if let Some(views) = run_query(stats, queries::RECORD_VIEW_ALL_VERSIONS, &version_params) {
        result.version_views = field(&views, "views");
        result.version_unique_views = field(&views, "unique_views");
    }

    if record.is_open_access() {
        if let Some(downloads) = run_query(stats, queries::RECORD_DOWNLOAD, &record_params) {
            result.downloads = field(&downloads, "downloads");
            result.unique_downloads = field(&downloads, "unique_downloads");
            result.volume = field(&downloads, "volume");
        }
        if let Some(downloads) =
            run_query(stats, queries::RECORD_DOWNLOAD_ALL_VERSIONS, &version_params)
        {
            result.version_downloads = field(&downloads, "downloads");
            result.version_unique_downloads = field(&downloads, "unique_downloads");
            result.version_volume = field(&downloads, "volume");
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

fn run_query(
    stats: &dyn StatisticsSource,
    name: &str,
    params: &serde_json::Value,
) -> Option<serde_json::Value> {
    match stats.run_query(name, params) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(query = name, %err, "statistics query failed, indexing without stats");
            None
        }
    }
}

fn field(value: &serde_json::Value, name: &str) -> Option<f64> {
    Some(value.get(name).and_then(|v| v.as_f64()).unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{BucketId, ConceptId, RecordId, UserId};
    use crate::storage::FixedStatisticsSource;
    use crate::version_chain::VersionChainManager;

    fn record(recid: u64, open: bool) -> Record {
        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "access_right".to_string(),
            serde_json::Value::String(if open { "open" } else { "restricted" }.to_string()),
        );
        let bucket = BucketId::new();
        Record {
            recid: RecordId::new(recid),
            conceptrecid: ConceptId::new(recid - 1),
            owners: vec![UserId::new(1)],
            revision: 0,
            metadata,
            communities: None,
            files: vec![
                FileEntry {
                    key: "data.csv".to_string(),
                    size: 100,
                    bucket,
                },
                FileEntry {
                    key: "readme.txt".to_string(),
                    size: 20,
                    bucket,
                },
            ],
            buckets: None,
            oai: None,
            internal: None,
            doi: None,
            conceptdoi: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn stats_response(prefix: &str) -> serde_json::Value {
        json!({
            "views": 10.0,
            "unique_views": 5.0,
            "downloads": 3.0,
            "unique_downloads": 2.0,
            "volume": 300.0,
            "label": prefix,
        })
    }

    fn full_stats() -> FixedStatisticsSource {
        let source = FixedStatisticsSource::new();
        source.set(queries::RECORD_VIEW, stats_response("record"));
        source.set(queries::RECORD_DOWNLOAD, stats_response("record"));
        source.set(queries::RECORD_VIEW_ALL_VERSIONS, stats_response("versions"));
        source.set(
            queries::RECORD_DOWNLOAD_ALL_VERSIONS,
            stats_response("versions"),
        );
        source
    }

    #[test]
    fn test_open_record_keeps_files() {
        let doc = project(&record(10, true), None, &full_stats());
        assert_eq!(doc.files.as_ref().map(Vec::len), Some(2));
        assert_eq!(doc.filecount, 2);
        assert_eq!(doc.size, 120);
    }

    #[test]
    fn test_closed_record_redacts_files_but_keeps_aggregates() {
        let doc = project(&record(10, false), None, &full_stats());
        assert!(doc.files.is_none());
        // Aggregates survive the redaction
        assert_eq!(doc.filecount, 2);
        assert_eq!(doc.size, 120);
    }

    #[test]
    fn test_closed_record_omits_download_counters() {
        let doc = project(&record(10, false), None, &full_stats());
        let stats = doc.stats.unwrap();
        assert_eq!(stats.views, Some(10.0));
        assert_eq!(stats.downloads, None);
        assert_eq!(stats.volume, None);
        assert_eq!(stats.version_downloads, None);

        let value = serde_json::to_value(stats).unwrap();
        assert!(value.get("views").is_some());
        assert!(value.get("downloads").is_none());
    }

    #[test]
    fn test_missing_chain_defaults_to_single_version() {
        let doc = project(&record(10, true), None, &full_stats());
        assert_eq!(doc.relation, VersionRelation::default());
        assert!(doc.relation.is_last);
        assert_eq!(doc.relation.index, 0);
    }

    #[test]
    fn test_relation_from_chain_position() {
        let chains = VersionChainManager::new();
        let concept = ConceptId::new(9);
        chains.insert_draft_child(concept, RecordId::new(10)).unwrap();
        chains.promote_draft_child(concept).unwrap();
        chains.insert_draft_child(concept, RecordId::new(12)).unwrap();
        chains.promote_draft_child(concept).unwrap();
        let chain = chains.chain(concept).unwrap();

        let doc = project(&record(10, true), Some(&chain), &full_stats());
        assert_eq!(doc.relation.index, 0);
        assert!(!doc.relation.is_last);

        let mut latest = record(12, true);
        latest.conceptrecid = concept;
        let doc = project(&latest, Some(&chain), &full_stats());
        assert_eq!(doc.relation.index, 1);
        assert!(doc.relation.is_last);
    }

    #[test]
    fn test_failing_query_omits_only_its_counters() {
        // Unconfigured queries resolve as not-found errors
        let source = full_stats();
        source.unset(queries::RECORD_VIEW);
        let doc = project(&record(10, true), None, &source);
        let stats = doc.stats.unwrap();
        assert_eq!(stats.views, None);
        assert_eq!(stats.unique_views, None);
        assert_eq!(stats.downloads, Some(3.0));
        assert_eq!(stats.version_views, Some(10.0));
        assert_eq!(stats.version_volume, Some(300.0));
    }

    #[test]
    fn test_fully_failing_backend_drops_stats_block() {
        let source = FixedStatisticsSource::new();
        let doc = project(&record(10, true), None, &source);
        assert!(doc.stats.is_none());
    }

    #[test]
    fn test_document_serializes_without_redacted_fields() {
        let doc = project(&record(10, false), None, &full_stats());
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("files").is_none());
        assert!(value.get("filecount").is_some());
    }
}
