// Copyright 2025 Cowboy AI, LLC.

//! Version chain management
//!
//! One chain exists per concept identifier. It holds the record identifiers
//! of every version in creation order, at most one of which is the mutable
//! draft child, plus the canonical redirect target for the concept id.
//!
//! All mutations run inside a single write section of the shared store, so
//! concurrent draft insertions on the same concept id race safely: exactly
//! one wins, the rest observe a conflict.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::errors::{DepositError, DepositResult};
use crate::identifiers::{ConceptId, RecordId};

/// A single version chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChain {
    /// Concept identifier this chain belongs to
    pub concept: ConceptId,
    /// All member record identifiers, creation order = version order
    children: Vec<RecordId>,
    /// The in-progress new version, if any
    draft_child: Option<RecordId>,
    /// Canonical resolution target of the concept identifier
    redirect: Option<RecordId>,
}

impl VersionChain {
    fn new(concept: ConceptId) -> Self {
        Self {
            concept,
            children: Vec::new(),
            draft_child: None,
            redirect: None,
        }
    }

    /// All member record identifiers in version order
    pub fn children(&self) -> &[RecordId] {
        &self.children
    }

    /// Published members only (the draft slot is never exposed to readers)
    pub fn published_children(&self) -> Vec<RecordId> {
        self.children
            .iter()
            .copied()
            .filter(|c| Some(*c) != self.draft_child)
            .collect()
    }

    /// The published child with the highest version order
    pub fn last_child(&self) -> Option<RecordId> {
        self.published_children().last().copied()
    }

    /// The draft child, if one exists
    pub fn draft_child(&self) -> Option<RecordId> {
        self.draft_child
    }

    /// Current canonical resolution target
    pub fn redirect(&self) -> Option<RecordId> {
        self.redirect
    }

    /// Zero-based version index of a published member
    pub fn version_index(&self, recid: RecordId) -> Option<usize> {
        self.published_children().iter().position(|c| *c == recid)
    }
}

/// Manager over the shared chain store
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone, Default)]
pub struct VersionChainManager {
    chains: Arc<RwLock<HashMap<ConceptId, VersionChain>>>,
}

impl VersionChainManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `child` as the draft child of `concept`, creating the
    /// chain if it does not exist yet.
    ///
    /// Fails with a conflict if a draft child already exists. The check
    /// and the insert happen under one write lock, which is the
    /// store-enforced uniqueness guarantee for concurrent callers.
    pub fn insert_draft_child(&self, concept: ConceptId, child: RecordId) -> DepositResult<()> {
        let mut chains = self.write()?;
        let chain = chains
            .entry(concept)
            .or_insert_with(|| VersionChain::new(concept));
        if let Some(existing) = chain.draft_child {
            return Err(DepositError::Conflict(format!(
                "concept {concept} already has draft child {existing}"
            )));
        }
        chain.children.push(child);
        chain.draft_child = Some(child);
        debug!(%concept, %child, "inserted draft child");
        Ok(())
    }

    /// Remove the draft child from the chain entirely
    pub fn remove_draft_child(&self, concept: ConceptId) -> DepositResult<RecordId> {
        let mut chains = self.write()?;
        let chain = chains
            .get_mut(&concept)
            .ok_or_else(|| DepositError::NotFound(format!("version chain for {concept}")))?;
        let draft = chain
            .draft_child
            .take()
            .ok_or_else(|| DepositError::NotFound(format!("draft child for {concept}")))?;
        chain.children.retain(|c| *c != draft);
        debug!(%concept, %draft, "removed draft child");
        Ok(draft)
    }

    /// Clear the draft pointer while keeping the member in the sequence,
    /// turning the draft into the newest published child
    pub fn promote_draft_child(&self, concept: ConceptId) -> DepositResult<RecordId> {
        let mut chains = self.write()?;
        let chain = chains
            .get_mut(&concept)
            .ok_or_else(|| DepositError::NotFound(format!("version chain for {concept}")))?;
        chain
            .draft_child
            .take()
            .ok_or_else(|| DepositError::NotFound(format!("draft child for {concept}")))
    }

    /// Repoint the concept identifier's canonical resolution target to the
    /// latest published child. Idempotent; a chain with zero published
    /// children keeps its previous target.
    pub fn update_redirect(&self, concept: ConceptId) -> DepositResult<Option<RecordId>> {
        let mut chains = self.write()?;
        let chain = chains
            .get_mut(&concept)
            .ok_or_else(|| DepositError::NotFound(format!("version chain for {concept}")))?;
        if let Some(last) = chain.last_child() {
            chain.redirect = Some(last);
        }
        Ok(chain.redirect)
    }

    /// Read a snapshot of the chain, if one exists
    pub fn chain(&self, concept: ConceptId) -> Option<VersionChain> {
        self.chains.read().ok()?.get(&concept).cloned()
    }

    /// All member record identifiers of the chain, version order
    pub fn children(&self, concept: ConceptId) -> Vec<RecordId> {
        self.chain(concept)
            .map(|c| c.children().to_vec())
            .unwrap_or_default()
    }

    /// The latest published child of the chain
    pub fn last_child(&self, concept: ConceptId) -> Option<RecordId> {
        self.chain(concept).and_then(|c| c.last_child())
    }

    /// The draft child of the chain
    pub fn draft_child(&self, concept: ConceptId) -> Option<RecordId> {
        self.chain(concept).and_then(|c| c.draft_child())
    }

    fn write(
        &self,
    ) -> DepositResult<std::sync::RwLockWriteGuard<'_, HashMap<ConceptId, VersionChain>>> {
        self.chains
            .write()
            .map_err(|_| DepositError::ExternalService {
                service: "version-chain-store".to_string(),
                message: "lock poisoned".to_string(),
            })
    }
}
