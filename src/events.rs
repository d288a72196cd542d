// Copyright 2025 Cowboy AI, LLC.

//! Domain events emitted by the deposit lifecycle engine
//!
//! Events are published after the owning operation commits. Publication
//! failures are logged and never fail the operation.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::errors::DepositResult;
use crate::identifiers::{ConceptId, DepositId, Doi, RecordId};

/// Things that happen to a deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DepositEvent {
    /// A new draft was created
    Created {
        /// Deposit identifier
        deposit: DepositId,
        /// Reserved record identifier
        recid: RecordId,
        /// Concept identifier of the chain
        conceptrecid: ConceptId,
    },
    /// A draft was published (first time or from an open edit)
    Published {
        /// Deposit identifier
        deposit: DepositId,
        /// Published record identifier
        recid: RecordId,
        /// Committed record revision
        revision: u64,
    },
    /// A published record was checked out for editing
    EditOpened {
        /// Deposit identifier
        deposit: DepositId,
        /// Record identifier being edited
        recid: RecordId,
    },
    /// A new draft version was created in the chain
    NewVersionCreated {
        /// The newly created draft deposit
        deposit: DepositId,
        /// Its reserved record identifier
        recid: RecordId,
        /// Concept identifier of the chain
        conceptrecid: ConceptId,
    },
    /// A deposit was deleted
    Deleted {
        /// Deposit identifier
        deposit: DepositId,
    },
    /// A concept DOI was minted and bound
    ConceptDoiRegistered {
        /// Deposit identifier
        deposit: DepositId,
        /// The minted concept DOI
        conceptdoi: Doi,
    },
}

impl DepositEvent {
    /// Event type name for logging and subscription routing
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "DepositCreated",
            Self::Published { .. } => "DepositPublished",
            Self::EditOpened { .. } => "DepositEditOpened",
            Self::NewVersionCreated { .. } => "DepositNewVersionCreated",
            Self::Deleted { .. } => "DepositDeleted",
            Self::ConceptDoiRegistered { .. } => "DepositConceptDoiRegistered",
        }
    }
}

/// Event publisher seam for the lifecycle engine
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event
    fn publish(&self, event: DepositEvent) -> DepositResult<()>;
}

/// Publisher that drops events
#[derive(Clone, Copy, Default)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: DepositEvent) -> DepositResult<()> {
        Ok(())
    }
}

/// Publisher that records events for verification in tests
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    published: Arc<RwLock<Vec<DepositEvent>>>,
}

impl RecordingEventPublisher {
    /// Create a new recording publisher
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published events for verification
    pub fn published(&self) -> Vec<DepositEvent> {
        self.published.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event type names in publication order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.published().iter().map(|e| e.event_type()).collect()
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, event: DepositEvent) -> DepositResult<()> {
        if let Ok(mut published) = self.published.write() {
            published.push(event);
        }
        Ok(())
    }
}
