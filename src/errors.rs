// Copyright 2025 Cowboy AI, LLC.

//! Error types for deposit workflow operations

use thiserror::Error;

use crate::identifiers::CommunityId;

/// Errors that can occur in deposit workflow operations
#[derive(Debug, Clone, Error)]
pub enum DepositError {
    /// Persistent identifier allocation failed
    #[error("Identifier allocation failed: {0}")]
    Allocation(String),

    /// Concurrent draft-child race lost
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Deposit has no attached files
    #[error("Missing uploaded files. To delete all files, use DELETE.")]
    MissingFiles,

    /// An incomplete multipart upload exists against the deposit bucket
    #[error("A multipart file upload is in progress.")]
    OngoingUpload,

    /// Declared community ids that do not resolve to existing communities
    #[error("Provided community does not exist: {}", format_community_ids(.0))]
    MissingCommunities(Vec<CommunityId>),

    /// Illegal state transition attempted
    #[error("Invalid action '{action}' in state {state}")]
    InvalidState {
        /// State the deposit was in
        state: String,
        /// Action that was attempted
        action: String,
    },

    /// Missing chain, record, deposit or identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// External collaborator failure
    #[error("External service error: {service} - {message}")]
    ExternalService {
        /// Name of the external service
        service: String,
        /// Error message from the service
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for deposit workflow operations
pub type DepositResult<T> = Result<T, DepositError>;

fn format_community_ids(ids: &[CommunityId]) -> String {
    ids.iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<serde_json::Error> for DepositError {
    fn from(err: serde_json::Error) -> Self {
        DepositError::Serialization(err.to_string())
    }
}

impl DepositError {
    /// Build an invalid-state error from a state name and attempted action
    pub fn invalid_state(state: impl Into<String>, action: impl Into<String>) -> Self {
        DepositError::InvalidState {
            state: state.into(),
            action: action.into(),
        }
    }

    /// Check if this is a validation failure raised before any mutation
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            DepositError::MissingFiles
                | DepositError::OngoingUpload
                | DepositError::MissingCommunities(_)
        )
    }

    /// Check if this is a concurrent draft-child conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, DepositError::Conflict(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DepositError::NotFound(_))
    }
}
