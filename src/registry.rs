// Copyright 2025 Cowboy AI, LLC.

//! Persistent identifier registry
//!
//! Thin external service seam: the workflow engine allocates record,
//! concept and deposit identifiers through [`PidRegistry`] and tracks
//! their promotion from reserved to registered. An in-memory
//! implementation is provided for tests and embedding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::{DepositError, DepositResult};
use crate::identifiers::{PidStatus, PidType};

/// A persistent identifier with its lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pid {
    /// Kind of identifier
    pub pid_type: PidType,
    /// Allocated value
    pub value: u64,
    /// Current status
    pub status: PidStatus,
}

/// Registry allocating and resolving persistent identifiers
pub trait PidRegistry: Send + Sync {
    /// Allocate a fresh identifier of the given type, in Reserved status
    fn allocate(&self, pid_type: PidType) -> DepositResult<Pid>;

    /// Resolve an identifier by type and value
    fn resolve(&self, pid_type: PidType, value: u64) -> Option<Pid>;

    /// Promote an identifier to Registered status
    fn mark_registered(&self, pid_type: PidType, value: u64) -> DepositResult<()>;

    /// Repoint an identifier's canonical resolution (concept ids)
    fn mark_redirected(&self, pid_type: PidType, value: u64) -> DepositResult<()>;

    /// Delete an identifier. Fails unless the identifier is in a
    /// deletable status (Reserved or Registered).
    fn delete(&self, pid_type: PidType, value: u64) -> DepositResult<()>;
}

/// In-memory identifier registry
///
/// Record and concept identifiers draw from the same sequence, so a
/// first version's concept id and record id are adjacent values.
pub struct InMemoryPidRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

struct RegistryState {
    next_recid: u64,
    next_depid: u64,
    pids: HashMap<(PidType, u64), PidStatus>,
}

impl Default for InMemoryPidRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPidRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryState {
                next_recid: 1,
                next_depid: 1,
                pids: HashMap::new(),
            })),
        }
    }
}

impl PidRegistry for InMemoryPidRegistry {
    fn allocate(&self, pid_type: PidType) -> DepositResult<Pid> {
        let mut state = self
            .inner
            .write()
            .map_err(|_| DepositError::Allocation("registry lock poisoned".to_string()))?;
        let value = match pid_type {
            PidType::Recid | PidType::Doi => {
                let v = state.next_recid;
                state.next_recid += 1;
                v
            }
            PidType::Depid => {
                let v = state.next_depid;
                state.next_depid += 1;
                v
            }
        };
        state.pids.insert((pid_type, value), PidStatus::Reserved);
        Ok(Pid {
            pid_type,
            value,
            status: PidStatus::Reserved,
        })
    }

    fn resolve(&self, pid_type: PidType, value: u64) -> Option<Pid> {
        let state = self.inner.read().ok()?;
        state.pids.get(&(pid_type, value)).map(|status| Pid {
            pid_type,
            value,
            status: *status,
        })
    }

    fn mark_registered(&self, pid_type: PidType, value: u64) -> DepositResult<()> {
        self.set_status(pid_type, value, PidStatus::Registered)
    }

    fn mark_redirected(&self, pid_type: PidType, value: u64) -> DepositResult<()> {
        self.set_status(pid_type, value, PidStatus::Redirected)
    }

    fn delete(&self, pid_type: PidType, value: u64) -> DepositResult<()> {
        let mut state = self
            .inner
            .write()
            .map_err(|_| DepositError::Allocation("registry lock poisoned".to_string()))?;
        match state.pids.get(&(pid_type, value)) {
            None => Err(DepositError::NotFound(format!(
                "pid {pid_type:?}:{value}"
            ))),
            Some(PidStatus::Deleted) => Err(DepositError::invalid_state("Deleted", "delete")),
            Some(PidStatus::Redirected) => {
                Err(DepositError::invalid_state("Redirected", "delete"))
            }
            Some(_) => {
                state.pids.insert((pid_type, value), PidStatus::Deleted);
                Ok(())
            }
        }
    }
}

impl InMemoryPidRegistry {
    fn set_status(&self, pid_type: PidType, value: u64, status: PidStatus) -> DepositResult<()> {
        let mut state = self
            .inner
            .write()
            .map_err(|_| DepositError::Allocation("registry lock poisoned".to_string()))?;
        if !state.pids.contains_key(&(pid_type, value)) {
            return Err(DepositError::NotFound(format!("pid {pid_type:?}:{value}")));
        }
        state.pids.insert((pid_type, value), status);
        Ok(())
    }
}
