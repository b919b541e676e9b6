use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Handle issued by the manager when a worker registers.
///
/// Not `Clone`: the worker holds exactly one and gives it back
/// when it unregisters.
#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity(Uuid);

impl WorkerIdentity {
    /// Issue a fresh identity (manager side)
    pub fn generate() -> Self {
        WorkerIdentity(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        WorkerIdentity(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
