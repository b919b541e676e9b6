mod task;
mod identity;
mod error;

pub use task::{TaskId, TaskKind, TaskInput, TaskOutput, TaskStatus, TaskAssignment, TaskReport};
pub use identity::WorkerIdentity;
pub use error::{TaskError, Result};

pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024; // 10MB
