use crate::{TaskError, Result, MAX_PAYLOAD_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Task kind name (e.g., "send_email"); also the broker queue name
pub type TaskKind = String;

/// Task input handed to a handler (opaque bytes)
pub type TaskInput = Vec<u8>;

/// Task output produced by a handler (opaque bytes)
pub type TaskOutput = Vec<u8>;

/// Terminal status reported to the manager once per execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Handler returned an output
    Completed,
    /// Handler returned an error or panicked
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// A unit of work delivered by the broker on a kind's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// Unique task identifier
    pub id: TaskId,

    /// Task input (arbitrary bytes, max 10MB)
    pub input: TaskInput,
}

impl TaskAssignment {
    /// Wrap an input under a fresh task id
    pub fn new(input: TaskInput) -> Result<Self> {
        Self::with_id(Uuid::new_v4(), input)
    }

    pub fn with_id(id: TaskId, input: TaskInput) -> Result<Self> {
        check_payload(&input)?;
        Ok(TaskAssignment { id, input })
    }
}

/// Status update sent to the manager after a task ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,

    /// Kind the task was received on
    pub kind: TaskKind,

    pub status: TaskStatus,

    /// Handler output, present only for completed tasks
    pub output: Option<TaskOutput>,

    /// Failure message, present only for failed tasks
    pub error: Option<String>,

    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    /// Report for a task whose handler returned an output
    pub fn completed(
        task_id: TaskId,
        kind: impl Into<TaskKind>,
        output: TaskOutput,
    ) -> Result<Self> {
        check_payload(&output)?;
        Ok(TaskReport {
            task_id,
            kind: kind.into(),
            status: TaskStatus::Completed,
            output: Some(output),
            error: None,
            finished_at: Utc::now(),
        })
    }

    /// Report for a task whose handler failed; never carries an output
    pub fn failed(task_id: TaskId, kind: impl Into<TaskKind>, error: impl Into<String>) -> Self {
        TaskReport {
            task_id,
            kind: kind.into(),
            status: TaskStatus::Failed,
            output: None,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }
}

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(TaskError::PayloadTooLarge {
            max: MAX_PAYLOAD_SIZE,
            actual: payload.len(),
        });
    }
    Ok(())
}
