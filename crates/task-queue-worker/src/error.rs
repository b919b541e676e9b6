use task_queue_client::ClientError;
use task_queue_core::TaskId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("No task kinds registered")]
    NoTasksRegistered,

    #[error("Task kind {0} is not registered")]
    UnknownTaskKind(String),

    #[error("Worker is already registered")]
    AlreadyRegistered,

    #[error("Worker is not registered")]
    NotRegistered,

    #[error("Worker registration failed: {0}")]
    Registration(#[source] ClientError),

    #[error("Broker error: {0}")]
    Broker(#[source] ClientError),

    #[error("Listener for {kind} failed: {source}")]
    Listener { kind: String, source: ClientError },

    #[error("Failed to report status of task {task_id} ({kind}): {source}")]
    StatusReport {
        task_id: TaskId,
        kind: String,
        source: ClientError,
    },

    #[error("Worker unregistration failed: {0}")]
    Unregistration(#[source] ClientError),

    #[error("Worker was cancelled before it started running")]
    Cancelled,

    #[error("Application has already been started")]
    AlreadyStarted,

    #[error("Application task crashed: {0}")]
    Crashed(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
