//! Collaborator clients used by the worker: the broker that delivers tasks
//! and the manager that tracks workers and task statuses.
//!
//! Each collaborator is a capability trait with a TCP variant speaking the
//! framed task-queue protocol and an in-memory variant for tests and local
//! runs. Configuration picks the variant through the `create_*` factories.

mod config;
mod broker;
mod manager;
mod tcp_broker;
mod tcp_manager;
mod memory_broker;
mod memory_manager;

pub use config::{BrokerConfig, ManagerConfig};
pub use broker::{BrokerClient, TaskStream, create_broker_client};
pub use manager::{ManagerClient, create_manager_client};
pub use tcp_broker::TcpBrokerClient;
pub use tcp_manager::TcpManagerClient;
pub use memory_broker::InMemoryBroker;
pub use memory_manager::{InMemoryManager, RegisteredWorker};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Broker client is not connected")]
    NotConnected,

    #[error("Queue {0} already has a listener")]
    AlreadySubscribed(String),

    #[error("Queue {0} is closed")]
    QueueClosed(String),

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Task error: {0}")]
    TaskError(#[from] task_queue_core::TaskError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<task_queue_protocol::ProtocolError> for ClientError {
    fn from(e: task_queue_protocol::ProtocolError) -> Self {
        ClientError::ProtocolError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
