use crate::{InMemoryManager, ManagerConfig, Result, TcpManagerClient};
use async_trait::async_trait;
use task_queue_core::{TaskKind, TaskReport, WorkerIdentity};

/// Capabilities the worker needs from the manager
#[async_trait]
pub trait ManagerClient: Send + Sync {
    /// Announce a worker and the kinds it executes
    async fn register_worker(&self, name: &str, kinds: &[TaskKind]) -> Result<WorkerIdentity>;

    /// Give an identity back; it cannot be used afterwards
    async fn unregister_worker(&self, identity: WorkerIdentity) -> Result<()>;

    /// Record the terminal status of a task
    async fn update_task_status(&self, report: TaskReport) -> Result<()>;
}

/// Build the manager client selected by configuration
pub fn create_manager_client(config: &ManagerConfig) -> Box<dyn ManagerClient> {
    match config {
        ManagerConfig::Tcp { address } => Box::new(TcpManagerClient::new(address.clone())),
        ManagerConfig::InMemory => Box::new(InMemoryManager::new()),
    }
}
