use crate::{ClientError, ManagerClient, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use task_queue_core::{TaskKind, TaskReport, WorkerIdentity};

use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

/// A worker the manager currently knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredWorker {
    pub name: String,
    pub kinds: Vec<TaskKind>,
}

#[derive(Default)]
struct ManagerState {
    live: HashMap<Uuid, RegisteredWorker>,
    registrations: usize,
    unregistrations: usize,
    reports: Vec<TaskReport>,
    refuse_registration: bool,
    refuse_status_updates: bool,
}

/// Process-local manager that records everything it is told.
/// Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryManager {
    state: Arc<Mutex<ManagerState>>,
    reported: Arc<Notify>,
}

impl InMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `register_worker` fail as if the manager refused the connection
    pub fn refuse_registration(&self, refuse: bool) {
        self.state.lock().refuse_registration = refuse;
    }

    /// Make `update_task_status` fail as if the manager were unreachable
    pub fn refuse_status_updates(&self, refuse: bool) {
        self.state.lock().refuse_status_updates = refuse;
    }

    /// Workers currently registered
    pub fn live_workers(&self) -> Vec<RegisteredWorker> {
        self.state.lock().live.values().cloned().collect()
    }

    pub fn registration_count(&self) -> usize {
        self.state.lock().registrations
    }

    pub fn unregistration_count(&self) -> usize {
        self.state.lock().unregistrations
    }

    /// Every status report received so far, in arrival order
    pub fn reports(&self) -> Vec<TaskReport> {
        self.state.lock().reports.clone()
    }

    /// Wait until at least `count` reports arrived; false on timeout
    pub async fn wait_for_reports(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.reported.notified();
                if self.state.lock().reports.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl ManagerClient for InMemoryManager {
    async fn register_worker(&self, name: &str, kinds: &[TaskKind]) -> Result<WorkerIdentity> {
        let mut state = self.state.lock();
        if state.refuse_registration {
            return Err(ClientError::ConnectionError("connection refused".to_string()));
        }

        let identity = WorkerIdentity::generate();
        state.live.insert(
            identity.as_uuid(),
            RegisteredWorker {
                name: name.to_string(),
                kinds: kinds.to_vec(),
            },
        );
        state.registrations += 1;
        debug!("Registered worker {} as {}", name, identity);
        Ok(identity)
    }

    async fn unregister_worker(&self, identity: WorkerIdentity) -> Result<()> {
        let mut state = self.state.lock();
        if state.live.remove(&identity.as_uuid()).is_none() {
            return Err(ClientError::UnknownWorker(identity.to_string()));
        }
        state.unregistrations += 1;
        Ok(())
    }

    async fn update_task_status(&self, report: TaskReport) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.refuse_status_updates {
                return Err(ClientError::ConnectionError("manager unreachable".to_string()));
            }
            state.reports.push(report);
        }
        self.reported.notify_waiters();
        Ok(())
    }
}
