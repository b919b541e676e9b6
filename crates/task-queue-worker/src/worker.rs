use crate::config::WorkerApplicationConfig;
use crate::error::{Result, WorkerError};
use crate::executor::TaskExecutor;
use crate::handler::{TaskHandler, TaskRegistry, TaskResult};
use task_queue_client::{create_broker_client, create_manager_client, BrokerClient, ManagerClient};
use task_queue_core::{TaskAssignment, TaskInput, TaskKind, TaskReport, TaskStatus, WorkerIdentity};

use futures::future::join_all;
use futures::StreamExt;
use std::future::Future;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a worker application. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Registered,
    /// One listen loop per registered kind
    Running { loops: usize },
    ShuttingDown,
    Unregistered,
}

/// A worker process: registers with the manager, listens on one broker queue
/// per task kind and reports every execution back to the manager.
pub struct WorkerApplication {
    config: WorkerApplicationConfig,
    registry: TaskRegistry,
    manager: Box<dyn ManagerClient>,
    broker: Box<dyn BrokerClient>,
    /// Present only between registration and unregistration
    identity: Option<WorkerIdentity>,
    state: watch::Sender<WorkerState>,
}

impl WorkerApplication {
    /// Create an application whose collaborators are selected by `config`
    pub fn new(config: WorkerApplicationConfig) -> Self {
        let broker = create_broker_client(&config.broker, &config.name);
        let manager = create_manager_client(&config.manager);
        Self::with_clients(config, broker, manager)
    }

    pub fn with_clients(
        config: WorkerApplicationConfig,
        broker: Box<dyn BrokerClient>,
        manager: Box<dyn ManagerClient>,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);

        WorkerApplication {
            config,
            registry: TaskRegistry::new(),
            manager,
            broker,
            identity: None,
            state,
        }
    }

    /// Register a handler for a kind, replacing any previous one
    pub fn register_task<H: TaskHandler + 'static>(
        &mut self,
        kind: impl Into<TaskKind>,
        handler: H,
    ) {
        self.registry.register(kind, handler);
    }

    /// Register an async function as the handler for a kind
    pub fn register_fn<F, Fut>(&mut self, kind: impl Into<TaskKind>, handler: F)
    where
        F: Fn(TaskInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.registry.register_fn(kind, handler);
    }

    /// Builder-style registration
    pub fn task<H: TaskHandler + 'static>(mut self, kind: impl Into<TaskKind>, handler: H) -> Self {
        self.register_task(kind, handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &WorkerApplicationConfig {
        &self.config
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        self.registry.kinds()
    }

    pub fn is_registered(&self) -> bool {
        self.identity.is_some()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Follow lifecycle transitions, including after the application has
    /// been moved into `entrypoint`
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Register with the manager, then connect to the broker.
    ///
    /// If the broker refuses the connection the freshly issued identity is
    /// given back before the error is returned.
    pub async fn register_worker(&mut self) -> Result<()> {
        if self.identity.is_some() {
            return Err(WorkerError::AlreadyRegistered);
        }
        if self.registry.is_empty() {
            return Err(WorkerError::NoTasksRegistered);
        }

        let kinds = self.registry.kinds();
        info!("Registering worker {} for task kinds {:?}", self.config.name, kinds);

        let identity = self
            .manager
            .register_worker(&self.config.name, &kinds)
            .await
            .map_err(WorkerError::Registration)?;
        info!("Worker {} registered as {}", self.config.name, identity);
        self.identity = Some(identity);

        if let Err(source) = self.broker.connect().await {
            error!("Failed to connect to broker: {}", source);
            if let Some(identity) = self.identity.take() {
                if let Err(e) = self.manager.unregister_worker(identity).await {
                    warn!("Failed to release worker identity: {}", e);
                }
            }
            return Err(WorkerError::Broker(source));
        }

        self.state.send_replace(WorkerState::Registered);
        Ok(())
    }

    /// Give the identity back to the manager and disconnect the broker.
    ///
    /// The broker is disconnected even when the manager call fails; the
    /// first error is returned.
    pub async fn unregister_worker(&mut self) -> Result<()> {
        let identity = self.identity.take().ok_or(WorkerError::NotRegistered)?;
        info!("Unregistering worker {} ({})", self.config.name, identity);

        let unregistered = self
            .manager
            .unregister_worker(identity)
            .await
            .map_err(WorkerError::Unregistration);
        if let Err(e) = &unregistered {
            error!("{}", e);
        }

        let disconnected = self.broker.disconnect().await.map_err(WorkerError::Broker);
        if let Err(e) = &disconnected {
            error!("Failed to disconnect from broker: {}", e);
        }

        self.state.send_replace(WorkerState::Unregistered);
        unregistered.and(disconnected)
    }

    /// Drive the whole lifecycle: register, run one listen loop per kind
    /// until they all end or `cancel` fires, then unregister.
    ///
    /// Cleanup runs exactly once whenever an identity was issued. A
    /// cancellation that arrives before registration completes yields
    /// [`WorkerError::Cancelled`]; one that arrives while running is a
    /// normal shutdown.
    pub async fn entrypoint(mut self, cancel: CancellationToken) -> Result<()> {
        let registered = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WorkerError::Cancelled),
            registered = self.register_worker() => registered,
        };

        if let Err(e) = registered {
            if self.identity.is_some() {
                if let Err(cleanup) = self.unregister_worker().await {
                    warn!("Cleanup after failed registration also failed: {}", cleanup);
                }
            }
            return Err(e);
        }

        let running = self.run(&cancel).await;
        let cleanup = self.unregister_worker().await;

        match (running, cleanup) {
            (Ok(()), cleanup) => cleanup,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                error!("Cleanup after failure also failed: {}", cleanup);
                Err(e)
            }
        }
    }

    /// RUNNING phase. The first loop to fail stops its siblings.
    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let kinds = self.registry.kinds();
        self.state.send_replace(WorkerState::Running { loops: kinds.len() });
        info!("Worker {} running {} listen loops", self.config.name, kinds.len());

        let stop = cancel.child_token();
        let stop = &stop;
        let loops = join_all(kinds.iter().map(|kind| async move {
            let result = self.listen(kind, stop).await;
            if let Err(e) = &result {
                error!("Listen loop for {} failed: {}", kind, e);
                stop.cancel();
            }
            result
        }));
        tokio::pin!(loops);

        let finished = tokio::select! {
            results = &mut loops => Some(results),
            _ = cancel.cancelled() => None,
        };
        let results = match finished {
            Some(results) => results,
            None => {
                self.state.send_replace(WorkerState::ShuttingDown);
                info!("Worker {} shutting down", self.config.name);
                loops.await
            }
        };

        let mut errors = results.into_iter().filter_map(|result| result.err());
        match errors.next() {
            Some(first) => {
                for other in errors {
                    debug!("Additional listen loop error: {}", other);
                }
                Err(first)
            }
            None => Ok(()),
        }
    }

    /// Per-kind loop: one task in flight at a time, in delivery order
    async fn listen(&self, kind: &str, cancel: &CancellationToken) -> Result<()> {
        let subscribed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            subscribed = self.broker.listen(kind) => subscribed,
        };
        let mut tasks = subscribed.map_err(|source| WorkerError::Listener {
            kind: kind.to_string(),
            source,
        })?;

        info!("Listening for {} tasks", kind);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = tasks.next() => next,
            };

            let assignment = match next {
                Some(Ok(assignment)) => assignment,
                Some(Err(source)) => {
                    return Err(WorkerError::Listener {
                        kind: kind.to_string(),
                        source,
                    })
                }
                None => {
                    debug!("Queue {} ended", kind);
                    break;
                }
            };

            let task_id = assignment.id;
            let executed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Abandoning task {} ({}) on shutdown", task_id, kind);
                    break;
                }
                executed = self.execute_task(kind, assignment) => executed,
            };

            match executed {
                Ok(status) => debug!("Task {} ({}) reported as {}", task_id, kind, status.as_str()),
                // Already logged; the loop keeps going without retrying
                Err(WorkerError::StatusReport { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        info!("Stopped listening for {} tasks", kind);
        Ok(())
    }

    /// Run one task and send exactly one status report for it
    async fn execute_task(&self, kind: &str, assignment: TaskAssignment) -> Result<TaskStatus> {
        let handler = self.registry.resolve(kind)?;
        let task_id = assignment.id;

        debug!("Executing task {} ({})", task_id, kind);

        let report = match TaskExecutor::new(handler).execute(assignment.input).await {
            Ok(output) => TaskReport::completed(task_id, kind, output).unwrap_or_else(|e| {
                error!("Task {} ({}) produced an unreportable output: {}", task_id, kind, e);
                TaskReport::failed(task_id, kind, e.to_string())
            }),
            Err(message) => {
                error!("Task {} ({}) failed: {}", task_id, kind, message);
                TaskReport::failed(task_id, kind, message)
            }
        };
        let status = report.status;

        self.manager.update_task_status(report).await.map_err(|source| {
            error!("Failed to report status of task {} ({}): {}", task_id, kind, source);
            WorkerError::StatusReport {
                task_id,
                kind: kind.to_string(),
                source,
            }
        })?;

        Ok(status)
    }
}

impl std::fmt::Debug for WorkerApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerApplication")
            .field("name", &self.config.name)
            .field("registry", &self.registry)
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}
