use crate::error::{Result, WorkerError};
use crate::worker::WorkerApplication;

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Upper bound on how long `shutdown` waits for the application's cleanup
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How a shutdown ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The application finished its cleanup within the timeout
    Completed,
    /// Cleanup was still running when the timeout expired
    TimedOut,
    /// The application stopped on cancellation before it was running
    Cancelled,
    /// Teardown failed; the message is informational only
    Failed(String),
    /// There was nothing to shut down
    NotRunning,
}

/// Requests a graceful shutdown, same as SIGINT/SIGTERM. Clones share the
/// flag; triggering more than once has no further effect.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    flag: CancellationToken,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.flag.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.is_cancelled()
    }
}

/// Runs a [`WorkerApplication`] in the background and shuts it down on a
/// termination signal, waiting a bounded time for its cleanup.
pub struct ApplicationRunner {
    app: Option<WorkerApplication>,
    /// Set by signals or a [`ShutdownTrigger`]
    shutdown: CancellationToken,
    /// Handed to the application's entrypoint
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
    shutdown_timeout: Duration,
}

impl ApplicationRunner {
    pub fn new(app: WorkerApplication) -> Self {
        ApplicationRunner {
            app: Some(app),
            shutdown: CancellationToken::new(),
            cancel: CancellationToken::new(),
            task: None,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            flag: self.shutdown.clone(),
        }
    }

    /// Start the application and wait for a shutdown request or for the
    /// application to finish by itself.
    ///
    /// Returns an error only when the application stopped on its own with
    /// one; a requested shutdown always yields its [`ShutdownOutcome`].
    pub async fn startup(&mut self) -> Result<ShutdownOutcome> {
        info!("Initializing application...");
        let app = self.app.take().ok_or(WorkerError::AlreadyStarted)?;

        let signals = tokio::spawn(listen_for_signals(self.shutdown.clone()));
        let mut task = tokio::spawn(app.entrypoint(self.cancel.clone()));
        info!("Application started successfully");

        let shutdown = self.shutdown.clone();
        let finished = tokio::select! {
            _ = shutdown.cancelled() => None,
            joined = &mut task => Some(joined),
        };

        let result = match finished {
            None => {
                self.task = Some(task);
                Ok(self.shutdown().await)
            }
            Some(Ok(Ok(()))) => {
                info!("Application finished");
                Ok(ShutdownOutcome::Completed)
            }
            Some(Ok(Err(e))) => {
                error!("Application runtime error: {}", e);
                Err(e)
            }
            Some(Err(e)) => {
                error!("Application runtime error: {}", e);
                Err(WorkerError::Crashed(e.to_string()))
            }
        };

        signals.abort();
        result
    }

    /// Cancel the application and wait up to the shutdown timeout for it to
    /// unregister. Never fails: every outcome is logged and returned.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        let Some(mut task) = self.task.take() else {
            return ShutdownOutcome::NotRunning;
        };

        info!("Initiating graceful shutdown...");
        self.shutdown.cancel();
        self.cancel.cancel();

        match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => {
                info!("Shutdown completed successfully");
                ShutdownOutcome::Completed
            }
            Ok(Ok(Err(WorkerError::Cancelled))) => {
                info!("Application shutdown complete");
                ShutdownOutcome::Cancelled
            }
            Ok(Err(e)) if e.is_cancelled() => {
                info!("Application shutdown complete");
                ShutdownOutcome::Cancelled
            }
            Ok(Ok(Err(e))) => {
                error!("Shutdown error: {}", e);
                ShutdownOutcome::Failed(e.to_string())
            }
            Ok(Err(e)) => {
                error!("Shutdown error: {}", e);
                ShutdownOutcome::Failed(e.to_string())
            }
            Err(_) => {
                // Dropping the handle detaches the task; cleanup may still finish
                warn!(
                    "Application shutdown timed out after {:?}, cleanup may still be running",
                    self.shutdown_timeout
                );
                ShutdownOutcome::TimedOut
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM and raise the shutdown flag once
async fn listen_for_signals(flag: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        // Either handler alone is enough to shut down
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| error!("Failed to install SIGTERM handler: {}", e))
            .ok();
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| error!("Failed to install SIGINT handler: {}", e))
            .ok();

        if sigterm.is_none() && sigint.is_none() {
            return;
        }

        tokio::select! {
            _ = next_signal(sigterm) => {
                info!("Received SIGTERM signal - initiating graceful shutdown");
            }
            _ = next_signal(sigint) => {
                info!("Received SIGINT signal (Ctrl+C) - initiating graceful shutdown");
            }
            _ = flag.cancelled() => return,
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C signal: {}", e);
                    return;
                }
                info!("Received Ctrl+C signal - initiating graceful shutdown");
            }
            _ = flag.cancelled() => return,
        }
    }

    flag.cancel();
}

/// Resolves on the next delivery; never resolves without a handler
#[cfg(unix)]
async fn next_signal(signal: Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(mut signal) => {
            signal.recv().await;
        }
        None => std::future::pending().await,
    }
}
