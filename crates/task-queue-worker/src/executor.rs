use crate::handler::{TaskHandler, TaskResult};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use task_queue_core::TaskInput;

/// Runs one handler invocation, turning a panic into a task failure
pub struct TaskExecutor {
    handler: Arc<dyn TaskHandler>,
}

impl TaskExecutor {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        TaskExecutor { handler }
    }

    /// Execute with panic recovery.
    ///
    /// The handler runs on the caller's task so that dropping this future
    /// (cancellation) also drops the handler.
    pub async fn execute(&self, input: TaskInput) -> TaskResult {
        match AssertUnwindSafe(self.handler.execute(input)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(format!("Task panicked: {}", panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
