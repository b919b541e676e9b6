use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use task_queue_core::{TaskInput, TaskKind, TaskOutput};
use tracing::debug;

/// Result type for task handlers
pub type TaskResult = std::result::Result<TaskOutput, String>;

/// Trait for task handlers
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task with the given input
    async fn execute(&self, input: TaskInput) -> TaskResult;
}

/// Adapts an async function or closure into a [`TaskHandler`]
pub struct FnHandler<F> {
    handler: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(TaskInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        FnHandler { handler }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    async fn execute(&self, input: TaskInput) -> TaskResult {
        (self.handler)(input).await
    }
}

/// Mapping from task kind to handler.
///
/// Filled while the application is being configured and only read once the
/// worker runs; registering a kind twice keeps the last handler.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task handler for a specific kind
    pub fn register<H: TaskHandler + 'static>(&mut self, kind: impl Into<TaskKind>, handler: H) {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), Arc::new(handler)).is_some() {
            debug!("Replaced handler for task kind {}", kind);
        } else {
            debug!("Registered handler for task kind {}", kind);
        }
    }

    /// Register an async function as the handler for a kind
    pub fn register_fn<F, Fut>(&mut self, kind: impl Into<TaskKind>, handler: F)
    where
        F: Fn(TaskInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.register(kind, FnHandler::new(handler));
    }

    /// Handler for a kind; an unknown kind means the worker is misconfigured
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn TaskHandler>> {
        self.handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| WorkerError::UnknownTaskKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Example task handler that just echoes the input
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn execute(&self, input: TaskInput) -> TaskResult {
        Ok(input)
    }
}

/// Example task handler that simulates work
pub struct SleepHandler {
    duration_ms: u64,
}

impl SleepHandler {
    pub fn new(duration_ms: u64) -> Self {
        SleepHandler { duration_ms }
    }
}

#[async_trait]
impl TaskHandler for SleepHandler {
    async fn execute(&self, input: TaskInput) -> TaskResult {
        tokio::time::sleep(tokio::time::Duration::from_millis(self.duration_ms)).await;
        Ok(input)
    }
}

/// Example task handler that processes JSON
pub struct JsonProcessorHandler;

#[async_trait]
impl TaskHandler for JsonProcessorHandler {
    async fn execute(&self, input: TaskInput) -> TaskResult {
        let json: serde_json::Value = serde_json::from_slice(&input)
            .map_err(|e| format!("Invalid JSON: {}", e))?;

        // Example: count keys if object
        let result = if let Some(obj) = json.as_object() {
            serde_json::json!({
                "key_count": obj.len(),
                "original": json,
            })
        } else {
            serde_json::json!({
                "original": json,
            })
        };

        serde_json::to_vec(&result).map_err(|e| format!("Failed to serialize result: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_handler() {
        let input = b"test data".to_vec();
        let result = EchoHandler.execute(input.clone()).await.unwrap();
        assert_eq!(result, input);
    }

    #[tokio::test]
    async fn test_json_handler_counts_keys() {
        let output = JsonProcessorHandler
            .execute(br#"{"a": 1, "b": 2}"#.to_vec())
            .await
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["key_count"], 2);
    }

    #[tokio::test]
    async fn test_json_handler_rejects_garbage() {
        let err = JsonProcessorHandler.execute(b"not json".to_vec()).await.unwrap_err();
        assert!(err.starts_with("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_registry() {
        let mut registry = TaskRegistry::new();
        registry.register("echo", EchoHandler);

        assert!(registry.contains("echo"));
        assert!(!registry.contains("unknown"));

        let handler = registry.resolve("echo").unwrap();
        let result = handler.execute(b"test".to_vec()).await.unwrap();
        assert_eq!(result, b"test");
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = TaskRegistry::new();
        registry.register_fn("a", |_input| async { Ok::<_, String>(b"first".to_vec()) });
        registry.register_fn("a", |_input| async { Ok::<_, String>(b"second".to_vec()) });

        assert_eq!(registry.len(), 1);
        let output = registry.resolve("a").unwrap().execute(vec![]).await.unwrap();
        assert_eq!(output, b"second");
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let registry = TaskRegistry::new();
        match registry.resolve("missing") {
            Err(WorkerError::UnknownTaskKind(kind)) => assert_eq!(kind, "missing"),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("resolved an unregistered kind"),
        }
    }

    #[test]
    fn test_kinds_are_sorted() {
        let mut registry = TaskRegistry::new();
        registry.register("b", EchoHandler);
        registry.register("a", EchoHandler);
        registry.register("c", SleepHandler::new(1));

        assert_eq!(registry.kinds(), vec!["a", "b", "c"]);
        assert_eq!(format!("{:?}", registry), r#"TaskRegistry { kinds: ["a", "b", "c"] }"#);
    }
}
