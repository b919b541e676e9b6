use crate::{BrokerClient, ClientError, Result, TaskStream};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use task_queue_core::{TaskAssignment, TaskId, TaskInput};

use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Queue {
    /// None once the queue has been closed
    sender: Option<mpsc::UnboundedSender<TaskAssignment>>,
    /// Taken by the first (and only) listener
    receiver: Option<mpsc::UnboundedReceiver<TaskAssignment>>,
}

impl Queue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Queue {
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }
}

struct BrokerState {
    session: Option<CancellationToken>,
    queues: HashMap<String, Queue>,
    subscriptions: Vec<String>,
    connects: usize,
    disconnects: usize,
    refuse_connections: bool,
}

/// Process-local broker. Clones share the same queues, so a test can keep
/// one handle to publish while the worker owns another.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        InMemoryBroker {
            state: Arc::new(Mutex::new(BrokerState {
                session: None,
                queues: HashMap::new(),
                subscriptions: Vec::new(),
                connects: 0,
                disconnects: 0,
                refuse_connections: false,
            })),
        }
    }

    /// Enqueue an input on a queue, creating the queue if needed
    pub fn publish(&self, queue: &str, input: TaskInput) -> Result<TaskId> {
        let assignment = TaskAssignment::new(input)?;
        let task_id = assignment.id;

        let mut state = self.state.lock();
        let slot = state.queues.entry(queue.to_string()).or_insert_with(Queue::new);
        let sender = slot
            .sender
            .as_ref()
            .ok_or_else(|| ClientError::QueueClosed(queue.to_string()))?;
        sender
            .send(assignment)
            .map_err(|_| ClientError::QueueClosed(queue.to_string()))?;

        Ok(task_id)
    }

    /// End a queue's stream once its pending inputs are drained
    pub fn close_queue(&self, queue: &str) {
        let mut state = self.state.lock();
        let slot = state.queues.entry(queue.to_string()).or_insert_with(Queue::new);
        slot.sender = None;
    }

    /// Make subsequent `connect` calls fail as if the broker were down
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Queues that have been listened to, in subscription order
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().session.is_some()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnects
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(ClientError::ConnectionError("connection refused".to_string()));
        }
        if state.session.is_none() {
            state.session = Some(CancellationToken::new());
            state.connects += 1;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(session) = state.session.take() {
            session.cancel();
            state.disconnects += 1;
        }
        Ok(())
    }

    async fn listen(&self, queue: &str) -> Result<TaskStream> {
        let (session, receiver) = {
            let mut state = self.state.lock();
            let session = state.session.clone().ok_or(ClientError::NotConnected)?;
            let slot = state.queues.entry(queue.to_string()).or_insert_with(Queue::new);
            let receiver = slot
                .receiver
                .take()
                .ok_or_else(|| ClientError::AlreadySubscribed(queue.to_string()))?;
            state.subscriptions.push(queue.to_string());
            (session, receiver)
        };

        debug!("Subscribed to in-memory queue {}", queue);

        let tasks = stream::unfold((receiver, session), |(mut receiver, session)| async move {
            let next = tokio::select! {
                _ = session.cancelled() => None,
                assignment = receiver.recv() => assignment,
            };
            next.map(|assignment| (Ok(assignment), (receiver, session)))
        });

        Ok(tasks.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_listen_is_fifo() {
        let mut broker = InMemoryBroker::new();
        broker.connect().await.unwrap();

        let first = broker.publish("a", b"x1".to_vec()).unwrap();
        let second = broker.publish("a", b"x2".to_vec()).unwrap();
        broker.close_queue("a");

        let tasks: Vec<_> = broker.listen("a").await.unwrap().collect().await;
        let ids: Vec<_> = tasks.into_iter().map(|t| t.unwrap().id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_listen_before_connect_fails() {
        let broker = InMemoryBroker::new();
        assert!(matches!(broker.listen("a").await, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_queue_is_not_restartable() {
        let mut broker = InMemoryBroker::new();
        broker.connect().await.unwrap();

        let _first = broker.listen("a").await.unwrap();
        assert!(matches!(
            broker.listen("a").await,
            Err(ClientError::AlreadySubscribed(q)) if q == "a"
        ));
        assert_eq!(broker.subscriptions(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_disconnect_ends_streams() {
        let mut broker = InMemoryBroker::new();
        broker.connect().await.unwrap();
        let mut tasks = broker.listen("a").await.unwrap();

        broker.disconnect().await.unwrap();
        assert!(tasks.next().await.is_none());
        assert_eq!(broker.disconnect_count(), 1);

        // Second disconnect is a no-op
        broker.disconnect().await.unwrap();
        assert_eq!(broker.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let mut broker = InMemoryBroker::new();
        broker.refuse_connections(true);

        assert!(matches!(broker.connect().await, Err(ClientError::ConnectionError(_))));
        assert!(!broker.is_connected());
        assert_eq!(broker.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_to_closed_queue() {
        let broker = InMemoryBroker::new();
        broker.close_queue("a");
        assert!(matches!(
            broker.publish("a", b"late".to_vec()),
            Err(ClientError::QueueClosed(_))
        ));
    }
}
