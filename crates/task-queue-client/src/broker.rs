use crate::{BrokerConfig, InMemoryBroker, Result, TcpBrokerClient};
use async_trait::async_trait;
use futures::stream::BoxStream;
use task_queue_core::TaskAssignment;

/// Lazy, unbounded sequence of tasks delivered on one queue.
///
/// Ends when the client disconnects or the transport closes; an `Err` item
/// reports a transport failure and is the last item of the stream.
pub type TaskStream = BoxStream<'static, Result<TaskAssignment>>;

/// Capabilities the worker needs from a broker
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Open the connection
    async fn connect(&mut self) -> Result<()>;

    /// Close the connection and end every open stream
    async fn disconnect(&mut self) -> Result<()>;

    /// Subscribe to a queue. A queue's stream is not restartable.
    async fn listen(&self, queue: &str) -> Result<TaskStream>;
}

/// Build the broker client selected by configuration
pub fn create_broker_client(config: &BrokerConfig, client_name: &str) -> Box<dyn BrokerClient> {
    match config {
        BrokerConfig::Tcp { address, username, password } => Box::new(TcpBrokerClient::new(
            address.clone(),
            client_name,
            username.clone(),
            password.clone(),
        )),
        BrokerConfig::InMemory => Box::new(InMemoryBroker::new()),
    }
}
