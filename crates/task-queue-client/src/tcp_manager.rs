use crate::{ClientError, ManagerClient, Result};
use async_trait::async_trait;
use task_queue_core::{TaskKind, TaskReport, WorkerIdentity};
use task_queue_protocol::{
    AckResponse, Message, MessageCodec, RegisterWorkerRequest, UnregisterWorkerRequest,
    UpdateTaskStatusRequest,
};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// Manager client speaking the framed protocol, one connection per request
pub struct TcpManagerClient {
    address: String,
}

impl TcpManagerClient {
    pub fn new(address: impl Into<String>) -> Self {
        TcpManagerClient { address: address.into() }
    }

    /// Send one request and wait for its Ack/Nack
    async fn request(&self, message: Message) -> Result<AckResponse> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| ClientError::ConnectionError(format!("{}: {}", self.address, e)))?;

        let mut framed = Framed::new(stream, MessageCodec);

        framed.send(message).await?;

        match framed.next().await {
            Some(Ok(Message::Ack(ack))) => Ok(ack),
            Some(Ok(Message::Nack(nack))) => Err(ClientError::ServerError(nack.error)),
            Some(Ok(other)) => Err(ClientError::ProtocolError(format!(
                "Unexpected response: {:?}",
                other.message_type()
            ))),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::ConnectionError("Connection closed".to_string())),
        }
    }
}

#[async_trait]
impl ManagerClient for TcpManagerClient {
    async fn register_worker(&self, name: &str, kinds: &[TaskKind]) -> Result<WorkerIdentity> {
        let ack = self
            .request(Message::RegisterWorker(RegisterWorkerRequest {
                name: name.to_string(),
                kinds: kinds.to_vec(),
            }))
            .await?;

        ack.worker_id.ok_or_else(|| {
            ClientError::ProtocolError("Registration acknowledged without an identity".to_string())
        })
    }

    async fn unregister_worker(&self, identity: WorkerIdentity) -> Result<()> {
        debug!("Unregistering worker {}", identity);
        self.request(Message::UnregisterWorker(UnregisterWorkerRequest { worker_id: identity }))
            .await?;
        Ok(())
    }

    async fn update_task_status(&self, report: TaskReport) -> Result<()> {
        self.request(Message::UpdateTaskStatus(UpdateTaskStatusRequest { report }))
            .await?;
        Ok(())
    }
}
