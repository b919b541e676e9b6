use crate::{BrokerClient, ClientError, Result, TaskStream};
use async_trait::async_trait;
use task_queue_protocol::{HelloRequest, Message, MessageCodec, SubscribeRequest};

use futures::{stream, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Connection = Framed<TcpStream, MessageCodec>;

/// Broker client speaking the framed protocol.
///
/// Every subscription gets its own connection so queues never block each
/// other; `disconnect` ends all of them at once.
pub struct TcpBrokerClient {
    address: String,
    client_name: String,
    username: String,
    password: String,
    /// Present while connected; cancelled on disconnect
    session: Option<CancellationToken>,
}

impl TcpBrokerClient {
    pub fn new(
        address: impl Into<String>,
        client_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        TcpBrokerClient {
            address: address.into(),
            client_name: client_name.into(),
            username: username.into(),
            password: password.into(),
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Open a connection and authenticate it
    async fn handshake(&self) -> Result<Connection> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| ClientError::ConnectionError(format!("{}: {}", self.address, e)))?;

        let mut framed = Framed::new(stream, MessageCodec);
        framed
            .send(Message::Hello(HelloRequest {
                client_name: self.client_name.clone(),
                username: self.username.clone(),
                password: self.password.clone(),
            }))
            .await?;

        expect_ack(&mut framed).await?;
        Ok(framed)
    }
}

async fn expect_ack(framed: &mut Connection) -> Result<()> {
    match framed.next().await {
        Some(Ok(Message::Ack(_))) => Ok(()),
        Some(Ok(Message::Nack(nack))) => Err(ClientError::ServerError(nack.error)),
        Some(Ok(other)) => Err(ClientError::ProtocolError(format!(
            "Unexpected response: {:?}",
            other.message_type()
        ))),
        Some(Err(e)) => Err(e.into()),
        None => Err(ClientError::ConnectionError("Connection closed".to_string())),
    }
}

#[async_trait]
impl BrokerClient for TcpBrokerClient {
    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        // Handshake once to check the broker is reachable and accepts us
        let mut check = self.handshake().await?;
        if let Err(e) = check.close().await {
            debug!("Failed to close handshake connection: {}", e);
        }

        self.session = Some(CancellationToken::new());
        info!("Connected to broker at {}", self.address);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.cancel();
            info!("Disconnected from broker at {}", self.address);
        }
        Ok(())
    }

    async fn listen(&self, queue: &str) -> Result<TaskStream> {
        let session = self.session.clone().ok_or(ClientError::NotConnected)?;

        let mut framed = self.handshake().await?;
        framed
            .send(Message::Subscribe(SubscribeRequest { queue: queue.to_string() }))
            .await?;
        expect_ack(&mut framed).await?;

        debug!("Subscribed to queue {}", queue);

        let state = Some((framed, session, queue.to_string()));
        let tasks = stream::unfold(state, |state| async move {
            let Some((mut framed, session, queue)) = state else {
                return None;
            };

            let next = tokio::select! {
                _ = session.cancelled() => return None,
                next = framed.next() => next,
            };

            match next {
                Some(Ok(Message::TaskAssigned(msg))) => {
                    Some((Ok(msg.assignment), Some((framed, session, queue))))
                }
                Some(Ok(other)) => {
                    let err = ClientError::ProtocolError(format!(
                        "Unexpected {:?} on queue {}",
                        other.message_type(),
                        queue
                    ));
                    Some((Err(err), None))
                }
                Some(Err(e)) => {
                    warn!("Subscription to {} failed: {}", queue, e);
                    Some((Err(e.into()), None))
                }
                None => {
                    debug!("Broker closed subscription to {}", queue);
                    None
                }
            }
        });

        Ok(tasks.boxed())
    }
}
