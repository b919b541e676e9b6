use serde::{Deserialize, Serialize};
use task_queue_core::{TaskAssignment, TaskKind, TaskReport, WorkerIdentity};

/// Message types for the TCP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 1,
    Subscribe = 2,
    TaskAssigned = 3,
    RegisterWorker = 4,
    UnregisterWorker = 5,
    UpdateTaskStatus = 6,
    Ack = 7,
    Nack = 8,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Hello),
            2 => Some(MessageType::Subscribe),
            3 => Some(MessageType::TaskAssigned),
            4 => Some(MessageType::RegisterWorker),
            5 => Some(MessageType::UnregisterWorker),
            6 => Some(MessageType::UpdateTaskStatus),
            7 => Some(MessageType::Ack),
            8 => Some(MessageType::Nack),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages
#[derive(Debug, Serialize, Deserialize)]
pub enum Message {
    /// Broker handshake carrying client credentials
    Hello(HelloRequest),

    /// Start streaming a queue on this connection
    Subscribe(SubscribeRequest),

    /// Broker pushes a task to a subscribed connection
    TaskAssigned(TaskAssignedMessage),

    /// Worker announces itself to the manager
    RegisterWorker(RegisterWorkerRequest),

    /// Worker leaves the manager
    UnregisterWorker(UnregisterWorkerRequest),

    /// Worker reports a terminal task status
    UpdateTaskStatus(UpdateTaskStatusRequest),

    /// Positive acknowledgment
    Ack(AckResponse),

    /// Negative acknowledgment
    Nack(NackResponse),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::Subscribe(_) => MessageType::Subscribe,
            Message::TaskAssigned(_) => MessageType::TaskAssigned,
            Message::RegisterWorker(_) => MessageType::RegisterWorker,
            Message::UnregisterWorker(_) => MessageType::UnregisterWorker,
            Message::UpdateTaskStatus(_) => MessageType::UpdateTaskStatus,
            Message::Ack(_) => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloRequest {
    pub client_name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub queue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignedMessage {
    pub queue: String,
    pub assignment: TaskAssignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    pub name: String,
    pub kinds: Vec<TaskKind>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnregisterWorkerRequest {
    pub worker_id: WorkerIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub report: TaskReport,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AckResponse {
    /// Identity issued in reply to RegisterWorker
    pub worker_id: Option<WorkerIdentity>,
    /// Optional message
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NackResponse {
    pub error: String,
}
