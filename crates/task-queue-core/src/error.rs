use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Payload size exceeds maximum allowed size of {max} bytes (got {actual})")]
    PayloadTooLarge { max: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, TaskError>;
