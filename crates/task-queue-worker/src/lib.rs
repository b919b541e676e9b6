pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod locator;
pub mod runner;
pub mod worker;

pub use config::WorkerApplicationConfig;
pub use error::{Result, WorkerError};
pub use handler::{FnHandler, TaskHandler, TaskRegistry, TaskResult};
pub use locator::{AppCatalog, AppLocator, LocatorError};
pub use runner::{ApplicationRunner, ShutdownOutcome, ShutdownTrigger, SHUTDOWN_TIMEOUT};
pub use worker::{WorkerApplication, WorkerState};
