pub mod config;
pub mod logging;

pub mod chunking;
pub mod control;
pub mod controller;
pub mod error;
pub mod probe;
pub mod progress;
pub mod project;
pub mod retry;
pub mod task;
pub mod transfer;
pub mod url_model;

pub use controller::{DownloadController, StartRequest};
pub use error::EngineError;
pub use task::{DownloadTask, TaskEvent, TaskStatus};
