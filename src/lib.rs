//! Volair core: configuration stores, temporary agent memory, and the
//! orchestration-server client.

pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod memory;
pub mod storage;

pub use client::{ClientError, VolairClient};
pub use error::AppError;
pub use memory::{Message, TemporaryMemory};
pub use storage::{ConfigStore, Stores};
