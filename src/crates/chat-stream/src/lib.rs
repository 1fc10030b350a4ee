//! Rill chat streaming client
//!
//! Resumable SSE chat sessions for the Rill assistant backend:
//! - Stream session controller: opens the push channel, delivers chunks,
//!   exposes cancellation and a completion signal
//! - Resume coordinator: supplies the last-chunk cursor on reconnect
//! - Local recovery cache: restart-surviving progress records

pub mod cache;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod resume;
pub mod sink;
pub mod storage;
pub mod transport;
pub mod types;

pub use cache::{CacheEntry, RecoveryCache};
pub use config::{ClientConfig, RetryConfig};
pub use controller::{
    StreamHandle, StreamOptions, StreamOutcome, StreamSessionController,
};
pub use credentials::{Anonymous, CredentialProvider, StaticCredential};
pub use error::StreamError;
pub use resume::ResumeCoordinator;
pub use sink::StreamSink;
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use transport::LAST_CHUNK_ID_HEADER;
pub use types::ChatMode;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
