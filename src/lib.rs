// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod digest;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod store;

pub use crate::api::router;
pub use crate::error::{Error, Result};
pub use crate::pipeline::Pipeline;
pub use crate::scheduler::{JobKind, Scheduler};
pub use crate::store::Store;
