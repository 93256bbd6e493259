//! Synchronous client for CrowdFlower jobs.
//!
//! # Overview
//! `CrowdFlowerClient` builds `HttpRequest` values and parses `HttpResponse`
//! values without touching the network (host-does-IO pattern). A `Session`
//! pairs it with a `Transport` that performs the blocking round-trip, and
//! `Job` is a local, mutable proxy for one remote job that records which
//! fields changed and pushes only those on `save`.
//!
//! # Design
//! - `CrowdFlowerClient` is stateless: it holds only the base URL and key.
//! - The `Session` is passed explicitly into every `Job` operation and owns
//!   no jobs; there is no shared registry or global credential.
//! - Jobs are open JSON maps so unknown platform fields round-trip verbatim.
//! - No retries: every error reaches the caller as an `ApiError`.
//!
//! ```no_run
//! use crowdflower_core::{ClientConfig, Session};
//!
//! # fn main() -> Result<(), crowdflower_core::ApiError> {
//! let session = Session::new(&ClientConfig::new("my-api-key"))?;
//! let mut job = session.get_job(123123)?;
//! job.set_title("New Title");
//! job.save(&session)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod job;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{guess_content_type, CrowdFlowerClient};
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use job::{Job, JobState, SaveOutcome};
pub use session::Session;
pub use transport::{Transport, UreqTransport};
pub use types::JobData;
