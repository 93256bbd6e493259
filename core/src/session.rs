//! A configured client paired with a transport.
//!
//! # Design
//! `Session` is the only type that performs I/O. It owns one
//! `CrowdFlowerClient` and one `Transport` and is passed by reference into
//! every `Job` operation; it never holds on to the jobs it produces.

use std::path::Path;

use serde_json::Value;

use crate::client::{resolve_content_type, CrowdFlowerClient};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::job::Job;
use crate::transport::{Transport, UreqTransport};

pub struct Session<T: Transport = UreqTransport> {
    client: CrowdFlowerClient,
    transport: T,
}

impl Session<UreqTransport> {
    /// Build a session with a `ureq` transport from validated config.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;
        Ok(Self {
            client: CrowdFlowerClient::from_config(config),
            transport: UreqTransport::new(config.timeout()),
        })
    }

    /// Shorthand for `Session::new(&ClientConfig::from_env()?)`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::new(&ClientConfig::from_env()?)
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(client: CrowdFlowerClient, transport: T) -> Self {
        Self { client, transport }
    }

    pub fn client(&self) -> &CrowdFlowerClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a prepared request. Only the method and path are logged; the
    /// query string carries the API key.
    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = request.method;
        let path = request.path.clone();
        tracing::debug!(%method, %path, "sending request");

        match self.transport.execute(request) {
            Ok(response) => {
                if (200..300).contains(&response.status) {
                    tracing::debug!(%method, %path, status = response.status, "request succeeded");
                } else {
                    tracing::warn!(%method, %path, status = response.status, "request failed");
                }
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(%method, %path, error = %e, "transport failure");
                Err(e)
            }
        }
    }

    /// Issue an authenticated request and decode the JSON response body.
    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let request = self.client.build_request(method, path, params, body)?;
        self.client.parse_json(self.execute(request)?)
    }

    /// Fetch an existing job.
    pub fn get_job(&self, id: u64) -> Result<Job, ApiError> {
        Job::fetch(self, id)
    }

    /// Create a new job from unit rows and return it in a clean state.
    pub fn upload_job(&self, rows: &[Value]) -> Result<Job, ApiError> {
        let request = self.client.build_upload_job(rows)?;
        let data = self.client.parse_job(self.execute(request)?)?;
        tracing::info!(id = ?crate::types::job_id(&data), rows = rows.len(), "created job from upload");
        Ok(Job::from_server(data))
    }

    /// Create a new job from raw unit data (CSV, spreadsheet, JSON lines).
    pub fn upload_job_bytes(&self, bytes: Vec<u8>, content_type: &str) -> Result<Job, ApiError> {
        let request = self.client.build_upload_file(None, bytes, content_type);
        let data = self.client.parse_job(self.execute(request)?)?;
        tracing::info!(id = ?crate::types::job_id(&data), content_type, "created job from upload");
        Ok(Job::from_server(data))
    }

    /// Create a new job from a unit file. Without an explicit content type
    /// one is guessed from the extension; the file is not read if neither
    /// works.
    pub fn upload_job_file(
        &self,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<Job, ApiError> {
        let path = path.as_ref();
        let content_type = resolve_content_type(path, content_type)?;
        let bytes = std::fs::read(path)?;
        self.upload_job_bytes(bytes, content_type)
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("client", &self.client).finish_non_exhaustive()
    }
}
