//! Local proxy for a remote job with explicit dirty tracking.
//!
//! # Design
//! A `Job` keeps two maps: `data`, the last-known server representation, and
//! `changes`, the fields set locally since the last sync. Reads consult
//! `changes` first. The keys of `changes` are the dirty-field set, so a field
//! set many times is still sent once.
//!
//! Every network operation builds its new state off to the side and commits
//! it only after the response parsed successfully, so a failed call leaves
//! the job exactly as it was and a retry resends the same changes.

use std::path::Path;

use serde_json::Value;

use crate::client::resolve_content_type;
use crate::error::ApiError;
use crate::session::Session;
use crate::transport::Transport;
use crate::types::{self, JobData, FIELD_CML, FIELD_ID, FIELD_INSTRUCTIONS, FIELD_TITLE};

/// Synchronization state of a `Job` relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No id yet; the next save creates the job.
    New,
    /// Matches the last-known server state.
    Clean,
    /// Has local changes not yet pushed.
    Dirty,
}

/// What a call to `Job::save` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Job {
    data: JobData,
    changes: JobData,
}

impl Job {
    /// A job that exists only locally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a job representation received from the server. The result has
    /// no pending changes.
    pub fn from_server(data: JobData) -> Self {
        Self {
            data,
            changes: JobData::new(),
        }
    }

    pub fn fetch<T: Transport>(session: &Session<T>, id: u64) -> Result<Self, ApiError> {
        let request = session.client().build_get_job(id);
        let data = session.client().parse_job(session.execute(request)?)?;
        Ok(Self::from_server(data))
    }

    pub fn state(&self) -> JobState {
        if self.id().is_none() {
            JobState::New
        } else if self.changes.is_empty() {
            JobState::Clean
        } else {
            JobState::Dirty
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Names of fields set locally since the last sync, in sorted order.
    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> + '_ {
        let mut names: Vec<&str> = self.changes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names.into_iter()
    }

    /// Pending local values, keyed by field name.
    pub fn changes(&self) -> &JobData {
        &self.changes
    }

    /// The last-known server representation, without local changes.
    pub fn server_data(&self) -> &JobData {
        &self.data
    }

    /// Server data with local changes applied on top.
    pub fn to_json(&self) -> JobData {
        let mut merged = self.data.clone();
        merged.extend(self.changes.clone());
        merged
    }

    pub fn id(&self) -> Option<u64> {
        types::job_id(&self.data)
    }

    /// Current value of a field: the pending local value if there is one,
    /// otherwise the server value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.changes.get(field).or_else(|| self.data.get(field))
    }

    fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str(FIELD_TITLE)
    }

    pub fn instructions(&self) -> Option<&str> {
        self.get_str(FIELD_INSTRUCTIONS)
    }

    /// CML markup, returned verbatim.
    pub fn cml(&self) -> Option<&str> {
        self.get_str(FIELD_CML)
    }

    /// Set any writable field and mark it dirty.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self, ApiError> {
        if types::is_read_only(field) {
            return Err(ApiError::ReadOnlyAttribute(field.to_string()));
        }
        self.changes.insert(field.to_string(), value.into());
        Ok(self)
    }

    fn set_writable(&mut self, field: &str, value: Value) -> &mut Self {
        self.changes.insert(field.to_string(), value);
        self
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.set_writable(FIELD_TITLE, Value::String(title.into()))
    }

    pub fn set_instructions(&mut self, instructions: impl Into<String>) -> &mut Self {
        self.set_writable(FIELD_INSTRUCTIONS, Value::String(instructions.into()))
    }

    /// Set CML markup. It is not parsed here; the server validates it.
    pub fn set_cml(&mut self, cml: impl Into<String>) -> &mut Self {
        self.set_writable(FIELD_CML, Value::String(cml.into()))
    }

    /// Drop all pending changes.
    pub fn discard_changes(&mut self) {
        self.changes.clear();
    }

    /// Push local state to the server.
    ///
    /// A new job is created with its full attribute mapping. A dirty job
    /// sends only its dirty fields. A clean job is left alone and no request
    /// is made. On error the job is unchanged.
    pub fn save<T: Transport>(&mut self, session: &Session<T>) -> Result<SaveOutcome, ApiError> {
        match self.state() {
            JobState::Clean => {
                tracing::debug!(id = ?self.id(), "job is clean, nothing to save");
                Ok(SaveOutcome::Unchanged)
            }
            JobState::New => self.create(session),
            JobState::Dirty => self.push_changes(session),
        }
    }

    /// Same as [`Job::save`].
    pub fn update<T: Transport>(&mut self, session: &Session<T>) -> Result<SaveOutcome, ApiError> {
        self.save(session)
    }

    fn create<T: Transport>(&mut self, session: &Session<T>) -> Result<SaveOutcome, ApiError> {
        let mut payload = self.to_json();
        payload.remove(FIELD_ID);

        let request = session.client().build_create_job(&payload)?;
        let response = session.client().parse_json(session.execute(request)?)?;

        let mut data = payload;
        data.extend(response_object(response)?);
        let id = types::job_id(&data)
            .ok_or_else(|| ApiError::DeserializationError("created job has no id".to_string()))?;

        tracing::info!(id, "created job");
        self.data = data;
        self.changes.clear();
        Ok(SaveOutcome::Created)
    }

    fn push_changes<T: Transport>(&mut self, session: &Session<T>) -> Result<SaveOutcome, ApiError> {
        let id = self.id().ok_or(ApiError::MissingId)?;

        let request = session.client().build_update_job(id, &self.changes)?;
        let response = session.client().parse_json(session.execute(request)?)?;

        let mut data = self.to_json();
        data.extend(response_object(response)?);

        tracing::info!(id, fields = self.changes.len(), "updated job");
        self.data = data;
        self.changes.clear();
        Ok(SaveOutcome::Updated)
    }

    /// Re-read the job from the server, discarding pending changes.
    pub fn refresh<T: Transport>(&mut self, session: &Session<T>) -> Result<(), ApiError> {
        let id = self.id().ok_or(ApiError::MissingId)?;
        let fresh = Self::fetch(session, id)?;
        if self.is_dirty() {
            tracing::debug!(id, discarded = self.changes.len(), "refresh discarded local changes");
        }
        *self = fresh;
        Ok(())
    }

    /// Delete the job remotely. The local value is consumed.
    pub fn delete<T: Transport>(self, session: &Session<T>) -> Result<(), ApiError> {
        let id = self.id().ok_or(ApiError::MissingId)?;
        let request = session.client().build_delete_job(id);
        session.client().parse_delete_job(session.execute(request)?)?;
        tracing::info!(id, "deleted job");
        Ok(())
    }

    /// Append unit rows to this job. Server fields in the response are merged
    /// in; pending local changes are kept.
    pub fn upload<T: Transport>(&mut self, session: &Session<T>, rows: &[Value]) -> Result<(), ApiError> {
        let id = self.id().ok_or(ApiError::MissingId)?;
        let request = session.client().build_upload_rows(id, rows)?;
        let response = session.client().parse_json(session.execute(request)?)?;
        let fields = response_object(response)?;
        tracing::info!(id, rows = rows.len(), "uploaded units");
        self.data.extend(fields);
        Ok(())
    }

    /// Append raw unit data (CSV, spreadsheet, JSON lines) to this job.
    pub fn upload_bytes<T: Transport>(
        &mut self,
        session: &Session<T>,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ApiError> {
        let id = self.id().ok_or(ApiError::MissingId)?;
        let request = session.client().build_upload_file(Some(id), bytes, content_type);
        let response = session.client().parse_json(session.execute(request)?)?;
        let fields = response_object(response)?;
        tracing::info!(id, content_type, "uploaded unit data");
        self.data.extend(fields);
        Ok(())
    }

    /// Append the units in a file to this job. Without an explicit content
    /// type one is guessed from the extension, and the upload fails with
    /// `UnknownContentType` before reading the file if that does not work.
    pub fn upload_file<T: Transport>(
        &mut self,
        session: &Session<T>,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<(), ApiError> {
        let path = path.as_ref();
        self.id().ok_or(ApiError::MissingId)?;
        let content_type = resolve_content_type(path, content_type)?;
        let bytes = std::fs::read(path)?;
        self.upload_bytes(session, bytes, content_type)
    }
}

/// Accept a job object or an empty body as a write response.
fn response_object(value: Value) -> Result<JobData, ApiError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JobData::new()),
        _ => Err(ApiError::DeserializationError(
            "expected a job object in response".to_string(),
        )),
    }
}
