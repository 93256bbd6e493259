//! Stateless HTTP request builder and response parser for the job API.
//!
//! # Design
//! `CrowdFlowerClient` holds only a base URL and the API key and carries no
//! mutable state between calls. Each operation is split into a `build_*`
//! method that produces an `HttpRequest` and a `parse_*` method that consumes
//! an `HttpResponse`. The `Session` wires the two together through a
//! `Transport`.

use std::path::Path;

use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::JobData;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Builds requests for, and parses responses from, the CrowdFlower v1 API.
#[derive(Clone)]
pub struct CrowdFlowerClient {
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for CrowdFlowerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrowdFlowerClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CrowdFlowerClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.base_url, &config.api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an arbitrary request against `path` (relative to the base URL).
    /// The API key is always appended as the `key` query parameter.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<HttpRequest, ApiError> {
        let body = body
            .map(|b| serde_json::to_string(b).map_err(|e| ApiError::SerializationError(e.to_string())))
            .transpose()?;
        Ok(self.request(method, path, params, body))
    }

    pub fn build_get_job(&self, id: u64) -> HttpRequest {
        self.request(HttpMethod::Get, &format!("jobs/{id}.json"), &[], None)
    }

    pub fn build_create_job(&self, data: &JobData) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(data).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(self.request(HttpMethod::Post, "jobs.json", &[], Some(body)))
    }

    /// Build a partial update: only the fields in `changes` are sent.
    pub fn build_update_job(&self, id: u64, changes: &JobData) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(changes).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(self.request(HttpMethod::Put, &format!("jobs/{id}.json"), &[], Some(body)))
    }

    pub fn build_delete_job(&self, id: u64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("jobs/{id}.json"), &[], None)
    }

    /// Build a request creating a new job from unit rows.
    pub fn build_upload_job(&self, rows: &[Value]) -> Result<HttpRequest, ApiError> {
        let body = newline_delimited(rows)?;
        Ok(self.request(HttpMethod::Post, "jobs/upload.json", &[], Some(body)))
    }

    /// Build a request appending unit rows to an existing job.
    pub fn build_upload_rows(&self, id: u64, rows: &[Value]) -> Result<HttpRequest, ApiError> {
        let body = newline_delimited(rows)?;
        Ok(self.request(HttpMethod::Post, &format!("jobs/{id}/upload.json"), &[], Some(body)))
    }

    /// Build a raw unit upload (CSV, spreadsheet, JSON lines) sent verbatim
    /// with `content_type`. With `id` the units are appended to that job;
    /// without it the upload creates a new job.
    pub fn build_upload_file(&self, id: Option<u64>, bytes: Vec<u8>, content_type: &str) -> HttpRequest {
        let path = match id {
            Some(id) => format!("jobs/{id}/upload.json"),
            None => "jobs/upload.json".to_string(),
        };
        self.request_with_body(HttpMethod::Post, &path, &[], Some((bytes, content_type)))
    }

    /// Decode any 2xx body as JSON. An empty body decodes to `Value::Null`.
    pub fn parse_json(&self, response: HttpResponse) -> Result<Value, ApiError> {
        check_status(&response)?;
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    /// Decode a job object. Used for get, create, update and upload.
    pub fn parse_job(&self, response: HttpResponse) -> Result<JobData, ApiError> {
        match self.parse_json(response)? {
            Value::Object(map) => Ok(map),
            other => Err(ApiError::DeserializationError(format!(
                "expected a job object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn parse_delete_job(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, &str)],
        body: Option<String>,
    ) -> HttpRequest {
        let body = body.map(|b| (b.into_bytes(), JSON_CONTENT_TYPE));
        self.request_with_body(method, path, params, body)
    }

    fn request_with_body(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, &str)],
        body: Option<(Vec<u8>, &str)>,
    ) -> HttpRequest {
        let mut query = vec![("key".to_string(), self.api_key.clone())];
        query.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let (headers, body) = match body {
            Some((bytes, content_type)) => (
                vec![("content-type".to_string(), content_type.to_string())],
                Some(bytes),
            ),
            None => (Vec::new(), None),
        };
        HttpRequest {
            method,
            path: format!("{}/{}", self.base_url, path.trim_start_matches('/')),
            query,
            headers,
            body,
        }
    }
}

/// Guess an upload content type from a file extension.
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" => "text/plain",
        "json" => JSON_CONTENT_TYPE,
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        _ => return None,
    };
    Some(content_type)
}

/// Pick the explicit content type if given, else guess from `path`.
pub(crate) fn resolve_content_type<'a>(
    path: &Path,
    explicit: Option<&'a str>,
) -> Result<&'a str, ApiError> {
    match explicit {
        Some(content_type) => Ok(content_type),
        None => guess_content_type(path)
            .ok_or_else(|| ApiError::UnknownContentType(path.display().to_string())),
    }
}

fn newline_delimited(rows: &[Value]) -> Result<String, ApiError> {
    let lines = rows
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::SerializationError(e.to_string()))?;
    Ok(lines.join("\n"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    let status = response.status;
    let body = || response.body.clone();
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(ApiError::Authentication { status, body: body() }),
        404 => Err(ApiError::NotFound),
        429 => Err(ApiError::RateLimited {
            retry_after_secs: response
                .header("retry-after")
                .and_then(|v| v.trim().parse().ok()),
            body: body(),
        }),
        400 | 422 => Err(ApiError::Validation { status, body: body() }),
        500..=599 => Err(ApiError::Server { status, body: body() }),
        _ => Err(ApiError::HttpError { status, body: body() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> CrowdFlowerClient {
        CrowdFlowerClient::new("http://localhost:3000/v1", "test-key")
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn data(value: Value) -> JobData {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn build_get_job_produces_correct_request() {
        let req = client().build_get_job(123123);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/v1/jobs/123123.json");
        assert_eq!(req.query, vec![("key".to_string(), "test-key".to_string())]);
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_create_job_produces_correct_request() {
        let req = client()
            .build_create_job(&data(json!({"title": "X", "cml": "<cml:text/>"})))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/v1/jobs.json");
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        let body: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"title": "X", "cml": "<cml:text/>"}));
    }

    #[test]
    fn build_update_job_sends_only_given_fields() {
        let req = client()
            .build_update_job(7, &data(json!({"title": "New Title"})))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.path, "http://localhost:3000/v1/jobs/7.json");
        let body: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"title": "New Title"}));
    }

    #[test]
    fn build_delete_job_produces_correct_request() {
        let req = client().build_delete_job(7);
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.path, "http://localhost:3000/v1/jobs/7.json");
        assert!(req.body.is_none());
    }

    #[test]
    fn build_upload_rows_is_newline_delimited() {
        let rows = vec![json!({"text": "a"}), json!({"text": "b"})];
        let req = client().build_upload_rows(7, &rows).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/v1/jobs/7/upload.json");
        assert_eq!(
            req.body.as_deref(),
            Some("{\"text\":\"a\"}\n{\"text\":\"b\"}".as_bytes())
        );

        let req = client().build_upload_job(&rows).unwrap();
        assert_eq!(req.path, "http://localhost:3000/v1/jobs/upload.json");
    }

    #[test]
    fn build_upload_file_sends_bytes_with_given_type() {
        let csv = b"text,lang\ngreat,en\nawful,en\n".to_vec();
        let req = client().build_upload_file(Some(7), csv.clone(), "text/csv");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/v1/jobs/7/upload.json");
        assert_eq!(req.headers, vec![("content-type".to_string(), "text/csv".to_string())]);
        assert_eq!(req.body, Some(csv));
        assert_eq!(req.query_param("key"), Some("test-key"));

        let req = client().build_upload_file(None, vec![0x50, 0x4b], "application/vnd.ms-excel");
        assert_eq!(req.path, "http://localhost:3000/v1/jobs/upload.json");
        assert_eq!(req.body.as_deref(), Some(&[0x50u8, 0x4b][..]));
    }

    #[test]
    fn content_type_is_guessed_from_extension() {
        assert_eq!(guess_content_type(Path::new("units.csv")), Some("text/csv"));
        assert_eq!(guess_content_type(Path::new("UNITS.CSV")), Some("text/csv"));
        assert_eq!(guess_content_type(Path::new("rows.json")), Some("application/json"));
        assert_eq!(guess_content_type(Path::new("units.bin")), None);
        assert_eq!(guess_content_type(Path::new("units")), None);
    }

    #[test]
    fn explicit_content_type_wins_and_unknown_fails() {
        assert_eq!(
            resolve_content_type(Path::new("units.csv"), Some("text/plain")).unwrap(),
            "text/plain"
        );
        let err = resolve_content_type(Path::new("units.dat"), None).unwrap_err();
        assert!(matches!(err, ApiError::UnknownContentType(ref p) if p == "units.dat"));
    }

    #[test]
    fn build_request_appends_params_after_key() {
        let req = client()
            .build_request(HttpMethod::Get, "/jobs.json", &[("page", "2")], None)
            .unwrap();
        assert_eq!(req.path, "http://localhost:3000/v1/jobs.json");
        assert_eq!(req.query[0].0, "key");
        assert_eq!(req.query_param("page"), Some("2"));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = CrowdFlowerClient::new("http://localhost:3000/v1/", "k");
        assert_eq!(client.build_get_job(1).path, "http://localhost:3000/v1/jobs/1.json");
    }

    #[test]
    fn parse_job_success() {
        let job = client()
            .parse_job(response(200, r#"{"id":123123,"title":"Test"}"#))
            .unwrap();
        assert_eq!(job["id"], 123123);
        assert_eq!(job["title"], "Test");
    }

    #[test]
    fn parse_job_rejects_non_object() {
        let err = client().parse_job(response(200, "[1,2]")).unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn parse_job_bad_json() {
        let err = client().parse_job(response(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn parse_json_empty_body_is_null() {
        assert_eq!(client().parse_json(response(204, "")).unwrap(), Value::Null);
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let c = client();
        assert!(matches!(
            c.parse_job(response(401, "bad key")).unwrap_err(),
            ApiError::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            c.parse_job(response(403, "")).unwrap_err(),
            ApiError::Authentication { status: 403, .. }
        ));
        assert!(matches!(c.parse_job(response(404, "")).unwrap_err(), ApiError::NotFound));
        assert!(matches!(
            c.parse_job(response(422, "{}")).unwrap_err(),
            ApiError::Validation { status: 422, .. }
        ));
        assert!(matches!(
            c.parse_job(response(400, "")).unwrap_err(),
            ApiError::Validation { status: 400, .. }
        ));
        assert!(matches!(
            c.parse_job(response(500, "boom")).unwrap_err(),
            ApiError::Server { status: 500, .. }
        ));
        assert!(matches!(
            c.parse_job(response(302, "")).unwrap_err(),
            ApiError::HttpError { status: 302, .. }
        ));
    }

    #[test]
    fn rate_limit_reads_retry_after() {
        let resp = HttpResponse {
            status: 429,
            headers: vec![("Retry-After".to_string(), "12".to_string())],
            body: "slow down".to_string(),
        };
        let err = client().parse_job(resp).unwrap_err();
        assert!(matches!(
            err,
            ApiError::RateLimited { retry_after_secs: Some(12), .. }
        ));
    }

    #[test]
    fn parse_delete_job_not_found() {
        let err = client().parse_delete_job(response(404, "")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        assert!(client().parse_delete_job(response(200, "")).is_ok());
    }

    #[test]
    fn debug_hides_api_key() {
        let printed = format!("{:?}", client());
        assert!(!printed.contains("test-key"));
    }
}
