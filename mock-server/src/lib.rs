use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const DEFAULT_API_KEY: &str = "mock-key";

/// Fields the server manages itself; writes to them are rejected with 422.
pub const READ_ONLY_FIELDS: &[&str] = &[
    "completed",
    "completed_at",
    "created_at",
    "gold",
    "golds_count",
    "id",
    "judgments_count",
    "units_count",
    "updated_at",
];

const FIRST_JOB_ID: u64 = 100_000;

pub type JobFields = Map<String, Value>;

#[derive(Debug, Default)]
struct StoredJob {
    fields: JobFields,
    units: Vec<Value>,
}

#[derive(Clone)]
pub struct AppState {
    jobs: Arc<RwLock<HashMap<u64, StoredJob>>>,
    next_id: Arc<AtomicU64>,
    api_key: Arc<str>,
}

type ApiResult<T> = Result<T, (StatusCode, Json<Value>)>;
type KeyQuery = Query<HashMap<String, String>>;

pub fn app() -> Router {
    app_with_key(DEFAULT_API_KEY)
}

pub fn app_with_key(api_key: &str) -> Router {
    let state = AppState {
        jobs: Arc::new(RwLock::new(HashMap::new())),
        next_id: Arc::new(AtomicU64::new(FIRST_JOB_ID)),
        api_key: Arc::from(api_key),
    };
    Router::new()
        .route("/v1/jobs.json", post(create_job))
        .route("/v1/jobs/upload.json", post(upload_new_job))
        .route("/v1/jobs/{id}", get(get_job).put(update_job).delete(delete_job))
        .route("/v1/jobs/{id}/upload.json", post(upload_units))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": { "message": message.into() } })))
}

fn authorize(state: &AppState, query: &HashMap<String, String>) -> ApiResult<()> {
    match query.get("key") {
        Some(key) if key.as_str() == &*state.api_key => Ok(()),
        Some(_) => Err(error(StatusCode::UNAUTHORIZED, "invalid API key")),
        None => Err(error(StatusCode::UNAUTHORIZED, "missing API key")),
    }
}

/// `/v1/jobs/{id}` carries the `.json` extension in the last segment.
fn parse_job_file(file: &str) -> ApiResult<u64> {
    file.strip_suffix(".json")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("no route for {file}")))
}

fn reject_read_only(fields: &JobFields) -> ApiResult<()> {
    match fields.keys().find(|k| READ_ONLY_FIELDS.contains(&k.as_str())) {
        Some(field) => Err(error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("'{field}' is read only"),
        )),
        None => Ok(()),
    }
}

fn parse_rows(body: &str) -> ApiResult<Vec<Value>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match serde_json::from_str::<Value>(line) {
            Ok(row @ Value::Object(_)) => Ok(row),
            _ => Err(error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "each uploaded row must be a JSON object",
            )),
        })
        .collect()
}

/// Plain delimited rows; the first line names the columns. Quoting is not
/// supported.
fn parse_delimited(body: &str, delimiter: char) -> ApiResult<Vec<Value>> {
    let mut lines = body.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&str> = header.split(delimiter).map(str::trim).collect();
    lines
        .map(|line| {
            let cells: Vec<&str> = line.split(delimiter).map(str::trim).collect();
            if cells.len() != columns.len() {
                return Err(error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("expected {} columns, got {}", columns.len(), cells.len()),
                ));
            }
            let row: JobFields = columns
                .iter()
                .zip(cells)
                .map(|(column, cell)| (column.to_string(), json!(cell)))
                .collect();
            Ok(Value::Object(row))
        })
        .collect()
}

/// Dispatch on the request content type. A missing type is treated as JSON
/// lines.
fn parse_upload(headers: &HeaderMap, body: &str) -> ApiResult<Vec<Value>> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim())
        .unwrap_or("application/json");
    match content_type {
        "application/json" => parse_rows(body),
        "text/csv" => parse_delimited(body, ','),
        "text/tab-separated-values" => parse_delimited(body, '\t'),
        other => Err(error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported upload type '{other}'"),
        )),
    }
}

async fn insert_job(state: &AppState, mut fields: JobFields, units: Vec<Value>) -> JobFields {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    fields.insert("id".to_string(), json!(id));
    fields.entry("state").or_insert_with(|| json!("unordered"));
    fields.insert("units_count".to_string(), json!(units.len()));
    fields.insert("judgments_count".to_string(), json!(0));
    fields.insert("completed".to_string(), json!(false));

    let stored = StoredJob {
        fields: fields.clone(),
        units,
    };
    state.jobs.write().await.insert(id, stored);
    tracing::info!(id, "created job");
    fields
}

async fn create_job(
    State(state): State<AppState>,
    Query(query): KeyQuery,
    Json(input): Json<JobFields>,
) -> ApiResult<(StatusCode, Json<JobFields>)> {
    authorize(&state, &query)?;
    reject_read_only(&input)?;
    let job = insert_job(&state, input, Vec::new()).await;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn upload_new_job(
    State(state): State<AppState>,
    Query(query): KeyQuery,
    headers: HeaderMap,
    body: String,
) -> ApiResult<(StatusCode, Json<JobFields>)> {
    authorize(&state, &query)?;
    let rows = parse_upload(&headers, &body)?;
    let job = insert_job(&state, JobFields::new(), rows).await;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn get_job(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): KeyQuery,
) -> ApiResult<Json<JobFields>> {
    authorize(&state, &query)?;
    let id = parse_job_file(&file)?;
    let jobs = state.jobs.read().await;
    jobs.get(&id)
        .map(|job| Json(job.fields.clone()))
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("job {id} not found")))
}

async fn update_job(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): KeyQuery,
    Json(input): Json<JobFields>,
) -> ApiResult<Json<JobFields>> {
    authorize(&state, &query)?;
    let id = parse_job_file(&file)?;
    reject_read_only(&input)?;
    let mut jobs = state.jobs.write().await;
    let job = jobs
        .get_mut(&id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("job {id} not found")))?;
    tracing::info!(id, fields = input.len(), "updated job");
    job.fields.extend(input);
    Ok(Json(job.fields.clone()))
}

async fn delete_job(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): KeyQuery,
) -> ApiResult<StatusCode> {
    authorize(&state, &query)?;
    let id = parse_job_file(&file)?;
    let mut jobs = state.jobs.write().await;
    jobs.remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("job {id} not found")))
}

async fn upload_units(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): KeyQuery,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<JobFields>> {
    authorize(&state, &query)?;
    let rows = parse_upload(&headers, &body)?;
    let mut jobs = state.jobs.write().await;
    let job = jobs
        .get_mut(&id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("job {id} not found")))?;
    job.units.extend(rows);
    job.fields
        .insert("units_count".to_string(), json!(job.units.len()));
    Ok(Json(job.fields.clone()))
}
