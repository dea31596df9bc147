//! Route handlers: translate HTTP requests into `Coordinator` calls
//! and project the results back onto the `{result, data}` envelope.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use coordinator_engine::{CompleteResult, JobOffer};
use coordinator_model::error::CoordinatorError;
use coordinator_model::worker::WorkerKind;
use serde_json::{json, Value};

use crate::dto::{CompleteFormat, CompleteJobBody, Envelope, FailJobBody, LiveFilter, RequestJobQuery, SubmitJobChainBody};
use crate::error::AppError;
use crate::ip;
use crate::state::AppState;

fn offer_json(offer: Option<JobOffer>) -> Value {
    match offer {
        None => Value::Null,
        Some(JobOffer { job, subkey, index }) => {
            let mut value = serde_json::to_value(job).unwrap_or(Value::Null);
            if let Value::Object(map) = &mut value {
                map.insert("subkey".to_string(), json!(subkey));
                map.insert("index".to_string(), json!(index));
            }
            value
        }
    }
}

pub async fn submit_job_chain(
    State(state): State<AppState>,
    Json(body): Json<SubmitJobChainBody>,
) -> Result<Json<Envelope<Vec<String>>>, AppError> {
    let entries = body
        .jobs
        .into_iter()
        .map(|e| e.into_submission())
        .collect::<Result<Vec<_>, _>>()?;
    let keys = state.coordinator.submit_chain(entries, body.overwrite_canceled)?;
    tracing::info!(count = keys.len(), "submitted job chain");
    Ok(Json(Envelope::success(keys)))
}

pub async fn request_job(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<RequestJobQuery>,
) -> Result<Json<Envelope<Value>>, AppError> {
    let worker_ip = ip::extract(&headers, Some(peer));
    let worker_kind = query.worker_kind.as_deref().and_then(WorkerKind::from_str);
    let offer = state.coordinator.request_job(
        &query.name,
        worker_ip,
        worker_kind,
        query.version.as_deref(),
        query.types.as_deref(),
    )?;
    Ok(Json(Envelope::success(offer_json(offer))))
}

async fn update_job_inner(
    state: &AppState,
    key: &str,
    subkey: Option<&str>,
    ip: Option<String>,
) -> Result<Json<Envelope<Value>>, AppError> {
    let alive = state.coordinator.update_job(key, subkey, ip)?;
    let data = if alive { json!({}) } else { json!({ "status": "canceled" }) };
    Ok(Json(Envelope::success(data)))
}

pub async fn update_job(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<Envelope<Value>>, AppError> {
    let worker_ip = ip::extract(&headers, Some(peer));
    update_job_inner(&state, &key, None, worker_ip).await
}

pub async fn update_job_sub(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path((key, subkey)): Path<(String, String)>,
) -> Result<Json<Envelope<Value>>, AppError> {
    let worker_ip = ip::extract(&headers, Some(peer));
    update_job_inner(&state, &key, Some(&subkey), worker_ip).await
}

async fn release_job_inner(state: &AppState, key: &str, subkey: Option<&str>) -> Result<Json<Envelope<Value>>, AppError> {
    state.coordinator.release_job(key, subkey)?;
    Ok(Json(Envelope::success(json!({}))))
}

pub async fn release_job(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Envelope<Value>>, AppError> {
    release_job_inner(&state, &key, None).await
}

pub async fn release_job_sub(
    State(state): State<AppState>,
    Path((key, subkey)): Path<(String, String)>,
) -> Result<Json<Envelope<Value>>, AppError> {
    release_job_inner(&state, &key, Some(&subkey)).await
}

pub async fn cancel_job(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Envelope<Value>>, AppError> {
    state.coordinator.cancel_job(&key)?;
    Ok(Json(Envelope::success(json!({}))))
}

pub async fn reset_job(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Envelope<Value>>, AppError> {
    state.coordinator.reset_job(&key)?;
    Ok(Json(Envelope::success(json!({}))))
}

fn decode_complete_result(body: CompleteJobBody) -> Result<CompleteResult, CoordinatorError> {
    match (body.format, body.result) {
        (CompleteFormat::None, _) => Ok(CompleteResult::NoHit),
        (CompleteFormat::Hex, Some(s)) => {
            Ok(CompleteResult::Hit(hex::decode(&s).map_err(|_| CoordinatorError::invalid_fields(&["result"]))?))
        }
        (CompleteFormat::B64, Some(s)) => Ok(CompleteResult::Hit(
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
                .map_err(|_| CoordinatorError::invalid_fields(&["result"]))?,
        )),
        (_, None) => Err(CoordinatorError::invalid_fields(&["result"])),
    }
}

async fn complete_job_inner(
    state: &AppState,
    key: &str,
    subkey: Option<&str>,
    body: CompleteJobBody,
) -> Result<Json<Envelope<Value>>, AppError> {
    let result = decode_complete_result(body)?;
    state.coordinator.complete_job(key, subkey, result)?;
    tracing::info!(key, "completed job");
    Ok(Json(Envelope::success(json!({}))))
}

pub async fn complete_job(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<CompleteJobBody>,
) -> Result<Json<Envelope<Value>>, AppError> {
    complete_job_inner(&state, &key, None, body).await
}

pub async fn complete_job_sub(
    State(state): State<AppState>,
    Path((key, subkey)): Path<(String, String)>,
    Json(body): Json<CompleteJobBody>,
) -> Result<Json<Envelope<Value>>, AppError> {
    complete_job_inner(&state, &key, Some(&subkey), body).await
}

async fn fail_job_inner(
    state: &AppState,
    key: &str,
    subkey: Option<&str>,
    body: FailJobBody,
) -> Result<Json<Envelope<Value>>, AppError> {
    state.coordinator.fail_job(key, subkey, body.note)?;
    Ok(Json(Envelope::success(json!({}))))
}

pub async fn fail_job(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<FailJobBody>,
) -> Result<Json<Envelope<Value>>, AppError> {
    fail_job_inner(&state, &key, None, body).await
}

pub async fn fail_job_sub(
    State(state): State<AppState>,
    Path((key, subkey)): Path<(String, String)>,
    Json(body): Json<FailJobBody>,
) -> Result<Json<Envelope<Value>>, AppError> {
    fail_job_inner(&state, &key, Some(&subkey), body).await
}

pub async fn check_job_statuses(
    State(state): State<AppState>,
    Path(csv_keys): Path<String>,
) -> Json<Envelope<Value>> {
    let keys: Vec<String> = csv_keys.split(',').map(str::to_string).collect();
    let statuses = state.coordinator.check_job_statuses(&keys);
    let data: Value = statuses
        .into_iter()
        .map(|(key, status)| (key, json!(status.as_str())))
        .collect::<serde_json::Map<_, _>>()
        .into();
    Json(Envelope::success(data))
}

pub async fn check_network_stats(State(state): State<AppState>) -> Json<Envelope<Value>> {
    let stats = state.coordinator.network_stats();
    Json(Envelope::success(json!({
        "waiting_jobs": stats.waiting_jobs,
        "working_jobs": stats.working_jobs,
        "live_miiners": stats.live_miiners,
        "live_friendbots": stats.live_friendbots,
        "artifacts_mined": stats.artifacts_mined,
    })))
}

pub async fn download_movable(State(state): State<AppState>, Path(id0): Path<String>) -> Result<Vec<u8>, AppError> {
    state
        .coordinator
        .download_movable(&id0)
        .await
        .ok_or_else(|| CoordinatorError::UnknownJob(id0).into())
}

pub mod admin {
    use super::*;

    pub async fn list_jobs(State(state): State<AppState>) -> Json<Envelope<Value>> {
        let jobs = state.coordinator.list_jobs();
        Json(Envelope::success(json!(jobs)))
    }

    pub async fn list_workers(State(state): State<AppState>, Query(q): Query<LiveFilter>) -> Json<Envelope<Value>> {
        let workers = state.coordinator.list_workers(None, q.live.unwrap_or(false));
        Json(Envelope::success(json!(workers)))
    }

    pub async fn list_miners(State(state): State<AppState>, Query(q): Query<LiveFilter>) -> Json<Envelope<Value>> {
        let workers = state.coordinator.list_workers(Some(WorkerKind::Miiner), q.live.unwrap_or(false));
        Json(Envelope::success(json!(workers)))
    }

    pub async fn list_friendbots(State(state): State<AppState>, Query(q): Query<LiveFilter>) -> Json<Envelope<Value>> {
        let workers = state.coordinator.list_workers(Some(WorkerKind::Friendbot), q.live.unwrap_or(false));
        Json(Envelope::success(json!(workers)))
    }
}
