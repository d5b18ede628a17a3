use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::{query_params, ApiState};
use crate::error::AppError;
use crate::logging::redact;
use crate::models::Signer;
use crate::publisher::unix_now;
use crate::validate;

/// Creates a signer and registers it under the app FID. The response carries
/// the approval URL the user must open.
pub async fn create(State(state): State<Arc<ApiState>>) -> Result<Json<Signer>, AppError> {
    let signer = state.signers()?.create_and_register(unix_now()?).await?;
    Ok(Json(signer))
}

pub async fn status(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Signer>, AppError> {
    let params = query_params(query);
    let signer_uuid = validate::uuid("signer_uuid", params.get("signer_uuid"))?;
    let signer = state.signers()?.signer_status(&signer_uuid).await?;
    Ok(Json(signer))
}

/// Notification only. Signer state is always re-read from the signer
/// service, so nothing here is trusted or stored.
pub async fn webhook(payload: Option<Json<Value>>) -> Json<Value> {
    let body = payload.map(|Json(body)| body).unwrap_or(Value::Null);
    let event = body.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let signer = body
        .pointer("/data/signer_uuid")
        .or_else(|| body.get("signer_uuid"))
        .and_then(Value::as_str)
        .map(redact);
    let status = body
        .pointer("/data/status")
        .or_else(|| body.get("status"))
        .and_then(Value::as_str);

    info!(event, signer = ?signer, status = ?status, "signer webhook received");
    Json(json!({ "ok": true, "received": true }))
}
