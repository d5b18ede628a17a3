//! Curated-list CRUD and curation preference forwarding.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{json_body, query_params, ApiState};
use crate::auth;
use crate::error::AppError;
use crate::models::NewCuratedListItem;
use crate::validate;

const CAST_TEXT_MAX_CHARS: usize = 1024;
const NOTES_MAX_CHARS: usize = 500;

fn list_id(raw: String) -> Result<Uuid, AppError> {
    Ok(validate::uuid("id", Some(&Value::String(raw)))?)
}

pub async fn list_items(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let list_id = list_id(id)?;
    let items = state.curated()?.list_items(list_id).await?;
    Ok(Json(json!({ "ok": true, "items": items })))
}

pub async fn add_item(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let list_id = list_id(id)?;
    let body = json_body(payload)?;
    let added_by = auth::require_fid(
        state.identity()?,
        &headers,
        body.get("token").and_then(Value::as_str),
    )
    .await?;

    let item = NewCuratedListItem {
        list_id,
        cast_hash: validate::cast_hash("castHash", body.get("castHash"))?,
        author_fid: validate::fid("authorFid", body.get("authorFid"))?,
        cast_text: validate::optional_text("castText", body.get("castText"), CAST_TEXT_MAX_CHARS)?,
        cast_timestamp: validate::optional_timestamp("castTimestamp", body.get("castTimestamp"))?,
        added_by_fid: added_by,
        notes: validate::optional_text("notes", body.get("notes"), NOTES_MAX_CHARS)?,
    };

    let created = state.curated()?.add_item(item).await?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "item": created }))))
}

pub async fn remove_item(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let list_id = list_id(id)?;
    let params = query_params(query);
    auth::require_fid(state.identity()?, &headers, None).await?;
    let cast_hash = validate::cast_hash("castHash", params.get("castHash"))?;

    if !state.curated()?.remove_item(list_id, &cast_hash).await? {
        return Err(AppError::NotFound(format!("{} is not in this list", cast_hash)));
    }
    Ok(Json(json!({ "ok": true })))
}

/// Forwards preference CRUD to the curation service for the caller's FID.
pub async fn forward_preferences(
    State(state): State<Arc<ApiState>>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    payload: Option<Json<Value>>,
) -> Result<Json<Value>, AppError> {
    let fid = auth::require_fid(state.identity()?, &headers, None).await?;

    let mut forwarded: Vec<(&str, String)> = query
        .iter()
        .filter(|(key, _)| key.as_str() != "fid" && key.as_str() != "token")
        .map(|(key, value)| (key.as_str(), value.clone()))
        .collect();
    forwarded.push(("fid", fid.to_string()));

    let body = match method {
        Method::POST | Method::PUT => Some(payload.map(|Json(body)| body).unwrap_or_else(|| json!({}))),
        _ => None,
    };

    let response = state
        .curation()?
        .request(method, "/preferences", &forwarded, body.as_ref())
        .await?;
    Ok(Json(response))
}
