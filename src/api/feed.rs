//! Read routes relayed through the proxy gateway.

use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::{query_params, ApiState};
use crate::error::{AppError, ValidationError};
use crate::proxy::{
    FeedSource, ProfileLookup, TrendingQuery, CHANNELS_LIMIT, FEED_LIMIT, FRIENDS_LIMIT,
    TRENDING_LIMIT,
};
use crate::validate;

fn channel_key(params: &Value, field: &'static str) -> Result<Option<String>, ValidationError> {
    validate::optional_text(field, params.get(field), 64).map(|c| c.map(|c| c.trim().to_string()))
}

pub async fn feed(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let params = query_params(query);
    let limit = validate::limit(params.get("limit"), FEED_LIMIT.0, FEED_LIMIT.1);
    let feed_type = params.get("feed_type").and_then(Value::as_str).unwrap_or_default();
    let channel = channel_key(&params, "channel")?;

    let source = match (feed_type, channel) {
        ("following", _) | (_, None) => FeedSource::Following(validate::fid("fid", params.get("fid"))?),
        (_, Some(channel)) => FeedSource::Channel(channel),
    };

    let casts = state.proxy()?.feed(&source, limit).await?;
    Ok(Json(json!({ "data": casts })))
}

pub async fn channels(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let params = query_params(query);
    let fid = validate::optional_fid("fid", params.get("fid"))?;
    let limit = validate::limit(params.get("limit"), CHANNELS_LIMIT.0, CHANNELS_LIMIT.1);

    let channels = state.proxy()?.channels(fid, limit).await?;
    Ok(Json(json!({ "ok": true, "channels": channels })))
}

pub async fn friends(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let params = query_params(query);
    let fid = validate::fid("fid", params.get("fid"))?;
    let limit = validate::limit(params.get("limit"), FRIENDS_LIMIT.0, FRIENDS_LIMIT.1);

    let users = state.proxy()?.friends(fid, limit).await?;
    Ok(Json(json!({ "data": users })))
}

pub async fn profile(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let params = query_params(query);
    let lookup = match validate::optional_fid("fid", params.get("fid"))? {
        Some(fid) => ProfileLookup::Fid(fid),
        None => {
            let username = validate::optional_text("username", params.get("username"), 64)?
                .map(|u| u.trim().trim_start_matches('@').to_string())
                .filter(|u| !u.is_empty())
                .ok_or_else(|| ValidationError::new("fid", "fid or username is required"))?;
            ProfileLookup::Username(username)
        }
    };

    let (user, casts) = state
        .proxy()?
        .profile(&lookup, validate::flag(params.get("casts")))
        .await?;
    Ok(Json(json!({ "user": user, "casts": casts })))
}

pub async fn trending(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let params = query_params(query);
    let trending = TrendingQuery {
        limit: validate::limit(params.get("limit"), TRENDING_LIMIT.0, TRENDING_LIMIT.1),
        time_window: validate::time_window(params.get("time_window"))?,
        viewer_fid: validate::optional_fid("viewer_fid", params.get("viewer_fid"))?,
        channel_id: channel_key(&params, "channel_id")?,
    };

    let casts = state.proxy()?.trending(&trending).await?;
    Ok(Json(json!({ "data": casts })))
}

pub async fn search_users(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let params = query_params(query);
    let q = validate::search_query(params.get("q"))?;

    let users = state.proxy()?.search_users(&q).await?;
    Ok(Json(json!({ "users": users })))
}
