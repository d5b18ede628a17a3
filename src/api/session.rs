use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{json_body, ApiState};
use crate::auth::{self, SiwfOutcome, SiwfRequest};
use crate::error::AppError;
use crate::models::{Fid, Profile};
use crate::proxy::{profile_from_user, ProfileLookup};

/// Resolves a bearer (or body) token to its FID.
pub async fn session(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Option<Json<Value>>,
) -> Result<Json<Value>, AppError> {
    let body = payload.map(|Json(body)| body).unwrap_or(Value::Null);
    let fid = auth::require_fid(
        state.identity()?,
        &headers,
        body.get("token").and_then(Value::as_str),
    )
    .await?;
    Ok(Json(json!({ "fid": fid })))
}

/// Missing SIWF fields are passed on empty so the verifier rejects them
/// like any other failed check.
fn siwf_field(body: &Value, field: &str) -> String {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn dev_profile() -> Profile {
    Profile {
        fid: Fid(1),
        username: Some("dev".to_string()),
        display_name: Some("Dev User".to_string()),
        avatar: None,
    }
}

pub async fn siwf(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let domain = match body.get("domain").and_then(Value::as_str).filter(|d| !d.trim().is_empty()) {
        Some(domain) => domain.to_string(),
        None => headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .unwrap_or_default(),
    };
    let request = SiwfRequest {
        message: siwf_field(&body, "message"),
        signature: siwf_field(&body, "signature"),
        nonce: siwf_field(&body, "nonce"),
        domain,
    };

    let profile = match state.siwf.verify(&request, Utc::now()).await? {
        SiwfOutcome::DevBypass => dev_profile(),
        SiwfOutcome::Verified(fid) => {
            let user = state.proxy()?.user(&ProfileLookup::Fid(fid)).await?;
            profile_from_user(&user).unwrap_or(Profile {
                fid,
                username: None,
                display_name: None,
                avatar: None,
            })
        }
    };

    info!(fid = %profile.fid, "sign-in verified");
    Ok(Json(json!({ "ok": true, "profile": profile })))
}
