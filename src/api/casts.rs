//! Publishing routes: casts, replies and reactions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{json_body, query_params, ApiState};
use crate::error::{AppError, ValidationError};
use crate::hub;
use crate::logging::redact;
use crate::models::{CastDraft, CastParent, ReactionKind};
use crate::publisher::{HubCredential, Publisher};
use crate::signer::require_approved;
use crate::validate;

const CHANNEL_KEY_MAX_CHARS: usize = 64;

fn parent(body: &Value) -> Result<Option<CastParent>, ValidationError> {
    if !validate::is_blank(body.get("parentHash")) {
        return Ok(Some(CastParent::Hash {
            hash: validate::cast_hash("parentHash", body.get("parentHash"))?,
            author: validate::optional_fid("parentFid", body.get("parentFid"))?,
        }));
    }
    Ok(validate::optional_url("parentUrl", body.get("parentUrl"))?.map(CastParent::Url))
}

/// Direct-hub publish with a caller-held Ed25519 key.
pub async fn compose(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let text = validate::cast_text(body.get("text"))?;
    let embeds = validate::embeds(body.get("embeds"))?;
    let parent = parent(&body)?;

    if validate::is_blank(body.get("fid")) {
        return Err(AppError::NoUser);
    }
    let fid = validate::fid("fid", body.get("fid"))?;

    let key = match body.get("privateKey").and_then(Value::as_str) {
        Some(raw) if !raw.trim().is_empty() => hub::signing_key_from_hex(raw)?,
        _ => {
            warn!(fid = %fid, "compose without a signing key");
            return Err(AppError::NoSigner);
        }
    };

    let draft = CastDraft {
        text,
        embeds,
        parent,
        channel_key: None,
    };
    let cast = state.hub.publish(&HubCredential { fid, key }, &draft).await?;
    Ok(Json(json!({ "ok": true, "cast": cast })))
}

/// Hosted publish. Uses the caller's signer when given, otherwise the
/// configured bot signer.
pub async fn privy_compose(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let draft = CastDraft {
        text: validate::cast_text(body.get("text"))?,
        embeds: validate::embeds(body.get("embeds"))?,
        parent: validate::optional_url("parentUrl", body.get("parentUrl"))?.map(CastParent::Url),
        channel_key: validate::optional_text("channelKey", body.get("channelKey"), CHANNEL_KEY_MAX_CHARS)?
            .map(|key| key.trim().to_string()),
    };
    let fid = validate::optional_fid("fid", body.get("fid"))?;
    let signer_uuid = if validate::is_blank(body.get("signerUuid")) {
        None
    } else {
        Some(validate::uuid("signerUuid", body.get("signerUuid"))?)
    };

    let hosted = state.hosted()?;
    let credential = match (signer_uuid, fid) {
        (Some(uuid), fid) => {
            let signer = require_approved(state.neynar()?, &uuid).await?;
            if let (Some(expected), Some(actual)) = (fid, signer.fid) {
                if expected != actual {
                    warn!(fid = %expected, signer = %redact(&signer.signer_uuid), "signer belongs to another fid");
                    return Err(AppError::NoSigner);
                }
            }
            signer.signer_uuid
        }
        (None, Some(fid)) => {
            let bot = state.bot_signer_uuid.ok_or_else(|| {
                warn!(fid = %fid, "no signer supplied and no bot signer configured");
                AppError::NoSigner
            })?;
            // The bot signer is held to the same approval rule as a user's.
            let signer = require_approved(state.neynar()?, &bot).await?;
            info!(fid = %fid, "publishing with the bot signer");
            signer.signer_uuid
        }
        (None, None) => return Err(AppError::NoUser),
    };

    let cast = hosted.publish(&credential, &draft).await?;
    Ok(Json(json!({ "ok": true, "cast": cast })))
}

pub async fn reply(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let draft = CastDraft {
        text: validate::cast_text(body.get("text"))?,
        embeds: validate::embeds(body.get("embeds"))?,
        parent: Some(CastParent::Hash {
            hash: validate::cast_hash("parentHash", body.get("parentHash"))?,
            author: None,
        }),
        channel_key: None,
    };
    let signer_uuid = signer_uuid(&body)?;

    let hosted = state.hosted()?;
    let signer = require_approved(state.neynar()?, &signer_uuid).await?;
    let cast = hosted.publish(&signer.signer_uuid, &draft).await?;
    Ok(Json(json!({ "ok": true, "cast": cast })))
}

fn signer_uuid(params: &Value) -> Result<Uuid, AppError> {
    if validate::is_blank(params.get("signerUuid")) {
        return Err(AppError::NoSigner);
    }
    Ok(validate::uuid("signerUuid", params.get("signerUuid"))?)
}

async fn react(
    state: &ApiState,
    params: &Value,
    kind: ReactionKind,
    remove: bool,
) -> Result<Json<Value>, AppError> {
    let target = validate::cast_hash("castHash", params.get("castHash"))?;
    let signer_uuid = signer_uuid(params)?;

    let hosted = state.hosted()?;
    let signer = require_approved(state.neynar()?, &signer_uuid).await?;
    let data = hosted.react(&signer.signer_uuid, kind, &target, remove).await?;
    Ok(Json(json!({ "ok": true, "data": data })))
}

pub async fn like(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    react(&state, &json_body(payload)?, ReactionKind::Like, false).await
}

pub async fn unlike(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    react(&state, &query_params(query), ReactionKind::Like, true).await
}

pub async fn recast(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    react(&state, &json_body(payload)?, ReactionKind::Recast, false).await
}

pub async fn unrecast(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    react(&state, &query_params(query), ReactionKind::Recast, true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fid;

    #[test]
    fn parent_prefers_hash_over_url() {
        let body = json!({
            "parentHash": "ABCDEF0123456789ABCDEF0123456789ABCDEF01",
            "parentFid": 3,
            "parentUrl": "https://warpcast.com/~/channel/homies"
        });
        match parent(&body).unwrap() {
            Some(CastParent::Hash { hash, author }) => {
                assert_eq!(hash.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
                assert_eq!(author, Some(Fid(3)));
            }
            other => panic!("expected hash parent, got {:?}", other),
        }

        let url_only = json!({"parentUrl": "https://warpcast.com/~/channel/homies"});
        assert!(matches!(parent(&url_only).unwrap(), Some(CastParent::Url(_))));
        assert_eq!(parent(&json!({})).unwrap(), None);
    }

    #[test]
    fn missing_signer_uuid_is_no_signer() {
        assert!(matches!(signer_uuid(&json!({})), Err(AppError::NoSigner)));
        assert!(matches!(
            signer_uuid(&json!({"signerUuid": "nope"})),
            Err(AppError::Validation(_))
        ));
    }
}
