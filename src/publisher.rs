//! Cast publication. Two interchangeable strategies share the `Publisher`
//! contract: submit an authored cast to the network and return its hash.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use prost::Message as _;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::error::AppError;
use crate::hub::{self, HubClient};
use crate::logging::redact;
use crate::metrics;
use crate::models::{CastDraft, CastHash, Fid, PublishedCast, ReactionKind};
use crate::upstream::UpstreamApi;

#[async_trait]
pub trait Publisher: Send + Sync {
    type Credential: Send + Sync;

    async fn publish(
        &self,
        credential: &Self::Credential,
        draft: &CastDraft,
    ) -> Result<PublishedCast, AppError>;
}

/// Publishes through the hosted API, which signs and submits on the
/// signer's behalf. The default path.
pub struct HostedPublisher {
    neynar: Arc<dyn UpstreamApi>,
}

impl HostedPublisher {
    pub fn new(neynar: Arc<dyn UpstreamApi>) -> Self {
        Self { neynar }
    }

    pub fn cast_payload(signer_uuid: &str, draft: &CastDraft) -> Value {
        let mut payload = Map::new();
        payload.insert("signer_uuid".into(), json!(signer_uuid));
        payload.insert("text".into(), json!(draft.text));
        if !draft.embeds.is_empty() {
            let embeds: Vec<Value> = draft
                .embeds
                .iter()
                .map(|url| json!({ "url": url.as_str() }))
                .collect();
            payload.insert("embeds".into(), Value::Array(embeds));
        }
        if let Some(parent) = &draft.parent {
            payload.insert("parent".into(), json!(parent.as_str()));
        }
        if let Some(channel) = &draft.channel_key {
            payload.insert("channel_id".into(), json!(channel));
        }
        Value::Object(payload)
    }

    /// Adds or removes a like/recast. Removal is the same request with DELETE.
    pub async fn react(
        &self,
        signer_uuid: &str,
        kind: ReactionKind,
        target: &CastHash,
        remove: bool,
    ) -> Result<Value, AppError> {
        let payload = json!({
            "signer_uuid": signer_uuid,
            "reaction_type": kind.as_str(),
            "target": target.as_str(),
        });
        let result = if remove {
            self.neynar.delete("/v2/farcaster/reaction", &payload).await?
        } else {
            self.neynar.post("/v2/farcaster/reaction", &payload).await?
        };

        let op = if remove { "remove" } else { "add" };
        metrics::REACTIONS_SUBMITTED
            .with_label_values(&[kind.as_str(), op])
            .inc();
        info!(signer = %redact(signer_uuid), kind = kind.as_str(), op, target = %target, "reaction submitted");
        Ok(result)
    }
}

#[async_trait]
impl Publisher for HostedPublisher {
    type Credential = String;

    async fn publish(
        &self,
        signer_uuid: &String,
        draft: &CastDraft,
    ) -> Result<PublishedCast, AppError> {
        let body = self
            .neynar
            .post("/v2/farcaster/cast", &Self::cast_payload(signer_uuid, draft))
            .await?;

        let cast = body.get("cast").cloned().unwrap_or(body);
        let published = PublishedCast {
            hash: cast
                .get("hash")
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty())
                .ok_or_else(|| {
                    AppError::Unknown(anyhow::anyhow!("hosted API returned a cast without a hash"))
                })?
                .to_string(),
            author_fid: cast
                .pointer("/author/fid")
                .and_then(Value::as_u64)
                .map(Fid),
            text: cast.get("text").and_then(Value::as_str).map(str::to_string),
        };

        metrics::CASTS_PUBLISHED.with_label_values(&["hosted"]).inc();
        info!(signer = %redact(signer_uuid), hash = %published.hash, "cast published via hosted API");
        Ok(published)
    }
}

/// A caller-held Ed25519 key for an FID.
pub struct HubCredential {
    pub fid: Fid,
    pub key: SigningKey,
}

/// Builds, signs and submits the cast message locally.
///
/// Trust assumption: nothing here checks that `key` is an approved signer
/// for `fid`. The hub validates the key against on-chain state and rejects
/// unauthorized messages; that rejection is relayed to the caller.
pub struct HubPublisher {
    hub: Arc<dyn HubClient>,
}

impl HubPublisher {
    pub fn new(hub: Arc<dyn HubClient>) -> Self {
        Self { hub }
    }
}

pub(crate) fn unix_now() -> Result<u64, AppError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AppError::Unknown(e.into()))
}

#[async_trait]
impl Publisher for HubPublisher {
    type Credential = HubCredential;

    async fn publish(
        &self,
        credential: &HubCredential,
        draft: &CastDraft,
    ) -> Result<PublishedCast, AppError> {
        let timestamp = hub::farcaster_timestamp(unix_now()?)?;
        let data = hub::cast_add_data(credential.fid, draft, timestamp)?;
        let message = hub::sign_message(data, &credential.key);
        let local_hash = hub::message_hash(&message);

        let response = self.hub.submit_message(message.encode_to_vec()).await?;
        let hash = response
            .get("hash")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| local_hash.to_string());

        metrics::CASTS_PUBLISHED.with_label_values(&["hub"]).inc();
        info!(fid = %credential.fid, hash = %hash, "cast submitted to hub");
        Ok(PublishedCast {
            hash,
            author_fid: Some(credential.fid),
            text: Some(draft.text.clone()),
        })
    }
}
