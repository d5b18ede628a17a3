//! Local construction and submission of signed Farcaster messages.
//!
//! A cast message is built as `MessageData`, encoded, hashed with BLAKE3
//! (truncated to 20 bytes), and the hash is signed with the signer's Ed25519
//! key. The hub receives the encoded `Message` as raw bytes.

pub mod proto;

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use prost::Message as _;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::Secret;
use crate::error::{AppError, ValidationError};
use crate::metrics;
use crate::models::{CastDraft, CastHash, CastParent, Fid};
use crate::upstream::{http_client, read_json, transport_error};

use proto::{cast_add_body, embed, message_data};

/// 2021-01-01T00:00:00Z, the origin of hub message timestamps.
pub const FARCASTER_EPOCH: u64 = 1_609_459_200;

const HASH_LENGTH: usize = 20;

/// Parses a hex Ed25519 private key: a 32-byte seed, or a 64-byte
/// seed-plus-public-key pair.
pub fn signing_key_from_hex(raw: &str) -> Result<SigningKey, AppError> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|_| AppError::NoSigner)?;
    let seed: [u8; 32] = match bytes.len() {
        32 | 64 => bytes[..32].try_into().map_err(|_| AppError::NoSigner)?,
        _ => return Err(AppError::NoSigner),
    };
    Ok(SigningKey::from_bytes(&seed))
}

pub fn farcaster_timestamp(unix_seconds: u64) -> Result<u32, AppError> {
    unix_seconds
        .checked_sub(FARCASTER_EPOCH)
        .and_then(|t| u32::try_from(t).ok())
        .ok_or_else(|| AppError::Unknown(anyhow::anyhow!("clock is outside the Farcaster epoch range")))
}

pub fn cast_add_data(
    fid: Fid,
    draft: &CastDraft,
    timestamp: u32,
) -> Result<proto::MessageData, ValidationError> {
    let parent = match &draft.parent {
        None => None,
        Some(CastParent::Hash { hash, author }) => {
            // The hosted API resolves the parent author; the hub needs it inline.
            let author = author.ok_or_else(|| {
                ValidationError::new("parentFid", "Parent author FID is required for replies")
            })?;
            Some(cast_add_body::Parent::ParentCastId(proto::CastId {
                fid: author.get(),
                hash: hash.to_bytes(),
            }))
        }
        Some(CastParent::Url(url)) => Some(cast_add_body::Parent::ParentUrl(url.to_string())),
    };

    let body = proto::CastAddBody {
        embeds_deprecated: Vec::new(),
        mentions: Vec::new(),
        text: draft.text.clone(),
        mentions_positions: Vec::new(),
        embeds: draft
            .embeds
            .iter()
            .map(|url| proto::Embed {
                embed: Some(embed::Embed::Url(url.to_string())),
            })
            .collect(),
        parent,
    };

    Ok(proto::MessageData {
        r#type: proto::MessageType::CastAdd as i32,
        fid: fid.get(),
        timestamp,
        network: proto::FarcasterNetwork::Mainnet as i32,
        body: Some(message_data::Body::CastAddBody(body)),
    })
}

/// Hashes and signs `data`, producing a message ready for submission.
pub fn sign_message(data: proto::MessageData, key: &SigningKey) -> proto::Message {
    let data_bytes = data.encode_to_vec();
    let digest = blake3::hash(&data_bytes);
    let hash = digest.as_bytes()[..HASH_LENGTH].to_vec();
    let signature = key.sign(&hash);

    proto::Message {
        data: Some(data),
        hash,
        hash_scheme: proto::HashScheme::Blake3 as i32,
        signature: signature.to_bytes().to_vec(),
        signature_scheme: proto::SignatureScheme::Ed25519 as i32,
        signer: key.verifying_key().to_bytes().to_vec(),
        data_bytes: Some(data_bytes),
    }
}

pub fn message_hash(message: &proto::Message) -> CastHash {
    CastHash::from_bytes(&message.hash)
}

#[async_trait]
pub trait HubClient: Send + Sync {
    /// Submits an encoded `Message`. Returns the hub's JSON view of it.
    async fn submit_message(&self, encoded: Vec<u8>) -> Result<Value, AppError>;
}

pub struct HttpHub {
    http_client: HttpClient,
    hub_url: String,
    api_key: Option<Secret>,
}

impl HttpHub {
    pub fn new(hub_url: &str, api_key: Option<Secret>, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            hub_url: hub_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl HubClient for HttpHub {
    async fn submit_message(&self, encoded: Vec<u8>) -> Result<Value, AppError> {
        let url = format!("{}/v1/submitMessage", self.hub_url);
        debug!(bytes = encoded.len(), "submitting message to hub");

        let mut request = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(encoded);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose());
        }

        let timer = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("hub", e))?;
        metrics::UPSTREAM_LATENCY
            .with_label_values(&["hub"])
            .observe(timer.elapsed().as_secs_f64());

        read_json("hub", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};
    use url::Url;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn draft() -> CastDraft {
        CastDraft {
            text: "gm homies".to_string(),
            embeds: vec![Url::parse("https://example.com/a.png").unwrap()],
            parent: None,
            channel_key: None,
        }
    }

    #[test]
    fn parses_seed_and_keypair_hex() {
        let seed_hex = format!("0x{}", hex::encode([7u8; 32]));
        assert_eq!(signing_key_from_hex(&seed_hex).unwrap().to_bytes(), [7u8; 32]);

        let mut pair = vec![7u8; 32];
        pair.extend_from_slice(&key().verifying_key().to_bytes());
        assert_eq!(
            signing_key_from_hex(&hex::encode(pair)).unwrap().to_bytes(),
            [7u8; 32]
        );

        assert!(matches!(signing_key_from_hex("0x1234"), Err(AppError::NoSigner)));
        assert!(matches!(signing_key_from_hex("nothex"), Err(AppError::NoSigner)));
    }

    #[test]
    fn timestamps_are_relative_to_farcaster_epoch() {
        assert_eq!(farcaster_timestamp(FARCASTER_EPOCH).unwrap(), 0);
        assert_eq!(farcaster_timestamp(FARCASTER_EPOCH + 90).unwrap(), 90);
        assert!(farcaster_timestamp(0).is_err());
    }

    #[test]
    fn signed_message_hash_and_signature_verify() {
        let data = cast_add_data(Fid(123), &draft(), 1000).unwrap();
        let message = sign_message(data.clone(), &key());

        let data_bytes = message.data_bytes.clone().unwrap();
        assert_eq!(data_bytes, data.encode_to_vec());
        assert_eq!(message.hash, blake3::hash(&data_bytes).as_bytes()[..20].to_vec());

        let signature = Signature::from_slice(&message.signature).unwrap();
        key().verifying_key().verify(&message.hash, &signature).unwrap();
        assert_eq!(message.signer, key().verifying_key().to_bytes().to_vec());
        assert_eq!(message_hash(&message).as_str().len(), 42);
    }

    #[test]
    fn cast_body_round_trips_through_wire_format() {
        let mut draft = draft();
        draft.parent = Some(CastParent::Url(Url::parse("https://warpcast.com/~/channel/homies").unwrap()));
        let message = sign_message(cast_add_data(Fid(9), &draft, 5).unwrap(), &key());

        let decoded = proto::Message::decode(message.encode_to_vec().as_slice()).unwrap();
        let data = decoded.data.unwrap();
        assert_eq!(data.fid, 9);
        assert_eq!(data.r#type, proto::MessageType::CastAdd as i32);
        assert_eq!(data.network, proto::FarcasterNetwork::Mainnet as i32);
        match data.body {
            Some(message_data::Body::CastAddBody(body)) => {
                assert_eq!(body.text, "gm homies");
                assert!(body.mentions.is_empty());
                assert_eq!(body.embeds.len(), 1);
                assert!(matches!(body.parent, Some(cast_add_body::Parent::ParentUrl(_))));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn hash_replies_need_the_parent_author() {
        let hash = CastHash::from_bytes(&[1u8; 20]);
        let mut draft = draft();
        draft.parent = Some(CastParent::Hash { hash: hash.clone(), author: None });
        let err = cast_add_data(Fid(9), &draft, 5).unwrap_err();
        assert_eq!(err.field, "parentFid");

        draft.parent = Some(CastParent::Hash { hash, author: Some(Fid(2)) });
        let data = cast_add_data(Fid(9), &draft, 5).unwrap();
        match data.body {
            Some(message_data::Body::CastAddBody(body)) => match body.parent {
                Some(cast_add_body::Parent::ParentCastId(id)) => {
                    assert_eq!(id.fid, 2);
                    assert_eq!(id.hash, vec![1u8; 20]);
                }
                other => panic!("unexpected parent: {:?}", other),
            },
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
