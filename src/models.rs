use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::error::AppError;

/// Farcaster ID. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fid(pub u64);

impl Fid {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content address of a cast: `0x` plus 40 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CastHash(String);

impl CastHash {
    /// Callers must have validated the input; see `validate::cast_hash`.
    pub(crate) fn from_normalized(value: String) -> Self {
        Self(value)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        hex::decode(self.0.trim_start_matches("0x")).unwrap_or_default()
    }
}

impl fmt::Display for CastHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerStatus {
    Generated,
    PendingApproval,
    Approved,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub signer_uuid: String,
    pub public_key: String,
    pub status: SignerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<Fid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_approval_url: Option<String>,
}

impl Signer {
    /// Only an approved signer may publish on a user's behalf.
    pub fn ensure_publishable(&self) -> Result<(), AppError> {
        match self.status {
            SignerStatus::Approved => Ok(()),
            _ => Err(AppError::NoSigner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastParent {
    /// A reply. `author` is only needed when building hub messages locally.
    Hash { hash: CastHash, author: Option<Fid> },
    Url(Url),
}

impl CastParent {
    pub fn as_str(&self) -> &str {
        match self {
            CastParent::Hash { hash, .. } => hash.as_str(),
            CastParent::Url(url) => url.as_str(),
        }
    }
}

/// A cast that has passed validation and may be handed to a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastDraft {
    pub text: String,
    pub embeds: Vec<Url>,
    pub parent: Option<CastParent>,
    pub channel_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedCast {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_fid: Option<Fid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Recast,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Recast => "recast",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub fid: Fid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CuratedListItem {
    pub id: i64,
    pub list_id: Uuid,
    pub cast_hash: String,
    pub author_fid: i64,
    pub cast_text: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cast_timestamp: Option<OffsetDateTime>,
    pub added_by_fid: i64,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCuratedListItem {
    pub list_id: Uuid,
    pub cast_hash: CastHash,
    pub author_fid: Fid,
    pub cast_text: Option<String>,
    pub cast_timestamp: Option<OffsetDateTime>,
    pub added_by_fid: Fid,
    pub notes: Option<String>,
}
