//! Read-only relay to the hosted API. Each call issues upstream GETs, strips
//! the response envelope and forwards upstream failures untouched.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::AppError;
use crate::models::{Fid, Profile};
use crate::search_policy::{PinnedAccountPolicy, SEARCH_RESULT_CAP};
use crate::upstream::UpstreamApi;

pub const FEED_LIMIT: (u32, u32) = (25, 100);
pub const CHANNELS_LIMIT: (u32, u32) = (25, 100);
pub const FRIENDS_LIMIT: (u32, u32) = (50, 100);
pub const TRENDING_LIMIT: (u32, u32) = (10, 50);
const PROFILE_CASTS_LIMIT: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Following(Fid),
    Channel(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    Fid(Fid),
    Username(String),
}

#[derive(Debug, Clone)]
pub struct TrendingQuery {
    pub limit: u32,
    pub time_window: &'static str,
    pub viewer_fid: Option<Fid>,
    pub channel_id: Option<String>,
}

/// Takes `body[key]` as an array; a missing or non-array field is empty.
fn array_field(body: &Value, key: &str) -> Vec<Value> {
    body.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Replaces each element with its `key` member, skipping elements without one.
fn pluck(items: Vec<Value>, key: &str) -> Vec<Value> {
    items
        .into_iter()
        .filter_map(|mut item| item.get_mut(key).map(Value::take))
        .collect()
}

pub fn profile_from_user(user: &Value) -> Option<Profile> {
    let fid = user.get("fid").and_then(Value::as_u64).filter(|f| *f > 0)?;
    let text = |key: &str| user.get(key).and_then(Value::as_str).map(str::to_string);
    Some(Profile {
        fid: Fid(fid),
        username: text("username"),
        display_name: text("display_name"),
        avatar: text("pfp_url"),
    })
}

pub struct ProxyGateway {
    neynar: Arc<dyn UpstreamApi>,
    pinned: Option<PinnedAccountPolicy>,
}

impl ProxyGateway {
    pub fn new(neynar: Arc<dyn UpstreamApi>, pinned: Option<PinnedAccountPolicy>) -> Self {
        Self { neynar, pinned }
    }

    pub async fn feed(&self, source: &FeedSource, limit: u32) -> Result<Vec<Value>, AppError> {
        let mut query = vec![("limit", limit.to_string())];
        match source {
            FeedSource::Following(fid) => {
                query.push(("feed_type", "following".to_string()));
                query.push(("fid", fid.to_string()));
            }
            FeedSource::Channel(channel) => {
                query.push(("feed_type", "filter".to_string()));
                query.push(("filter_type", "channel_id".to_string()));
                query.push(("channel_id", channel.clone()));
            }
        }
        let body = self.neynar.get("/v2/farcaster/feed", &query).await?;
        Ok(array_field(&body, "casts"))
    }

    /// Channels a user belongs to, or trending channels when no user is given.
    pub async fn channels(&self, fid: Option<Fid>, limit: u32) -> Result<Vec<Value>, AppError> {
        match fid {
            Some(fid) => {
                let body = self
                    .neynar
                    .get(
                        "/v2/farcaster/user/channels",
                        &[("fid", fid.to_string()), ("limit", limit.to_string())],
                    )
                    .await?;
                Ok(array_field(&body, "channels"))
            }
            None => {
                let body = self
                    .neynar
                    .get(
                        "/v2/farcaster/channel/trending",
                        &[
                            ("time_window", "7d".to_string()),
                            ("limit", limit.to_string()),
                        ],
                    )
                    .await?;
                Ok(pluck(array_field(&body, "channels"), "channel"))
            }
        }
    }

    pub async fn friends(&self, fid: Fid, limit: u32) -> Result<Vec<Value>, AppError> {
        let body = self
            .neynar
            .get(
                "/v2/farcaster/following",
                &[("fid", fid.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        Ok(pluck(array_field(&body, "users"), "user"))
    }

    pub async fn user(&self, lookup: &ProfileLookup) -> Result<Value, AppError> {
        let user = match lookup {
            ProfileLookup::Fid(fid) => {
                let body = self
                    .neynar
                    .get("/v2/farcaster/user/bulk", &[("fids", fid.to_string())])
                    .await?;
                array_field(&body, "users").into_iter().next()
            }
            ProfileLookup::Username(username) => {
                let body = self
                    .neynar
                    .get(
                        "/v2/farcaster/user/by_username",
                        &[("username", username.clone())],
                    )
                    .await?;
                body.get("user").cloned().filter(|u| !u.is_null())
            }
        };
        user.ok_or_else(|| AppError::NotFound("user".to_string()))
    }

    /// Returns the user and, when asked, their recent casts.
    pub async fn profile(
        &self,
        lookup: &ProfileLookup,
        with_casts: bool,
    ) -> Result<(Value, Option<Vec<Value>>), AppError> {
        let user = self.user(lookup).await?;
        if !with_casts {
            return Ok((user, None));
        }

        let fid = user
            .get("fid")
            .and_then(Value::as_u64)
            .ok_or_else(|| AppError::upstream("neynar", 502, user.clone()))?;
        let body = self
            .neynar
            .get(
                "/v2/farcaster/feed/user/casts",
                &[
                    ("fid", fid.to_string()),
                    ("limit", PROFILE_CASTS_LIMIT.to_string()),
                ],
            )
            .await?;
        Ok((user, Some(array_field(&body, "casts"))))
    }

    pub async fn trending(&self, query: &TrendingQuery) -> Result<Vec<Value>, AppError> {
        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("time_window", query.time_window.to_string()),
        ];
        if let Some(viewer) = query.viewer_fid {
            params.push(("viewer_fid", viewer.to_string()));
        }
        if let Some(channel) = &query.channel_id {
            params.push(("channel_id", channel.clone()));
        }
        let body = self.neynar.get("/v2/farcaster/feed/trending", &params).await?;
        Ok(array_field(&body, "casts"))
    }

    /// User search with the pinned-account rule applied. A failed pinned
    /// lookup does not fail the search.
    pub async fn search_users(&self, query: &str) -> Result<Vec<Value>, AppError> {
        let body = self
            .neynar
            .get(
                "/v2/farcaster/user/search",
                &[
                    ("q", query.to_string()),
                    ("limit", SEARCH_RESULT_CAP.to_string()),
                ],
            )
            .await?;
        let users = body
            .pointer("/result/users")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let pinned = match &self.pinned {
            Some(policy) if policy.matches(query) => {
                match self
                    .user(&ProfileLookup::Username(policy.username().to_string()))
                    .await
                {
                    Ok(user) => Some(user),
                    Err(e) => {
                        debug!(error = %e, "pinned account lookup failed");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(PinnedAccountPolicy::merge(pinned, users))
    }
}
