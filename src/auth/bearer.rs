use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::AppError;
use crate::logging::redact;
use crate::metrics;
use crate::models::Fid;
use crate::upstream::{http_client, transport_error};

/// Resolves a session token to the Farcaster account it belongs to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<Fid, AppError>;
}

/// Takes the token from `Authorization: Bearer`, falling back to a body field.
pub fn extract_token<'a>(headers: &'a HeaderMap, body_token: Option<&'a str>) -> Option<&'a str> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    from_header
        .or(body_token.map(str::trim))
        .filter(|token| !token.is_empty())
}

pub async fn require_fid(
    identity: &dyn IdentityProvider,
    headers: &HeaderMap,
    body_token: Option<&str>,
) -> Result<Fid, AppError> {
    let token = extract_token(headers, body_token).ok_or_else(|| {
        debug!("missing bearer token");
        AppError::Unauthorized
    })?;
    identity.verify_token(token).await
}

/// Like `require_fid`, but anonymous callers get `None`. A token that is
/// present and invalid still fails.
pub async fn optional_fid(
    identity: &dyn IdentityProvider,
    headers: &HeaderMap,
    body_token: Option<&str>,
) -> Result<Option<Fid>, AppError> {
    match extract_token(headers, body_token) {
        Some(token) => identity.verify_token(token).await.map(Some),
        None => Ok(None),
    }
}

/// Privy-backed verification: the token is checked by Privy and the linked
/// Farcaster account is read from the returned user.
pub struct PrivyIdentity {
    http_client: HttpClient,
    api_url: String,
    app_id: String,
}

impl PrivyIdentity {
    pub fn new(api_url: &str, app_id: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
        })
    }
}

/// Finds the FID on a Privy user object (`{user: {...}}` or the bare user).
pub fn linked_farcaster_fid(body: &Value) -> Option<Fid> {
    let user = body.get("user").unwrap_or(body);
    user.get("linked_accounts")?
        .as_array()?
        .iter()
        .filter(|account| account.get("type").and_then(Value::as_str) == Some("farcaster"))
        .find_map(|account| account.get("fid").and_then(Value::as_u64))
        .filter(|fid| *fid > 0)
        .map(Fid)
}

#[async_trait]
impl IdentityProvider for PrivyIdentity {
    async fn verify_token(&self, token: &str) -> Result<Fid, AppError> {
        let url = format!("{}/api/v1/users/me", self.api_url);
        let timer = Instant::now();
        let response = self
            .http_client
            .get(&url)
            .header("privy-app-id", &self.app_id)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error("privy", e))?;
        metrics::UPSTREAM_LATENCY
            .with_label_values(&["privy"])
            .observe(timer.elapsed().as_secs_f64());

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            debug!(token = %redact(token), "identity provider rejected token");
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            metrics::UPSTREAM_FAILURES.with_label_values(&["privy"]).inc();
            let details = response.text().await.unwrap_or_default();
            return Err(AppError::upstream("privy", status.as_u16(), details));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| transport_error("privy", e))?;
        linked_farcaster_fid(&body).ok_or_else(|| {
            debug!(token = %redact(token), "session has no linked Farcaster account");
            AppError::Unauthorized
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn header_token_wins_over_body() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_token(&headers, Some("body")), Some("abc"));
        assert_eq!(extract_token(&HeaderMap::new(), Some(" body ")), Some("body"));
        assert_eq!(extract_token(&HeaderMap::new(), Some("  ")), None);
        assert_eq!(extract_token(&HeaderMap::new(), None), None);

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_token(&basic, None), None);
    }

    #[test]
    fn finds_linked_farcaster_account() {
        let body = json!({
            "user": {
                "id": "did:privy:1",
                "linked_accounts": [
                    {"type": "email", "address": "a@b.c"},
                    {"type": "farcaster", "fid": 977, "username": "homie"}
                ]
            }
        });
        assert_eq!(linked_farcaster_fid(&body), Some(Fid(977)));

        let bare = json!({"linked_accounts": [{"type": "wallet"}]});
        assert_eq!(linked_farcaster_fid(&bare), None);
    }
}
