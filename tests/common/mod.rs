//! In-memory stand-ins for every external service, plus request helpers.
#![allow(dead_code)]

use alloy::primitives::Address;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use homiehouse::api::{create_api_router, ApiState, Services};
use homiehouse::auth::{CustodyResolver, IdentityProvider};
use homiehouse::config::{Config, Secret};
use homiehouse::curated::{CuratedListError, CuratedListStore};
use homiehouse::error::AppError;
use homiehouse::hub::HubClient;
use homiehouse::images::{HostedImage, ImageHost};
use homiehouse::models::{CastHash, CuratedListItem, Fid, NewCuratedListItem};
use homiehouse::upstream::{Query, UpstreamApi};

pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
pub const BOT_SIGNER: &str = "6a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d";
pub const BOT_FID: u64 = 4242;
pub const VALID_TOKEN: &str = "session-token-alice";
pub const ALICE: Fid = Fid(977);

/// Hosted API fake. Tracks signers so the approval flow can be driven
/// out of band, and records everything it is asked to publish.
#[derive(Default)]
pub struct FakeNeynar {
    pub signers: Mutex<HashMap<String, Value>>,
    pub casts: Mutex<Vec<Value>>,
    pub reactions: Mutex<Vec<(Method, Value)>>,
    pub queries: Mutex<Vec<(String, Vec<(String, String)>)>>,
    pub calls: AtomicUsize,
}

impl FakeNeynar {
    pub fn insert_signer(&self, signer_uuid: &str, status: &str, fid: Option<u64>) {
        let mut signer = json!({
            "signer_uuid": signer_uuid,
            "public_key": format!("0x{}", "ab".repeat(32)),
            "status": status,
        });
        if let Some(fid) = fid {
            signer["fid"] = json!(fid);
        }
        self.signers
            .lock()
            .unwrap()
            .insert(signer_uuid.to_string(), signer);
    }

    /// The user approving the request in their Farcaster client.
    pub fn approve(&self, signer_uuid: &str, fid: u64) {
        let mut signers = self.signers.lock().unwrap();
        let signer = signers.get_mut(signer_uuid).expect("unknown signer");
        signer["status"] = json!("approved");
        signer["fid"] = json!(fid);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn query_of(&self, path: &str) -> HashMap<String, String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, q)| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn not_found(message: &str) -> AppError {
    AppError::upstream("neynar", 404, json!({ "message": message }))
}

#[async_trait]
impl UpstreamApi for FakeNeynar {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.queries
            .lock()
            .unwrap()
            .push((path.to_string(), query.clone()));
        let param = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let body = body.cloned().unwrap_or(Value::Null);

        match (method.clone(), path) {
            (Method::POST, "/v2/farcaster/signer") => {
                let uuid = Uuid::new_v4().to_string();
                self.insert_signer(&uuid, "generated", None);
                Ok(self.signers.lock().unwrap()[&uuid].clone())
            }
            (Method::POST, "/v2/farcaster/signer/signed_key") => {
                let uuid = body["signer_uuid"].as_str().unwrap_or_default().to_string();
                let mut signers = self.signers.lock().unwrap();
                let signer = signers.get_mut(&uuid).ok_or_else(|| not_found("signer"))?;
                signer["status"] = json!("pending_approval");
                signer["signer_approval_url"] = json!(format!(
                    "https://client.warpcast.com/deeplinks/signed-key-request?token=0x{}",
                    "cd".repeat(8)
                ));
                Ok(signer.clone())
            }
            (Method::GET, "/v2/farcaster/signer") => self
                .signers
                .lock()
                .unwrap()
                .get(&param("signer_uuid"))
                .cloned()
                .ok_or_else(|| not_found("signer")),
            (Method::POST, "/v2/farcaster/cast") => {
                let mut casts = self.casts.lock().unwrap();
                casts.push(body.clone());
                Ok(json!({
                    "success": true,
                    "cast": {
                        "hash": format!("0x{:040x}", casts.len()),
                        "author": { "fid": 123 },
                        "text": body["text"],
                    }
                }))
            }
            (Method::POST | Method::DELETE, "/v2/farcaster/reaction") => {
                self.reactions.lock().unwrap().push((method, body));
                Ok(json!({ "success": true }))
            }
            (Method::GET, "/v2/farcaster/user/bulk") => {
                let fid: u64 = param("fids").parse().unwrap_or_default();
                Ok(json!({
                    "users": [{
                        "fid": fid,
                        "username": format!("user{}", fid),
                        "display_name": "Test User",
                        "pfp_url": "https://i.imgur.com/avatar.png"
                    }]
                }))
            }
            (Method::GET, "/v2/farcaster/user/by_username") => {
                Ok(json!({ "user": { "fid": 7, "username": param("username") } }))
            }
            (Method::GET, "/v2/farcaster/user/search") => Ok(json!({
                "result": { "users": [{ "fid": 9, "username": "homies" }, { "fid": 7, "username": "homiehouse" }] }
            })),
            (Method::GET, "/v2/farcaster/feed") | (Method::GET, "/v2/farcaster/feed/trending") => {
                Ok(json!({ "casts": [{ "hash": "0x01" }], "next": { "cursor": null } }))
            }
            _ => Err(not_found(path)),
        }
    }
}

#[derive(Default)]
pub struct FakeHub {
    pub received: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl HubClient for FakeHub {
    async fn submit_message(&self, encoded: Vec<u8>) -> Result<Value, AppError> {
        self.received.lock().unwrap().push(encoded);
        Ok(json!({}))
    }
}

pub struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn verify_token(&self, token: &str) -> Result<Fid, AppError> {
        if token == VALID_TOKEN {
            Ok(ALICE)
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

pub struct FixedCustody(pub Mutex<Address>);

#[async_trait]
impl CustodyResolver for FixedCustody {
    async fn custody_address(&self, _fid: Fid) -> Result<Address, AppError> {
        Ok(*self.0.lock().unwrap())
    }
}

/// Enforces the same `(list_id, cast_hash)` uniqueness as the table.
#[derive(Default)]
pub struct MemoryCuratedLists {
    items: Mutex<Vec<CuratedListItem>>,
}

#[async_trait]
impl CuratedListStore for MemoryCuratedLists {
    async fn list_items(&self, list_id: Uuid) -> Result<Vec<CuratedListItem>, CuratedListError> {
        let mut items: Vec<CuratedListItem> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.list_id == list_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(items)
    }

    async fn add_item(&self, item: NewCuratedListItem) -> Result<CuratedListItem, CuratedListError> {
        let mut items = self.items.lock().unwrap();
        if items
            .iter()
            .any(|i| i.list_id == item.list_id && i.cast_hash == item.cast_hash.as_str())
        {
            return Err(CuratedListError::AlreadyInList);
        }
        let created = CuratedListItem {
            id: items.len() as i64 + 1,
            list_id: item.list_id,
            cast_hash: item.cast_hash.to_string(),
            author_fid: item.author_fid.get() as i64,
            cast_text: item.cast_text,
            cast_timestamp: item.cast_timestamp,
            added_by_fid: item.added_by_fid.get() as i64,
            notes: item.notes,
            created_at: OffsetDateTime::now_utc(),
        };
        items.push(created.clone());
        Ok(created)
    }

    async fn remove_item(&self, list_id: Uuid, cast_hash: &CastHash) -> Result<bool, CuratedListError> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|i| !(i.list_id == list_id && i.cast_hash == cast_hash.as_str()));
        Ok(items.len() != before)
    }
}

#[derive(Default)]
pub struct FakeImageHost {
    pub uploads: Mutex<Vec<(usize, Option<String>)>>,
}

#[async_trait]
impl ImageHost for FakeImageHost {
    async fn upload(&self, bytes: &[u8], file_name: Option<&str>) -> Result<HostedImage, AppError> {
        self.uploads
            .lock()
            .unwrap()
            .push((bytes.len(), file_name.map(str::to_string)));
        Ok(HostedImage {
            url: "https://i.ibb.co/test/cat.png".to_string(),
            delete_url: Some("https://ibb.co/test/delete".to_string()),
        })
    }
}

/// Echoes what it was asked so tests can check the forwarding.
pub struct EchoCuration;

#[async_trait]
impl UpstreamApi for EchoCuration {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        let query: HashMap<&str, &str> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Ok(json!({
            "method": method.as_str(),
            "path": path,
            "query": query,
            "body": body,
        }))
    }
}

pub fn test_config() -> Config {
    Config {
        app_fid: Some(4242),
        app_mnemonic: Some(Secret::new(TEST_MNEMONIC)),
        bot_signer_uuid: Some(Uuid::parse_str(BOT_SIGNER).unwrap()),
        max_upload_bytes: 1024,
        ..Config::default()
    }
}

pub struct TestSetup {
    pub neynar: Arc<FakeNeynar>,
    pub hub: Arc<FakeHub>,
    pub custody: Arc<FixedCustody>,
    pub images: Arc<FakeImageHost>,
    pub app: Router,
}

impl TestSetup {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let neynar = Arc::new(FakeNeynar::default());
        if let Some(bot) = config.bot_signer_uuid {
            neynar.insert_signer(&bot.to_string(), "approved", Some(BOT_FID));
        }
        let hub = Arc::new(FakeHub::default());
        let custody = Arc::new(FixedCustody(Mutex::new(Address::ZERO)));
        let images = Arc::new(FakeImageHost::default());

        let services = Services {
            neynar: Some(neynar.clone()),
            hub: hub.clone(),
            identity: Some(Arc::new(FakeIdentity)),
            custody: custody.clone(),
            curated: Some(Arc::new(MemoryCuratedLists::default())),
            images: Some(images.clone()),
            curation: Some(Arc::new(EchoCuration)),
        };
        let state = Arc::new(ApiState::new(&config, services));

        Self {
            neynar,
            hub,
            custody,
            images,
            app: create_api_router(state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", VALID_TOKEN));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
