//! Signer lifecycle: create, register with an EIP-712 signed key request,
//! and poll for out-of-band approval.
//!
//! ```text
//! generated --(signed key request accepted)--> pending_approval
//! pending_approval --(user approves, observed by polling)--> approved
//! approved --(user revokes)--> revoked
//! ```
//!
//! Status is only ever learned by polling the signer service. Webhook
//! deliveries are logged by the API layer and never change what this module
//! reports.

use alloy::primitives::{address, Address, Bytes, U256};
use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{eip712_domain, Eip712Domain, SolStruct};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, ValidationError};
use crate::logging::redact;
use crate::metrics;
use crate::models::{Fid, Signer};
use crate::upstream::UpstreamApi;

/// Farcaster's SignedKeyRequestValidator on OP mainnet.
pub const SIGNED_KEY_REQUEST_VALIDATOR: Address =
    address!("00000000FC700472606ED4fA22623Acf62c60553");

/// Signed key requests expire a day after they are issued.
pub const KEY_REQUEST_TTL_SECS: u64 = 24 * 60 * 60;

sol! {
    struct SignedKeyRequest {
        uint256 requestFid;
        bytes key;
        uint256 deadline;
    }
}

pub fn key_request_domain() -> Eip712Domain {
    eip712_domain! {
        name: "Farcaster SignedKeyRequestValidator",
        version: "1",
        chain_id: 10,
        verifying_contract: SIGNED_KEY_REQUEST_VALIDATOR,
    }
}

fn decode_public_key(public_key: &str) -> Result<Vec<u8>, ValidationError> {
    let digits = public_key.trim().trim_start_matches("0x");
    match hex::decode(digits) {
        Ok(bytes) if bytes.len() == 32 => Ok(bytes),
        _ => Err(ValidationError::new(
            "public_key",
            "Signer public key must be 32 bytes of hex",
        )),
    }
}

/// Polls the signer service. Shared by the manager and the publish routes,
/// which need status checks even when registration is not configured.
pub async fn fetch_signer(neynar: &dyn UpstreamApi, signer_uuid: &Uuid) -> Result<Signer, AppError> {
    let body = neynar
        .get(
            "/v2/farcaster/signer",
            &[("signer_uuid", signer_uuid.to_string())],
        )
        .await?;
    serde_json::from_value(body)
        .map_err(|e| AppError::Unknown(anyhow::anyhow!("unexpected signer payload: {}", e)))
}

/// Fails with `no_signer` unless the signer is approved.
pub async fn require_approved(
    neynar: &dyn UpstreamApi,
    signer_uuid: &Uuid,
) -> Result<Signer, AppError> {
    let signer = fetch_signer(neynar, signer_uuid).await?;
    if let Err(e) = signer.ensure_publishable() {
        warn!(
            signer = %redact(&signer.signer_uuid),
            status = ?signer.status,
            "refusing to publish with unapproved signer"
        );
        return Err(e);
    }
    Ok(signer)
}

pub struct SignerManager {
    neynar: Arc<dyn UpstreamApi>,
    app_fid: Fid,
    app_signer: PrivateKeySigner,
}

impl SignerManager {
    pub fn new(neynar: Arc<dyn UpstreamApi>, app_fid: Fid, app_signer: PrivateKeySigner) -> Self {
        Self {
            neynar,
            app_fid,
            app_signer,
        }
    }

    /// Missing settings are a configuration error; callers report it once.
    pub fn from_config(
        config: &Config,
        neynar: Option<Arc<dyn UpstreamApi>>,
    ) -> Result<Self, AppError> {
        let neynar =
            neynar.ok_or_else(|| AppError::Config("NEYNAR_API_KEY is not set".to_string()))?;
        let app_fid = config
            .app_fid
            .ok_or_else(|| AppError::Config("APP_FID is not set".to_string()))?;
        let mnemonic = config
            .app_mnemonic
            .as_ref()
            .ok_or_else(|| AppError::Config("APP_MNEMONIC is not set".to_string()))?;
        let app_signer = custody_signer_from_mnemonic(mnemonic.expose())?;

        Ok(Self::new(neynar, Fid(app_fid), app_signer))
    }

    pub fn app_fid(&self) -> Fid {
        self.app_fid
    }

    pub fn app_address(&self) -> Address {
        self.app_signer.address()
    }

    /// Signs `SignedKeyRequest { requestFid, key, deadline }` with the app's
    /// custody key. Returns the 65-byte signature as `0x` hex.
    pub fn sign_key_request(&self, public_key: &str, deadline: u64) -> Result<String, AppError> {
        let request = SignedKeyRequest {
            requestFid: U256::from(self.app_fid.get()),
            key: Bytes::from(decode_public_key(public_key)?),
            deadline: U256::from(deadline),
        };
        let hash = request.eip712_signing_hash(&key_request_domain());
        let signature = self
            .app_signer
            .sign_hash_sync(&hash)
            .map_err(|e| AppError::Unknown(anyhow::anyhow!("failed to sign key request: {}", e)))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    pub async fn create_signer(&self) -> Result<Signer, AppError> {
        let body = self.neynar.post("/v2/farcaster/signer", &json!({})).await?;
        let signer: Signer = serde_json::from_value(body)
            .map_err(|e| AppError::Unknown(anyhow::anyhow!("unexpected signer payload: {}", e)))?;
        info!(signer = %redact(&signer.signer_uuid), "created signer");
        Ok(signer)
    }

    /// `now` is unix seconds; the request deadline is a day later.
    pub async fn register_signer(
        &self,
        signer_uuid: &str,
        public_key: &str,
        now: u64,
    ) -> Result<Signer, AppError> {
        let deadline = now + KEY_REQUEST_TTL_SECS;
        let signature = self.sign_key_request(public_key, deadline)?;

        let body = self
            .neynar
            .post(
                "/v2/farcaster/signer/signed_key",
                &json!({
                    "signer_uuid": signer_uuid,
                    "app_fid": self.app_fid,
                    "deadline": deadline,
                    "signature": signature,
                }),
            )
            .await?;
        let signer: Signer = serde_json::from_value(body)
            .map_err(|e| AppError::Unknown(anyhow::anyhow!("unexpected signer payload: {}", e)))?;

        metrics::SIGNERS_REGISTERED.inc();
        info!(
            signer = %redact(&signer.signer_uuid),
            status = ?signer.status,
            deadline,
            "registered signed key request"
        );
        Ok(signer)
    }

    pub async fn create_and_register(&self, now: u64) -> Result<Signer, AppError> {
        let created = self.create_signer().await?;
        self.register_signer(&created.signer_uuid, &created.public_key, now)
            .await
    }

    pub async fn signer_status(&self, signer_uuid: &Uuid) -> Result<Signer, AppError> {
        fetch_signer(self.neynar.as_ref(), signer_uuid).await
    }
}

pub fn custody_signer_from_mnemonic(phrase: &str) -> Result<PrivateKeySigner, AppError> {
    MnemonicBuilder::<English>::default()
        .phrase(phrase.trim())
        .build()
        .map_err(|_| AppError::Config("APP_MNEMONIC is not a valid mnemonic".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Signature;
    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::Value;
    use std::sync::Mutex;

    use crate::upstream::Query;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
    const PUBLIC_KEY: &str = "0x5b3e6d4cf1dc1e2eb3f6a2b6e8b5c2bdc0d1a96e4c6a7bb0e2f1d5c9a8b7c6d5";

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(Method, String, Option<Value>)>>,
    }

    #[async_trait]
    impl UpstreamApi for Recorder {
        async fn request(
            &self,
            method: Method,
            path: &str,
            _query: &Query<'_>,
            body: Option<&Value>,
        ) -> Result<Value, AppError> {
            self.calls
                .lock()
                .unwrap()
                .push((method, path.to_string(), body.cloned()));
            Ok(json!({
                "signer_uuid": "19d0c5fd-9b33-4a48-a0e2-bc7b0555baec",
                "public_key": PUBLIC_KEY,
                "status": "pending_approval",
                "signer_approval_url": "https://client.warpcast.com/deeplinks/signed-key-request?token=0x1"
            }))
        }
    }

    fn manager(recorder: Arc<Recorder>) -> SignerManager {
        let signer = custody_signer_from_mnemonic(TEST_MNEMONIC).unwrap();
        SignerManager::new(recorder, Fid(4242), signer)
    }

    #[test]
    fn key_request_signature_recovers_to_app_custody_address() {
        let manager = manager(Arc::new(Recorder::default()));
        let deadline = 1_700_000_000;
        let signature_hex = manager.sign_key_request(PUBLIC_KEY, deadline).unwrap();

        let bytes = hex::decode(signature_hex.trim_start_matches("0x")).unwrap();
        assert_eq!(bytes.len(), 65);
        let signature = Signature::try_from(bytes.as_slice()).unwrap();

        let request = SignedKeyRequest {
            requestFid: U256::from(4242u64),
            key: Bytes::from(hex::decode(PUBLIC_KEY.trim_start_matches("0x")).unwrap()),
            deadline: U256::from(deadline),
        };
        let hash = request.eip712_signing_hash(&key_request_domain());
        let recovered = signature.recover_address_from_prehash(&hash).unwrap();
        assert_eq!(recovered, manager.app_address());
    }

    #[test]
    fn rejects_malformed_public_keys() {
        let manager = manager(Arc::new(Recorder::default()));
        assert!(matches!(
            manager.sign_key_request("0x1234", 1),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn invalid_mnemonic_is_a_config_error() {
        assert!(matches!(
            custody_signer_from_mnemonic("not a real mnemonic"),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn register_posts_deadline_one_day_out() {
        let recorder = Arc::new(Recorder::default());
        let manager = manager(recorder.clone());
        let signer = manager
            .register_signer("19d0c5fd-9b33-4a48-a0e2-bc7b0555baec", PUBLIC_KEY, 1_000)
            .await
            .unwrap();
        assert!(signer.signer_approval_url.is_some());

        let calls = recorder.calls.lock().unwrap();
        let (method, path, body) = &calls[0];
        assert_eq!(*method, Method::POST);
        assert_eq!(path, "/v2/farcaster/signer/signed_key");
        let body = body.as_ref().unwrap();
        assert_eq!(body["deadline"], json!(1_000 + KEY_REQUEST_TTL_SECS));
        assert_eq!(body["app_fid"], json!(4242));
        assert!(body["signature"].as_str().unwrap().starts_with("0x"));
    }

    #[test]
    fn missing_configuration_is_reported() {
        let config = Config::default();
        let neynar: Arc<dyn UpstreamApi> = Arc::new(Recorder::default());
        match SignerManager::from_config(&config, Some(neynar)) {
            Err(AppError::Config(msg)) => assert!(msg.contains("APP_FID")),
            other => panic!("expected config error, got {:?}", other.err()),
        }
    }
}
