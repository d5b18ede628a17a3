//! Sign-In-With-Farcaster verification.
//!
//! The client signs an EIP-4361 message with the account's custody address.
//! Verification fails closed: the message must parse, name this domain and
//! nonce, carry a valid signature from the stated address, and that address
//! must hold custody of the FID named in the message resources.

use alloy::primitives::{address, Address, Signature, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::Environment;
use crate::error::AppError;
use crate::logging::redact;
use crate::metrics;
use crate::models::Fid;
use crate::upstream::{http_client, read_json, transport_error};

/// Farcaster IdRegistry on OP mainnet.
pub const ID_REGISTRY: Address = address!("00000000Fc6c5F01Fc30151999387Bb99A9f489b");

/// Accepted only when running in development.
pub const DEV_BYPASS_SIGNATURE: &str = "dev-bypass-signature";

const SIWF_CHAIN_ID: u64 = 10;
const FID_RESOURCE_PREFIX: &str = "farcaster://fid/";
const PREAMBLE_SUFFIX: &str = " wants you to sign in with your Ethereum account:";

sol! {
    function custodyOf(uint256 fid) external view returns (address owner);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SiwfError {
    #[error("malformed sign-in message: {0}")]
    Malformed(&'static str),
    #[error("domain mismatch")]
    DomainMismatch,
    #[error("nonce mismatch")]
    NonceMismatch,
    #[error("unsupported chain or version")]
    Unsupported,
    #[error("message expired or not yet valid")]
    Expired,
    #[error("invalid signature")]
    BadSignature,
    #[error("message names no fid")]
    MissingFid,
    #[error("signer does not hold custody of the fid")]
    NotCustody,
    #[error("custody lookup failed")]
    CustodyLookup,
}

impl SiwfError {
    fn reason(&self) -> &'static str {
        match self {
            SiwfError::Malformed(_) => "malformed",
            SiwfError::DomainMismatch => "domain",
            SiwfError::NonceMismatch => "nonce",
            SiwfError::Unsupported => "unsupported",
            SiwfError::Expired => "expired",
            SiwfError::BadSignature => "signature",
            SiwfError::MissingFid => "fid",
            SiwfError::NotCustody => "custody",
            SiwfError::CustodyLookup => "custody_lookup",
        }
    }
}

/// The parts of an EIP-4361 message that verification looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInMessage {
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<FixedOffset>,
    pub expiration_time: Option<DateTime<FixedOffset>>,
    pub not_before: Option<DateTime<FixedOffset>>,
    pub resources: Vec<String>,
}

impl SignInMessage {
    pub fn parse(raw: &str) -> Result<Self, SiwfError> {
        let mut lines = raw.lines();
        let domain = lines
            .next()
            .and_then(|l| l.strip_suffix(PREAMBLE_SUFFIX))
            .ok_or(SiwfError::Malformed("preamble"))?
            .trim()
            .to_string();
        let address = lines
            .next()
            .and_then(|l| Address::from_str(l.trim()).ok())
            .ok_or(SiwfError::Malformed("address"))?;

        let mut statement = None;
        let mut uri = None;
        let mut version = None;
        let mut chain_id = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expiration_time = None;
        let mut not_before = None;
        let mut resources = Vec::new();
        let mut in_resources = false;

        for line in lines {
            if in_resources {
                if let Some(resource) = line.strip_prefix("- ") {
                    resources.push(resource.trim().to_string());
                    continue;
                }
                in_resources = false;
            }
            if line.trim().is_empty() {
                continue;
            }
            match line.split_once(": ") {
                Some(("URI", v)) => uri = Some(v.trim().to_string()),
                Some(("Version", v)) => version = Some(v.trim().to_string()),
                Some(("Chain ID", v)) => {
                    chain_id = Some(v.trim().parse().map_err(|_| SiwfError::Malformed("chain id"))?)
                }
                Some(("Nonce", v)) => nonce = Some(v.trim().to_string()),
                Some(("Issued At", v)) => issued_at = Some(parse_time(v, "issued at")?),
                Some(("Expiration Time", v)) => expiration_time = Some(parse_time(v, "expiration")?),
                Some(("Not Before", v)) => not_before = Some(parse_time(v, "not before")?),
                Some(("Request ID", _)) => {}
                _ if line.trim() == "Resources:" => in_resources = true,
                _ if uri.is_none() && statement.is_none() => statement = Some(line.to_string()),
                _ => return Err(SiwfError::Malformed("unexpected line")),
            }
        }

        Ok(Self {
            domain,
            address,
            statement,
            uri: uri.ok_or(SiwfError::Malformed("uri"))?,
            version: version.ok_or(SiwfError::Malformed("version"))?,
            chain_id: chain_id.ok_or(SiwfError::Malformed("chain id"))?,
            nonce: nonce.ok_or(SiwfError::Malformed("nonce"))?,
            issued_at: issued_at.ok_or(SiwfError::Malformed("issued at"))?,
            expiration_time,
            not_before,
            resources,
        })
    }

    pub fn fid(&self) -> Option<Fid> {
        self.resources
            .iter()
            .find_map(|r| r.strip_prefix(FID_RESOURCE_PREFIX))
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .map(Fid)
    }
}

fn parse_time(value: &str, field: &'static str) -> Result<DateTime<FixedOffset>, SiwfError> {
    DateTime::parse_from_rfc3339(value.trim()).map_err(|_| SiwfError::Malformed(field))
}

/// Reduces a host or origin to a bare lowercase hostname:
/// `https://Localhost:3000/path` becomes `localhost`.
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim().to_ascii_lowercase();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&trimmed);
    let host = without_scheme.split('/').next().unwrap_or_default();
    if let Some(rest) = host.strip_prefix('[') {
        // IPv6 literal, the port follows the closing bracket
        return rest.split(']').next().unwrap_or_default().to_string();
    }
    host.split(':').next().unwrap_or_default().to_string()
}

/// Answers which address holds custody of an FID.
#[async_trait]
pub trait CustodyResolver: Send + Sync {
    async fn custody_address(&self, fid: Fid) -> Result<Address, AppError>;
}

/// Reads `IdRegistry.custodyOf(fid)` over JSON-RPC.
pub struct RpcCustodyResolver {
    http_client: HttpClient,
    rpc_url: String,
}

impl RpcCustodyResolver {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            rpc_url: rpc_url.to_string(),
        })
    }
}

pub fn custody_of_calldata(fid: Fid) -> String {
    let call = custodyOfCall {
        fid: U256::from(fid.get()),
    };
    format!("0x{}", hex::encode(call.abi_encode()))
}

/// The return value is one ABI word; the address is its last 20 bytes.
pub fn decode_address_word(result: &str) -> Option<Address> {
    let bytes = hex::decode(result.trim_start_matches("0x")).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(Address::from_slice(&bytes[12..]))
}

#[async_trait]
impl CustodyResolver for RpcCustodyResolver {
    async fn custody_address(&self, fid: Fid) -> Result<Address, AppError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": ID_REGISTRY.to_string(), "data": custody_of_calldata(fid) },
                "latest"
            ],
        });

        let timer = Instant::now();
        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error("rpc", e))?;
        metrics::UPSTREAM_LATENCY
            .with_label_values(&["rpc"])
            .observe(timer.elapsed().as_secs_f64());

        let body = read_json("rpc", response).await?;
        if let Some(error) = body.get("error") {
            return Err(AppError::upstream("rpc", 502, error.clone()));
        }
        body.get("result")
            .and_then(Value::as_str)
            .and_then(decode_address_word)
            .ok_or_else(|| AppError::upstream("rpc", 502, body.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct SiwfRequest {
    pub message: String,
    pub signature: String,
    pub nonce: String,
    /// Explicit domain, or the request's Host header.
    pub domain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiwfOutcome {
    Verified(Fid),
    DevBypass,
}

pub struct SiwfVerifier {
    custody: Arc<dyn CustodyResolver>,
    environment: Environment,
}

impl SiwfVerifier {
    pub fn new(custody: Arc<dyn CustodyResolver>, environment: Environment) -> Self {
        Self {
            custody,
            environment,
        }
    }

    /// Any failure, including an unreachable custody lookup, is reported
    /// as `Unauthorized`.
    pub async fn verify(&self, request: &SiwfRequest, now: DateTime<Utc>) -> Result<SiwfOutcome, AppError> {
        if self.environment.is_development() && request.signature == DEV_BYPASS_SIGNATURE {
            warn!("development sign-in bypass used");
            return Ok(SiwfOutcome::DevBypass);
        }

        match self.check(request, now).await {
            Ok(fid) => Ok(SiwfOutcome::Verified(fid)),
            Err(rejection) => {
                metrics::SIWF_REJECTIONS
                    .with_label_values(&[rejection.reason()])
                    .inc();
                debug!(
                    reason = rejection.reason(),
                    signature = %redact(&request.signature),
                    "sign-in rejected"
                );
                Err(AppError::Unauthorized)
            }
        }
    }

    async fn check(&self, request: &SiwfRequest, now: DateTime<Utc>) -> Result<Fid, SiwfError> {
        let message = SignInMessage::parse(&request.message)?;
        verify_claims(&message, request, now)?;

        let signature = parse_signature(&request.signature)?;
        let recovered = signature
            .recover_address_from_msg(request.message.as_bytes())
            .map_err(|_| SiwfError::BadSignature)?;
        if recovered != message.address {
            return Err(SiwfError::BadSignature);
        }

        let fid = message.fid().ok_or(SiwfError::MissingFid)?;
        let custody = self.custody.custody_address(fid).await.map_err(|e| {
            warn!(fid = %fid, error = %e, "custody lookup failed");
            SiwfError::CustodyLookup
        })?;
        if custody != recovered {
            return Err(SiwfError::NotCustody);
        }
        Ok(fid)
    }
}

fn verify_claims(
    message: &SignInMessage,
    request: &SiwfRequest,
    now: DateTime<Utc>,
) -> Result<(), SiwfError> {
    let expected = normalize_domain(&request.domain);
    if expected.is_empty() || normalize_domain(&message.domain) != expected {
        return Err(SiwfError::DomainMismatch);
    }
    if message.nonce != request.nonce {
        return Err(SiwfError::NonceMismatch);
    }
    if message.chain_id != SIWF_CHAIN_ID || message.version != "1" {
        return Err(SiwfError::Unsupported);
    }
    if message.expiration_time.is_some_and(|t| t <= now) {
        return Err(SiwfError::Expired);
    }
    if message.not_before.is_some_and(|t| t > now) {
        return Err(SiwfError::Expired);
    }
    Ok(())
}

fn parse_signature(raw: &str) -> Result<Signature, SiwfError> {
    let bytes = hex::decode(raw.trim().trim_start_matches("0x")).map_err(|_| SiwfError::BadSignature)?;
    Signature::try_from(bytes.as_slice()).map_err(|_| SiwfError::BadSignature)
}
