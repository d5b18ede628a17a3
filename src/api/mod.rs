//! HTTP surface. Handlers validate, resolve identity, then hand off to the
//! publisher, signer manager, proxy gateway or a store.

mod casts;
mod curated;
mod feed;
mod session;
mod signer;
mod upload;

use axum::extract::rejection::JsonRejection;
use axum::extract::DefaultBodyLimit;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{CustodyResolver, IdentityProvider, PrivyIdentity, RpcCustodyResolver, SiwfVerifier};
use crate::config::{Config, Environment};
use crate::curated::{CuratedListStore, PgCuratedLists};
use crate::db;
use crate::error::{AppError, ValidationError};
use crate::hub::{HttpHub, HubClient};
use crate::images::{ImageHost, ImgbbHost};
use crate::metrics;
use crate::proxy::ProxyGateway;
use crate::publisher::{HostedPublisher, HubPublisher};
use crate::search_policy::PinnedAccountPolicy;
use crate::signer::SignerManager;
use crate::upstream::{HttpUpstream, UpstreamApi};

/// Multipart framing on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Handles to every external system. Optional entries are integrations that
/// may be left unconfigured; their routes then answer `config_error`.
pub struct Services {
    pub neynar: Option<Arc<dyn UpstreamApi>>,
    pub hub: Arc<dyn HubClient>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub custody: Arc<dyn CustodyResolver>,
    pub curated: Option<Arc<dyn CuratedListStore>>,
    pub images: Option<Arc<dyn ImageHost>>,
    pub curation: Option<Arc<dyn UpstreamApi>>,
}

impl Services {
    /// Production wiring from configuration. Only a failing database
    /// connection is fatal.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let timeout = config.http_timeout;

        let neynar: Option<Arc<dyn UpstreamApi>> = match &config.neynar_api_key {
            Some(key) => Some(Arc::new(HttpUpstream::neynar(&config.neynar_api_url, key, timeout)?)),
            None => None,
        };
        let identity: Option<Arc<dyn IdentityProvider>> = match &config.privy_app_id {
            Some(app_id) => Some(Arc::new(PrivyIdentity::new(&config.privy_api_url, app_id, timeout)?)),
            None => None,
        };
        let curated: Option<Arc<dyn CuratedListStore>> = match &config.database_url {
            Some(url) => Some(Arc::new(PgCuratedLists::new(db::init_db_pool(url).await?))),
            None => None,
        };
        let images: Option<Arc<dyn ImageHost>> = match &config.imgbb_api_key {
            Some(key) => Some(Arc::new(ImgbbHost::new(key.clone(), timeout)?)),
            None => None,
        };
        let curation: Option<Arc<dyn UpstreamApi>> = match &config.curation_service_url {
            Some(url) => Some(Arc::new(HttpUpstream::new("curation", url, timeout)?)),
            None => None,
        };

        Ok(Self {
            neynar,
            hub: Arc::new(HttpHub::new(&config.hub_url, config.hub_api_key.clone(), timeout)?),
            identity,
            custody: Arc::new(RpcCustodyResolver::new(&config.optimism_rpc_url, timeout)?),
            curated,
            images,
            curation,
        })
    }
}

pub struct ApiState {
    pub environment: Environment,
    pub neynar: Option<Arc<dyn UpstreamApi>>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub proxy: Option<ProxyGateway>,
    pub hosted: Option<HostedPublisher>,
    pub hub: HubPublisher,
    pub signers: Option<SignerManager>,
    pub siwf: SiwfVerifier,
    pub curated: Option<Arc<dyn CuratedListStore>>,
    pub images: Option<Arc<dyn ImageHost>>,
    pub curation: Option<Arc<dyn UpstreamApi>>,
    pub bot_signer_uuid: Option<Uuid>,
    pub max_upload_bytes: usize,
}

impl ApiState {
    pub fn new(config: &Config, services: Services) -> Self {
        let signers = match SignerManager::from_config(config, services.neynar.clone()) {
            Ok(manager) => {
                info!(app_fid = %manager.app_fid(), "signer registration enabled");
                Some(manager)
            }
            Err(e) => {
                error!(error = %e, "signer registration disabled");
                None
            }
        };
        for (name, enabled) in [
            ("neynar", services.neynar.is_some()),
            ("privy", services.identity.is_some()),
            ("curated lists", services.curated.is_some()),
            ("image upload", services.images.is_some()),
            ("curation", services.curation.is_some()),
        ] {
            if !enabled {
                info!(integration = name, "integration not configured, its routes are disabled");
            }
        }

        let pinned = config
            .pinned_search_username
            .as_deref()
            .and_then(PinnedAccountPolicy::new);

        Self {
            environment: config.environment,
            proxy: services
                .neynar
                .clone()
                .map(|neynar| ProxyGateway::new(neynar, pinned)),
            hosted: services.neynar.clone().map(HostedPublisher::new),
            neynar: services.neynar,
            identity: services.identity,
            hub: HubPublisher::new(services.hub),
            signers,
            siwf: SiwfVerifier::new(services.custody, config.environment),
            curated: services.curated,
            images: services.images,
            curation: services.curation,
            bot_signer_uuid: config.bot_signer_uuid,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    fn neynar(&self) -> Result<&dyn UpstreamApi, AppError> {
        self.neynar
            .as_deref()
            .ok_or_else(|| AppError::Config("NEYNAR_API_KEY is not set".to_string()))
    }

    fn proxy(&self) -> Result<&ProxyGateway, AppError> {
        self.proxy
            .as_ref()
            .ok_or_else(|| AppError::Config("NEYNAR_API_KEY is not set".to_string()))
    }

    fn hosted(&self) -> Result<&HostedPublisher, AppError> {
        self.hosted
            .as_ref()
            .ok_or_else(|| AppError::Config("NEYNAR_API_KEY is not set".to_string()))
    }

    fn identity(&self) -> Result<&dyn IdentityProvider, AppError> {
        self.identity
            .as_deref()
            .ok_or_else(|| AppError::Config("PRIVY_APP_ID is not set".to_string()))
    }

    fn signers(&self) -> Result<&SignerManager, AppError> {
        self.signers.as_ref().ok_or_else(|| {
            AppError::Config("signer registration needs NEYNAR_API_KEY, APP_FID and APP_MNEMONIC".to_string())
        })
    }

    fn curated(&self) -> Result<&dyn CuratedListStore, AppError> {
        self.curated
            .as_deref()
            .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))
    }

    fn images(&self) -> Result<&dyn ImageHost, AppError> {
        self.images
            .as_deref()
            .ok_or_else(|| AppError::Config("IMGBB_API_KEY is not set".to_string()))
    }

    fn curation(&self) -> Result<&dyn UpstreamApi, AppError> {
        self.curation
            .as_deref()
            .ok_or_else(|| AppError::Config("CURATION_SERVICE_URL is not set".to_string()))
    }
}

pub fn create_api_router(state: Arc<ApiState>) -> Router {
    let upload_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/session", post(session::session))
        .route("/siwf", post(session::siwf))
        .route("/feed", get(feed::feed))
        .route("/channels", get(feed::channels))
        .route("/friends", get(feed::friends))
        .route("/profile", get(feed::profile))
        .route("/trending", get(feed::trending))
        .route("/search-users", get(feed::search_users))
        .route("/compose", post(casts::compose))
        .route("/privy-compose", post(casts::privy_compose))
        .route("/reply", post(casts::reply))
        .route("/like", post(casts::like).delete(casts::unlike))
        .route("/recast", post(casts::recast).delete(casts::unrecast))
        .route("/signer", post(signer::create).get(signer::status))
        .route("/signer/webhook", post(signer::webhook))
        .route(
            "/upload-image",
            post(upload::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/curated-lists/:id/items",
            get(curated::list_items)
                .post(curated::add_item)
                .delete(curated::remove_item),
        )
        .route(
            "/curation",
            get(curated::forward_preferences)
                .post(curated::forward_preferences)
                .put(curated::forward_preferences)
                .delete(curated::forward_preferences),
        )
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(upload_limit))
        .layer(CorsLayer::permissive().max_age(Duration::from_secs(3600)))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn metrics_endpoint() -> impl IntoResponse {
    metrics::metrics_handler()
}

/// Unwraps a JSON body, reporting a malformed one as a validation error.
pub(crate) fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    match payload {
        Ok(Json(body @ Value::Object(_))) => Ok(body),
        Ok(_) => Err(ValidationError::new("body", "Request body must be a JSON object").into()),
        Err(rejection) => Err(ValidationError::new("body", rejection.body_text()).into()),
    }
}

/// Lifts query-string pairs into a JSON object so the body validators apply.
pub(crate) fn query_params(query: HashMap<String, String>) -> Value {
    Value::Object(
        query
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<String, Value>>(),
    )
}
