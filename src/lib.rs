pub mod api;
pub mod auth;
pub mod config;
pub mod curated;
pub mod db;
pub mod error;
pub mod hub;
pub mod images;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod proxy;
pub mod publisher;
pub mod search_policy;
pub mod signer;
pub mod upstream;
pub mod validate;
