use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::Secret;
use crate::error::AppError;
use crate::metrics;
use crate::upstream::{http_client, read_json, transport_error};

const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedImage {
    pub url: String,
    pub delete_url: Option<String>,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, bytes: &[u8], file_name: Option<&str>) -> Result<HostedImage, AppError>;
}

pub struct ImgbbHost {
    http_client: HttpClient,
    upload_url: String,
    api_key: Secret,
}

impl ImgbbHost {
    pub fn new(api_key: Secret, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            upload_url: IMGBB_UPLOAD_URL.to_string(),
            api_key,
        })
    }
}

/// Reads `data.url` and `data.delete_url` from an imgbb response.
pub fn hosted_image(body: &Value) -> Option<HostedImage> {
    let data = body.get("data")?;
    Some(HostedImage {
        url: data.get("url")?.as_str()?.to_string(),
        delete_url: data
            .get("delete_url")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[async_trait]
impl ImageHost for ImgbbHost {
    async fn upload(&self, bytes: &[u8], file_name: Option<&str>) -> Result<HostedImage, AppError> {
        let mut form = vec![("image", STANDARD.encode(bytes))];
        if let Some(name) = file_name {
            form.push(("name", name.to_string()));
        }

        let timer = Instant::now();
        let response = self
            .http_client
            .post(&self.upload_url)
            .query(&[("key", self.api_key.expose())])
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error("imgbb", e))?;
        metrics::UPSTREAM_LATENCY
            .with_label_values(&["imgbb"])
            .observe(timer.elapsed().as_secs_f64());

        let body = read_json("imgbb", response).await?;
        let image = hosted_image(&body).ok_or_else(|| AppError::upstream("imgbb", 502, body.clone()))?;
        info!(url = %image.url, size = bytes.len(), "image uploaded");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_upload_response() {
        let body = json!({
            "data": {
                "url": "https://i.ibb.co/abc/cat.png",
                "delete_url": "https://ibb.co/abc/deadbeef"
            },
            "success": true,
            "status": 200
        });
        let image = hosted_image(&body).unwrap();
        assert_eq!(image.url, "https://i.ibb.co/abc/cat.png");
        assert_eq!(image.delete_url.as_deref(), Some("https://ibb.co/abc/deadbeef"));

        assert!(hosted_image(&json!({"success": false})).is_none());
    }

    #[tokio::test]
    async fn unreachable_host_does_not_echo_the_api_key() {
        let host = ImgbbHost {
            upload_url: "http://127.0.0.1:1/1/upload".to_string(),
            ..ImgbbHost::new(Secret::new("SUPER_SECRET_IMGBB_KEY"), Duration::from_secs(2)).unwrap()
        };

        let err = host.upload(b"\x89PNG", Some("cat.png")).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 502);
        match err {
            AppError::Upstream { details, .. } => {
                assert!(!details.to_string().contains("SUPER_SECRET_IMGBB_KEY"));
                assert_eq!(details, json!("connection failed"));
            }
            other => panic!("expected an upstream error, got {:?}", other),
        }
    }
}
