use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use super::ApiState;
use crate::error::{AppError, ValidationError};
use crate::validate::{self, UploadedFile};

const FILE_FIELDS: &[&str] = &["image", "file"];

pub async fn upload_image(
    State(state): State<Arc<ApiState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ValidationError::new("image", e.body_text()))?
    {
        if !field.name().is_some_and(|name| FILE_FIELDS.contains(&name)) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ValidationError::new("image", e.body_text()))?;
        upload = Some(UploadedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let file = validate::image_file(upload.as_ref(), state.max_upload_bytes)?;
    let image = state
        .images()?
        .upload(&file.bytes, file.file_name.as_deref())
        .await?;
    Ok(Json(json!({
        "ok": true,
        "url": image.url,
        "deleteUrl": image.delete_url,
    })))
}
