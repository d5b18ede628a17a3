//! Input validation. Pure functions over raw JSON values; no I/O.
//!
//! Query-string parameters are lifted into `Value::String` by the handlers so
//! that body and query inputs share the same rules.

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::{CastHash, Fid};

/// Farcaster's maximum cast text length, in UTF-8 bytes.
pub const MAX_CAST_BYTES: usize = 320;

/// Farcaster's maximum number of embeds per cast.
pub const MAX_EMBEDS: usize = 2;

pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

pub const TIME_WINDOWS: &[&str] = &["1h", "6h", "12h", "24h", "7d"];

/// Absent, null or whitespace-only.
pub fn is_blank(raw: Option<&Value>) -> bool {
    match raw {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_positive_integer(raw: &Value) -> Option<u64> {
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
}

pub fn fid(field: &'static str, raw: Option<&Value>) -> Result<Fid, ValidationError> {
    optional_fid(field, raw)?.ok_or_else(|| ValidationError::new(field, "FID is required"))
}

pub fn optional_fid(field: &'static str, raw: Option<&Value>) -> Result<Option<Fid>, ValidationError> {
    if is_blank(raw) {
        return Ok(None);
    }
    raw.and_then(as_positive_integer)
        .map(|n| Some(Fid(n)))
        .ok_or_else(|| ValidationError::new(field, "FID must be a positive integer"))
}

/// Never fails: anything unusable falls back to `default`.
pub fn limit(raw: Option<&Value>, default: u32, max: u32) -> u32 {
    raw.and_then(as_positive_integer)
        .map(|n| n.min(max as u64) as u32)
        .unwrap_or(default)
}

pub fn cast_text(raw: Option<&Value>) -> Result<String, ValidationError> {
    let text = match raw {
        Some(Value::String(s)) => s,
        None | Some(Value::Null) => return Err(ValidationError::new("text", "Text is required")),
        Some(_) => return Err(ValidationError::new("text", "Text must be a string")),
    };
    if text.trim().is_empty() {
        return Err(ValidationError::new("text", "Text is required"));
    }
    if text.len() > MAX_CAST_BYTES {
        return Err(ValidationError::new(
            "text",
            format!("Text exceeds {} bytes", MAX_CAST_BYTES),
        ));
    }
    Ok(text.clone())
}

pub fn cast_hash(field: &'static str, raw: Option<&Value>) -> Result<CastHash, ValidationError> {
    let value = match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
        _ => return Err(ValidationError::new(field, "Cast hash is required")),
    };
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::new(field, "Cast hash must be 20 bytes of hex"));
    }
    Ok(CastHash::from_normalized(format!(
        "0x{}",
        digits.to_ascii_lowercase()
    )))
}

pub fn uuid(field: &'static str, raw: Option<&Value>) -> Result<Uuid, ValidationError> {
    match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => Uuid::parse_str(s.trim())
            .map_err(|_| ValidationError::new(field, "Must be a valid UUID")),
        _ => Err(ValidationError::new(field, "UUID is required")),
    }
}

fn http_url(field: &'static str, value: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(value.trim())
        .map_err(|_| ValidationError::new(field, format!("Invalid URL: {}", value)))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(ValidationError::new(field, format!("Invalid URL: {}", value))),
    }
}

pub fn optional_url(field: &'static str, raw: Option<&Value>) -> Result<Option<Url>, ValidationError> {
    match raw {
        _ if is_blank(raw) => Ok(None),
        Some(Value::String(s)) => http_url(field, s).map(Some),
        _ => Err(ValidationError::new(field, "Must be a URL string")),
    }
}

/// Accepts `["https://…"]` or `[{"url": "https://…"}]`.
pub fn embeds(raw: Option<&Value>) -> Result<Vec<Url>, ValidationError> {
    let entries = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(ValidationError::new("embeds", "Embeds must be an array")),
    };
    if entries.len() > MAX_EMBEDS {
        return Err(ValidationError::new(
            "embeds",
            format!("At most {} embeds are allowed", MAX_EMBEDS),
        ));
    }
    entries
        .iter()
        .map(|entry| match entry {
            Value::String(s) => http_url("embeds", s),
            Value::Object(obj) => match obj.get("url") {
                Some(Value::String(s)) => http_url("embeds", s),
                _ => Err(ValidationError::new("embeds", "Embed object needs a url")),
            },
            _ => Err(ValidationError::new("embeds", "Embed must be a URL")),
        })
        .collect()
}

pub fn search_query(raw: Option<&Value>) -> Result<String, ValidationError> {
    match raw {
        Some(Value::String(s)) if s.trim().chars().count() >= 2 => Ok(s.trim().to_string()),
        _ => Err(ValidationError::new(
            "q",
            "Query must be at least 2 characters",
        )),
    }
}

pub fn time_window(raw: Option<&Value>) -> Result<&'static str, ValidationError> {
    match raw {
        _ if is_blank(raw) => Ok("24h"),
        Some(Value::String(s)) => TIME_WINDOWS
            .iter()
            .copied()
            .find(|w| *w == s.trim())
            .ok_or_else(|| ValidationError::new("time_window", "Unsupported time window")),
        _ => Err(ValidationError::new("time_window", "Unsupported time window")),
    }
}

/// Optional free-text field with an upper bound.
pub fn optional_text(
    field: &'static str,
    raw: Option<&Value>,
    max_chars: usize,
) -> Result<Option<String>, ValidationError> {
    match raw {
        _ if is_blank(raw) => Ok(None),
        Some(Value::String(s)) if s.chars().count() <= max_chars => Ok(Some(s.clone())),
        Some(Value::String(_)) => Err(ValidationError::new(
            field,
            format!("Must be at most {} characters", max_chars),
        )),
        _ => Err(ValidationError::new(field, "Must be a string")),
    }
}

/// RFC 3339 timestamp, optional.
pub fn optional_timestamp(
    field: &'static str,
    raw: Option<&Value>,
) -> Result<Option<OffsetDateTime>, ValidationError> {
    match raw {
        _ if is_blank(raw) => Ok(None),
        Some(Value::String(s)) => OffsetDateTime::parse(s.trim(), &Rfc3339)
            .map(Some)
            .map_err(|_| ValidationError::new(field, "Must be an RFC 3339 timestamp")),
        _ => Err(ValidationError::new(field, "Must be an RFC 3339 timestamp")),
    }
}

/// Boolean query flag: `true`/`1`/`yes`, or a JSON `true`.
pub fn flag(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub fn image_file(
    file: Option<&UploadedFile>,
    max_bytes: usize,
) -> Result<&UploadedFile, ValidationError> {
    let file = file
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| ValidationError::new("image", "No image file provided"))?;
    let content_type = file.content_type.as_deref().unwrap_or_default();
    if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
        return Err(ValidationError::new(
            "image",
            format!("Unsupported image type: {}", content_type),
        ));
    }
    if file.bytes.len() > max_bytes {
        return Err(ValidationError::new(
            "image",
            format!("Image exceeds {} bytes", max_bytes),
        ));
    }
    Ok(file)
}
