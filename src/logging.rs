use std::env;
use tracing_subscriber::{fmt, EnvFilter};

pub fn setup_logging() {
    // Check for a LOG_LEVEL environment variable, defaulting to INFO
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("homiehouse={}", log_level))
            // Upstream bodies can be large, keep the transport quiet unless asked
            .add_directive("homiehouse::upstream=warn".parse().unwrap())
            .add_directive("homiehouse::api=info".parse().unwrap())
            .add_directive("homiehouse::publisher=info".parse().unwrap())
            // Reduce noise from third-party libraries
            .add_directive("tower_http=info".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    tracing::info!("Logging initialized at custom levels");
}

const VISIBLE_PREFIX: usize = 6;

/// Shortens a sensitive value (signer UUID, token, key, signature) for logging.
pub fn redact(value: &str) -> String {
    let visible: String = value.chars().take(VISIBLE_PREFIX).collect();
    if visible.len() == value.len() {
        "…".to_string()
    } else {
        format!("{}…", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_keeps_only_a_prefix() {
        assert_eq!(
            redact("0a1b2c3d-aaaa-bbbb-cccc-000000000000"),
            "0a1b2c…"
        );
        assert_eq!(redact("0xdeadbeefcafe"), "0xdead…");
    }

    #[test]
    fn redact_hides_short_values_entirely() {
        assert_eq!(redact("abc"), "…");
        assert_eq!(redact(""), "…");
    }
}
