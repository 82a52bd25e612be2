use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure should be followed by flag usage text.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Format an API error for display, extracting message from JSON if present.
///
/// Handles the two shapes Google returns:
/// - `"HTTP 403: {"error": {"message": "...", "status": "..."}}"` (REST APIs)
/// - `"HTTP 400: {"error": "invalid_grant", "error_description": "..."}"` (token endpoint)
/// - Plain text errors → returned as-is
#[must_use]
pub fn format_api_error(error: &str) -> String {
    if let Some(json_start) = error.find('{') {
        let json_str = &error[json_start..];

        if let Ok(json) = serde_json::from_str::<serde_json::Value>(json_str)
            && let Some(msg) = extract_error_message(&json)
        {
            let prefix = &error[..json_start].trim();
            if prefix.is_empty() {
                return msg;
            }
            return format!("{prefix} {msg}");
        }
    }

    error.to_string()
}

fn extract_error_message(json: &serde_json::Value) -> Option<String> {
    if let Some(error_obj) = json.get("error") {
        if let Some(msg) = error_obj.get("message").and_then(|v| v.as_str()) {
            let mut result = msg.to_string();
            if let Some(status) = error_obj.get("status").and_then(|v| v.as_str()) {
                result = format!("{result} (status: {status})");
            }
            return Some(result);
        }

        // OAuth token endpoint: {"error": "invalid_grant", "error_description": "..."}
        if let Some(code) = error_obj.as_str() {
            return Some(
                match json.get("error_description").and_then(|v| v.as_str()) {
                    Some(description) => format!("{code}: {description}"),
                    None => code.to_string(),
                },
            );
        }
    }

    if let Some(msg) = json.get("message").and_then(|v| v.as_str()) {
        return Some(msg.to_string());
    }

    None
}
