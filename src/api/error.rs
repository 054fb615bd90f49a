use thiserror::Error;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

/// Why a fetch against the statistics API failed.
#[derive(Error, Debug)]
pub enum FetchError {
  #[error("Network error: {0}")]
  Network(String),

  #[error("Server returned {status}: {message}")]
  Status { status: u16, message: String },

  #[error("Invalid JSON in response: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("Expected a JSON array of rows, got {0}")]
  Shape(&'static str),
}

impl FetchError {
  /// Build a status error, preferring the API's `{ "error": ... }` message.
  pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
    let message = serde_json::from_str::<serde_json::Value>(body)
      .ok()
      .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
      .unwrap_or_else(|| truncate_body(body));

    FetchError::Status {
      status: status.as_u16(),
      message,
    }
  }

  /// Shape errors are recovered by showing an empty table.
  pub fn is_shape(&self) -> bool {
    matches!(self, FetchError::Shape(_))
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    FetchError::Network(e.to_string())
  }
}

/// Name of a JSON value's type, for shape errors.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
  match value {
    serde_json::Value::Null => "null",
    serde_json::Value::Bool(_) => "a boolean",
    serde_json::Value::Number(_) => "a number",
    serde_json::Value::String(_) => "a string",
    serde_json::Value::Array(_) => "an array",
    serde_json::Value::Object(_) => "an object",
  }
}

fn truncate_body(body: &str) -> String {
  if body.len() <= MAX_ERROR_BODY_LENGTH {
    body.to_string()
  } else {
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!("{}... ({} bytes)", &body[..end], body.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_uses_api_error_message() {
    let err = FetchError::from_status(
      reqwest::StatusCode::INTERNAL_SERVER_ERROR,
      r#"{"error":"Failed to fetch speed data"}"#,
    );
    assert_eq!(
      err.to_string(),
      "Server returned 500: Failed to fetch speed data"
    );
  }

  #[test]
  fn test_from_status_truncates_plain_bodies() {
    let body = "x".repeat(1000);
    match FetchError::from_status(reqwest::StatusCode::BAD_GATEWAY, &body) {
      FetchError::Status { status, message } => {
        assert_eq!(status, 502);
        assert!(message.ends_with("(1000 bytes)"));
        assert!(message.len() < 400);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn test_shape_errors_are_flagged() {
    assert!(FetchError::Shape("an object").is_shape());
    assert!(!FetchError::Network("down".into()).is_shape());
  }
}
