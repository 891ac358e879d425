//! Shared HTTP plumbing for provider clients.

use reqwest::{Response, StatusCode};

use crate::error::ProviderError;

pub(crate) const USER_AGENT: &str = "roastbooth-rust/1.0";

/// Classifies a transport-level failure (no response received).
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(e.to_string())
}

/// Classifies a non-success HTTP status.
pub(crate) fn status_error(status: StatusCode, body: &str) -> ProviderError {
    let message = error_message(body);
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return ProviderError::Unavailable(format!("HTTP {}: {}", status.as_u16(), message));
    }
    ProviderError::Rejected {
        status: status.as_u16(),
        message,
    }
}

/// Returns the response unchanged if its status is a success, otherwise
/// consumes the body into a classified error.
pub(crate) async fn check_status(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

/// Pulls a human-readable message out of common JSON error shapes
/// (`{"error": {"message": ..}}`, `{"detail": {"message": ..}}`,
/// `{"error": ".."}`), falling back to the raw body.
fn error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        for ptr in ["/error/message", "/detail/message", "/error", "/detail", "/message"] {
            if let Some(s) = v.pointer(ptr).and_then(|m| m.as_str()) {
                return s.to_string();
            }
        }
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_unavailable() {
        for code in [500, 502, 503, 429, 408] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(
                matches!(status_error(status, ""), ProviderError::Unavailable(_)),
                "status {code}"
            );
        }
    }

    #[test]
    fn client_errors_are_rejected() {
        let err = status_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error": {"message": "invalid api key", "type": "auth"}}"#,
        );
        assert_eq!(
            err,
            ProviderError::Rejected {
                status: 401,
                message: "invalid api key".into()
            }
        );
    }

    #[test]
    fn error_message_shapes() {
        assert_eq!(error_message(r#"{"detail": {"message": "quota"}}"#), "quota");
        assert_eq!(error_message(r#"{"error": "nope"}"#), "nope");
        assert_eq!(error_message(" plain text \n"), "plain text");
    }
}
