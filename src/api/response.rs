use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::CronmanError;

/// The wire envelope every endpoint replies with. Bodies are tab-indented
/// pretty JSON for parity with the original service.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub status: String,
    pub data: serde_json::Value,
    pub error: String,
}

impl Envelope {
    pub fn ok<T: Serialize>(data: T) -> (StatusCode, Self) {
        (
            StatusCode::OK,
            Self {
                status: "OK".to_string(),
                data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
                error: String::new(),
            },
        )
    }

    pub fn error(err: &CronmanError) -> (StatusCode, Self) {
        let (code, status) = match err {
            CronmanError::BadRequest(_)
            | CronmanError::BadCron { .. }
            | CronmanError::JobNotFound(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            CronmanError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };
        (
            code,
            Self {
                status: status.to_string(),
                data: serde_json::Value::Null,
                error: err.to_string(),
            },
        )
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        match to_tab_json(&self) {
            Ok(body) => (
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode response");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode response").into_response()
            }
        }
    }
}

/// Serialize with tab indentation and a trailing newline.
fn to_tab_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_has_empty_error() {
        let (code, envelope) = Envelope::ok("payload");
        assert_eq!(code, StatusCode::OK);
        assert_eq!(envelope.status, "OK");
        assert!(envelope.error.is_empty());
    }

    #[test]
    fn not_found_maps_to_bad_request() {
        let err = CronmanError::JobNotFound("abc".to_string());
        let (code, envelope) = Envelope::error(&err);
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(envelope.status, "Bad Request");
        assert!(envelope.error.contains("abc"));
    }

    #[test]
    fn unavailable_maps_to_503() {
        let (code, envelope) = Envelope::error(&CronmanError::Unavailable);
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(envelope.status, "Service Unavailable");
    }

    #[test]
    fn bodies_are_tab_indented() {
        let body = to_tab_json(&serde_json::json!({"k": "v"})).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("{\n\t\"k\""));
        assert!(text.ends_with("\n"));
    }
}
