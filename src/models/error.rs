use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde_json::json;
use serde_json::Value;

#[derive(Debug)]
pub struct Error {
    pub code: StatusCode,
    pub body: Json<Value>,
    pub retry_after: Option<u64>,
}

impl Error {
    pub fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            body: Json(json!({"error": message})),
            retry_after: None,
        }
    }

    /// Error carrying a JSON body of the caller's choosing.
    pub fn with_body(code: StatusCode, body: Value) -> Self {
        Self {
            code,
            body: Json(body),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            code: StatusCode::TOO_MANY_REQUESTS,
            body: Json(json!({
                "success": false,
                "error": "Rate limit exceeded",
                "retryAfter": retry_after_secs,
            })),
            retry_after: Some(retry_after_secs),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let mut response = (self.code, self.body).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<(StatusCode, &str)> for Error {
    fn from((code, msg): (StatusCode, &str)) -> Self {
        Self::new(code, msg)
    }
}
