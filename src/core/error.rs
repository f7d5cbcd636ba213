/// Transport-level errors.
///
/// These are answered synchronously on the submission endpoint with HTTP 400
/// and never reach an SSE stream.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::core::server::ALLOW_ANY_ORIGIN;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Missing sessionId query parameter")]
    MissingSession,

    #[error("Unknown or expired session: {0}")]
    UnknownSession(String),

    #[error("Invalid JSON-RPC request body: {0}")]
    InvalidBody(String),
}

impl ResponseError for TransportError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ALLOW_ANY_ORIGIN)
            .json(serde_json::json!({
                "error": self.to_string()
            }))
    }
}
