//! Error responses
//!
//! Caller faults go back as 400 with their message. Server faults go back
//! as 500 with a generic body and are logged in full.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use minemap_core::Error;
use serde_json::json;

const INTERNAL: &str = "Internal Server Error";

#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = if self.0.is_client_error() {
            (StatusCode::BAD_REQUEST, self.0.to_string())
        } else {
            tracing::error!(error = %self.0, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string())
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
