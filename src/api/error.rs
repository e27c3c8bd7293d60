//! HTTP error responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// API errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    NotFound(String),
    Engine(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::NotFound(msg) => Self::NotFound(msg),
            other => Self::Engine(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let status = self.status();
        let error = match self {
            Self::BadRequest(msg) => msg.to_string(),
            Self::NotFound(msg) | Self::Engine(msg) => msg,
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}
