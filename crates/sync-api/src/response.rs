use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use sync_core::Error;

/// Outcome code carried in every response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Success,
    NotFound,
    BadRequest,
    Conflict,
    Timeout,
    JobFailed,
    InternalError,
}

impl ResponseCode {
    pub fn status(self) -> StatusCode {
        match self {
            ResponseCode::Success => StatusCode::OK,
            ResponseCode::NotFound => StatusCode::NOT_FOUND,
            ResponseCode::BadRequest => StatusCode::BAD_REQUEST,
            ResponseCode::Conflict => StatusCode::CONFLICT,
            ResponseCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ResponseCode::JobFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ResponseCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Code for a sync error
    pub fn for_error(error: &Error) -> Self {
        match error {
            Error::Parse(_) | Error::Validation(_) | Error::Serialization(_) => {
                ResponseCode::BadRequest
            }
            Error::NotFound(_) => ResponseCode::NotFound,
            // Wrong trigger policy for the request
            Error::Configuration(_) => ResponseCode::Conflict,
            Error::StillRunning { .. } | Error::NotConverged { .. } => ResponseCode::Timeout,
            Error::JobFailed(_) => ResponseCode::JobFailed,
            _ => ResponseCode::InternalError,
        }
    }
}

/// JSON envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub message: String,
    pub code: ResponseCode,
    pub errors: Vec<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            message: message.into(),
            code: ResponseCode::Success,
            errors: Vec::new(),
        }
    }

    pub fn failure(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: message.into(),
            code,
            errors: Vec::new(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self::failure(ResponseCode::NotFound, format!("{} not found", resource))
    }

    /// Failure response for `error`, prefixed with what was being attempted.
    /// A failed job lists each record failure under `errors`.
    pub fn from_error(context: &str, error: &Error) -> Self {
        let mut response = Self::failure(
            ResponseCode::for_error(error),
            format!("{}: {}", context, error),
        );
        if let Error::JobFailed(result) = error {
            response.errors = result
                .failures
                .iter()
                .map(|f| format!("#{} {}: {}", f.index, f.adapter, f.reason))
                .collect();
        }
        response
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        (self.code.status(), Json(self)).into_response()
    }
}
