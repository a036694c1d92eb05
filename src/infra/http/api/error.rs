use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use voicegen_api_types::{ApiErrorBody, ApiErrorMessage};

use crate::application::error::ErrorReport;
use crate::application::jobs::DispatchError;
use crate::application::repos::StatusRepoError;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNKNOWN_JOB: &str = "unknown_job";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const UNSUPPORTED_MEDIA_TYPE: &str = "unsupported_media_type";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    pub fn internal(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Internal error",
            Some(hint.into()),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map a body extraction failure, keeping the status axum chose for it.
    pub fn from_rejection(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        let hint = Some(rejection.body_text());
        match status {
            StatusCode::PAYLOAD_TOO_LARGE => Self::new(
                status,
                codes::PAYLOAD_TOO_LARGE,
                "Request body too large",
                hint,
            ),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => Self::new(
                status,
                codes::UNSUPPORTED_MEDIA_TYPE,
                "Expected a JSON request body",
                hint,
            ),
            _ => Self::bad_request("Malformed request body", hint),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(message) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Invalid input",
                Some(message),
            ),
            DispatchError::NotFound(id) => {
                Self::not_found("Job not found", Some(format!("no job with id `{id}`")))
            }
            DispatchError::UnknownJob(id) => Self::new(
                StatusCode::NOT_FOUND,
                codes::UNKNOWN_JOB,
                "Unknown job",
                Some(format!("no job with id `{id}` was ever queued")),
            ),
            DispatchError::Repo(StatusRepoError::Duplicate(id)) => Self::new(
                StatusCode::CONFLICT,
                codes::DUPLICATE,
                "Job id collision",
                Some(format!("`{id}` is already tracked")),
            ),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}
