use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use voicegen_api_types::{
    AckStatus, CompletionAck, CompletionNotification, DeliveryState, GenerationRequest,
    HealthResponse, InvalidInputResponse, InvalidInputStatus, JobState, StatusResponse,
    SubmitResponse, SubmitStatus,
};

use crate::application::delivery::WorkerState;
use crate::application::error::ErrorReport;
use crate::application::jobs::DispatchError;
use crate::domain::types::{JobStatus, JobStatusRecord};

use super::error::ApiError;
use crate::infra::http::HttpState;

const SOURCE_GENERATE: &str = "infra::http::api::generate";

pub async fn generate(
    State(state): State<HttpState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let status = rejection.status();
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
                return invalid_input(rejection.body_text());
            }
            return ApiError::from_rejection(rejection).into_response();
        }
    };

    match state.dispatcher.submit(request.input).await {
        Ok(submission) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                status: SubmitStatus::Queued,
                job_id: submission.job_id.to_string(),
            }),
        )
            .into_response(),
        Err(DispatchError::Validation(message)) => invalid_input(message),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn job_status(
    State(state): State<HttpState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let record = state.dispatcher.status(&job_id).await?;
    Ok(Json(status_response(record, &state.url_prefix)))
}

pub async fn notify_file_ready(
    State(state): State<HttpState>,
    payload: Result<Json<CompletionNotification>, JsonRejection>,
) -> Result<Json<CompletionAck>, ApiError> {
    let Json(notification) = payload.map_err(ApiError::from_rejection)?;
    let job_id = notification.job_id.clone();

    state.dispatcher.complete(notification).await?;

    Ok(Json(CompletionAck {
        status: AckStatus::Acknowledged,
        job_id,
    }))
}

pub async fn health(State(state): State<HttpState>) -> Result<Json<HealthResponse>, ApiError> {
    let delivery = match *state.delivery.borrow() {
        WorkerState::Connected => DeliveryState::Connected,
        WorkerState::Disconnected => DeliveryState::Disconnected,
    };
    let tracked_jobs = state.dispatcher.tracked_jobs().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        delivery,
        queue_depth: state.dispatcher.queue_depth(),
        tracked_jobs,
    }))
}

fn invalid_input(message: String) -> Response {
    let mut response = (
        StatusCode::BAD_REQUEST,
        Json(InvalidInputResponse {
            status: InvalidInputStatus::InvalidInput,
            message: message.clone(),
        }),
    )
        .into_response();
    ErrorReport::from_message(SOURCE_GENERATE, StatusCode::BAD_REQUEST, message)
        .attach(&mut response);
    response
}

fn status_response(record: JobStatusRecord, url_prefix: &str) -> StatusResponse {
    let state = match record.status {
        JobStatus::Queued => JobState::Queued,
        JobStatus::Error => JobState::Error,
        JobStatus::Ready { result } => JobState::Ready {
            url: result_url(url_prefix, &result),
            filename: result,
        },
    };

    StatusResponse {
        state,
        submitted_at: record.submitted_at,
        completed_at: record.completed_at,
    }
}

/// Results that already look like a URL or an absolute path are passed through.
fn result_url(prefix: &str, result: &str) -> String {
    if result.starts_with("http://") || result.starts_with("https://") || result.starts_with('/')
    {
        return result.to_string();
    }
    format!("{prefix}/{result}")
}
