use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use shared::{
    domain::SurveyDescriptor,
    error::{ApiError, ErrorCode},
    protocol::{SessionPayload, SUBMIT_ERROR, SUBMIT_SUCCESS},
    scoring::evaluate_page,
};
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir};
use tracing::{info, warn};

use crate::app_state::{AppState, StoredSubmission};

mod validation;

use validation::validate_payload;

pub(crate) fn build_router(state: AppState, static_dir: &str, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/book/:survey", get(survey_descriptor))
        .route("/book/:survey/submit", post(submit))
        .route("/book/:survey/results", get(results))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

async fn ping() -> &'static str {
    "ok"
}

fn not_found(survey: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(
            ErrorCode::NotFound,
            format!("unknown survey '{survey}'"),
        )),
    )
}

async fn survey_descriptor(
    State(state): State<AppState>,
    Path(survey): Path<String>,
) -> Result<Json<SurveyDescriptor>, (StatusCode, Json<ApiError>)> {
    state
        .surveys
        .get(&survey)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(&survey))
}

/// Stores every payload of the batch, valid or not. The body is the success
/// sentinel only when all of them passed validation.
async fn submit(
    State(state): State<AppState>,
    Path(survey): Path<String>,
    body: Bytes,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    let descriptor = state.surveys.get(&survey).ok_or_else(|| not_found(&survey))?;

    let batch: Vec<SessionPayload> = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(error) => {
            warn!(%survey, %error, "submit: body is not a payload batch");
            return Ok(SUBMIT_ERROR);
        }
    };

    let today = Local::now().date_naive();
    let mut all_valid = true;
    let mut stored = Vec::with_capacity(batch.len());
    for payload in batch {
        let rejection = match validate_payload(&payload, &descriptor.pages, today) {
            Ok(()) => None,
            Err(error) => {
                warn!(%survey, reason = %error.message, "submit: payload flagged");
                all_valid = false;
                Some(error.message)
            }
        };
        let scores = if rejection.is_none() {
            descriptor
                .pages
                .iter()
                .zip(&payload.results)
                .map(|(page, records)| evaluate_page(page, records))
                .collect()
        } else {
            Vec::new()
        };
        stored.push(StoredSubmission {
            survey: survey.clone(),
            payload,
            scores,
            rejection,
        });
    }

    let count = stored.len();
    state.submissions.lock().await.extend(stored);
    info!(%survey, count, all_valid, "submit: batch stored");

    Ok(if all_valid { SUBMIT_SUCCESS } else { SUBMIT_ERROR })
}

async fn results(
    State(state): State<AppState>,
    Path(survey): Path<String>,
) -> Result<Json<Vec<StoredSubmission>>, (StatusCode, Json<ApiError>)> {
    if !state.surveys.contains_key(&survey) {
        return Err(not_found(&survey));
    }
    let submissions = state.submissions.lock().await;
    Ok(Json(
        submissions
            .iter()
            .filter(|submission| submission.survey == survey)
            .cloned()
            .collect(),
    ))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
