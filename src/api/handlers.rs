//! HTTP request handlers

use super::types::{
    CallListResponse, CallResponse, ErrorResponse, FeedbackWebhook, ListCallsQuery,
    RecordingStatusWebhook, RecordingWebhook, StatusWebhook, VoiceWebhook,
};
use super::AppState;
use crate::db::DbError;
use crate::runtime::{CallError, NextStep, Speech, TurnOutcome};
use crate::twiml::TwimlBuilder;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Spoken when a webhook arrives for a call with no live session
const CALL_ENDED: &str = "Sorry, this call has already ended. Goodbye.";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Twilio voice webhooks
        .route("/voice", post(incoming_call))
        .route("/recording", post(caller_recording))
        .route("/feedback", post(deliver_feedback))
        .route("/status", post(call_status))
        .route("/recording-status", post(recording_status))
        // Synthesized replies for <Play>
        .route("/audio/:id", get(get_audio))
        // Call history
        .route("/api/calls", get(list_calls))
        .route("/api/calls/:sid", get(get_call))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// TwiML rendering
// ============================================================

/// A TwiML document
struct Twiml(String);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/xml")], self.0).into_response()
    }
}

fn render(state: &AppState, outcome: &TurnOutcome) -> Twiml {
    let twiml = match &outcome.speech {
        Speech::Audio { id } => TwimlBuilder::new().play(state.url(&format!("/audio/{id}"))),
        Speech::Say { text } => TwimlBuilder::new().say(text),
    };

    let settings = state.calls.settings();
    let twiml = match outcome.next {
        NextStep::Record => twiml.record(
            state.url("/recording"),
            settings.record_max_length,
            settings.record_timeout,
            state.url("/recording-status"),
        ),
        NextStep::AwaitFeedback { delay } => twiml
            .pause(delay.as_secs())
            .redirect(state.url("/feedback")),
        NextStep::Hangup => twiml.hangup(),
    };
    Twiml(twiml.build())
}

/// Apologize and hang up; Twilio must always get valid TwiML back
fn call_ended(call_sid: &str, error: &CallError) -> Twiml {
    match error {
        CallError::NotFound(_) | CallError::SessionEnded(_) => {
            tracing::info!(call_sid = %call_sid, error = %error, "Webhook for finished call");
        }
        CallError::NoFeedback | CallError::RuntimeGone => {
            tracing::error!(call_sid = %call_sid, error = %error, "Call webhook failed");
        }
    }
    Twiml(TwimlBuilder::new().say(CALL_ENDED).hangup().build())
}

// ============================================================
// Voice webhooks
// ============================================================

async fn incoming_call(State(state): State<AppState>, Form(hook): Form<VoiceWebhook>) -> Twiml {
    match state
        .calls
        .start_call(&hook.call_sid, &hook.from, &hook.to)
        .await
    {
        Ok(outcome) => render(&state, &outcome),
        Err(e) => call_ended(&hook.call_sid, &e),
    }
}

async fn caller_recording(
    State(state): State<AppState>,
    Form(hook): Form<RecordingWebhook>,
) -> Twiml {
    match state
        .calls
        .caller_turn(&hook.call_sid, hook.recording_url.as_deref())
        .await
    {
        Ok(outcome) => render(&state, &outcome),
        Err(e) => call_ended(&hook.call_sid, &e),
    }
}

async fn deliver_feedback(
    State(state): State<AppState>,
    Form(hook): Form<FeedbackWebhook>,
) -> Twiml {
    match state.calls.feedback(&hook.call_sid).await {
        Ok(outcome) => render(&state, &outcome),
        Err(e) => call_ended(&hook.call_sid, &e),
    }
}

async fn call_status(State(state): State<AppState>, Form(hook): Form<StatusWebhook>) -> StatusCode {
    tracing::debug!(call_sid = %hook.call_sid, status = %hook.call_status, "Call status");
    if hook.is_final() {
        state.calls.hangup(&hook.call_sid, &hook.call_status).await;
    }
    StatusCode::NO_CONTENT
}

async fn recording_status(
    State(state): State<AppState>,
    Form(hook): Form<RecordingStatusWebhook>,
) -> Result<StatusCode, AppError> {
    state
        .db
        .set_recording_url(&hook.call_sid, &hook.recording_url)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Audio
// ============================================================

async fn get_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let clip = state
        .audio
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Audio clip not found: {id}")))?;

    Ok((
        [(header::CONTENT_TYPE, clip.content_type.clone())],
        clip.bytes.clone(),
    )
        .into_response())
}

// ============================================================
// Call history
// ============================================================

async fn list_calls(
    State(state): State<AppState>,
    Query(query): Query<ListCallsQuery>,
) -> Result<Json<CallListResponse>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let calls = state.db.list_calls(limit)?;
    let active = state.calls.active_calls().await;
    Ok(Json(CallListResponse { calls, active }))
}

async fn get_call(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<CallResponse>, AppError> {
    let call = state.db.get_call(&sid)?;
    Ok(Json(CallResponse { call }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("call-coach ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    NotFound(String),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::CallNotFound(_) => AppError::NotFound(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
