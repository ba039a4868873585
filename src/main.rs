//! Call Coach - telephone role-play trainer for service advisors
//!
//! Answers Twilio voice webhooks, walks the caller through a scripted
//! customer call and grades how they handled it.

mod api;
mod db;
mod grading;
mod llm;
mod runtime;
mod state_machine;
mod twiml;
mod voice;

use api::{create_router, AppState};
use db::Database;
use grading::{Grader, GradingMode, RubricGrader, StaticGrader};
use llm::LlmConfig;
use runtime::{CallManager, CallSettings, Collaborators, DatabaseStorage, Synthesizer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice::{AudioCache, VoiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Local development keeps credentials in .env
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_coach=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("CALL_COACH_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.call-coach/calls.db")
    });

    let port: u16 = std::env::var("CALL_COACH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);

    let public_host = std::env::var("PUBLIC_HOST").ok();
    let settings = CallSettings::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    // Sessions live in memory, so nothing in progress survived the restart
    let abandoned = db.abandon_in_progress()?;
    if abandoned > 0 {
        tracing::info!(count = abandoned, "Marked interrupted calls as abandoned");
    }

    // Grading
    let llm_config = LlmConfig::from_env();
    let llm = llm_config.build_service()?;
    let grader: Arc<dyn Grader> = match (settings.effective_grading_mode(llm.is_some()), llm) {
        (GradingMode::Rubric, Some(llm)) => {
            tracing::info!(model = %llm.model_id(), "Rubric grading enabled");
            Arc::new(RubricGrader::new(llm))
        }
        _ => {
            tracing::info!("Static feedback enabled");
            Arc::new(StaticGrader::new(&settings.script.static_feedback))
        }
    };

    // Speech
    let voice_config = VoiceConfig::from_env();
    let synthesizer = voice_config
        .synthesizer()?
        .map(|s| Arc::new(s) as Arc<dyn Synthesizer>);
    if synthesizer.is_none() {
        tracing::warn!("ElevenLabs not configured, replies use Twilio's built-in voice");
    }
    let audio = Arc::new(AudioCache::default());

    let collaborators = Collaborators {
        recordings: Arc::new(voice_config.recordings()?),
        transcriber: Arc::new(voice_config.transcriber()?),
        synthesizer,
        grader,
        store: Arc::new(DatabaseStorage::new(db.clone())),
        audio: audio.clone(),
    };

    // Create application state
    let calls = Arc::new(CallManager::new(settings, collaborators));
    let state = AppState::new(calls, db, audio, public_host.as_deref());

    let app = create_router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Call Coach server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
