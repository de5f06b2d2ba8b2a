//! Dashboard API route handlers.
//!
//! All endpoints return JSON. Reads come from the coordinator's published
//! snapshot; writes go through the coordinator handle.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{Settings, SettingsUpdate};
use crate::engine::{CoordinatorHandle, LoopEvent};
use crate::types::{BetOutcome, BettingState, ControlError, DiceReading, EnginePhase};

/// Rounds kept in memory for `/api/rounds`.
const ROUND_LOG_CAPACITY: usize = 500;

/// Rounds returned per request.
const ROUNDS_PER_PAGE: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub handle: CoordinatorHandle,
    pub rounds: RwLock<VecDeque<RoundLogEntry>>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(handle: CoordinatorHandle) -> Self {
        Self {
            handle,
            rounds: RwLock::new(VecDeque::new()),
            started_at: Utc::now(),
        }
    }

    pub async fn record_round(&self, entry: RoundLogEntry) {
        let mut rounds = self.rounds.write().await;
        if rounds.len() == ROUND_LOG_CAPACITY {
            rounds.pop_front();
        }
        rounds.push_back(entry);
    }
}

/// Follow the event stream and log every settled round. Ends when the
/// stream closes.
pub fn spawn_round_logger(
    state: AppState,
    mut events: broadcast::Receiver<LoopEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_reading: Option<DiceReading> = None;
        loop {
            match events.recv().await {
                Ok(LoopEvent::Reading { reading }) => last_reading = Some(reading),
                Ok(LoopEvent::Outcome { outcome, at }) => {
                    state
                        .record_round(RoundLogEntry::new(outcome, last_reading.take(), at))
                        .await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Round logger fell behind; some rounds not logged");
                }
                Err(RecvError::Closed) => {
                    debug!("Event stream closed; round logger exiting");
                    break;
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub phase: EnginePhase,
    pub state: BettingState,
    pub win_rate: f64,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub reading: Option<DiceReading>,
    pub outcome: BetOutcome,
}

impl RoundLogEntry {
    pub fn new(outcome: BetOutcome, reading: Option<DiceReading>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            reading,
            outcome,
        }
    }
}

/// Drag corners in screen coordinates, either order.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RegionRequest {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// A rejected control call, rendered as JSON.
pub struct ApiError(pub ControlError);

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ControlError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::InvalidSetting(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ControlError::NoColorSelected
            | ControlError::NoCaptureRegion
            | ControlError::NoBettingRegion => StatusCode::CONFLICT,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.handle.snapshot();
    Json(StatusResponse {
        phase: EnginePhase::from(&snapshot),
        win_rate: snapshot.win_rate(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        state: snapshot,
    })
}

/// GET /api/rounds
pub async fn get_rounds(State(state): State<AppState>) -> Json<Vec<RoundLogEntry>> {
    let rounds = state.rounds.read().await;
    let start = rounds.len().saturating_sub(ROUNDS_PER_PAGE);
    Json(rounds.iter().skip(start).cloned().collect())
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.handle.settings().await?))
}

/// POST /api/settings
pub async fn post_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.handle.update_settings(update).await?))
}

/// POST /api/region
pub async fn post_region(
    State(state): State<AppState>,
    Json(req): Json<RegionRequest>,
) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.handle.set_capture_region(req.start, req.end).await?))
}

/// POST /api/start
pub async fn post_start(State(state): State<AppState>) -> Result<Json<BettingState>, ApiError> {
    Ok(Json(state.handle.start().await?))
}

/// POST /api/stop
pub async fn post_stop(State(state): State<AppState>) -> Result<Json<BettingState>, ApiError> {
    Ok(Json(state.handle.stop().await?))
}

/// POST /api/reset
pub async fn post_reset(State(state): State<AppState>) -> Result<Json<BettingState>, ApiError> {
    Ok(Json(state.handle.reset_statistics().await?))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
