//! HTTP lookup of precomputed presence probabilities.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use time::{macros::format_description, Date};

use crate::model::PresenceTable;

#[derive(Clone)]
pub struct LookupState {
    table: Arc<PresenceTable>,
    threshold: f64,
}

impl LookupState {
    pub fn new(table: PresenceTable, threshold: f64) -> Self {
        Self {
            table: Arc::new(table),
            threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Presence {
    pub present: bool,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceResponse {
    pub presence: Presence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub households: usize,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LookupError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid hour '{0}', expected 0-23")]
    InvalidHour(String),
    #[error("no presence estimate for household '{household}' at hour {hour}")]
    NotFound { household: String, hour: u8 },
}

impl LookupError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidDate(_) | Self::InvalidHour(_) => "bad_request",
            Self::NotFound { .. } => "not_found",
        }
    }
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidDate(_) | Self::InvalidHour(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

fn round2(p: f64) -> f64 {
    (p * 100.0).round() / 100.0
}

fn parse_hour(raw: &str) -> Result<u8, LookupError> {
    raw.parse::<u8>()
        .ok()
        .filter(|h| *h < 24)
        .ok_or_else(|| LookupError::InvalidHour(raw.to_string()))
}

/// Look up one (household, hour). The date is validated but does not select
/// anything yet: the table holds one value per hour of day.
pub fn decide(
    state: &LookupState,
    household: &str,
    date: &str,
    hour: &str,
) -> Result<PresenceResponse, LookupError> {
    Date::parse(date, format_description!("[year]-[month]-[day]"))
        .map_err(|_| LookupError::InvalidDate(date.to_string()))?;
    let hour = parse_hour(hour)?;

    let probability = state
        .table
        .get(household, hour)
        .ok_or_else(|| LookupError::NotFound {
            household: household.to_string(),
            hour,
        })?;

    Ok(PresenceResponse {
        presence: Presence {
            present: probability > state.threshold,
            probability: round2(probability),
        },
    })
}

pub async fn lookup(
    State(state): State<LookupState>,
    Path((household, date, hour)): Path<(String, String, String)>,
) -> Result<Json<PresenceResponse>, LookupError> {
    let started = Instant::now();
    let result = decide(&state, &household, &date, &hour);

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    metrics::counter!("lookup_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("lookup_latency_seconds").record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::debug!(error = %e, "lookup rejected");
    }

    result.map(Json)
}

pub async fn health(State(state): State<LookupState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        households: state.table.households(),
    })
}

pub fn router(state: LookupState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/:household/:date/:hour", get(lookup))
        .with_state(state)
}

pub async fn serve(bind_addr: &str, state: LookupState) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid serve.bind_addr '{bind_addr}': {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "presence lookup listening");

    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}
