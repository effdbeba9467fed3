//! Faucet HTTP handlers.
//!
//! `POST /faucet` runs the admission pipeline; the rest are read-only
//! queries over the cooldown store and dispensation log.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FaucetError;
use crate::state::AppState;

/// Maximum dispensation-log entries returned per history page.
pub const MAX_HISTORY_LIMIT: u64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(request_funds))
        .route("/status", get(get_status))
        .route("/eligibility/{address}", get(check_eligibility))
        .route("/history", get(get_history))
}

#[derive(Debug, Deserialize)]
pub struct FaucetRequest {
    /// Recipient wallet address
    pub address: String,
    /// CAPTCHA response token sent by the frontend
    pub captcha_response: String,
}

#[derive(Debug, Serialize)]
pub struct FaucetResponse {
    pub success: bool,
    pub transaction_hash: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub faucet_address: String,
    pub balance_wei: String,
    pub dispense_amount_wei: u64,
    pub cooldown_secs: i64,
    pub total_dispensed_wei: i64,
    pub total_requests: i64,
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub address: String,
    pub eligible: bool,
    pub retry_after_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub transaction_hash: String,
    pub recipient: String,
    pub amount_wei: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub address: Option<String>,
}

async fn request_funds(
    State(state): State<AppState>,
    Json(request): Json<FaucetRequest>,
) -> Result<Json<FaucetResponse>, FaucetError> {
    let dispensation = state
        .service
        .dispense(&request.address, &request.captcha_response)
        .await?;

    Ok(Json(FaucetResponse {
        success: true,
        transaction_hash: dispensation.tx_hash,
    }))
}

async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, FaucetError> {
    let status = state.service.status().await?;
    Ok(Json(StatusResponse {
        faucet_address: status.faucet_address,
        balance_wei: status.balance_wei.to_string(),
        dispense_amount_wei: status.dispense_amount_wei,
        cooldown_secs: status.cooldown_secs,
        total_dispensed_wei: status.total_dispensed_wei,
        total_requests: status.total_requests,
    }))
}

async fn check_eligibility(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<EligibilityResponse>, FaucetError> {
    let eligibility = state.service.eligibility(&address).await?;
    Ok(Json(EligibilityResponse {
        address: eligibility.address,
        eligible: eligibility.eligible,
        retry_after_secs: eligibility.retry_after_secs,
    }))
}

async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, FaucetError> {
    let limit = query.limit.unwrap_or(20).min(MAX_HISTORY_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let records = state
        .service
        .store()
        .recent_dispensations(query.address.as_deref(), limit, offset)
        .await?;

    let entries = records
        .into_iter()
        .map(|record| HistoryEntry {
            transaction_hash: record.tx_hash,
            recipient: record.recipient_address,
            amount_wei: record.amount_wei,
            created_at: record.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(Json(entries))
}
