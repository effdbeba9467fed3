//! Request-pipeline error taxonomy and its HTTP mapping.
//!
//! Every rejection surfaces a single human-readable `detail` string; upstream
//! oracle/chain failure internals stay in the logs and are never echoed to
//! the caller.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaucetError {
    /// Covers both an invalid token and an unreachable oracle; the two are
    /// deliberately indistinguishable to the caller.
    #[error("reCAPTCHA verification failed")]
    VerificationFailed,

    #[error("invalid Ethereum address")]
    InvalidAddress,

    #[error("cooldown active for another {retry_after_secs}s")]
    CooldownActive { retry_after_secs: i64 },

    #[error("chain query failed: {0}")]
    ChainQueryFailed(anyhow::Error),

    #[error("transaction submission failed: {0}")]
    SubmissionFailed(anyhow::Error),

    #[error("cooldown store unavailable: {0}")]
    StoreUnavailable(#[from] DbErr),
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            FaucetError::VerificationFailed => (
                StatusCode::BAD_REQUEST,
                "reCAPTCHA verification failed".to_string(),
            ),
            FaucetError::InvalidAddress => (
                StatusCode::BAD_REQUEST,
                "Invalid Ethereum address".to_string(),
            ),
            FaucetError::CooldownActive { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "You can only request once every 24 hours.".to_string(),
            ),
            FaucetError::ChainQueryFailed(err) => {
                tracing::warn!("chain query failed: {err:#}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Chain endpoint unavailable".to_string(),
                )
            }
            FaucetError::SubmissionFailed(err) => {
                tracing::warn!("transaction submission failed: {err:#}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Transaction submission failed".to_string(),
                )
            }
            FaucetError::StoreUnavailable(err) => {
                tracing::error!("cooldown store unavailable: {err}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
        };

        let body = Json(json!({ "detail": detail }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: FaucetError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(
            status_of(FaucetError::VerificationFailed),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(FaucetError::InvalidAddress),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(FaucetError::CooldownActive {
                retry_after_secs: 60
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(FaucetError::ChainQueryFailed(anyhow::anyhow!("boom"))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(FaucetError::SubmissionFailed(anyhow::anyhow!("boom"))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(FaucetError::StoreUnavailable(DbErr::Custom(
                "down".to_string()
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
