//! Human-verification gate backed by the reCAPTCHA siteverify oracle.
//!
//! Fail-closed: a network failure, a malformed payload, or a missing
//! `success` field all count as a failed verification. One outbound call per
//! invocation, no retries.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

pub struct CaptchaVerifier {
    client: reqwest::Client,
    siteverify_url: String,
    secret: String,
}

impl CaptchaVerifier {
    pub fn new(siteverify_url: String, secret: String, timeout: Duration) -> anyhow::Result<Self> {
        assert!(!siteverify_url.is_empty(), "Siteverify URL must be provided");
        assert!(!secret.is_empty(), "Verification secret must be provided");
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            siteverify_url,
            secret,
        })
    }

    /// Returns `true` only when the oracle explicitly reports success.
    pub async fn verify(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }

        let response = match self
            .client
            .post(&self.siteverify_url)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!("verification oracle unreachable: {err}");
                return false;
            }
        };

        match response.json::<Value>().await {
            Ok(payload) => oracle_accepted(&payload),
            Err(err) => {
                warn!("verification oracle returned malformed payload: {err}");
                false
            }
        }
    }
}

fn oracle_accepted(payload: &Value) -> bool {
    payload
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_explicit_success_is_accepted() {
        assert!(oracle_accepted(&json!({ "success": true })));
        assert!(oracle_accepted(&json!({
            "success": true,
            "challenge_ts": "2026-08-30T00:00:00Z",
            "hostname": "example.org"
        })));
    }

    #[test]
    fn everything_else_fails_closed() {
        assert!(!oracle_accepted(&json!({ "success": false })));
        assert!(!oracle_accepted(&json!({ "success": "true" })));
        assert!(!oracle_accepted(&json!({ "success": 1 })));
        assert!(!oracle_accepted(&json!({ "error-codes": ["invalid-input-response"] })));
        assert!(!oracle_accepted(&json!({})));
        assert!(!oracle_accepted(&json!(null)));
        assert!(!oracle_accepted(&json!([true])));
    }
}
