//! Request admission pipeline.
//!
//! Per request, strictly in order: verification gate, address validation,
//! atomic cooldown claim, transaction issuance, dispensation record. Any
//! failure short-circuits; a claim is reverted when issuance fails, and a
//! record-write failure after on-chain submission is logged but still
//! reported as success because the funds already moved.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::address::EthAddress;
use crate::error::FaucetError;
use crate::issuer::TransactionIssuer;
use crate::store::{ClaimOutcome, CooldownStore, cooldown_remaining};
use crate::verification::CaptchaVerifier;

#[derive(Debug)]
pub struct Dispensation {
    pub recipient: String,
    pub tx_hash: String,
    pub amount_wei: u64,
}

#[derive(Debug)]
pub struct Eligibility {
    pub address: String,
    pub eligible: bool,
    pub retry_after_secs: Option<i64>,
}

#[derive(Debug)]
pub struct FaucetStatus {
    pub faucet_address: String,
    pub balance_wei: u128,
    pub dispense_amount_wei: u64,
    pub cooldown_secs: i64,
    pub total_dispensed_wei: i64,
    pub total_requests: i64,
}

pub struct FaucetService {
    verifier: CaptchaVerifier,
    store: CooldownStore,
    issuer: TransactionIssuer,
    cooldown_secs: i64,
    // In-process stripe of per-address mutexes. First line of defense under
    // single-instance load; the store-level conditional claim remains the
    // authoritative guarantee across instances.
    address_locks: Cache<String, Arc<Mutex<()>>>,
}

impl FaucetService {
    pub fn new(
        verifier: CaptchaVerifier,
        store: CooldownStore,
        issuer: TransactionIssuer,
        cooldown_secs: i64,
    ) -> Self {
        assert!(cooldown_secs > 0, "Cooldown window must be positive");
        let address_locks = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(600))
            .build();
        Self {
            verifier,
            store,
            issuer,
            cooldown_secs,
            address_locks,
        }
    }

    pub fn store(&self) -> &CooldownStore {
        &self.store
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.issuer.chain().timeout()
    }

    /// Runs the full admission pipeline for one request.
    pub async fn dispense(
        &self,
        raw_address: &str,
        captcha_token: &str,
    ) -> Result<Dispensation, FaucetError> {
        if !self.verifier.verify(captcha_token).await {
            return Err(FaucetError::VerificationFailed);
        }

        let recipient = EthAddress::parse(raw_address)?;
        let canonical = recipient.to_checksummed();

        let lock = self
            .address_locks
            .get_with(canonical.clone(), async { Arc::new(Mutex::new(())) })
            .await;
        let _admission_scope = lock.lock().await;

        let now = Utc::now().timestamp();
        let previous = match self
            .store
            .try_claim(&canonical, now, self.cooldown_secs)
            .await?
        {
            ClaimOutcome::Claimed { previous } => previous,
            ClaimOutcome::Active { retry_after_secs } => {
                return Err(FaucetError::CooldownActive { retry_after_secs });
            }
        };

        let tx_hash = match self.issuer.issue(&recipient).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                // Give the address its window back; the claim only stands
                // for a dispensation that actually went out.
                if let Err(release_err) = self.store.release(&canonical, now, previous).await {
                    warn!(
                        address = %canonical,
                        "failed to release cooldown claim after issuance error: {release_err}"
                    );
                }
                return Err(err);
            }
        };

        let amount_wei = self.issuer.dispense_amount_wei();
        if let Err(err) = self
            .store
            .record_dispensation(&canonical, amount_wei as i64, &tx_hash)
            .await
        {
            // Funds already moved on-chain; the cooldown claim is durable,
            // only the audit log entry is missing. Operators reconcile from
            // this log line.
            error!(
                address = %canonical,
                tx_hash = %tx_hash,
                "dispensation record write failed after submission: {err}"
            );
        }

        info!(address = %canonical, tx_hash = %tx_hash, amount_wei, "dispensed");
        Ok(Dispensation {
            recipient: canonical,
            tx_hash,
            amount_wei,
        })
    }

    /// Cooldown probe without side effects.
    pub async fn eligibility(&self, raw_address: &str) -> Result<Eligibility, FaucetError> {
        let address = EthAddress::parse(raw_address)?;
        let canonical = address.to_checksummed();
        let now = Utc::now().timestamp();

        let retry_after_secs = match self.store.last_dispensed(&canonical).await? {
            Some(last) => cooldown_remaining(last, now, self.cooldown_secs),
            None => None,
        };

        Ok(Eligibility {
            address: canonical,
            eligible: retry_after_secs.is_none(),
            retry_after_secs,
        })
    }

    pub async fn status(&self) -> Result<FaucetStatus, FaucetError> {
        let faucet_address = self.issuer.faucet_address();
        let balance_wei = self
            .issuer
            .chain()
            .balance(faucet_address)
            .await
            .map_err(FaucetError::ChainQueryFailed)?;
        let (total_dispensed_wei, total_requests) = self.store.totals().await?;

        Ok(FaucetStatus {
            faucet_address: faucet_address.to_checksummed(),
            balance_wei,
            dispense_amount_wei: self.issuer.dispense_amount_wei(),
            cooldown_secs: self.cooldown_secs,
            total_dispensed_wei,
            total_requests,
        })
    }
}
