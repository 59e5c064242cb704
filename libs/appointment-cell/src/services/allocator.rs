use std::sync::Arc;

use chrono::NaiveDate;
use rand::Rng;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::BookingSettings;

use crate::error::BookingError;
use crate::models::TokenClaim;
use crate::store::{ConflictKind, StoreError, TokenLedger};

#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl From<&BookingSettings> for AllocatorConfig {
    fn from(settings: &BookingSettings) -> Self {
        Self {
            max_attempts: settings.token_max_attempts.max(1),
            backoff_base_ms: settings.token_backoff_base_ms,
            backoff_max_ms: settings.token_backoff_max_ms,
        }
    }
}

/// Issues per-(doctor, date) token numbers by optimistic insert.
///
/// Each attempt reads the highest granted token and tries to claim the next
/// one; the ledger's uniqueness constraint rejects the loser of a race, which
/// backs off and retries. Grants are keyed by `claim_key`, so asking again with
/// the same key returns the earlier grant instead of a new number.
pub struct TokenAllocator {
    ledger: Arc<dyn TokenLedger>,
    config: AllocatorConfig,
}

impl TokenAllocator {
    pub fn new(ledger: Arc<dyn TokenLedger>, config: AllocatorConfig) -> Self {
        Self { ledger, config }
    }

    #[instrument(skip(self))]
    pub async fn allocate(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        claim_key: &str,
    ) -> Result<TokenClaim, BookingError> {
        if let Some(existing) = self.existing_grant(doctor_id, date, claim_key).await? {
            debug!("Reusing token {} granted to {}", existing.token_number, claim_key);
            return Ok(existing);
        }

        for attempt in 1..=self.config.max_attempts {
            let next = self.ledger.highest_token(doctor_id, date).await? + 1;
            let claim = TokenClaim::new(doctor_id, date, next, claim_key);

            match self.ledger.claim_token(&claim).await {
                Ok(()) => {
                    info!("Allocated token {} for doctor {} on {}", next, doctor_id, date);
                    return Ok(claim);
                }
                Err(StoreError::Conflict(ConflictKind::Token)) => {
                    warn!("Token {} already taken (attempt {}/{})", next, attempt, self.config.max_attempts);
                }
                Err(StoreError::Conflict(ConflictKind::Claim)) => {
                    // A concurrent call with the same key won
                    if let Some(existing) = self.existing_grant(doctor_id, date, claim_key).await? {
                        return Ok(existing);
                    }
                }
                Err(e) => return Err(e.into()),
            }

            if attempt < self.config.max_attempts {
                sleep(self.backoff(attempt)).await;
            }
        }

        error!(
            "Token allocation exhausted for doctor {} on {} after {} attempts",
            doctor_id, date, self.config.max_attempts
        );
        Err(BookingError::TokenAllocationExhausted {
            doctor_id,
            date,
            attempts: self.config.max_attempts,
        })
    }

    async fn existing_grant(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        claim_key: &str,
    ) -> Result<Option<TokenClaim>, BookingError> {
        match self.ledger.find_claim(claim_key).await? {
            Some(claim) if claim.doctor_id == doctor_id && claim.appointment_date == date => Ok(Some(claim)),
            Some(claim) => Err(BookingError::Store(StoreError::Corrupt(format!(
                "claim {} belongs to doctor {} on {}",
                claim_key, claim.doctor_id, claim.appointment_date
            )))),
            None => Ok(None),
        }
    }

    /// Exponential backoff capped at `backoff_max_ms`, plus up to one base interval of jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base_ms;
        let exp = base.saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter = if base > 0 { rand::thread_rng().gen_range(0..=base) } else { 0 };
        Duration::from_millis(exp.min(self.config.backoff_max_ms) + jitter)
    }
}
