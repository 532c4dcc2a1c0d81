//! Challenge-code lifecycle: issue, supersede, verify, rate-limit.

use std::sync::Arc;

use crate::models::ChallengeCode;
use crate::store::CodeStore;
use crate::utils::random_code;

use super::error::ServiceError;

/// Manages one-time codes per (principal, auth event) pair.
///
/// The send counter is monotonic and independent of the current-code
/// pointer: triggering new codes never resets the quota, so exceeding the
/// limit is permanent for the pair until an administrative reset.
#[derive(Clone)]
pub struct CodeService {
    codes: Arc<dyn CodeStore>,
    code_length: usize,
}

impl CodeService {
    pub fn new(codes: Arc<dyn CodeStore>, code_length: usize) -> Self {
        Self { codes, code_length }
    }

    /// Issue a fresh code, superseding any unconsumed one. Fails with
    /// `SendLimitExceeded` once the cumulative counter reaches `max_codes`;
    /// the counter check and increment are a single atomic store operation.
    pub async fn issue(
        &self,
        principal_id: i64,
        event_id: i64,
        max_codes: u32,
    ) -> Result<String, ServiceError> {
        let allowed = self
            .codes
            .try_increment_send_count(principal_id, event_id, max_codes)
            .await?;
        if !allowed {
            tracing::warn!(principal_id, event_id, max_codes, "code send limit reached");
            return Err(ServiceError::SendLimitExceeded);
        }

        let code = random_code(self.code_length);
        self.codes
            .put_code(ChallengeCode::new(principal_id, event_id, code.clone()))
            .await?;
        // never log the code value itself
        tracing::info!(principal_id, event_id, "challenge code issued");
        Ok(code)
    }

    /// Verify a submitted code. True iff it matches the current unconsumed
    /// code; a match atomically consumes it, so re-submission fails. Never
    /// touches the send counter.
    pub async fn verify(
        &self,
        principal_id: i64,
        event_id: i64,
        submitted: &str,
    ) -> Result<bool, ServiceError> {
        let matched = self
            .codes
            .consume_code_if_matches(principal_id, event_id, submitted)
            .await?;
        if !matched {
            tracing::info!(principal_id, event_id, "challenge code verification failed");
        }
        Ok(matched)
    }

    pub async fn send_count(&self, principal_id: i64, event_id: i64) -> Result<u64, ServiceError> {
        Ok(self.codes.send_count(principal_id, event_id).await?)
    }

    /// Administrative quota reset for a pair.
    pub async fn reset_send_count(
        &self,
        principal_id: i64,
        event_id: i64,
    ) -> Result<(), ServiceError> {
        self.codes.reset_send_count(principal_id, event_id).await?;
        tracing::info!(principal_id, event_id, "send counter reset");
        Ok(())
    }

    /// Whether the pair's current code has been consumed (i.e. the holder
    /// already authenticated with it).
    pub async fn has_consumed_code(
        &self,
        principal_id: i64,
        event_id: i64,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .codes
            .current_code(principal_id, event_id)
            .await?
            .map(|c| c.consumed)
            .unwrap_or(false))
    }
}
