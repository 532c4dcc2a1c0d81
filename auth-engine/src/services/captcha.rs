//! Captcha verification boundary.
//!
//! Challenge generation and image rendering live outside the engine; the
//! register pipeline only asks whether a submitted answer solves a
//! challenge.

use async_trait::async_trait;

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, challenge_id: &str, submitted: &str) -> Result<bool, anyhow::Error>;
}

/// Verifier that rejects everything; safe default for deployments that never
/// enable the captcha step.
pub struct RejectAllCaptcha;

#[async_trait]
impl CaptchaVerifier for RejectAllCaptcha {
    async fn verify(&self, _challenge_id: &str, _submitted: &str) -> Result<bool, anyhow::Error> {
        Ok(false)
    }
}
