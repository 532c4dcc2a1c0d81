use secrecy::SecretString;
use service_core::error::AppError;
use std::env;

use crate::models::{AuthEvent, AuthMethod};
use crate::utils::PhoneConfig;

/// Engine-wide settings. Per-event method configs may override the code
/// limits; everything else applies globally.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shared key for token signing; every replica must hold the same value.
    pub shared_secret: SecretString,
    pub phone: PhoneConfig,
    pub email_max_codes: u32,
    pub sms_max_codes: u32,
    pub code_length: usize,
    /// Default freshness window callers use when verifying tokens.
    pub token_max_age_secs: u64,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let is_prod = env_str == "prod";

        let config = EngineConfig {
            shared_secret: SecretString::new(get_env(
                "AUTH_SHARED_SECRET",
                Some("insecure-dev-secret"),
                is_prod,
            )?),
            phone: PhoneConfig {
                country_code: get_env("PHONE_COUNTRY_CODE", Some("34"), is_prod)?,
                exit_prefix: get_env("PHONE_EXIT_PREFIX", Some("00"), is_prod)?,
            },
            email_max_codes: get_env("SEND_CODES_EMAIL_MAX", Some("10"), is_prod)?
                .parse()
                .unwrap_or(10),
            sms_max_codes: get_env("SEND_CODES_SMS_MAX", Some("5"), is_prod)?
                .parse()
                .unwrap_or(5),
            code_length: get_env("CODE_LENGTH", Some("6"), is_prod)?
                .parse()
                .unwrap_or(6),
            token_max_age_secs: get_env("TOKEN_MAX_AGE_SECS", Some("300"), is_prod)?
                .parse()
                .unwrap_or(300),
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults with an explicit secret; used by embedders and tests.
    pub fn with_secret(secret: SecretString) -> Self {
        Self {
            shared_secret: secret,
            phone: PhoneConfig::default(),
            email_max_codes: 10,
            sms_max_codes: 5,
            code_length: 6,
            token_max_age_secs: 300,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        use secrecy::ExposeSecret;

        if self.shared_secret.expose_secret().len() < 8 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "AUTH_SHARED_SECRET must be at least 8 characters"
            )));
        }
        if !(4..=10).contains(&self.code_length) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CODE_LENGTH must be within 4..=10"
            )));
        }
        if self.email_max_codes == 0 || self.sms_max_codes == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "code send limits must be positive"
            )));
        }
        if self.phone.country_code.is_empty()
            || !self.phone.country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PHONE_COUNTRY_CODE must be numeric"
            )));
        }
        Ok(())
    }

    /// Send limit for an event: its method config override, or the engine
    /// default for that channel.
    pub fn max_codes_for(&self, event: &AuthEvent) -> u32 {
        let default = match event.auth_method {
            AuthMethod::Email => self.email_max_codes,
            AuthMethod::Sms => self.sms_max_codes,
            AuthMethod::Password => 0,
        };
        event.method_config.max_codes().unwrap_or(default)
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_secret_defaults() {
        let config = EngineConfig::with_secret(SecretString::new("test-secret".to_string()));
        assert_eq!(config.email_max_codes, 10);
        assert_eq!(config.sms_max_codes, 5);
        assert_eq!(config.code_length, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = EngineConfig::with_secret(SecretString::new("short".to_string()));
        assert!(config.validate().is_err());
    }
}
