//! Phone number canonicalization.
//!
//! Phone-based registration deduplicates on the canonical national form, so
//! `666666667`, `0034666666667` and `+34666666667` must all collapse to the
//! same string before any lookup or uniqueness check.

use serde::Deserialize;

/// Dialing-prefix configuration for the deployment's country.
#[derive(Debug, Clone, Deserialize)]
pub struct PhoneConfig {
    /// Country calling code without any prefix, e.g. "34".
    pub country_code: String,
    /// International exit prefix, e.g. "00".
    pub exit_prefix: String,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            country_code: "34".to_string(),
            exit_prefix: "00".to_string(),
        }
    }
}

/// Reduce a raw phone number to canonical national form.
///
/// Strips separators, then a single leading `+<country>` or
/// `<exit><country>` prefix. Idempotent: a canonical number passes through
/// unchanged.
pub fn canonicalize_phone(raw: &str, config: &PhoneConfig) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .collect();

    if let Some(rest) = digits.strip_prefix('+') {
        if let Some(national) = rest.strip_prefix(config.country_code.as_str()) {
            return national.to_string();
        }
        return rest.to_string();
    }

    if let Some(rest) = digits.strip_prefix(config.exit_prefix.as_str()) {
        if let Some(national) = rest.strip_prefix(config.country_code.as_str()) {
            return national.to_string();
        }
    }

    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_prefix_invariant() {
        let config = PhoneConfig::default();
        let national = canonicalize_phone("666666667", &config);
        assert_eq!(national, "666666667");
        assert_eq!(canonicalize_phone("0034666666667", &config), national);
        assert_eq!(canonicalize_phone("+34666666667", &config), national);
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let config = PhoneConfig::default();
        let once = canonicalize_phone("+34 666 66 66 67", &config);
        let twice = canonicalize_phone(&once, &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonicalize_strips_separators() {
        let config = PhoneConfig::default();
        assert_eq!(canonicalize_phone("666-66.66 67", &config), "666666667");
    }

    #[test]
    fn test_exit_prefix_without_country_code_untouched() {
        let config = PhoneConfig::default();
        // "00" followed by something that is not the country code is left
        // alone rather than guessed at.
        assert_eq!(canonicalize_phone("0049123456", &config), "0049123456");
    }

    #[test]
    fn test_foreign_plus_prefix_keeps_foreign_code() {
        let config = PhoneConfig::default();
        assert_eq!(canonicalize_phone("+49123456", &config), "49123456");
    }
}
