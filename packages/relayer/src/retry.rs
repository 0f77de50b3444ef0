//! Retry policy and error classification for pipeline work
//!
//! Maps every failure onto the bridge's taxonomy: transient errors retry with
//! exponential backoff up to `max_retries` and then fail; permanent errors
//! fail immediately; duplicate-submission errors count as success and the
//! pipeline reconciles state by re-querying the ledger.

use canton_rs::canton::CantonError;
use canton_rs::evm::is_nonce_error;
use std::time::Duration;

/// Transaction retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts before a transfer fails
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff: retry_delay,
            ..Self::default()
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// The bridge's failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network faults, Canton UNAVAILABLE, EVM nonce races — retry with backoff
    Transient,
    /// Decode failures, reverted receipts, INVALID_ARGUMENT — fail immediately
    Permanent,
    /// Unique-constraint hit or Canton duplicate commandId — treat as success
    Duplicate,
    /// Expired/invalid token — force one refresh, then permanent
    Auth,
}

/// Classify a Canton ledger error
pub fn classify_canton_error(error: &CantonError) -> ErrorClass {
    if error.is_duplicate_command() {
        ErrorClass::Duplicate
    } else if error.is_auth() {
        ErrorClass::Auth
    } else if error.is_transient() {
        ErrorClass::Transient
    } else if error.is_invalid_argument() {
        ErrorClass::Permanent
    } else {
        // Unknown ledger rejections get one more look before the operator does
        ErrorClass::Transient
    }
}

/// Classify an EVM-side error from its message
pub fn classify_evm_error(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();

    if is_nonce_error(&lower) {
        return ErrorClass::Transient;
    }

    if lower.contains("reverted")
        || lower.contains("execution reverted")
        || lower.contains("invalid signature")
        || lower.contains("insufficient funds")
        || lower.contains("out of gas")
    {
        return ErrorClass::Permanent;
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("503")
        || lower.contains("502")
    {
        return ErrorClass::Transient;
    }

    ErrorClass::Transient
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canton_status(http: u16, code: &str, message: &str) -> CantonError {
        CantonError::Status {
            http,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(8));
        assert_eq!(config.backoff_for_attempt(5), Duration::from_secs(60)); // capped
    }

    #[test]
    fn test_canton_classification() {
        assert_eq!(
            classify_canton_error(&canton_status(503, "UNAVAILABLE", "")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_canton_error(&canton_status(400, "INVALID_ARGUMENT", "bad numeric")),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify_canton_error(&canton_status(409, "ALREADY_EXISTS", "DUPLICATE_COMMAND")),
            ErrorClass::Duplicate
        );
        assert_eq!(
            classify_canton_error(&canton_status(401, "UNAUTHENTICATED", "expired")),
            ErrorClass::Auth
        );
    }

    #[test]
    fn test_evm_classification() {
        assert_eq!(classify_evm_error("execution reverted"), ErrorClass::Permanent);
        assert_eq!(classify_evm_error("nonce too low"), ErrorClass::Transient);
        assert_eq!(classify_evm_error("connection refused"), ErrorClass::Transient);
        assert_eq!(classify_evm_error("insufficient funds for gas"), ErrorClass::Permanent);
        assert_eq!(classify_evm_error("weird unknown error"), ErrorClass::Transient);
    }
}
