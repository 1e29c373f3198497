//! Webhook signature verification.
//!
//! The provider signs each delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`, where each `v1` is
//! HMAC-SHA256 over `"<t>.<raw body>"` keyed with the endpoint secret.
//! Several `v1` values appear while a secret is being rolled.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;
use tracing::instrument;

type HmacSha256 = Hmac<Sha256>;

/// Request header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    Malformed,
    #[error("webhook secret is not configured")]
    NotConfigured,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies signed webhook deliveries.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<SecretString>,
    tolerance: Duration,
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: Option<SecretString>, tolerance: Duration) -> Self {
        Self { secret, tolerance }
    }

    /// Check `header` against the raw request `body` at time `now`.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError` if the header is absent or malformed, the
    /// timestamp is outside the tolerance, or no signature matches.
    #[instrument(skip_all)]
    pub fn verify(
        &self,
        header: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let secret = self.secret.as_ref().ok_or(SignatureError::NotConfigured)?;
        let header = header.ok_or(SignatureError::MissingHeader)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
        let signed_at: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
        if signatures.is_empty() {
            return Err(SignatureError::Malformed);
        }

        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        if now.timestamp().abs_diff(signed_at) > tolerance.unsigned_abs() {
            return Err(SignatureError::Expired);
        }

        let matched = signatures.iter().any(|candidate| {
            let Ok(candidate) = hex::decode(candidate) else {
                return false;
            };
            let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
                return false;
            };
            mac.update(timestamp.as_bytes());
            mac.update(b".");
            mac.update(body);
            mac.verify_slice(&candidate).is_ok()
        });

        if matched {
            tracing::debug!("Webhook signature verified");
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// Produce a signature header for `body`, as the provider would.
///
/// Used by tests and local tooling that replays events.
#[must_use]
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return format!("t={timestamp}");
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    const SECRET: &str = "whsec_test_9f8e7d6c5b4a";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(
            Some(SecretString::from(SECRET)),
            Duration::from_secs(300),
        )
    }

    #[test]
    fn test_valid_signature() {
        let now = Utc::now();
        let body = br#"{"id":"evt_1"}"#;
        let header = sign(SECRET, now.timestamp(), body);
        assert_eq!(verifier().verify(Some(&header), body, now), Ok(()));
    }

    #[test]
    fn test_any_of_several_signatures_matches() {
        let now = Utc::now();
        let body = b"{}";
        let good = sign(SECRET, now.timestamp(), body);
        let header = format!("{},v1={}", good.replace("v1=", "v1=00,v1="), "ff");
        assert_eq!(verifier().verify(Some(&header), body, now), Ok(()));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let now = Utc::now();
        let header = sign(SECRET, now.timestamp(), b"{\"amount\":1}");
        assert_eq!(
            verifier().verify(Some(&header), b"{\"amount\":2}", now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let now = Utc::now();
        let header = sign("whsec_other", now.timestamp(), b"{}");
        assert_eq!(
            verifier().verify(Some(&header), b"{}", now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let now = Utc::now();
        let header = sign(SECRET, (now - TimeDelta::minutes(10)).timestamp(), b"{}");
        assert_eq!(
            verifier().verify(Some(&header), b"{}", now),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_malformed_headers() {
        let now = Utc::now();
        let v = verifier();
        assert_eq!(v.verify(None, b"{}", now), Err(SignatureError::MissingHeader));
        assert_eq!(v.verify(Some("v1=abc"), b"{}", now), Err(SignatureError::Malformed));
        assert_eq!(v.verify(Some("t=abc,v1=00"), b"{}", now), Err(SignatureError::Malformed));
        assert_eq!(v.verify(Some("t=1"), b"{}", now), Err(SignatureError::Malformed));

        let unconfigured = WebhookVerifier::new(None, Duration::from_secs(300));
        assert_eq!(
            unconfigured.verify(Some("t=1,v1=00"), b"{}", now),
            Err(SignatureError::NotConfigured)
        );
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
