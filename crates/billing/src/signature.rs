//! Webhook signature verification
//!
//! Stripe signs `"{timestamp}.{raw body}"` with HMAC-SHA256 and sends
//! `Stripe-Signature: t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. The check runs
//! over the exact bytes received; re-serialising parsed JSON would change
//! whitespace and key order and break it.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Header name carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse `t=...,v1=...` pairs. Unknown schemes (e.g. `v0`) are ignored.
    pub fn parse(header: &str) -> BillingResult<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        BillingError::WebhookHeaderMalformed(format!("bad timestamp: {value}"))
                    })?);
                }
                "v1" => {
                    // A non-hex v1 can never match; skip it rather than fail the whole header
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| BillingError::WebhookHeaderMalformed("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(BillingError::WebhookHeaderMalformed(
                "missing v1 signature".to_string(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> BillingResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Config("invalid webhook secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verify `payload` against `header` as of `now` (unix seconds)
pub fn verify_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> BillingResult<()> {
    let parsed = SignatureHeader::parse(header)?;

    // `t=` is unauthenticated; abs_diff and saturating_sub cannot overflow
    let tolerance = u64::try_from(tolerance_secs).unwrap_or(0);
    if now.abs_diff(parsed.timestamp) > tolerance {
        let age_secs = now.saturating_sub(parsed.timestamp);
        tracing::warn!(
            timestamp = parsed.timestamp,
            now = now,
            age_secs = age_secs,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookTimestampExpired { age_secs });
    }

    let mac = mac_for(secret, parsed.timestamp, payload)?;
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

    if !matched {
        tracing::warn!(
            payload_len = payload.len(),
            candidates = parsed.signatures.len(),
            "Webhook signature mismatch"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Verify `payload` against `header` using the system clock
pub fn verify(payload: &[u8], header: &str, secret: &str, tolerance_secs: i64) -> BillingResult<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    verify_at(payload, header, secret, tolerance_secs, now)
}

/// Build a `Stripe-Signature` header value for `payload` at `timestamp`.
/// Used to replay captured events locally and in tests.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> BillingResult<String> {
    let mac = mac_for(secret, timestamp, payload)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={signature}"))
}
