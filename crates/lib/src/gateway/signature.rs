//! Slack request signing: `X-Slack-Signature: v0=<hex(HMAC-SHA256(secret, "v0:{ts}:{body}"))>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";

const VERSION: &str = "v0";
/// Requests signed more than five minutes away from local time are rejected (replay window).
const MAX_CLOCK_SKEW_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature or timestamp header")]
    MissingHeaders,
    #[error("timestamp is not a unix time")]
    BadTimestamp,
    #[error("timestamp outside the allowed window")]
    Stale,
    #[error("signature is not v0=<hex>")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
}

fn mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

/// Signature header value for `body` sent at `timestamp`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let digest = mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("{}={}", VERSION, hex::encode(digest)))
}

/// Check the signature headers of one request against the signing secret.
/// `now_secs` is the current unix time.
pub fn verify(
    secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    now_secs: i64,
) -> Result<(), SignatureError> {
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return Err(SignatureError::MissingHeaders);
    };
    let sent_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::BadTimestamp)?;
    if now_secs.abs_diff(sent_at) > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::Stale);
    }
    let digest = signature
        .strip_prefix("v0=")
        .and_then(|h| hex::decode(h).ok())
        .ok_or(SignatureError::Malformed)?;
    mac(secret, timestamp, body)?
        .verify_slice(&digest)
        .map_err(|_| SignatureError::Mismatch)
}
