//! Webhook signature verification
//!
//! Slack signs `v0:{timestamp}:{body}` and sends `v0=<hex>`; GitHub signs
//! the raw body and sends `sha256=<hex>`. Both are HMAC-SHA256 and are
//! compared in constant time.

use crate::model::Provider;
use crate::{Result, SyncError};
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Oldest Slack request timestamp accepted, in seconds
pub const SLACK_MAX_SKEW_SECS: i64 = 5 * 60;

pub fn verify(provider: Provider, secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    match provider {
        Provider::Slack => verify_slack(secret, headers, body, chrono::Utc::now().timestamp()),
        Provider::GitHub => verify_github(secret, headers, body),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SyncError::Signature(format!("missing {} header", name)))
}

fn mac(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SyncError::Signature(format!("invalid secret: {}", e)))
}

fn check(mac: HmacSha256, signature_hex: &str) -> Result<()> {
    let expected = hex::decode(signature_hex)
        .map_err(|_| SyncError::Signature("signature is not hex".to_string()))?;
    mac.verify_slice(&expected)
        .map_err(|_| SyncError::Signature("signature mismatch".to_string()))
}

pub fn verify_slack(secret: &str, headers: &HeaderMap, body: &[u8], now: i64) -> Result<()> {
    let timestamp = header(headers, "x-slack-request-timestamp")?;
    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| SyncError::Signature("invalid request timestamp".to_string()))?;
    if (now - sent_at).abs() > SLACK_MAX_SKEW_SECS {
        return Err(SyncError::Signature("request timestamp too old".to_string()));
    }

    let signature = header(headers, "x-slack-signature")?;
    let signature = signature
        .strip_prefix("v0=")
        .ok_or_else(|| SyncError::Signature("unsupported signature version".to_string()))?;

    let mut mac = mac(secret)?;
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    check(mac, signature)
}

pub fn verify_github(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let signature = header(headers, "x-hub-signature-256")?;
    let signature = signature
        .strip_prefix("sha256=")
        .ok_or_else(|| SyncError::Signature("unsupported signature algorithm".to_string()))?;

    let mut mac = mac(secret)?;
    mac.update(body);
    check(mac, signature)
}

/// Hex HMAC-SHA256 of the given parts, as providers compute it
pub fn sign(secret: &str, parts: &[&[u8]]) -> Result<String> {
    let mut mac = mac(secret)?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const BODY: &[u8] = br#"{"type":"event_callback"}"#;

    fn slack_headers(ts: i64, signature: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-slack-request-timestamp", ts.to_string().parse().unwrap());
        headers.insert("x-slack-signature", signature.parse().unwrap());
        headers
    }

    fn slack_signature(ts: i64, body: &[u8]) -> String {
        let prefix = format!("v0:{}:", ts);
        format!("v0={}", sign(SECRET, &[prefix.as_bytes(), body]).unwrap())
    }

    #[test]
    fn test_slack_valid_signature() {
        let now = 1_700_000_000;
        let headers = slack_headers(now, &slack_signature(now, BODY));
        assert!(verify_slack(SECRET, &headers, BODY, now + 10).is_ok());
    }

    #[test]
    fn test_slack_tampered_body() {
        let now = 1_700_000_000;
        let headers = slack_headers(now, &slack_signature(now, BODY));
        let err = verify_slack(SECRET, &headers, b"{}", now).unwrap_err();
        assert!(matches!(err, SyncError::Signature(_)));
    }

    #[test]
    fn test_slack_replayed_request() {
        let sent = 1_700_000_000;
        let headers = slack_headers(sent, &slack_signature(sent, BODY));
        assert!(verify_slack(SECRET, &headers, BODY, sent + SLACK_MAX_SKEW_SECS + 1).is_err());
    }

    #[test]
    fn test_github_signature() {
        let mut headers = HeaderMap::new();
        let signature = format!("sha256={}", sign(SECRET, &[BODY]).unwrap());
        headers.insert("x-hub-signature-256", signature.parse().unwrap());

        assert!(verify_github(SECRET, &headers, BODY).is_ok());
        assert!(verify_github("other-secret", &headers, BODY).is_err());
    }

    #[test]
    fn test_missing_header() {
        let err = verify(Provider::GitHub, SECRET, &HeaderMap::new(), BODY).unwrap_err();
        assert!(err.to_string().contains("x-hub-signature-256"));
    }
}
