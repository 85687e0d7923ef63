use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use derive_more::{Display, Error};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Separator between the base64 payload and its hex-encoded MAC.
const SEPARATOR: char = '.';

pub const ACTION_ATTENDANCE: &str = "attendance";

/// Signing configuration, passed in explicitly so tests can run with
/// their own secrets and TTLs.
#[derive(Debug, Clone)]
pub struct QrConfig {
    pub hmac_secret: String,
    /// Default token lifetime in seconds when the issuer does not supply one.
    pub default_ttl_secs: i64,
}

/// The signed token payload. Field order is the serialization order,
/// so signing is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPayload {
    pub kiosk_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub nonce: String,
    pub action: String,
    /// Calendar date the token authorizes attendance for. Signed into the
    /// payload rather than derived from `issued_at`, so an admin can
    /// pre-generate a token for a make-up session on another day.
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum QrTokenError {
    #[display(fmt = "Invalid token format")]
    Malformed,
    #[display(fmt = "Invalid signature")]
    InvalidSignature,
    #[display(fmt = "Token expired")]
    Expired,
}

#[derive(Debug, Clone)]
pub struct IssuedQr {
    pub token: String,
    pub payload: QrPayload,
    pub expires_at: DateTime<Utc>,
}

fn mac_for(secret: &str, payload_b64: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key");
    mac.update(payload_b64.as_bytes());
    mac
}

fn sign(config: &QrConfig, payload: &QrPayload) -> String {
    let json = serde_json::to_string(payload).expect("payload serializes");
    let payload_b64 = BASE64.encode(json.as_bytes());
    let signature = hex::encode(mac_for(&config.hmac_secret, &payload_b64).finalize().into_bytes());
    format!("{payload_b64}{SEPARATOR}{signature}")
}

/// Build and sign a token as of `now`.
pub fn issue_at(
    config: &QrConfig,
    kiosk_id: &str,
    ttl_secs: Option<i64>,
    target_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> IssuedQr {
    let ttl = ttl_secs.unwrap_or(config.default_ttl_secs).max(1);
    let expires_at = now + Duration::seconds(ttl);

    let payload = QrPayload {
        kiosk_id: kiosk_id.to_owned(),
        issued_at: now,
        expires_at,
        nonce: Uuid::new_v4().to_simple().to_string(),
        action: ACTION_ATTENDANCE.to_owned(),
        date: target_date.unwrap_or_else(|| now.date_naive()),
    };

    let token = sign(config, &payload);

    IssuedQr {
        token,
        payload,
        expires_at,
    }
}

pub fn issue(
    config: &QrConfig,
    kiosk_id: &str,
    ttl_secs: Option<i64>,
    target_date: Option<NaiveDate>,
) -> IssuedQr {
    issue_at(config, kiosk_id, ttl_secs, target_date, Utc::now())
}

/// Check authenticity and freshness of a token as of `now` and return its
/// payload. Stateless: "verified" here means authentically issued and not
/// time-expired, not "unused"; single-use is the token store's concern.
pub fn verify_at(
    config: &QrConfig,
    token: &str,
    now: DateTime<Utc>,
) -> Result<QrPayload, QrTokenError> {
    let (payload_b64, signature_hex) = token
        .split_once(SEPARATOR)
        .ok_or(QrTokenError::Malformed)?;
    if payload_b64.is_empty() || signature_hex.is_empty() {
        return Err(QrTokenError::Malformed);
    }

    let signature = hex::decode(signature_hex).map_err(|_| QrTokenError::InvalidSignature)?;
    // verify_slice is constant-time
    mac_for(&config.hmac_secret, payload_b64)
        .verify_slice(&signature)
        .map_err(|_| QrTokenError::InvalidSignature)?;

    let json = BASE64
        .decode(payload_b64)
        .map_err(|_| QrTokenError::Malformed)?;
    let payload: QrPayload =
        serde_json::from_slice(&json).map_err(|_| QrTokenError::Malformed)?;

    if now > payload.expires_at {
        return Err(QrTokenError::Expired);
    }

    Ok(payload)
}

pub fn verify(config: &QrConfig, token: &str) -> Result<QrPayload, QrTokenError> {
    verify_at(config, token, Utc::now())
}
