use crate::model::attendance::{Attendance, AttendanceMethod, AttendanceStatus};
use crate::model::attendance_token::AttendanceToken;
use crate::qr::codec::{self, IssuedQr, QrConfig, QrTokenError};
use crate::qr::geofence;
use crate::store::StoreError;
use crate::store::attendance_ledger::{AttendanceLedger, NewAttendance};
use crate::store::token_store::TokenStore;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::{Display, Error};

/// Geofence settings resolved from configuration. `reference` absent means
/// geofencing is not deployed and location checks pass through.
#[derive(Debug, Clone)]
pub struct GeofencePolicy {
    pub reference: Option<(f64, f64)>,
    pub radius_m: f64,
    /// Whether a redemption without an applicable geofence check (no
    /// reference point or no device coordinates) still auto-verifies.
    /// Defaults to true, matching the behavior deployments rely on.
    pub auto_verify_without_geofence: bool,
}

#[derive(Debug, Clone)]
pub struct RedeemRequest {
    pub token: String,
    pub student_id: u64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub selfie_base64: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RedeemOutcome {
    pub record: Attendance,
    /// True when a present record for (student, date) already existed and
    /// redemption succeeded without touching the token or the ledger.
    pub already_marked: bool,
    pub geofence_ok: bool,
    pub requires_verification: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Display, Error)]
pub enum RedeemError {
    #[display(fmt = "{}", _0)]
    Token(#[error(source)] QrTokenError),
    /// Authentically signed and unexpired, but never recorded at issuance,
    /// an inconsistency that is surfaced, not silently accepted.
    #[display(fmt = "Token not found")]
    TokenNotFound,
    #[display(fmt = "Token already used")]
    TokenAlreadyUsed,
    #[display(fmt = "{}", _0)]
    Store(#[error(source)] StoreError),
}

impl From<QrTokenError> for RedeemError {
    fn from(e: QrTokenError) -> Self {
        RedeemError::Token(e)
    }
}

impl From<StoreError> for RedeemError {
    fn from(e: StoreError) -> Self {
        RedeemError::Store(e)
    }
}

const GEOFENCE_WARNING: &str = "Location mismatch - not within library boundaries";

/// Issue a signed token and persist it. Returns the codec output; the token
/// string itself is what a QR renderer encodes.
pub async fn issue_token<S: TokenStore>(
    qr: &QrConfig,
    store: &S,
    kiosk_id: &str,
    ttl_secs: Option<i64>,
    target_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<IssuedQr, StoreError> {
    let issued = codec::issue_at(qr, kiosk_id, ttl_secs, target_date, now);

    store
        .create(&AttendanceToken {
            token: issued.token.clone(),
            kiosk_id: Some(issued.payload.kiosk_id.clone()),
            issued_at: issued.payload.issued_at,
            expires_at: issued.payload.expires_at,
            target_date: issued.payload.date,
            used: false,
            used_by: None,
        })
        .await?;

    Ok(issued)
}

/// Redeem a token for the acting student. Each gate aborts with its error;
/// the only compare-and-swap point is `mark_used`, so two concurrent
/// redemptions of one token resolve to exactly one success.
pub async fn redeem<S: TokenStore, L: AttendanceLedger>(
    qr: &QrConfig,
    policy: &GeofencePolicy,
    store: &S,
    ledger: &L,
    request: &RedeemRequest,
    now: DateTime<Utc>,
) -> Result<RedeemOutcome, RedeemError> {
    // 1. authenticity and freshness (stateless)
    let payload = codec::verify_at(qr, &request.token, now)?;

    // 2-3. durable token state
    let record = store
        .find(&request.token)
        .await?
        .ok_or(RedeemError::TokenNotFound)?;
    if record.used {
        return Err(RedeemError::TokenAlreadyUsed);
    }

    // 4. the signed payload owns the target date
    let target_date = payload.date;

    // 5. idempotent per (student, date): an existing present record is a
    // success, not an error, and the token stays unused
    if let Some(existing) = ledger.find_present(request.student_id, target_date).await? {
        return Ok(RedeemOutcome {
            record: existing,
            already_marked: true,
            geofence_ok: true,
            requires_verification: false,
            warning: None,
        });
    }

    // 6. geofence applies only when both sides of the comparison exist;
    // a miss downgrades trust instead of aborting
    let mut geofence_applied = false;
    let mut geofence_ok = true;
    if let (Some((ref_lat, ref_lon)), Some(lat), Some(lon)) =
        (policy.reference, request.lat, request.lon)
    {
        geofence_applied = true;
        geofence_ok = geofence::within_radius(ref_lat, ref_lon, lat, lon, policy.radius_m);
    }

    // 7. single atomic transition unused -> used
    if !store.mark_used(&request.token, request.student_id).await? {
        return Err(RedeemError::TokenAlreadyUsed);
    }

    // 8. selfie evidence always forces manual review
    let auto_verify = if geofence_applied {
        geofence_ok
    } else {
        policy.auto_verify_without_geofence
    };
    let verified = auto_verify && request.selfie_base64.is_none();

    let photo_url = request
        .selfie_base64
        .as_ref()
        .map(|b64| format!("data:image/jpeg;base64,{b64}"));

    let created = ledger
        .record_presence(&NewAttendance {
            student_id: request.student_id,
            date: target_date,
            status: AttendanceStatus::Present,
            method: AttendanceMethod::AppQr,
            lat: request.lat,
            lon: request.lon,
            photo_url,
            verified,
            recorded_by: request.device_id.clone().unwrap_or_else(|| "app".to_owned()),
        })
        .await?;

    Ok(RedeemOutcome {
        record: created,
        already_marked: false,
        geofence_ok,
        requires_verification: geofence_applied && !geofence_ok,
        warning: (geofence_applied && !geofence_ok).then(|| GEOFENCE_WARNING.to_owned()),
    })
}
