use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::model::attendance::{Attendance, AttendanceStatus};
use crate::service::attendance_flow::{self, RedeemError, RedeemRequest};
use crate::store::attendance_ledger::{AttendanceLedger, MySqlAttendanceLedger};
use crate::store::token_store::MySqlTokenStore;
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct GenerateQrRequest {
    /// Issuing station; defaults to the authenticated admin's id
    #[schema(example = "kiosk-entrance-1")]
    pub kiosk_id: Option<String>,
    /// Token lifetime override in seconds
    #[schema(example = 30)]
    pub ttl_seconds: Option<i64>,
    /// Calendar date the token authorizes; defaults to today
    #[schema(example = "2024-03-05", format = "date", value_type = String)]
    pub date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct GenerateQrResponse {
    /// The signed token; also the string a QR renderer encodes
    pub token: String,
    pub qr_payload: String,
    #[schema(example = "2024-03-05T10:00:30Z", format = "date-time", value_type = String)]
    pub expires_at: DateTime<Utc>,
    #[schema(example = "2024-03-05", format = "date", value_type = String)]
    pub date: NaiveDate,
}

#[derive(Deserialize, ToSchema)]
pub struct MarkAttendanceRequest {
    pub token: String,
    /// Selfie evidence; supplying one forces manual verification
    pub selfie_base64: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[schema(example = "android-3f9c")]
    pub device_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MarkAttendanceResponse {
    #[schema(example = "Attendance marked successfully")]
    pub message: String,
    pub data: Attendance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_verification: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct ManualMarkRequest {
    #[schema(example = 42)]
    pub student_id: u64,
    /// Defaults to today
    #[schema(example = "2024-03-05", format = "date", value_type = String)]
    pub date: Option<NaiveDate>,
    /// Defaults to present
    pub status: Option<AttendanceStatus>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VerifyAction {
    Approve,
    Reject,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub action: VerifyAction,
}

#[derive(Deserialize, IntoParams)]
pub struct DateRangeFilter {
    /// Inclusive lower bound (YYYY-MM-DD)
    #[param(value_type = String, format = "date")]
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound (YYYY-MM-DD)
    #[param(value_type = String, format = "date")]
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
pub struct AttendanceFilter {
    #[param(value_type = String, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = String, format = "date")]
    pub to: Option<NaiveDate>,
    /// Filter by student ID
    pub student_id: Option<u64>,
    /// Filter by verification state
    pub verified: Option<bool>,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Date(NaiveDate),
    Bool(bool),
}

const ATTENDANCE_COLUMNS: &str =
    "id, student_id, date, status, method, lat, lon, photo_url, verified, recorded_by, created_at";

async fn fetch_attendance(
    pool: &MySqlPool,
    where_sql: &str,
    args: Vec<FilterValue>,
    order_sql: &str,
) -> Result<Vec<Attendance>, sqlx::Error> {
    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance{where_sql} {order_sql}"
    );

    let mut query = sqlx::query_as::<_, Attendance>(&sql);
    for arg in args {
        query = match arg {
            FilterValue::U64(v) => query.bind(v),
            FilterValue::Date(d) => query.bind(d),
            FilterValue::Bool(b) => query.bind(b),
        };
    }

    query.fetch_all(pool).await
}

fn push_date_range(
    where_sql: &mut String,
    args: &mut Vec<FilterValue>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) {
    if let Some(from) = from {
        where_sql.push_str(" AND date >= ?");
        args.push(FilterValue::Date(from));
    }
    if let Some(to) = to {
        where_sql.push_str(" AND date <= ?");
        args.push(FilterValue::Date(to));
    }
}

/* =========================
Issue QR token (Admin/Kiosk)
========================= */
/// Swagger doc for generate_qr endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/qrcode",
    request_body(
        content = GenerateQrRequest,
        description = "Token issuance parameters",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Token issued", body = GenerateQrResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn generate_qr(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<GenerateQrRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let kiosk_id = payload
        .kiosk_id
        .clone()
        .unwrap_or_else(|| auth.user_id.to_string());

    let store = MySqlTokenStore::new(pool.get_ref().clone());

    let issued = attendance_flow::issue_token(
        &config.qr_config(),
        &store,
        &kiosk_id,
        payload.ttl_seconds,
        payload.date,
        Utc::now(),
    )
    .await
    .map_err(|e| {
        // DuplicateToken is a nonce collision: fatal for this request, the
        // kiosk simply re-issues
        tracing::error!(error = %e, %kiosk_id, "QR token issuance failed");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(GenerateQrResponse {
        qr_payload: issued.token.clone(),
        token: issued.token,
        expires_at: issued.expires_at,
        date: issued.payload.date,
    }))
}

/* =========================
Redeem QR token (Student)
========================= */
/// Swagger doc for mark_attendance endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/mark",
    request_body(
        content = MarkAttendanceRequest,
        description = "Scanned token plus optional location and selfie",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Attendance marked", body = MarkAttendanceResponse),
        (status = 400, description = "Invalid, expired, unknown or already-used token", body = Object, example = json!({
            "message": "Token already used"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn mark_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<MarkAttendanceRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_student()?;

    let store = MySqlTokenStore::new(pool.get_ref().clone());
    let ledger = MySqlAttendanceLedger::new(pool.get_ref().clone());

    let request = RedeemRequest {
        token: payload.token.clone(),
        student_id: auth.user_id,
        lat: payload.lat,
        lon: payload.lon,
        selfie_base64: payload.selfie_base64.clone(),
        device_id: payload.device_id.clone(),
    };

    let outcome = match attendance_flow::redeem(
        &config.qr_config(),
        &config.geofence_policy(),
        &store,
        &ledger,
        &request,
        Utc::now(),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e @ (RedeemError::Token(_) | RedeemError::TokenNotFound | RedeemError::TokenAlreadyUsed)) => {
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "message": e.to_string()
            })));
        }
        Err(RedeemError::Store(e)) => {
            tracing::error!(error = %e, student_id = auth.user_id, "Attendance redemption failed");
            return Err(actix_web::error::ErrorInternalServerError(
                "Internal Server Error",
            ));
        }
    };

    let message = if outcome.already_marked {
        format!("Attendance already marked for {}", outcome.record.date)
    } else {
        "Attendance marked successfully".to_owned()
    };

    Ok(HttpResponse::Ok().json(MarkAttendanceResponse {
        message,
        data: outcome.record,
        warning: outcome.warning,
        requires_verification: outcome.requires_verification.then_some(true),
    }))
}

/* =========================
Manual mark (Admin)
========================= */
/// Swagger doc for manual_mark endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/manual",
    request_body(
        content = ManualMarkRequest,
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Attendance marked or updated", body = Object, example = json!({
            "message": "Attendance marked successfully"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn manual_mark(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ManualMarkRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let date = payload.date.unwrap_or_else(|| Utc::now().date_naive());
    let status = payload.status.unwrap_or(AttendanceStatus::Present);
    let recorded_by = format!("admin_{}", auth.user_id);

    // admin override: update the existing record for that date if present
    let updated = sqlx::query(
        r#"
        UPDATE attendance
        SET status = ?, method = 'manual', verified = TRUE, recorded_by = ?
        WHERE student_id = ?
        AND date = ?
        "#,
    )
    .bind(status.to_string())
    .bind(&recorded_by)
    .bind(payload.student_id)
    .bind(date)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, student_id = payload.student_id, "Manual attendance update failed");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    if updated.rows_affected() > 0 {
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Attendance updated successfully"
        })));
    }

    sqlx::query(
        r#"
        INSERT INTO attendance
            (student_id, date, status, method, verified, recorded_by)
        VALUES (?, ?, ?, 'manual', TRUE, ?)
        "#,
    )
    .bind(payload.student_id)
    .bind(date)
    .bind(status.to_string())
    .bind(&recorded_by)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, student_id = payload.student_id, "Manual attendance insert failed");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Attendance marked successfully"
    })))
}

/* =========================
Own attendance history
========================= */
/// Swagger doc for my_attendance endpoint
#[utoipa::path(
    get,
    path = "/api/attendance/my",
    params(DateRangeFilter),
    responses(
        (status = 200, description = "Attendance records", body = [Attendance]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<DateRangeFilter>,
) -> actix_web::Result<impl Responder> {
    student_history(pool.get_ref(), auth.user_id, query.from, query.to).await
}

/* =========================
Per-student attendance history
========================= */
/// Swagger doc for student_attendance endpoint
#[utoipa::path(
    get,
    path = "/api/attendance/student/{id}",
    params(
        ("id" = u64, Path, description = "Student ID"),
        DateRangeFilter
    ),
    responses(
        (status = 200, description = "Attendance records", body = [Attendance]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn student_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<DateRangeFilter>,
) -> actix_web::Result<impl Responder> {
    // students may only read their own history
    let student_id = if auth.is_admin() {
        path.into_inner()
    } else {
        auth.user_id
    };

    student_history(pool.get_ref(), student_id, query.from, query.to).await
}

async fn student_history(
    pool: &MySqlPool,
    student_id: u64,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> actix_web::Result<HttpResponse> {
    let mut where_sql = String::from(" WHERE student_id = ?");
    let mut args = vec![FilterValue::U64(student_id)];
    push_date_range(&mut where_sql, &mut args, from, to);

    let records = fetch_attendance(pool, &where_sql, args, "ORDER BY date DESC")
        .await
        .map_err(|e| {
            tracing::error!(error = %e, student_id, "Failed to fetch attendance history");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(records))
}

/* =========================
All attendance (Admin)
========================= */
/// Swagger doc for all_attendance endpoint
#[utoipa::path(
    get,
    path = "/api/attendance/all",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Attendance records", body = [Attendance]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn all_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    push_date_range(&mut where_sql, &mut args, query.from, query.to);

    if let Some(student_id) = query.student_id {
        where_sql.push_str(" AND student_id = ?");
        args.push(FilterValue::U64(student_id));
    }

    if let Some(verified) = query.verified {
        where_sql.push_str(" AND verified = ?");
        args.push(FilterValue::Bool(verified));
    }

    let records = fetch_attendance(
        pool.get_ref(),
        &where_sql,
        args,
        "ORDER BY date DESC, id DESC",
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch attendance list");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(records))
}

/* =========================
Manual-review queue (Admin)
========================= */
/// Swagger doc for unverified_attendance endpoint
#[utoipa::path(
    get,
    path = "/api/attendance/unverified",
    responses(
        (status = 200, description = "Unverified attendance records", body = [Attendance]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn unverified_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let records = fetch_attendance(
        pool.get_ref(),
        " WHERE verified = FALSE",
        Vec::new(),
        "ORDER BY id DESC",
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch unverified attendance");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(records))
}

/* =========================
Verify or reject (Admin)
========================= */
/// Swagger doc for verify_attendance endpoint
#[utoipa::path(
    put,
    path = "/api/attendance/{id}/verify",
    params(
        ("id" = u64, Path, description = "Attendance record ID")
    ),
    request_body(
        content = VerifyRequest,
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Record verified or rejected", body = Attendance),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance record not found", body = Object, example = json!({
            "message": "Attendance record not found"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn verify_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<VerifyRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let id = path.into_inner();
    let ledger = MySqlAttendanceLedger::new(pool.get_ref().clone());

    // rejecting flips the record to absent and marks it reviewed
    let (message, status_override) = match payload.action {
        VerifyAction::Approve => ("Attendance verified", None),
        VerifyAction::Reject => ("Attendance rejected", Some(AttendanceStatus::Absent)),
    };

    let record = ledger
        .set_verified(id, true, status_override)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, id, "Attendance verification failed");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    match record {
        Some(data) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": message,
            "data": data
        }))),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Attendance record not found"
        }))),
    }
}
