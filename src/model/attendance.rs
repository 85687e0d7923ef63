use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceMethod {
    AppQr,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Attendance {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 42)]
    pub student_id: u64,
    #[schema(example = "2024-03-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "present", value_type = String)]
    pub status: String,
    #[schema(example = "app_qr", value_type = String)]
    pub method: Option<String>,
    /// Device latitude captured at redemption, if any
    pub lat: Option<f64>,
    /// Device longitude captured at redemption, if any
    pub lon: Option<f64>,
    /// Selfie evidence as a data URL; presence forces manual review
    #[schema(value_type = String)]
    pub photo_url: Option<String>,
    pub verified: bool,
    #[schema(example = "app", value_type = String)]
    pub recorded_by: Option<String>,
    #[schema(example = "2024-03-05T10:00:00Z", format = "date-time", value_type = String)]
    pub created_at: Option<DateTime<Utc>>,
}
