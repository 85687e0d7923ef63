use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of an issued QR token. `used` transitions false → true
/// exactly once, via the token store's guarded update.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceToken {
    pub token: String,
    pub kiosk_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub target_date: NaiveDate,
    pub used: bool,
    pub used_by: Option<u64>,
}
