use crate::model::attendance::{Attendance, AttendanceMethod, AttendanceStatus};
use crate::store::StoreError;
use chrono::NaiveDate;
use sqlx::MySqlPool;

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub student_id: u64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub method: AttendanceMethod,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub photo_url: Option<String>,
    pub verified: bool,
    pub recorded_by: String,
}

/// Per-student, per-date presence records. Uniqueness of (student, date)
/// among `present` records is the caller's job via `find_present`; the
/// ledger itself never rejects a duplicate.
#[allow(async_fn_in_trait)]
pub trait AttendanceLedger {
    async fn find_present(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Option<Attendance>, StoreError>;

    async fn record_presence(&self, entry: &NewAttendance) -> Result<Attendance, StoreError>;

    /// Admin verify/reject. Rejecting passes `status_override = Absent`.
    /// Returns the updated record, or None if the id does not exist.
    async fn set_verified(
        &self,
        id: u64,
        verified: bool,
        status_override: Option<AttendanceStatus>,
    ) -> Result<Option<Attendance>, StoreError>;
}

pub struct MySqlAttendanceLedger {
    pool: MySqlPool,
}

impl MySqlAttendanceLedger {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Attendance>, StoreError> {
        let record = sqlx::query_as::<_, Attendance>(
            r#"
            SELECT id, student_id, date, status, method, lat, lon,
                   photo_url, verified, recorded_by, created_at
            FROM attendance
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

impl AttendanceLedger for MySqlAttendanceLedger {
    async fn find_present(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Option<Attendance>, StoreError> {
        let record = sqlx::query_as::<_, Attendance>(
            r#"
            SELECT id, student_id, date, status, method, lat, lon,
                   photo_url, verified, recorded_by, created_at
            FROM attendance
            WHERE student_id = ?
            AND date = ?
            AND status = 'present'
            "#,
        )
        .bind(student_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn record_presence(&self, entry: &NewAttendance) -> Result<Attendance, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (student_id, date, status, method, lat, lon, photo_url, verified, recorded_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.student_id)
        .bind(entry.date)
        .bind(entry.status.to_string())
        .bind(entry.method.to_string())
        .bind(entry.lat)
        .bind(entry.lon)
        .bind(&entry.photo_url)
        .bind(entry.verified)
        .bind(&entry.recorded_by)
        .execute(&self.pool)
        .await?;

        let record = self
            .find_by_id(result.last_insert_id())
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        Ok(record)
    }

    async fn set_verified(
        &self,
        id: u64,
        verified: bool,
        status_override: Option<AttendanceStatus>,
    ) -> Result<Option<Attendance>, StoreError> {
        match status_override {
            Some(status) => {
                sqlx::query(
                    r#"
                    UPDATE attendance
                    SET verified = ?, status = ?
                    WHERE id = ?
                    "#,
                )
                .bind(verified)
                .bind(status.to_string())
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE attendance
                    SET verified = ?
                    WHERE id = ?
                    "#,
                )
                .bind(verified)
                .bind(id)
                .execute(&self.pool)
                .await?
            }
        };

        self.find_by_id(id).await
    }
}
