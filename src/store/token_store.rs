use crate::model::attendance_token::AttendanceToken;
use crate::store::{StoreError, is_duplicate_key};
use sqlx::MySqlPool;

/// Durable record of issued tokens and their single-use state.
#[allow(async_fn_in_trait)]
pub trait TokenStore {
    async fn create(&self, record: &AttendanceToken) -> Result<(), StoreError>;

    async fn find(&self, token: &str) -> Result<Option<AttendanceToken>, StoreError>;

    /// Atomically flip `used` from false to true and bind the redeeming
    /// student. Returns false when the token is absent or already used;
    /// exactly one of two racing callers can see true.
    async fn mark_used(&self, token: &str, used_by: u64) -> Result<bool, StoreError>;
}

pub struct MySqlTokenStore {
    pool: MySqlPool,
}

impl MySqlTokenStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl TokenStore for MySqlTokenStore {
    async fn create(&self, record: &AttendanceToken) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_tokens
                (token, kiosk_id, issued_at, expires_at, target_date, used)
            VALUES (?, ?, ?, ?, ?, FALSE)
            "#,
        )
        .bind(&record.token)
        .bind(&record.kiosk_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.target_date)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::DuplicateToken),
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, token: &str) -> Result<Option<AttendanceToken>, StoreError> {
        let record = sqlx::query_as::<_, AttendanceToken>(
            r#"
            SELECT token, kiosk_id, issued_at, expires_at, target_date, used, used_by
            FROM attendance_tokens
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_used(&self, token: &str, used_by: u64) -> Result<bool, StoreError> {
        // single guarded update: the check and the set happen in one statement
        let result = sqlx::query(
            r#"
            UPDATE attendance_tokens
            SET used = TRUE, used_by = ?
            WHERE token = ?
            AND used = FALSE
            "#,
        )
        .bind(used_by)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
