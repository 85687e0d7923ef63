pub mod attendance_ledger;
pub mod token_store;

use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum StoreError {
    /// Primary-key collision on token insert. The 128-bit nonce makes this
    /// practically unreachable, but it must surface as a hard failure so the
    /// kiosk re-issues.
    #[display(fmt = "Duplicate token")]
    DuplicateToken,
    #[display(fmt = "Database error: {}", _0)]
    Database(#[error(source)] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// MySQL reports unique-key violations under SQLSTATE 23000.
pub(crate) fn is_duplicate_key(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23000"))
}
