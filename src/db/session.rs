//! Refresh session storage: one row per live refresh token.
//!
//! Access tokens are never stored; they are stateless and expire on their
//! own. Refresh tokens are persisted here so they can be rotated on use and
//! revoked before their natural expiry.

use sqlx::sqlite::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};

/// A refresh session record.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: i64,
    pub refresh_token: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    refresh_token: String,
    expires_at: String,
    created_at: String,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            refresh_token: row.refresh_token,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

/// Store for managing refresh sessions.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a session for a freshly issued refresh token. Returns the
    /// session ID.
    pub async fn create(
        &self,
        user_id: i64,
        refresh_token: &str,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let expires_at_str = timestamp_to_datetime(expires_at);

        let result = sqlx::query(
            "INSERT INTO sessions (user_id, refresh_token, expires_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(refresh_token)
        .bind(&expires_at_str)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a session by its refresh token, regardless of expiry.
    pub async fn find_by_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionRecord>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, refresh_token, expires_at, created_at FROM sessions WHERE refresh_token = ?",
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionRecord::from))
    }

    /// Get a session by its refresh token, excluding expired rows.
    pub async fn find_valid_by_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionRecord>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, refresh_token, expires_at, created_at FROM sessions WHERE refresh_token = ? AND expires_at > datetime('now')",
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionRecord::from))
    }

    /// Swap a session's token and expiry, but only if it still holds
    /// `prior_token`. Returns false when a concurrent rotation got there
    /// first; the caller must treat the token it read as already consumed.
    pub async fn rotate(
        &self,
        id: i64,
        prior_token: &str,
        new_token: &str,
        new_expires_at: u64,
    ) -> Result<bool, sqlx::Error> {
        let expires_at_str = timestamp_to_datetime(new_expires_at);

        let result = sqlx::query(
            "UPDATE sessions SET refresh_token = ?, expires_at = ? WHERE id = ? AND refresh_token = ?",
        )
        .bind(new_token)
        .bind(&expires_at_str)
        .bind(id)
        .bind(prior_token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a session by its refresh token (logout). Returns whether a row
    /// was deleted.
    pub async fn delete_by_token(&self, refresh_token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_token = ?")
            .bind(refresh_token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every session for a user (logout everywhere). Returns the count.
    pub async fn delete_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all expired sessions. The expiry comparison runs inside SQLite
    /// per row, so a session rotated to a future expiry mid-sweep is never
    /// touched.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= datetime('now')")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List a user's unexpired sessions, most recent first.
    pub async fn list_valid_by_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<SessionRecord>, sqlx::Error> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, refresh_token, expires_at, created_at FROM sessions WHERE user_id = ? AND expires_at > datetime('now') ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    /// Whether the user has at least one unexpired session.
    pub async fn has_valid_for_user(&self, user_id: i64) -> Result<bool, sqlx::Error> {
        let row: (i32,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE user_id = ? AND expires_at > datetime('now'))",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 != 0)
    }
}

/// Current Unix time in seconds. Clamps to zero if the clock reads before
/// the epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Convert a Unix timestamp to SQLite's "YYYY-MM-DD HH:MM:SS" form. This is
/// the format datetime('now') emits, so stored values compare correctly as
/// strings.
pub fn timestamp_to_datetime(timestamp: u64) -> String {
    let (year, month, day, hours, minutes, seconds) = civil_parts(timestamp);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hours, minutes, seconds
    )
}

/// The same instant rendered as ISO 8601 ("YYYY-MM-DDTHH:MM:SSZ") for API
/// responses and headers.
pub fn timestamp_to_iso8601(timestamp: u64) -> String {
    let (year, month, day, hours, minutes, seconds) = civil_parts(timestamp);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

/// Re-render a stored "YYYY-MM-DD HH:MM:SS" value as ISO 8601.
pub fn datetime_to_iso8601(datetime: &str) -> String {
    format!("{}Z", datetime.replacen(' ', "T", 1))
}

fn civil_parts(timestamp: u64) -> (i32, u32, u32, u64, u64, u64) {
    let days_since_epoch = timestamp / 86400;
    let time_of_day = timestamp % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = days_to_ymd(days_since_epoch as i64);
    (year, month, day, hours, minutes, seconds)
}

/// Convert days since Unix epoch to year, month, day.
fn days_to_ymd(days: i64) -> (i32, u32, u32) {
    // Algorithm from http://howardhinnant.github.io/date_algorithms.html
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}
