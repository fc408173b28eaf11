//! Repository for the `shared_links` table and the public-download path
//! contract.
//!
//! Tokens are high-entropy and opaque: 32 random bytes hashed to a hex
//! string. Expiry is checked in code against values this module wrote,
//! so the stored datetime encoding always compares consistently.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

/// Expiry horizon used for "unlimited" links.
const UNLIMITED_DAYS: i64 = 365 * 100;

/// Provides CRUD operations for share links.
pub struct ShareRepo;

impl ShareRepo {
    /// Create a link for `file_path` valid for `ttl_hours` from `now`
    /// (any non-positive TTL means effectively forever). Returns the
    /// opaque token.
    pub async fn create(
        pool: &SqlitePool,
        file_path: &str,
        ttl_hours: i64,
        now: NaiveDateTime,
    ) -> Result<String, sqlx::Error> {
        let token = generate_token();
        let expires_at = if ttl_hours > 0 {
            now + Duration::hours(ttl_hours)
        } else {
            now + Duration::days(UNLIMITED_DAYS)
        };

        sqlx::query("INSERT INTO shared_links (token, file_path, expires_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(file_path)
            .bind(expires_at)
            .execute(pool)
            .await?;
        Ok(token)
    }

    /// Resolve a token to its file path. Unknown and expired tokens both
    /// come back as `None` -- the public endpoint must not distinguish
    /// them.
    pub async fn resolve(
        pool: &SqlitePool,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String, NaiveDateTime)> =
            sqlx::query_as("SELECT file_path, expires_at FROM shared_links WHERE token = ?")
                .bind(token)
                .fetch_optional(pool)
                .await?;

        Ok(row.and_then(|(file_path, expires_at)| (now < expires_at).then_some(file_path)))
    }

    /// Delete expired rows, returning how many were removed.
    pub async fn delete_expired(pool: &SqlitePool, now: NaiveDateTime) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM shared_links WHERE expires_at < ?")
            .bind(now)
            .execute(pool)
            .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, "deleted expired share links");
        }
        Ok(removed)
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!("{:x}", Sha256::digest(bytes))
}

/// Resolve a stored share path against the data dir, refusing anything
/// that canonicalizes outside it. This is the invariant the public
/// download endpoint relies on -- a row must never grant access beyond
/// the artifact tree.
pub fn resolve_shared_path(data_dir: &Path, file_path: &str) -> Option<PathBuf> {
    let root = data_dir.canonicalize().ok()?;
    let candidate = root.join(file_path).canonicalize().ok()?;
    candidate.starts_with(&root).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn create_and_resolve_round_trip(pool: SqlitePool) {
        let now = dt("2025-01-02 12:00:00");
        let token = ShareRepo::create(&pool, "timelapse_1_week.webm", 24, now)
            .await
            .unwrap();

        let resolved = ShareRepo::resolve(&pool, &token, now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(resolved.as_deref(), Some("timelapse_1_week.webm"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn expired_token_resolves_to_none(pool: SqlitePool) {
        let now = dt("2025-01-02 12:00:00");
        let token = ShareRepo::create(&pool, "timelapse_1_week.webm", 1, now)
            .await
            .unwrap();

        let resolved = ShareRepo::resolve(&pool, &token, now + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(resolved, None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_token_resolves_to_none(pool: SqlitePool) {
        let now = dt("2025-01-02 12:00:00");
        assert_eq!(ShareRepo::resolve(&pool, "no-such-token", now).await.unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn non_positive_ttl_means_far_future(pool: SqlitePool) {
        let now = dt("2025-01-02 12:00:00");
        let token = ShareRepo::create(&pool, "latest_snapshot.jpg", 0, now)
            .await
            .unwrap();

        let much_later = NaiveDate::from_ymd_opt(2100, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let resolved = ShareRepo::resolve(&pool, &token, much_later).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("latest_snapshot.jpg"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sweep_deletes_only_expired_rows(pool: SqlitePool) {
        let now = dt("2025-01-02 12:00:00");
        let expired = ShareRepo::create(&pool, "a.webm", 1, now).await.unwrap();
        let live = ShareRepo::create(&pool, "b.webm", 48, now).await.unwrap();

        let later = now + Duration::hours(2);
        assert_eq!(ShareRepo::delete_expired(&pool, later).await.unwrap(), 1);
        assert_eq!(ShareRepo::resolve(&pool, &expired, later).await.unwrap(), None);
        assert!(ShareRepo::resolve(&pool, &live, later).await.unwrap().is_some());

        // A second sweep is a no-op.
        assert_eq!(ShareRepo::delete_expired(&pool, later).await.unwrap(), 0);
    }

    #[test]
    fn shared_paths_cannot_escape_the_data_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("timelapse_1_week.webm"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("gallery")).unwrap();
        std::fs::write(dir.path().join("gallery/2025-01-02-07.jpg"), b"x").unwrap();

        assert!(resolve_shared_path(dir.path(), "timelapse_1_week.webm").is_some());
        assert!(resolve_shared_path(dir.path(), "gallery/2025-01-02-07.jpg").is_some());
        assert!(resolve_shared_path(dir.path(), "../outside.txt").is_none());
        assert!(resolve_shared_path(dir.path(), "/etc/passwd").is_none());
        assert!(resolve_shared_path(dir.path(), "missing.webm").is_none());
    }
}
