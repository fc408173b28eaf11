//! Repository for the `users` table.
//!
//! Password hashes use Argon2id in PHC string format so the parameters
//! and salt travel with the hash. The session/cookie side of
//! authentication lives in the external HTTP layer; this module only
//! stores accounts and answers credential checks.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::SqlitePool;

use crate::models::User;

/// Provides account storage and credential verification.
pub struct UserRepo;

impl UserRepo {
    pub async fn exists(pool: &SqlitePool, username: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Create an account. Fails when the username is taken.
    pub async fn create(
        pool: &SqlitePool,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<i64, sqlx::Error> {
        let hash = hash_password(password)
            .map_err(|err| sqlx::Error::Protocol(format!("password hashing failed: {err}")))?;
        let result =
            sqlx::query("INSERT INTO users (username, password_hash, is_admin) VALUES (?, ?, ?)")
                .bind(username)
                .bind(hash)
                .bind(is_admin)
                .execute(pool)
                .await?;
        tracing::info!(username, is_admin, "created user");
        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_username(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, is_admin FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Verify a username/password pair, returning the user on success
    /// and `None` for unknown users and wrong passwords alike.
    pub async fn verify_credentials(
        pool: &SqlitePool,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(pool)
                .await?;
        let Some((hash,)) = row else {
            return Ok(None);
        };
        if !verify_password(password, &hash) {
            return Ok(None);
        }
        Self::get_by_username(pool, username).await
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, is_admin FROM users ORDER BY username")
            .fetch_all(pool)
            .await
    }

    pub async fn update_password(
        pool: &SqlitePool,
        username: &str,
        new_password: &str,
    ) -> Result<(), sqlx::Error> {
        let hash = hash_password(new_password)
            .map_err(|err| sqlx::Error::Protocol(format!("password hashing failed: {err}")))?;
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE username = ?")
            .bind(hash)
            .bind(username)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, username: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}

/// Hash a password with Argon2id and a fresh random salt.
fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Constant-time verification against a stored PHC hash. Malformed
/// hashes count as a failed check rather than an error.
fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("invalid password hash format in users table");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
