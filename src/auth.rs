use crate::db::{self, DbConnection};
use crate::error::AppError;
use crate::models::{Identity, Role};
use axum::http::{header, HeaderMap};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rand::Rng;
use rusqlite::{params, OptionalExtension};

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(hash(password, DEFAULT_COST)?)
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    verify(password, password_hash).unwrap_or(false)
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Issues a fresh session token for a user after successful verification.
pub async fn create_session(conn: &DbConnection, user_id: i64) -> Result<String, AppError> {
    let token = generate_token();
    let now = Utc::now();

    conn.lock().await.execute(
        "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, now.to_rfc3339()],
    )?;

    Ok(token)
}

pub async fn destroy_session(conn: &DbConnection, token: &str) -> Result<(), AppError> {
    conn.lock()
        .await
        .execute("DELETE FROM sessions WHERE token = ?1", [token])?;
    Ok(())
}

pub fn token_from_headers(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthenticated)
}

/// Resolves the session token carried on a request into a request-scoped
/// identity. An absent or unknown token is `Unauthenticated`.
pub async fn authenticate(
    conn: &DbConnection,
    headers: &HeaderMap,
) -> Result<Identity, AppError> {
    let token = token_from_headers(headers)?;

    conn.lock()
        .await
        .query_row(
            "SELECT users.id, users.role FROM sessions
             JOIN users ON users.id = sessions.user_id
             WHERE sessions.token = ?1",
            [token],
            |row| {
                Ok(Identity {
                    user_id: row.get(0)?,
                    role: db::read_role(row, 1)?,
                })
            },
        )
        .optional()?
        .ok_or(AppError::Unauthenticated)
}

/// The single ownership/privilege gate: a mutation on a record owned by
/// `owner_id` is permitted to the owner and to moderators, nobody else.
pub fn authorize(identity: &Identity, owner_id: i64) -> Result<(), AppError> {
    if identity.user_id == owner_id || identity.role == Role::Moderator {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn require_moderator(identity: &Identity) -> Result<(), AppError> {
    if identity.role == Role::Moderator {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
