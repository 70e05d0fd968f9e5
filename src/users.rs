//! Credential store: user records, registration uniqueness, password
//! verification, profile updates, and moderated deletion.

use crate::auth;
use crate::db::{self, DbConnection};
use crate::error::AppError;
use crate::models::{Identity, Role, User};
use crate::upload;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: db::read_role(row, 4)?,
        profile_picture: row.get(5)?,
    })
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, profile_picture";

fn fetch_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [user_id],
        row_to_user,
    )
    .optional()
}

/// Creates a new account. A single combined check rejects the registration
/// when either the username or the email is already taken.
pub async fn register(
    conn: &DbConnection,
    username: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, AppError> {
    if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "username, email and password are required".to_string(),
        ));
    }

    let password_hash = auth::hash_password(password)?;
    let conn = conn.lock().await;

    let taken = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1 OR email = ?2",
            params![username, email],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if taken {
        return Err(AppError::Duplicate);
    }

    conn.execute(
        "INSERT INTO users (username, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
        params![username, email, password_hash, role.as_str()],
    )?;

    let id = conn.last_insert_rowid();
    fetch_user(&conn, id)?.ok_or(AppError::NotFound("user"))
}

/// Login check: lookup by email, then bcrypt comparison. Unknown email and
/// wrong password are indistinguishable to the caller.
pub async fn verify(conn: &DbConnection, email: &str, password: &str) -> Result<User, AppError> {
    let user = conn
        .lock()
        .await
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [email],
            row_to_user,
        )
        .optional()?;

    match user {
        Some(user) if auth::verify_password(password, &user.password_hash) => Ok(user),
        _ => Err(AppError::Auth),
    }
}

pub async fn get_user(conn: &DbConnection, user_id: i64) -> Result<User, AppError> {
    fetch_user(&*conn.lock().await, user_id)?.ok_or(AppError::NotFound("user"))
}

/// Admin surface: full account listing, moderators only.
pub async fn list_users(conn: &DbConnection, identity: &Identity) -> Result<Vec<User>, AppError> {
    auth::require_moderator(identity)?;

    let conn = conn.lock().await;
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

/// Replaces the caller's password. The current password must verify first;
/// a session alone is not enough to rotate credentials.
pub async fn change_password(
    conn: &DbConnection,
    identity: &Identity,
    current_password: &str,
    new_password: &str,
) -> Result<(), AppError> {
    if new_password.is_empty() {
        return Err(AppError::Validation("new password is required".to_string()));
    }

    let new_hash = auth::hash_password(new_password)?;
    let conn = conn.lock().await;
    let user = fetch_user(&conn, identity.user_id)?.ok_or(AppError::NotFound("user"))?;

    if !auth::verify_password(current_password, &user.password_hash) {
        return Err(AppError::Auth);
    }

    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![new_hash, identity.user_id],
    )?;
    Ok(())
}

/// Partial profile update, permitted to the account owner and to moderators.
/// Uniqueness is not re-checked here; a username collision surfaces through
/// the schema constraint as `Duplicate`.
pub async fn set_profile(
    conn: &DbConnection,
    identity: &Identity,
    target_id: i64,
    username: Option<&str>,
    email: Option<&str>,
    profile_picture: Option<String>,
) -> Result<User, AppError> {
    auth::authorize(identity, target_id)?;

    let conn = conn.lock().await;
    let mut user = fetch_user(&conn, target_id)?.ok_or(AppError::NotFound("user"))?;

    if let Some(username) = username {
        user.username = username.to_string();
    }
    if let Some(email) = email {
        user.email = email.to_string();
    }
    if let Some(picture) = profile_picture {
        user.profile_picture = Some(picture);
    }

    conn.execute(
        "UPDATE users SET username = ?1, email = ?2, profile_picture = ?3 WHERE id = ?4",
        params![user.username, user.email, user.profile_picture, target_id],
    )?;
    Ok(user)
}

/// Moderator-only account removal. Owned posts and music are cascaded in the
/// same operation; their stored files are removed best-effort afterwards.
pub async fn delete_user(
    conn: &DbConnection,
    identity: &Identity,
    user_id: i64,
) -> Result<(), AppError> {
    auth::require_moderator(identity)?;

    let orphaned_files = {
        let conn = conn.lock().await;
        let user = fetch_user(&conn, user_id)?.ok_or(AppError::NotFound("user"))?;

        let mut stmt = conn.prepare("SELECT file_path FROM posts WHERE user_id = ?1")?;
        let mut paths = stmt
            .query_map([user_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        if let Some(picture) = user.profile_picture {
            paths.push(picture);
        }

        conn.execute("DELETE FROM posts WHERE user_id = ?1", [user_id])?;
        conn.execute("DELETE FROM music WHERE user_id = ?1", [user_id])?;
        conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?;
        conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
        paths
    };

    for path in &orphaned_files {
        upload::remove_stored_file(path).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::establish_connection;

    async fn setup() -> DbConnection {
        establish_connection(":memory:").unwrap()
    }

    async fn add_user(conn: &DbConnection, name: &str, role: Role) -> User {
        register(conn, name, &format!("{name}@x.com"), "pw1", role)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected() {
        let conn = setup().await;
        let alice = register(&conn, "alice", "a@x.com", "pw1", Role::Standard)
            .await
            .unwrap();

        let same_name = register(&conn, "alice", "b@x.com", "pw2", Role::Standard).await;
        assert!(matches!(same_name, Err(AppError::Duplicate)));

        let same_email = register(&conn, "bob", "a@x.com", "pw2", Role::Standard).await;
        assert!(matches!(same_email, Err(AppError::Duplicate)));

        let bob = register(&conn, "bob", "b@x.com", "pw2", Role::Standard)
            .await
            .unwrap();
        assert_ne!(alice.id, bob.id);
    }

    #[tokio::test]
    async fn verify_matches_email_and_password_only() {
        let conn = setup().await;
        let alice = add_user(&conn, "alice", Role::Standard).await;

        let found = verify(&conn, "alice@x.com", "pw1").await.unwrap();
        assert_eq!(found.id, alice.id);

        assert!(matches!(
            verify(&conn, "alice@x.com", "wrong").await,
            Err(AppError::Auth)
        ));
        assert!(matches!(
            verify(&conn, "nobody@x.com", "pw1").await,
            Err(AppError::Auth)
        ));
    }

    #[tokio::test]
    async fn password_is_never_stored_in_cleartext() {
        let conn = setup().await;
        let alice = add_user(&conn, "alice", Role::Standard).await;
        assert_ne!(alice.password_hash, "pw1");
        assert!(!alice.password_hash.contains("pw1"));
    }

    #[tokio::test]
    async fn change_password_requires_the_current_one() {
        let conn = setup().await;
        let alice = add_user(&conn, "alice", Role::Standard).await;
        let identity = alice.identity();

        assert!(matches!(
            change_password(&conn, &identity, "wrong", "pw2").await,
            Err(AppError::Auth)
        ));

        change_password(&conn, &identity, "pw1", "pw2").await.unwrap();
        assert!(verify(&conn, "alice@x.com", "pw2").await.is_ok());
        assert!(matches!(
            verify(&conn, "alice@x.com", "pw1").await,
            Err(AppError::Auth)
        ));
    }

    #[tokio::test]
    async fn profile_updates_are_gated_by_ownership() {
        let conn = setup().await;
        let alice = add_user(&conn, "alice", Role::Standard).await;
        let bob = add_user(&conn, "bob", Role::Standard).await;
        let moderator = add_user(&conn, "mod", Role::Moderator).await;

        let stranger = set_profile(
            &conn,
            &bob.identity(),
            alice.id,
            Some("hijacked"),
            None,
            None,
        )
        .await;
        assert!(matches!(stranger, Err(AppError::Forbidden)));

        let updated = set_profile(
            &conn,
            &alice.identity(),
            alice.id,
            Some("alice2"),
            None,
            Some("uploads/pic.png".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(updated.username, "alice2");
        assert_eq!(updated.email, "alice@x.com");
        assert_eq!(updated.profile_picture.as_deref(), Some("uploads/pic.png"));

        let moderated = set_profile(
            &conn,
            &moderator.identity(),
            alice.id,
            None,
            Some("new@x.com"),
            None,
        )
        .await
        .unwrap();
        assert_eq!(moderated.email, "new@x.com");
        assert_eq!(moderated.username, "alice2");
    }

    #[tokio::test]
    async fn username_collision_on_update_is_duplicate() {
        let conn = setup().await;
        let alice = add_user(&conn, "alice", Role::Standard).await;
        add_user(&conn, "bob", Role::Standard).await;

        let result = set_profile(&conn, &alice.identity(), alice.id, Some("bob"), None, None).await;
        assert!(matches!(result, Err(AppError::Duplicate)));
    }

    #[tokio::test]
    async fn deletion_is_moderator_only_and_cascades() {
        let conn = setup().await;
        let alice = add_user(&conn, "alice", Role::Standard).await;
        let moderator = add_user(&conn, "mod", Role::Moderator).await;

        conn.lock()
            .await
            .execute(
                "INSERT INTO posts (file_name, file_path, posted_at, user_id)
                 VALUES ('notes', 'uploads/x', '2024-01-01T00:00:00+00:00', ?1)",
                [alice.id],
            )
            .unwrap();
        conn.lock()
            .await
            .execute(
                "INSERT INTO music (music_link, music_name, posted_at, user_id)
                 VALUES ('abc', 'lofi', '2024-01-01T00:00:00+00:00', ?1)",
                [alice.id],
            )
            .unwrap();

        assert!(matches!(
            delete_user(&conn, &alice.identity(), moderator.id).await,
            Err(AppError::Forbidden)
        ));

        delete_user(&conn, &moderator.identity(), alice.id)
            .await
            .unwrap();

        assert!(matches!(
            get_user(&conn, alice.id).await,
            Err(AppError::NotFound(_))
        ));
        let remaining: i64 = conn
            .lock()
            .await
            .query_row(
                "SELECT COUNT(*) FROM posts WHERE user_id = ?1",
                [alice.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0);
        let remaining: i64 = conn
            .lock()
            .await
            .query_row(
                "SELECT COUNT(*) FROM music WHERE user_id = ?1",
                [alice.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn deleting_an_unknown_user_is_not_found() {
        let conn = setup().await;
        let moderator = add_user(&conn, "mod", Role::Moderator).await;
        assert!(matches!(
            delete_user(&conn, &moderator.identity(), 999).await,
            Err(AppError::NotFound(_))
        ));
    }
}
