//! Content store: posts and music records, ownership-gated CRUD, and the
//! handoff to file ingestion.

use crate::auth;
use crate::db::{self, DbConnection};
use crate::error::AppError;
use crate::models::{Identity, Music, Post};
use crate::upload::{self, FileUpload};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        file_name: row.get(1)?,
        file_description: row.get(2)?,
        file_path: row.get(3)?,
        posted_at: db::read_timestamp(row, 4)?,
        user_id: row.get(5)?,
    })
}

fn row_to_music(row: &Row<'_>) -> rusqlite::Result<Music> {
    Ok(Music {
        id: row.get(0)?,
        music_link: row.get(1)?,
        music_name: row.get(2)?,
        posted_at: db::read_timestamp(row, 3)?,
        user_id: row.get(4)?,
    })
}

const POST_COLUMNS: &str = "id, file_name, file_description, file_path, posted_at, user_id";
const MUSIC_COLUMNS: &str = "id, music_link, music_name, posted_at, user_id";

/// Ingests the upload first, then persists the record, so a failed file
/// write never leaves a post pointing at nothing. The reverse (file written,
/// insert failed) leaves an orphaned file, which is accepted.
pub async fn create_post(
    conn: &DbConnection,
    upload_dir: &str,
    identity: &Identity,
    file_name: &str,
    file_description: Option<&str>,
    file: FileUpload,
) -> Result<Post, AppError> {
    if file_name.trim().is_empty() {
        return Err(AppError::Validation("a post name is required".to_string()));
    }

    let file_path = upload::ingest(upload_dir, file).await?;
    let now = Utc::now();

    let conn = conn.lock().await;
    conn.execute(
        "INSERT INTO posts (file_name, file_description, file_path, posted_at, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            file_name,
            file_description,
            file_path,
            now.to_rfc3339(),
            identity.user_id
        ],
    )?;

    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
        [id],
        row_to_post,
    )
    .map_err(AppError::from)
}

pub async fn get_post(conn: &DbConnection, post_id: i64) -> Result<Post, AppError> {
    conn.lock()
        .await
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
            [post_id],
            row_to_post,
        )
        .optional()?
        .ok_or(AppError::NotFound("post"))
}

/// All posts, newest first (descending id).
pub async fn list_posts(conn: &DbConnection) -> Result<Vec<Post>, AppError> {
    let conn = conn.lock().await;
    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} FROM posts ORDER BY id DESC"
    ))?;
    let posts = stmt
        .query_map([], row_to_post)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(posts)
}

/// Metadata-only edit (the stored file is never replaced), permitted to the
/// owner and to moderators.
pub async fn update_post(
    conn: &DbConnection,
    identity: &Identity,
    post_id: i64,
    file_name: Option<&str>,
    file_description: Option<&str>,
) -> Result<Post, AppError> {
    let conn = conn.lock().await;
    let mut post = conn
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
            [post_id],
            row_to_post,
        )
        .optional()?
        .ok_or(AppError::NotFound("post"))?;
    auth::authorize(identity, post.user_id)?;

    if let Some(file_name) = file_name {
        post.file_name = file_name.to_string();
    }
    if let Some(description) = file_description {
        post.file_description = Some(description.to_string());
    }

    conn.execute(
        "UPDATE posts SET file_name = ?1, file_description = ?2 WHERE id = ?3",
        params![post.file_name, post.file_description, post_id],
    )?;
    Ok(post)
}

/// Removes the record, then best-effort removes the stored file. Cleanup
/// failure is logged and never rolls back the delete.
pub async fn delete_post(
    conn: &DbConnection,
    identity: &Identity,
    post_id: i64,
) -> Result<(), AppError> {
    let file_path = {
        let conn = conn.lock().await;
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                [post_id],
                row_to_post,
            )
            .optional()?
            .ok_or(AppError::NotFound("post"))?;
        auth::authorize(identity, post.user_id)?;

        conn.execute("DELETE FROM posts WHERE id = ?1", [post_id])?;
        post.file_path
    };

    upload::remove_stored_file(&file_path).await;
    Ok(())
}

/// The submitted link is reduced to its trailing path segment before it is
/// stored; edits later replace the value verbatim.
pub fn normalize_music_link(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or_default()
}

pub async fn create_music(
    conn: &DbConnection,
    identity: &Identity,
    music_link: &str,
    music_name: &str,
) -> Result<Music, AppError> {
    if music_link.trim().is_empty() {
        return Err(AppError::Validation("a music link is required".to_string()));
    }

    let link = normalize_music_link(music_link);
    let now = Utc::now();

    let conn = conn.lock().await;
    conn.execute(
        "INSERT INTO music (music_link, music_name, posted_at, user_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![link, music_name, now.to_rfc3339(), identity.user_id],
    )?;

    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {MUSIC_COLUMNS} FROM music WHERE id = ?1"),
        [id],
        row_to_music,
    )
    .map_err(AppError::from)
}

pub async fn get_music(conn: &DbConnection, music_id: i64) -> Result<Music, AppError> {
    conn.lock()
        .await
        .query_row(
            &format!("SELECT {MUSIC_COLUMNS} FROM music WHERE id = ?1"),
            [music_id],
            row_to_music,
        )
        .optional()?
        .ok_or(AppError::NotFound("music"))
}

pub async fn list_music(conn: &DbConnection) -> Result<Vec<Music>, AppError> {
    let conn = conn.lock().await;
    let mut stmt = conn.prepare(&format!(
        "SELECT {MUSIC_COLUMNS} FROM music ORDER BY id DESC"
    ))?;
    let music = stmt
        .query_map([], row_to_music)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(music)
}

pub async fn update_music(
    conn: &DbConnection,
    identity: &Identity,
    music_id: i64,
    music_link: Option<&str>,
    music_name: Option<&str>,
) -> Result<Music, AppError> {
    let conn = conn.lock().await;
    let mut music = conn
        .query_row(
            &format!("SELECT {MUSIC_COLUMNS} FROM music WHERE id = ?1"),
            [music_id],
            row_to_music,
        )
        .optional()?
        .ok_or(AppError::NotFound("music"))?;
    auth::authorize(identity, music.user_id)?;

    // Edits store the submitted link as-is; normalization is create-only.
    if let Some(link) = music_link {
        music.music_link = link.to_string();
    }
    if let Some(name) = music_name {
        music.music_name = name.to_string();
    }

    conn.execute(
        "UPDATE music SET music_link = ?1, music_name = ?2 WHERE id = ?3",
        params![music.music_link, music.music_name, music_id],
    )?;
    Ok(music)
}

pub async fn delete_music(
    conn: &DbConnection,
    identity: &Identity,
    music_id: i64,
) -> Result<(), AppError> {
    let conn = conn.lock().await;
    let owner_id = conn
        .query_row(
            "SELECT user_id FROM music WHERE id = ?1",
            [music_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .ok_or(AppError::NotFound("music"))?;
    auth::authorize(identity, owner_id)?;

    conn.execute("DELETE FROM music WHERE id = ?1", [music_id])?;
    Ok(())
}
