//! Feed assembly: the read-only dashboard view joining content with each
//! author's display data. Posts and music stay in separate lists for the
//! renderer and are each ordered newest first.

use crate::db::{self, DbConnection};
use crate::error::AppError;
use crate::models::{Music, Post};
use rusqlite::Row;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuthorDisplay {
    pub id: i64,
    pub username: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedPost {
    pub post: Post,
    pub author: AuthorDisplay,
}

#[derive(Debug, Serialize)]
pub struct FeedMusic {
    pub music: Music,
    pub author: AuthorDisplay,
}

#[derive(Debug, Serialize)]
pub struct Feed {
    pub posts: Vec<FeedPost>,
    pub music: Vec<FeedMusic>,
}

fn row_to_author(row: &Row<'_>, offset: usize) -> rusqlite::Result<AuthorDisplay> {
    Ok(AuthorDisplay {
        id: row.get(offset)?,
        username: row.get(offset + 1)?,
        profile_picture: row.get(offset + 2)?,
    })
}

pub async fn build_feed(conn: &DbConnection) -> Result<Feed, AppError> {
    let conn = conn.lock().await;

    let mut stmt = conn.prepare(
        "SELECT p.id, p.file_name, p.file_description, p.file_path, p.posted_at, p.user_id,
                u.id, u.username, u.profile_picture
         FROM posts p JOIN users u ON u.id = p.user_id
         ORDER BY p.id DESC",
    )?;
    let posts = stmt
        .query_map([], |row| {
            Ok(FeedPost {
                post: Post {
                    id: row.get(0)?,
                    file_name: row.get(1)?,
                    file_description: row.get(2)?,
                    file_path: row.get(3)?,
                    posted_at: db::read_timestamp(row, 4)?,
                    user_id: row.get(5)?,
                },
                author: row_to_author(row, 6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT m.id, m.music_link, m.music_name, m.posted_at, m.user_id,
                u.id, u.username, u.profile_picture
         FROM music m JOIN users u ON u.id = m.user_id
         ORDER BY m.id DESC",
    )?;
    let music = stmt
        .query_map([], |row| {
            Ok(FeedMusic {
                music: Music {
                    id: row.get(0)?,
                    music_link: row.get(1)?,
                    music_name: row.get(2)?,
                    posted_at: db::read_timestamp(row, 3)?,
                    user_id: row.get(4)?,
                },
                author: row_to_author(row, 5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Feed { posts, music })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content;
    use crate::db::establish_connection;
    use crate::models::Role;
    use crate::upload::FileUpload;
    use crate::users;
    use axum::body::Bytes;

    #[tokio::test]
    async fn feed_orders_newest_first_and_annotates_authors() {
        let conn = establish_connection(":memory:").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_str().unwrap();

        let alice = users::register(&conn, "alice", "a@x.com", "pw1", Role::Standard)
            .await
            .unwrap();
        users::set_profile(
            &conn,
            &alice.identity(),
            alice.id,
            None,
            None,
            Some("uploads/alice.png".to_string()),
        )
        .await
        .unwrap();
        let bob = users::register(&conn, "bob", "b@x.com", "pw1", Role::Standard)
            .await
            .unwrap();

        let mut post_ids = Vec::new();
        for (owner, name) in [(&alice, "one"), (&bob, "two"), (&alice, "three")] {
            let post = content::create_post(
                &conn,
                dir_path,
                &owner.identity(),
                name,
                None,
                FileUpload::Bytes {
                    file_name: "notes.pdf".to_string(),
                    data: Bytes::from_static(b"x"),
                },
            )
            .await
            .unwrap();
            post_ids.push(post.id);
        }
        content::create_music(&conn, &bob.identity(), "https://a/b/first", "first")
            .await
            .unwrap();
        let last_music = content::create_music(&conn, &alice.identity(), "second", "second")
            .await
            .unwrap();

        let feed = build_feed(&conn).await.unwrap();

        let ids: Vec<i64> = feed.posts.iter().map(|p| p.post.id).collect();
        assert_eq!(ids, vec![post_ids[2], post_ids[1], post_ids[0]]);

        assert_eq!(feed.posts[0].author.username, "alice");
        assert_eq!(
            feed.posts[0].author.profile_picture.as_deref(),
            Some("uploads/alice.png")
        );
        assert_eq!(feed.posts[1].author.username, "bob");
        assert_eq!(feed.posts[1].author.profile_picture, None);

        assert_eq!(feed.music[0].music.id, last_music.id);
        assert_eq!(feed.music[0].author.id, alice.id);
        assert_eq!(feed.music[1].author.id, bob.id);
    }

    #[tokio::test]
    async fn empty_store_yields_an_empty_feed() {
        let conn = establish_connection(":memory:").unwrap();
        let feed = build_feed(&conn).await.unwrap();
        assert!(feed.posts.is_empty());
        assert!(feed.music.is_empty());
    }
}
