use chrono::{DateTime, Utc};
use serde::Serialize;

/// Privilege level attached to a user account. Moderators may view, edit,
/// and delete any record through the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Standard,
    Moderator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Moderator => "moderator",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "standard" => Some(Role::Standard),
            "moderator" => Some(Role::Moderator),
            _ => None,
        }
    }
}

/// The request-scoped identity resolved from a session token. Every mutating
/// operation receives one of these explicitly; there is no ambient session.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub profile_picture: Option<String>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            role: self.role,
        }
    }
}

/// An uploaded file shared by a user. `file_path` is always produced by
/// ingestion, never taken verbatim from client input.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub file_name: String,
    pub file_description: Option<String>,
    pub file_path: String,
    pub posted_at: DateTime<Utc>,
    pub user_id: i64,
}

/// A reference to an external audio link. Only the trailing path segment of
/// the submitted link is kept.
#[derive(Debug, Clone, Serialize)]
pub struct Music {
    pub id: i64,
    pub music_link: String,
    pub music_name: String,
    pub posted_at: DateTime<Utc>,
    pub user_id: i64,
}
