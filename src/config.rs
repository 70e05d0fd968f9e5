use std::env;

/// Runtime configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: String,
    pub upload_dir: String,
    /// Emails that register as moderators. This keeps the small fixed
    /// privileged group as configuration rather than hardcoded ids.
    pub moderators: Vec<String>,
}

impl Config {
    pub fn from_env() -> Config {
        Config {
            bind_addr: env::var("STUDYSHARE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_path: env::var("STUDYSHARE_DB")
                .unwrap_or_else(|_| "studyshare.db".to_string()),
            upload_dir: env::var("STUDYSHARE_UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".to_string()),
            moderators: env::var("STUDYSHARE_MODERATORS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn is_moderator_email(&self, email: &str) -> bool {
        self.moderators.iter().any(|m| m == email)
    }
}
