use crate::error::AppError;
use axum::body::Bytes;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Input to ingestion: either raw upload bytes, or a path that was already
/// resolved by a previous ingestion (re-use without re-upload).
pub enum FileUpload {
    Bytes { file_name: String, data: Bytes },
    Resolved(String),
}

/// Strips any path components and reduces the name to `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(|c| c == '.' || c == '_');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Writes an upload to the storage directory under a collision-resistant
/// name (fresh UUID prefix on the sanitized original name) and returns the
/// resulting relative path. Already-resolved paths pass through unchanged.
pub async fn ingest(upload_dir: &str, upload: FileUpload) -> Result<String, AppError> {
    match upload {
        FileUpload::Resolved(path) => Ok(path),
        FileUpload::Bytes { file_name, data } => {
            if data.is_empty() {
                return Err(AppError::Validation("please upload a file".to_string()));
            }

            let unique_name = format!("{}_{}", Uuid::new_v4(), sanitize_file_name(&file_name));
            fs::create_dir_all(upload_dir).await?;
            let path = Path::new(upload_dir).join(unique_name);
            fs::write(&path, &data).await?;
            Ok(path.to_string_lossy().into_owned())
        }
    }
}

/// Best-effort removal of a stored file after its record is gone. A failure
/// leaves an orphaned file behind, which is logged and otherwise ignored.
pub async fn remove_stored_file(path: &str) {
    if let Err(err) = fs::remove_file(path).await {
        tracing::warn!(path, error = %err, "could not remove stored file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, data: &[u8]) -> FileUpload {
        FileUpload::Bytes {
            file_name: name.to_string(),
            data: Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn sanitize_strips_paths_and_unsafe_characters() {
        assert_eq!(sanitize_file_name("notes.pdf"), "notes.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("week 1 (final).pdf"), "week_1__final_.pdf");
        assert_eq!(sanitize_file_name("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("///"), "upload");
    }

    #[tokio::test]
    async fn identical_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_str().unwrap();

        let a = ingest(dir_path, upload("notes.pdf", b"one")).await.unwrap();
        let b = ingest(dir_path, upload("notes.pdf", b"two")).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(tokio::fs::read(&a).await.unwrap(), b"one");
        assert_eq!(tokio::fs::read(&b).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn resolved_paths_pass_through() {
        let path = ingest("unused", FileUpload::Resolved("uploads/existing.pdf".to_string()))
            .await
            .unwrap();
        assert_eq!(path, "uploads/existing.pdf");
    }

    #[tokio::test]
    async fn empty_uploads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = ingest(dir.path().to_str().unwrap(), upload("notes.pdf", b"")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn ingest_creates_the_upload_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("uploads");
        let nested = nested.to_str().unwrap();

        let path = ingest(nested, upload("a.txt", b"x")).await.unwrap();
        assert!(tokio::fs::try_exists(&path).await.unwrap());
    }
}
