use crate::auth;
use crate::config::Config;
use crate::content;
use crate::db::DbConnection;
use crate::error::AppError;
use crate::feed::{self, AuthorDisplay};
use crate::models::{Music, Post, Role, User};
use crate::upload::{self, FileUpload};
use crate::users;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs;
use tokio_util::io::ReaderStream;

#[derive(Clone)]
pub struct AppState {
    pub conn: DbConnection,
    pub config: Arc<Config>,
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("malformed upload: {err}"))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    user: User,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = if state.config.is_moderator_email(&body.email) {
        Role::Moderator
    } else {
        Role::Standard
    };

    let user = users::register(&state.conn, &body.username, &body.email, &body.password, role)
        .await?;
    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = users::verify(&state.conn, &body.email, &body.password).await?;
    let token = auth::create_session(&state.conn, user.id).await?;
    Ok(Json(LoginResponse { token, user }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = auth::token_from_headers(&headers)?;
    auth::destroy_session(&state.conn, token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    auth::authenticate(&state.conn, &headers).await?;
    let feed = feed::build_feed(&state.conn).await?;
    Ok(Json(feed))
}

pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;

    let mut file = None;
    let mut file_name = String::new();
    let mut file_description = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(bad_multipart)?;
                file = Some(FileUpload::Bytes {
                    file_name: original,
                    data,
                });
            }
            "file_name" => file_name = field.text().await.map_err(bad_multipart)?,
            "file_description" => {
                file_description = Some(field.text().await.map_err(bad_multipart)?);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::Validation("please upload a file".to_string()))?;
    let post = content::create_post(
        &state.conn,
        &state.config.upload_dir,
        &identity,
        &file_name,
        file_description.as_deref(),
        file,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(content::get_post(&state.conn, post_id).await?))
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    file_name: Option<String>,
    file_description: Option<String>,
}

pub async fn update_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<i64>,
    Json(body): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    let post = content::update_post(
        &state.conn,
        &identity,
        post_id,
        body.file_name.as_deref(),
        body.file_description.as_deref(),
    )
    .await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    content::delete_post(&state.conn, &identity, post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Response, AppError> {
    let post = content::get_post(&state.conn, post_id).await?;

    let file = fs::File::open(&post.file_path)
        .await
        .map_err(|_| AppError::NotFound("file"))?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mime_type = mime_guess::from_path(&post.file_path).first_or_octet_stream();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        upload::sanitize_file_name(&post.file_name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, mime_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct CreateMusicRequest {
    music_link: String,
    music_name: String,
}

pub async fn create_music(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateMusicRequest>,
) -> Result<impl IntoResponse, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    let music =
        content::create_music(&state.conn, &identity, &body.music_link, &body.music_name).await?;
    Ok((StatusCode::CREATED, Json(music)))
}

pub async fn get_music(
    State(state): State<AppState>,
    Path(music_id): Path<i64>,
) -> Result<Json<Music>, AppError> {
    Ok(Json(content::get_music(&state.conn, music_id).await?))
}

#[derive(Deserialize)]
pub struct UpdateMusicRequest {
    music_link: Option<String>,
    music_name: Option<String>,
}

pub async fn update_music(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(music_id): Path<i64>,
    Json(body): Json<UpdateMusicRequest>,
) -> Result<Json<Music>, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    let music = content::update_music(
        &state.conn,
        &identity,
        music_id,
        body.music_link.as_deref(),
        body.music_name.as_deref(),
    )
    .await?;
    Ok(Json(music))
}

pub async fn delete_music(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(music_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    content::delete_music(&state.conn, &identity, music_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    Ok(Json(users::get_user(&state.conn, identity.user_id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<User>, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;

    let mut username = None;
    let mut email = None;
    let mut picture = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "username" => username = Some(field.text().await.map_err(bad_multipart)?),
            "email" => email = Some(field.text().await.map_err(bad_multipart)?),
            "profile_picture" => {
                let original = field.file_name().unwrap_or("picture").to_string();
                let data = field.bytes().await.map_err(bad_multipart)?;
                if !data.is_empty() {
                    let path = upload::ingest(
                        &state.config.upload_dir,
                        FileUpload::Bytes {
                            file_name: original,
                            data,
                        },
                    )
                    .await?;
                    picture = Some(path);
                }
            }
            _ => {}
        }
    }

    let user = users::set_profile(
        &state.conn,
        &identity,
        identity.user_id,
        username.as_deref(),
        email.as_deref(),
        picture,
    )
    .await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    users::change_password(&state.conn, &identity, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn author_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<AuthorDisplay>, AppError> {
    let user = users::get_user(&state.conn, user_id).await?;
    Ok(Json(AuthorDisplay {
        id: user.id,
        username: user.username,
        profile_picture: user.profile_picture,
    }))
}

#[derive(Serialize)]
pub struct AdminOverview {
    users: Vec<User>,
    posts: Vec<Post>,
    music: Vec<Music>,
}

pub async fn admin_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminOverview>, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    auth::require_moderator(&identity)?;

    Ok(Json(AdminOverview {
        users: users::list_users(&state.conn, &identity).await?,
        posts: content::list_posts(&state.conn).await?,
        music: content::list_music(&state.conn).await?,
    }))
}

#[derive(Deserialize)]
pub struct AdminUpdateUserRequest {
    username: Option<String>,
    email: Option<String>,
}

pub async fn admin_update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    Json(body): Json<AdminUpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    auth::require_moderator(&identity)?;

    let user = users::set_profile(
        &state.conn,
        &identity,
        user_id,
        body.username.as_deref(),
        body.email.as_deref(),
        None,
    )
    .await?;
    Ok(Json(user))
}

pub async fn admin_delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let identity = auth::authenticate(&state.conn, &headers).await?;
    users::delete_user(&state.conn, &identity, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
