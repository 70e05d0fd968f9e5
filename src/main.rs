mod auth;
mod config;
mod content;
mod db;
mod error;
mod feed;
mod handlers;
mod models;
mod upload;
mod users;

use axum::{
    routing::{get, post},
    Router,
};
use handlers::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();
    let conn = db::establish_connection(&config.database_path)
        .expect("Failed to establish database connection");

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        conn,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/feed", get(handlers::get_feed))
        .route("/posts", post(handlers::create_post))
        .route(
            "/posts/:post_id",
            get(handlers::get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route("/posts/:post_id/download", get(handlers::download_post))
        .route("/music", post(handlers::create_music))
        .route(
            "/music/:music_id",
            get(handlers::get_music)
                .put(handlers::update_music)
                .delete(handlers::delete_music),
        )
        .route(
            "/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route("/change_password", post(handlers::change_password))
        .route("/users/:user_id", get(handlers::author_profile))
        .route("/admin", get(handlers::admin_overview))
        .route(
            "/admin/users/:user_id",
            axum::routing::put(handlers::admin_update_user).delete(handlers::admin_delete_user),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Server running on http://{bind_addr}");
    axum::serve(listener, app).await.expect("Server error");
}
