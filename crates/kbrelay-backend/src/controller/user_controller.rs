use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde_json::json;

use crate::auth::AuthUser;

pub async fn validate_user(Extension(AuthUser(username)): Extension<AuthUser>) -> impl IntoResponse {
  Json(json!({ "username": username }))
}

pub async fn health() -> impl IntoResponse {
  Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
