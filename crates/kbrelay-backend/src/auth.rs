use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::BackendError;
use crate::BackendState;

const TOKEN_COOKIE: &str = "jwtToken";

/// Caller identity placed in request extensions by [`require_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

#[derive(Debug, Deserialize)]
struct Claims {
  #[serde(rename = "userName", default)]
  user_name: String,
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
  let from_cookie = headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|value| value.to_str().ok())
    .flat_map(|value| value.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(name, _)| *name == TOKEN_COOKIE)
    .map(|(_, value)| value.to_string());

  from_cookie.or_else(|| {
    headers
      .get(header::AUTHORIZATION)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.strip_prefix("Bearer "))
      .map(|token| token.trim().to_string())
  })
}

pub fn verify_token(token: &str, secret: &str) -> Result<String, BackendError> {
  let mut validation = Validation::new(Algorithm::HS256);
  validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
  validation.required_spec_claims.clear();

  let data = jsonwebtoken::decode::<Claims>(
    token,
    &DecodingKey::from_secret(secret.as_bytes()),
    &validation,
  )
  .map_err(|err| {
    tracing::warn!("rejected token: {}", err);
    BackendError::unauthorized("Invalid token")
  })?;

  let user_name = data.claims.user_name.trim();
  if user_name.is_empty() {
    return Err(BackendError::unauthorized("Token carries no user name"));
  }

  Ok(user_name.to_string())
}

pub async fn require_user(
  State(state): State<BackendState>,
  mut req: Request,
  next: Next,
) -> Result<Response, BackendError> {
  let token = token_from_headers(req.headers())
    .ok_or_else(|| BackendError::unauthorized("Missing token"))?;

  let user_name = verify_token(&token, &state.config.jwt_secret)?;

  req.extensions_mut().insert(AuthUser(user_name));

  Ok(next.run(req).await)
}
