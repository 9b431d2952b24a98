use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::provider::ProviderError;
use crate::service::model_selector::SelectionError;

pub const NOT_IMPLEMENTED_MSG: &str =
  "This functionality is not yet implemented for the selected model.";

#[derive(Debug)]
pub enum BackendError {
  CommonException { status: StatusCode, msg: String },
  ProviderException(ProviderError),
  UnknownException(anyhow::Error),
}

impl BackendError {
  pub fn bad_request(msg: impl Into<String>) -> Self {
    Self::CommonException {
      status: StatusCode::BAD_REQUEST,
      msg: msg.into(),
    }
  }

  pub fn not_found(msg: impl Into<String>) -> Self {
    Self::CommonException {
      status: StatusCode::NOT_FOUND,
      msg: msg.into(),
    }
  }

  pub fn unauthorized(msg: impl Into<String>) -> Self {
    Self::CommonException {
      status: StatusCode::UNAUTHORIZED,
      msg: msg.into(),
    }
  }

  pub fn not_implemented() -> Self {
    Self::CommonException {
      status: StatusCode::NOT_IMPLEMENTED,
      msg: NOT_IMPLEMENTED_MSG.to_string(),
    }
  }

  pub fn upstream(status: StatusCode) -> Self {
    Self::CommonException {
      status,
      msg: "Upstream provider returned an error".to_string(),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      BackendError::CommonException { status, .. } => *status,
      BackendError::ProviderException(err) => provider_status(err),
      BackendError::UnknownException(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

fn provider_status(err: &ProviderError) -> StatusCode {
  match err {
    ProviderError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
    ProviderError::Upstream { status, .. } if !status.is_success() => *status,
    ProviderError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    _ => StatusCode::BAD_GATEWAY,
  }
}

impl IntoResponse for BackendError {
  fn into_response(self) -> axum::response::Response {
    let status = self.status();

    let msg = match self {
      BackendError::CommonException { msg, .. } => msg,
      BackendError::ProviderException(err) => {
        tracing::error!("provider error: {}", err);
        match err {
          ProviderError::NotImplemented(_) => NOT_IMPLEMENTED_MSG.to_string(),
          ProviderError::PollTimeout { .. } => {
            "Timed out waiting for the provider to process the file".to_string()
          }
          ProviderError::ProcessingFailed(_) => "The provider failed to process the file".to_string(),
          _ => "Upstream provider returned an error".to_string(),
        }
      }
      BackendError::UnknownException(err) => {
        tracing::error!("stacktrace: {:?}", err);
        "Unknown Exception".to_string()
      }
    };

    let body = Json(json!({
        "status": status.as_u16(),
        "msg": msg,
    }));

    (status, body).into_response()
  }
}

impl From<anyhow::Error> for BackendError {
  fn from(value: anyhow::Error) -> Self {
    BackendError::UnknownException(value)
  }
}

impl From<sqlx::Error> for BackendError {
  fn from(value: sqlx::Error) -> Self {
    BackendError::UnknownException(value.into())
  }
}

impl From<ProviderError> for BackendError {
  fn from(value: ProviderError) -> Self {
    BackendError::ProviderException(value)
  }
}

impl From<SelectionError> for BackendError {
  fn from(value: SelectionError) -> Self {
    match value {
      SelectionError::ContextTooLarge { count, limit } => BackendError::bad_request(format!(
        "Token count {} exceeds the model limit of {}",
        count, limit
      )),
      SelectionError::Provider(err) => BackendError::ProviderException(err),
    }
  }
}
