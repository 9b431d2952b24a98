use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Json};
use axum::Extension;
use kbrelay_core::types::model::ModelOwner;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::BackendError;
use crate::service::ingestion::{self, UploadOutcome, UploadRequest};
use crate::types::request::TriggerUploadRequest;
use crate::BackendState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
  #[serde(flatten)]
  pub outcome: UploadOutcome,
  pub message: &'static str,
}

#[derive(Default)]
struct UploadForm {
  filename: Option<String>,
  content_type: Option<String>,
  bytes: Vec<u8>,
  vector_store_id: String,
  description: String,
  model_owner: String,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, BackendError> {
  let mut form = UploadForm::default();

  while let Some(mut field) = multipart
    .next_field()
    .await
    .map_err(|e| BackendError::bad_request(e.body_text()))?
  {
    let name = field.name().unwrap_or_default().to_string();

    match name.as_str() {
      "file" => {
        form.filename = field.file_name().map(str::to_string);
        form.content_type = field.content_type().map(str::to_string);

        while let Some(chunk) = field
          .chunk()
          .await
          .map_err(|e| BackendError::bad_request(e.body_text()))?
        {
          form.bytes.extend_from_slice(&chunk);
        }
      }
      "vector_store_id" | "file_description" | "model_owner" => {
        let value = field
          .text()
          .await
          .map_err(|e| BackendError::bad_request(e.body_text()))?;

        match name.as_str() {
          "vector_store_id" => form.vector_store_id = value.trim().to_string(),
          "file_description" => form.description = value,
          _ => form.model_owner = value.trim().to_string(),
        }
      }
      other => tracing::debug!("ignoring form field {}", other),
    }
  }

  Ok(form)
}

pub async fn upload_knowledge_file(
  State(state): State<BackendState>,
  Extension(AuthUser(username)): Extension<AuthUser>,
  multipart: Multipart,
) -> Result<impl IntoResponse, BackendError> {
  let form = read_form(multipart).await?;

  if form.vector_store_id.is_empty() {
    return Err(BackendError::bad_request("vector_store_id is required"));
  }
  if form.model_owner.is_empty() {
    return Err(BackendError::bad_request("model_owner is required"));
  }

  let owner: ModelOwner = form.model_owner.parse().map_err(|_| {
    BackendError::bad_request(format!("Invalid model_owner: {}", form.model_owner))
  })?;

  if !matches!(owner, ModelOwner::StepFun | ModelOwner::Local) {
    return Err(BackendError::not_implemented());
  }

  let filename = form
    .filename
    .filter(|name| !name.trim().is_empty())
    .ok_or_else(|| BackendError::bad_request("file is required"))?;

  let content_type = form.content_type.unwrap_or_else(|| {
    mime_guess::from_path(&filename)
      .first_or_octet_stream()
      .to_string()
  });

  let outcome = ingestion::ingest(
    state.workspace(),
    UploadRequest {
      username,
      filename,
      content_type,
      description: form.description,
      vector_store_id: form.vector_store_id,
      owner,
      bytes: form.bytes,
    },
  )
  .await?;

  tracing::info!("upload of {}: {}", outcome.file_id(), outcome.message());

  Ok(Json(UploadResponse {
    message: outcome.message(),
    outcome,
  }))
}

pub async fn trigger_external_upload(
  State(state): State<BackendState>,
  Extension(AuthUser(username)): Extension<AuthUser>,
  Json(req): Json<TriggerUploadRequest>,
) -> Result<impl IntoResponse, BackendError> {
  let outcome = ingestion::trigger_external_upload(state.workspace(), req, &username).await?;

  Ok(Json(outcome))
}
