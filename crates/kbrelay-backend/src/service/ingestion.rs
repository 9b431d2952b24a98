use kbrelay_core::types::model::{FilePurpose, FileStatus, ModelOwner};
use kbrelay_core::types::sqlx::{FileKnowledgeRelation, ProviderFile, UploadedFile};
use kbrelay_core::util::{format_size, is_text_file, local_now};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

use super::Workspace;
use crate::error::BackendError;
use crate::provider::{ProviderApi, ProviderError, ProviderStrategy};
use crate::types::request::TriggerUploadRequest;

/// Target marking an upload from the chat window rather than a knowledge base.
pub const CHAT_WINDOW_STORE: &str = "local";

/// Provider id of extraction rows, which belong to no knowledge base.
const EXTRACTION_KNOWLEDGE_BASE: &str = "local";

pub struct UploadRequest {
  pub username: String,
  pub filename: String,
  pub content_type: String,
  pub description: String,
  pub vector_store_id: String,
  pub owner: ModelOwner,
  pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
  /// Stored locally only.
  Uploaded { file_id: String, file_path: String },
  /// Same name, size and user as an earlier upload.
  Reused { file_id: String, file_path: String },
  AlreadyVectorized { file_id: String },
  StillProcessing { file_id: String },
  Bound {
    file_id: String,
    provider_file_id: String,
  },
  Processing {
    file_id: String,
    provider_file_id: String,
  },
}

impl UploadOutcome {
  pub fn file_id(&self) -> &str {
    match self {
      UploadOutcome::Uploaded { file_id, .. }
      | UploadOutcome::Reused { file_id, .. }
      | UploadOutcome::AlreadyVectorized { file_id }
      | UploadOutcome::StillProcessing { file_id }
      | UploadOutcome::Bound { file_id, .. }
      | UploadOutcome::Processing { file_id, .. } => file_id,
    }
  }

  pub fn message(&self) -> &'static str {
    match self {
      UploadOutcome::Uploaded { .. } => "File uploaded",
      UploadOutcome::Reused { .. } => "File already uploaded",
      UploadOutcome::AlreadyVectorized { .. } => {
        "File is already vectorized in this knowledge base"
      }
      UploadOutcome::StillProcessing { .. } => "File is still processing, check again later",
      UploadOutcome::Bound { .. } => "File bound to the knowledge base, check its status later",
      UploadOutcome::Processing { .. } => "File uploaded and queued for vectorization",
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutcome {
  pub file_id: String,
  pub provider_file_id: String,
  pub purpose: String,
  pub status: String,
}

/// Stores a knowledge-base upload and pushes it to the owning provider.
///
/// Identity is (filename, size, username); a repeat upload never writes a
/// second local copy.
pub async fn ingest(ws: Workspace<'_>, req: UploadRequest) -> Result<UploadOutcome, BackendError> {
  let strategy = ws.providers.strategy(req.owner);
  let now = local_now(ws.config.utc_offset_hours);
  let size = req.bytes.len() as i64;
  let target = req.vector_store_id.as_str();

  tracing::info!(
    "ingest {} ({}) for {} into {} via {}",
    req.filename,
    format_size(req.bytes.len()),
    req.username,
    target,
    req.owner
  );

  if let Some(existing) =
    crate::db::find_uploaded_file(ws.pool, &req.filename, size, &req.username).await?
  {
    return ingest_existing(ws, strategy.as_ref(), existing, req).await;
  }

  let file_path = ws
    .storage
    .save(&req.username, &req.filename, now, req.bytes.clone())
    .await?;

  let file = UploadedFile {
    file_id: Uuid::new_v4().to_string(),
    filename: req.filename.clone(),
    file_path,
    file_type: req.content_type.clone(),
    description: req.description.clone(),
    upload_time: now.unix_timestamp(),
    status: FileStatus::Uploaded.to_string(),
    username: req.username.clone(),
    file_size: size,
    ..Default::default()
  };

  let mut tx = ws.pool.begin().await?;
  crate::db::insert_uploaded_file(&mut *tx, &file).await?;
  if target != CHAT_WINDOW_STORE {
    let relation = FileKnowledgeRelation::new(&file.file_id, target, now.unix_timestamp());
    crate::db::insert_relation(&mut *tx, &relation).await?;
  }
  tx.commit().await?;

  if target == CHAT_WINDOW_STORE || !strategy.is_remote() {
    return Ok(UploadOutcome::Uploaded {
      file_path: ws.storage.public_url(&file.file_path),
      file_id: file.file_id,
    });
  }

  let provider_file_id = push_to_provider(
    ws,
    strategy.as_ref(),
    &file.file_id,
    &file.filename,
    req.bytes,
    target,
  )
  .await?;

  Ok(UploadOutcome::Processing {
    file_id: file.file_id,
    provider_file_id,
  })
}

async fn ingest_existing(
  ws: Workspace<'_>,
  strategy: &dyn ProviderStrategy,
  existing: UploadedFile,
  req: UploadRequest,
) -> Result<UploadOutcome, BackendError> {
  let target = req.vector_store_id.as_str();
  let file_id = existing.file_id.clone();

  if !is_text_file(&existing.filename) {
    return Ok(UploadOutcome::Reused {
      file_path: ws.storage.public_url(&existing.file_path),
      file_id,
    });
  }

  let purpose = FilePurpose::Retrieval.to_string();
  if let Some(provider_file) =
    crate::db::find_provider_file(ws.pool, &file_id, target, &purpose).await?
  {
    match provider_file.status.parse::<FileStatus>() {
      Ok(status) if status.is_done() => {
        return Ok(UploadOutcome::AlreadyVectorized { file_id });
      }
      Ok(FileStatus::Processing) => {
        return Ok(UploadOutcome::StillProcessing { file_id });
      }
      Ok(FileStatus::Uploaded) => {
        bind_or_fail(ws.pool, strategy, &file_id, target, &provider_file.id).await?;
        mark_processing(ws.pool, &file_id, &provider_file.id).await?;

        return Ok(UploadOutcome::Bound {
          file_id,
          provider_file_id: provider_file.id,
        });
      }
      _ => {
        tracing::info!(
          "provider file {} for {} is {}, uploading again",
          provider_file.id,
          file_id,
          provider_file.status
        );
      }
    }
  }

  if target == CHAT_WINDOW_STORE || !strategy.is_remote() {
    if target != CHAT_WINDOW_STORE {
      let now = local_now(ws.config.utc_offset_hours);
      let relation = FileKnowledgeRelation::new(&file_id, target, now.unix_timestamp());
      crate::db::insert_relation(ws.pool, &relation).await?;
    }

    return Ok(UploadOutcome::Reused {
      file_path: ws.storage.public_url(&existing.file_path),
      file_id,
    });
  }

  let provider_file_id =
    push_to_provider(ws, strategy, &file_id, &existing.filename, req.bytes, target).await?;

  let now = local_now(ws.config.utc_offset_hours);
  let relation = FileKnowledgeRelation::new(&file_id, target, now.unix_timestamp());
  crate::db::insert_relation(ws.pool, &relation).await?;

  Ok(UploadOutcome::Processing {
    file_id,
    provider_file_id,
  })
}

/// Upload for retrieval, record the provider file, bind it, then flag both rows processing.
async fn push_to_provider(
  ws: Workspace<'_>,
  strategy: &dyn ProviderStrategy,
  file_id: &str,
  filename: &str,
  bytes: Vec<u8>,
  vector_store_id: &str,
) -> Result<String, BackendError> {
  let uploaded = match strategy
    .upload_file(filename, bytes, FilePurpose::Retrieval)
    .await
  {
    Ok(uploaded) => uploaded,
    Err(err) => {
      mark_failed(ws.pool, file_id).await;
      return Err(err.into());
    }
  };

  let row = ProviderFile {
    id: uploaded.id,
    knowledge_base_id: vector_store_id.to_string(),
    usage_bytes: uploaded.bytes,
    uploaded_file_id: Some(file_id.to_string()),
    purpose: FilePurpose::Retrieval.to_string(),
    status: FileStatus::Uploaded.to_string(),
    created_at: local_now(ws.config.utc_offset_hours).unix_timestamp(),
  };

  {
    let mut conn = ws.pool.acquire().await?;
    crate::db::insert_provider_file(&mut conn, &row).await?;
  }

  bind_or_fail(ws.pool, strategy, file_id, vector_store_id, &row.id).await?;
  mark_processing(ws.pool, file_id, &row.id).await?;

  Ok(row.id)
}

async fn bind_or_fail(
  pool: &SqlitePool,
  strategy: &dyn ProviderStrategy,
  file_id: &str,
  vector_store_id: &str,
  provider_file_id: &str,
) -> Result<(), BackendError> {
  match strategy.bind_file(vector_store_id, provider_file_id).await {
    Ok(binding) => {
      tracing::info!(
        "bound {} to {} ({} bytes)",
        provider_file_id,
        vector_store_id,
        binding.usage_bytes
      );
      Ok(())
    }
    Err(err) => {
      mark_failed(pool, file_id).await;
      Err(err.into())
    }
  }
}

async fn mark_processing(
  pool: &SqlitePool,
  file_id: &str,
  provider_file_id: &str,
) -> Result<(), BackendError> {
  let status = FileStatus::Processing.to_string();

  let mut tx = pool.begin().await?;
  crate::db::update_provider_file_status(&mut tx, provider_file_id, &status).await?;
  crate::db::update_uploaded_file_status(&mut *tx, file_id, &status).await?;
  tx.commit().await?;

  Ok(())
}

/// Best effort; the caller is already returning the original error.
async fn mark_failed(pool: &SqlitePool, file_id: &str) {
  let status = FileStatus::Failed.to_string();

  if let Err(err) = crate::db::update_uploaded_file_status(pool, file_id, &status).await {
    tracing::error!("failed to mark {} as failed: {}", file_id, err);
  }
}

/// Polls until the provider reports `success`, checking once per `interval`.
pub async fn poll_file_status(
  api: &dyn ProviderApi,
  file_id: &str,
  interval: Duration,
  timeout: Duration,
) -> Result<(), ProviderError> {
  let poll = async {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
      ticker.tick().await;

      let file = api.file_status(file_id).await?;

      match file.status.as_str() {
        "success" => return Ok(()),
        "failed" => return Err(ProviderError::ProcessingFailed(file_id.to_string())),
        status => tracing::debug!("file {} is {}", file_id, status),
      }
    }
  };

  tokio::time::timeout(timeout, poll)
    .await
    .map_err(|_| ProviderError::PollTimeout {
      file_id: file_id.to_string(),
      timeout,
    })?
}

/// Runs extraction for chat attachments and returns their provider file ids.
pub async fn extract_for_chat(
  ws: Workspace<'_>,
  file_ids: &[String],
  username: &str,
) -> Result<Vec<String>, BackendError> {
  let api = ws.providers.stepfun();
  let interval = Duration::from_millis(ws.config.poll_interval_ms);
  let timeout = Duration::from_secs(ws.config.poll_timeout_secs);

  let mut extracted = Vec::with_capacity(file_ids.len());

  for file_id in file_ids {
    let file = crate::db::get_user_file(ws.pool, file_id, username)
      .await?
      .ok_or_else(|| BackendError::not_found(format!("File {} not found", file_id)))?;

    tracing::info!("extracting {} for {}", file.filename, username);

    let bytes = ws.storage.read(&file.file_path).await?;

    let uploaded = match api
      .upload_file(&file.filename, bytes, FilePurpose::FileExtract)
      .await
    {
      Ok(uploaded) => uploaded,
      Err(err) => {
        mark_failed(ws.pool, file_id).await;
        return Err(err.into());
      }
    };

    if let Err(err) = poll_file_status(api.as_ref(), &uploaded.id, interval, timeout).await {
      mark_failed(ws.pool, file_id).await;
      return Err(err.into());
    }

    let row = ProviderFile {
      id: uploaded.id,
      knowledge_base_id: EXTRACTION_KNOWLEDGE_BASE.to_string(),
      usage_bytes: uploaded.bytes,
      uploaded_file_id: Some(file_id.clone()),
      purpose: FilePurpose::FileExtract.to_string(),
      status: FileStatus::Success.to_string(),
      created_at: local_now(ws.config.utc_offset_hours).unix_timestamp(),
    };

    {
      let mut conn = ws.pool.acquire().await?;
      crate::db::insert_provider_file(&mut conn, &row).await?;
    }
    crate::db::update_uploaded_file_status(ws.pool, file_id, FileStatus::Completed.as_ref())
      .await?;

    extracted.push(row.id);
  }

  Ok(extracted)
}

/// Pushes an already stored file to a provider on demand.
pub async fn trigger_external_upload(
  ws: Workspace<'_>,
  req: TriggerUploadRequest,
  username: &str,
) -> Result<TriggerOutcome, BackendError> {
  let owner: ModelOwner = req
    .model_owner
    .trim()
    .parse()
    .map_err(|_| BackendError::bad_request(format!("Invalid model_owner: {}", req.model_owner)))?;
  let purpose: FilePurpose = req
    .purpose
    .trim()
    .parse()
    .map_err(|_| BackendError::bad_request(format!("Invalid purpose: {}", req.purpose)))?;

  if matches!(
    owner,
    ModelOwner::Zhipu | ModelOwner::Moonshot | ModelOwner::Baichuan
  ) {
    return Err(BackendError::not_implemented());
  }

  let file = crate::db::get_user_file(ws.pool, &req.file_id, username)
    .await?
    .ok_or_else(|| BackendError::not_found(format!("File {} not found", req.file_id)))?;

  match (owner, purpose) {
    (ModelOwner::StepFun, FilePurpose::Retrieval) => {
      if req.vector_store_id.trim().is_empty() {
        return Err(BackendError::bad_request("vectorStoreID is required"));
      }

      let strategy = ws.providers.strategy(owner);
      let bytes = ws.storage.read(&file.file_path).await?;

      let provider_file_id = push_to_provider(
        ws,
        strategy.as_ref(),
        &file.file_id,
        &file.filename,
        bytes,
        &req.vector_store_id,
      )
      .await?;

      let now = local_now(ws.config.utc_offset_hours);
      let relation =
        FileKnowledgeRelation::new(&file.file_id, &req.vector_store_id, now.unix_timestamp());
      crate::db::insert_relation(ws.pool, &relation).await?;

      Ok(TriggerOutcome {
        file_id: file.file_id,
        provider_file_id,
        purpose: purpose.to_string(),
        status: FileStatus::Processing.to_string(),
      })
    }
    (ModelOwner::Local, FilePurpose::FileExtract) => {
      let bytes = ws.storage.read(&file.file_path).await?;

      let uploaded = match ws
        .providers
        .stepfun()
        .upload_file(&file.filename, bytes, purpose)
        .await
      {
        Ok(uploaded) => uploaded,
        Err(err) => {
          mark_failed(ws.pool, &file.file_id).await;
          return Err(err.into());
        }
      };

      let row = ProviderFile {
        id: uploaded.id,
        knowledge_base_id: EXTRACTION_KNOWLEDGE_BASE.to_string(),
        usage_bytes: uploaded.bytes,
        uploaded_file_id: Some(file.file_id.clone()),
        purpose: purpose.to_string(),
        status: FileStatus::Processing.to_string(),
        created_at: local_now(ws.config.utc_offset_hours).unix_timestamp(),
      };

      let mut tx = ws.pool.begin().await?;
      crate::db::insert_provider_file(&mut tx, &row).await?;
      crate::db::update_uploaded_file_status(&mut *tx, &file.file_id, &row.status).await?;
      tx.commit().await?;

      Ok(TriggerOutcome {
        file_id: file.file_id,
        provider_file_id: row.id,
        purpose: row.purpose,
        status: row.status,
      })
    }
    _ => Err(BackendError::bad_request(format!(
      "Unsupported purpose {} for model_owner {}",
      purpose, owner
    ))),
  }
}
