//! In-process provider double shared by the unit tests.

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures::StreamExt;
use kbrelay_core::types::conf::BackendConf;
use kbrelay_core::types::model::FilePurpose;
use kbrelay_core::types::openai::{ChatMessage, ProviderFileObject, VectorStoreFileBinding};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::provider::{ProviderApi, ProviderError, ProviderRegistry, UpstreamResponse};
use crate::service::Workspace;
use crate::storage::Storage;

#[derive(Default)]
pub struct FakeProvider {
  counts: HashMap<String, u64>,
  contents: HashMap<String, String>,
  file_status: Option<String>,
  fail_uploads: bool,
  fail_binds: bool,
  vector_store_id: Option<String>,
  next_file: AtomicUsize,
  counted: Mutex<Vec<String>>,
  uploads: Mutex<Vec<(String, FilePurpose)>>,
  binds: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeProvider {
  pub fn with_count(mut self, model: &str, count: u64) -> Self {
    self.counts.insert(model.to_string(), count);
    self
  }

  pub fn with_content(mut self, file_id: &str, content: &str) -> Self {
    self.contents.insert(file_id.to_string(), content.to_string());
    self
  }

  pub fn with_file_status(mut self, status: &str) -> Self {
    self.file_status = Some(status.to_string());
    self
  }

  pub fn with_vector_store(mut self, id: &str) -> Self {
    self.vector_store_id = Some(id.to_string());
    self
  }

  pub fn failing_uploads(mut self) -> Self {
    self.fail_uploads = true;
    self
  }

  pub fn failing_binds(mut self) -> Self {
    self.fail_binds = true;
    self
  }

  pub fn counted_models(&self) -> Vec<String> {
    self.counted.lock().unwrap().clone()
  }

  pub fn uploads(&self) -> Vec<(String, FilePurpose)> {
    self.uploads.lock().unwrap().clone()
  }

  pub fn binds(&self) -> Vec<(String, Vec<String>)> {
    self.binds.lock().unwrap().clone()
  }

  fn upstream_error() -> ProviderError {
    ProviderError::Upstream {
      status: StatusCode::INTERNAL_SERVER_ERROR,
      body: "boom".to_string(),
    }
  }
}

#[async_trait]
impl ProviderApi for FakeProvider {
  fn name(&self) -> &'static str {
    "fake"
  }

  async fn chat(&self, _body: &Value) -> Result<UpstreamResponse, ProviderError> {
    Ok(UpstreamResponse {
      status: StatusCode::OK,
      body: futures::stream::empty::<std::io::Result<Bytes>>().boxed(),
    })
  }

  async fn count_tokens(
    &self,
    model: &str,
    _messages: &[ChatMessage],
  ) -> Result<u64, ProviderError> {
    self.counted.lock().unwrap().push(model.to_string());

    Ok(self.counts.get(model).copied().unwrap_or_default())
  }

  async fn upload_file(
    &self,
    filename: &str,
    bytes: Vec<u8>,
    purpose: FilePurpose,
  ) -> Result<ProviderFileObject, ProviderError> {
    if self.fail_uploads {
      return Err(Self::upstream_error());
    }

    self
      .uploads
      .lock()
      .unwrap()
      .push((filename.to_string(), purpose));

    let n = self.next_file.fetch_add(1, Ordering::SeqCst) + 1;

    Ok(ProviderFileObject {
      id: format!("file-{}", n),
      bytes: bytes.len() as i64,
      status: "processing".to_string(),
      filename: Some(filename.to_string()),
      purpose: Some(purpose.to_string()),
      created_at: Some(0),
    })
  }

  async fn file_status(&self, file_id: &str) -> Result<ProviderFileObject, ProviderError> {
    Ok(ProviderFileObject {
      id: file_id.to_string(),
      status: self
        .file_status
        .clone()
        .unwrap_or_else(|| "success".to_string()),
      ..Default::default()
    })
  }

  async fn file_content(&self, file_id: &str) -> Result<String, ProviderError> {
    Ok(
      self
        .contents
        .get(file_id)
        .cloned()
        .unwrap_or_else(|| format!("content of {}", file_id)),
    )
  }

  async fn create_vector_store(&self, _name: &str) -> Result<String, ProviderError> {
    self.vector_store_id.clone().ok_or_else(Self::upstream_error)
  }

  async fn bind_files(
    &self,
    vector_store_id: &str,
    file_ids: &[String],
  ) -> Result<VectorStoreFileBinding, ProviderError> {
    if self.fail_binds {
      return Err(Self::upstream_error());
    }

    self
      .binds
      .lock()
      .unwrap()
      .push((vector_store_id.to_string(), file_ids.to_vec()));

    Ok(VectorStoreFileBinding {
      id: file_ids.join(","),
      usage_bytes: 0,
      vector_store_id: vector_store_id.to_string(),
    })
  }
}

/// Pool, storage and providers wired the way a request sees them.
pub struct TestBed {
  pub config: BackendConf,
  pub pool: SqlitePool,
  pub storage: Storage,
  pub providers: ProviderRegistry,
  pub stepfun: Arc<FakeProvider>,
  pub openai: Arc<FakeProvider>,
  pub dify: Arc<FakeProvider>,
  _dir: tempfile::TempDir,
}

pub fn test_conf() -> BackendConf {
  BackendConf {
    api_prefix: "/api".to_string(),
    database_url: "sqlite::memory:".to_string(),
    file_web_host: "http://files.test".to_string(),
    jwt_secret: "secret".to_string(),
    utc_offset_hours: 8,
    max_upload_bytes: 1024 * 1024,
    poll_interval_ms: 5,
    poll_timeout_secs: 1,
    ..Default::default()
  }
}

impl TestBed {
  pub async fn new(stepfun: FakeProvider) -> Self {
    let dir = tempfile::tempdir().unwrap();

    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await
      .unwrap();
    crate::db::migrate(&pool).await.unwrap();

    let config = test_conf();
    let storage = Storage::new(dir.path().to_str().unwrap(), &config.file_web_host).unwrap();

    let stepfun = Arc::new(stepfun);
    let openai = Arc::new(FakeProvider::default());
    let dify = Arc::new(FakeProvider::default());
    let providers = ProviderRegistry::new(
      stepfun.clone(),
      openai.clone(),
      dify.clone(),
      config.utc_offset_hours,
    );

    Self {
      config,
      pool,
      storage,
      providers,
      stepfun,
      openai,
      dify,
      _dir: dir,
    }
  }

  fn rewire(mut self) -> Self {
    self.providers = ProviderRegistry::new(
      self.stepfun.clone(),
      self.openai.clone(),
      self.dify.clone(),
      self.config.utc_offset_hours,
    );
    self
  }

  /// Swaps the StepFun double while keeping the database and files.
  pub fn with_stepfun(mut self, stepfun: FakeProvider) -> Self {
    self.stepfun = Arc::new(stepfun);
    self.rewire()
  }

  pub fn with_openai(mut self, openai: FakeProvider) -> Self {
    self.openai = Arc::new(openai);
    self.rewire()
  }

  pub fn with_dify(mut self, dify: FakeProvider) -> Self {
    self.dify = Arc::new(dify);
    self.rewire()
  }

  pub fn workspace(&self) -> Workspace<'_> {
    Workspace {
      config: &self.config,
      pool: &self.pool,
      storage: &self.storage,
      providers: &self.providers,
    }
  }
}
