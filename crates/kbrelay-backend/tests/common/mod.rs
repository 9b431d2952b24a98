use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use futures::StreamExt;
use jsonwebtoken::{EncodingKey, Header};
use kbrelay_backend::provider::{ProviderApi, ProviderError, ProviderRegistry, UpstreamResponse};
use kbrelay_backend::storage::Storage;
use kbrelay_backend::{build_router, db, BackendState};
use kbrelay_core::types::conf::BackendConf;
use kbrelay_core::types::model::FilePurpose;
use kbrelay_core::types::openai::{ChatMessage, ProviderFileObject, VectorStoreFileBinding};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::{Arc, Mutex};

pub const SECRET: &str = "integration-secret";
pub const BOUNDARY: &str = "kbrelay-boundary";

/// Scripted upstream: fixed token count and a canned chat response.
pub struct ScriptedProvider {
  pub count: u64,
  pub chat_status: StatusCode,
  pub chat_body: String,
  pub chats: Mutex<Vec<Value>>,
}

impl ScriptedProvider {
  pub fn new(chat_status: StatusCode, chat_body: &str) -> Self {
    Self {
      count: 10,
      chat_status,
      chat_body: chat_body.to_string(),
      chats: Mutex::new(Vec::new()),
    }
  }

  pub fn chats(&self) -> Vec<Value> {
    self.chats.lock().unwrap().clone()
  }
}

#[async_trait]
impl ProviderApi for ScriptedProvider {
  fn name(&self) -> &'static str {
    "scripted"
  }

  async fn chat(&self, body: &Value) -> Result<UpstreamResponse, ProviderError> {
    self.chats.lock().unwrap().push(body.clone());

    let lines: Vec<std::io::Result<Bytes>> = self
      .chat_body
      .split_inclusive('\n')
      .map(|line| Ok(Bytes::from(line.to_string())))
      .collect();

    Ok(UpstreamResponse {
      status: self.chat_status,
      body: futures::stream::iter(lines).boxed(),
    })
  }

  async fn count_tokens(
    &self,
    _model: &str,
    _messages: &[ChatMessage],
  ) -> Result<u64, ProviderError> {
    Ok(self.count)
  }

  async fn upload_file(
    &self,
    filename: &str,
    bytes: Vec<u8>,
    purpose: FilePurpose,
  ) -> Result<ProviderFileObject, ProviderError> {
    Ok(ProviderFileObject {
      id: "file-remote".to_string(),
      bytes: bytes.len() as i64,
      status: "uploaded".to_string(),
      filename: Some(filename.to_string()),
      purpose: Some(purpose.to_string()),
      created_at: None,
    })
  }

  async fn file_status(&self, file_id: &str) -> Result<ProviderFileObject, ProviderError> {
    Ok(ProviderFileObject {
      id: file_id.to_string(),
      status: "success".to_string(),
      ..Default::default()
    })
  }

  async fn file_content(&self, _file_id: &str) -> Result<String, ProviderError> {
    Ok(String::new())
  }

  async fn create_vector_store(&self, _name: &str) -> Result<String, ProviderError> {
    Ok("vs_remote".to_string())
  }

  async fn bind_files(
    &self,
    vector_store_id: &str,
    file_ids: &[String],
  ) -> Result<VectorStoreFileBinding, ProviderError> {
    Ok(VectorStoreFileBinding {
      id: file_ids.join(","),
      usage_bytes: 0,
      vector_store_id: vector_store_id.to_string(),
    })
  }
}

pub struct TestApp {
  pub router: Router,
  pub stepfun: Arc<ScriptedProvider>,
  pub dify: Arc<ScriptedProvider>,
  _dir: tempfile::TempDir,
}

impl TestApp {
  pub async fn new(stepfun: ScriptedProvider, dify: ScriptedProvider) -> Self {
    let dir = tempfile::tempdir().unwrap();

    let config = BackendConf {
      api_prefix: "/api".to_string(),
      database_url: "sqlite::memory:".to_string(),
      file_web_host: "http://files.test".to_string(),
      jwt_secret: SECRET.to_string(),
      utc_offset_hours: 8,
      max_upload_bytes: 1024 * 1024,
      poll_interval_ms: 5,
      poll_timeout_secs: 1,
      ..Default::default()
    };

    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await
      .unwrap();
    db::migrate(&pool).await.unwrap();

    let storage = Storage::new(dir.path().to_str().unwrap(), &config.file_web_host).unwrap();

    let stepfun = Arc::new(stepfun);
    let dify = Arc::new(dify);
    let openai = Arc::new(ScriptedProvider::new(StatusCode::OK, ""));
    let providers = ProviderRegistry::new(
      stepfun.clone(),
      openai,
      dify.clone(),
      config.utc_offset_hours,
    );

    let router = build_router(BackendState::new(config, pool, storage, providers));

    Self {
      router,
      stepfun,
      dify,
      _dir: dir,
    }
  }
}

pub fn token(user: &str) -> String {
  jsonwebtoken::encode(
    &Header::default(),
    &json!({ "userName": user }),
    &EncodingKey::from_secret(SECRET.as_bytes()),
  )
  .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
  Request::builder()
    .uri(uri)
    .header(header::COOKIE, format!("jwtToken={}", token("alice")))
    .body(Body::empty())
    .unwrap()
}

pub fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
  Request::builder()
    .method(method)
    .uri(uri)
    .header(header::COOKIE, format!("jwtToken={}", token("alice")))
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

/// Builds a multipart body from text fields plus an optional file part.
pub fn multipart(uri: &str, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Request<Body> {
  let mut body = Vec::new();

  for (name, value) in fields {
    body.extend_from_slice(
      format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
        BOUNDARY, name, value
      )
      .as_bytes(),
    );
  }

  if let Some((filename, bytes)) = file {
    body.extend_from_slice(
      format!(
        "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n",
        BOUNDARY, filename
      )
      .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
  }

  body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

  Request::builder()
    .method("POST")
    .uri(uri)
    .header(header::COOKIE, format!("jwtToken={}", token("alice")))
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={}", BOUNDARY),
    )
    .body(Body::from(body))
    .unwrap()
}

pub async fn read_body(response: axum::response::Response) -> Bytes {
  axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap()
}

pub async fn read_json(response: axum::response::Response) -> Value {
  serde_json::from_slice(&read_body(response).await).unwrap()
}
