use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures::stream::BoxStream;
use kbrelay_core::types::model::FilePurpose;
use kbrelay_core::types::openai::{ChatMessage, ProviderFileObject, VectorStoreFileBinding};
use serde_json::Value;
use std::time::Duration;

pub mod http;
pub mod registry;
pub mod strategy;

pub use http::{HttpProvider, ProviderFlavor};
pub use registry::ProviderRegistry;
pub use strategy::ProviderStrategy;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
  #[error("{0} does not implement this operation")]
  NotImplemented(String),
  #[error("upstream responded {status}: {body}")]
  Upstream { status: StatusCode, body: String },
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("unexpected provider response: {0}")]
  Decode(String),
  #[error("file {file_id} not processed within {timeout:?}")]
  PollTimeout { file_id: String, timeout: Duration },
  #[error("provider failed to process file {0}")]
  ProcessingFailed(String),
}

/// A chat response whose body has not been read yet.
pub struct UpstreamResponse {
  pub status: StatusCode,
  pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

/// Outbound calls to one LLM vendor.
#[async_trait]
pub trait ProviderApi: Send + Sync {
  fn name(&self) -> &'static str;

  async fn chat(&self, body: &Value) -> Result<UpstreamResponse, ProviderError>;

  async fn count_tokens(&self, model: &str, messages: &[ChatMessage])
    -> Result<u64, ProviderError>;

  async fn upload_file(
    &self,
    filename: &str,
    bytes: Vec<u8>,
    purpose: FilePurpose,
  ) -> Result<ProviderFileObject, ProviderError>;

  async fn file_status(&self, file_id: &str) -> Result<ProviderFileObject, ProviderError>;

  async fn file_content(&self, file_id: &str) -> Result<String, ProviderError>;

  async fn create_vector_store(&self, name: &str) -> Result<String, ProviderError>;

  async fn bind_files(
    &self,
    vector_store_id: &str,
    file_ids: &[String],
  ) -> Result<VectorStoreFileBinding, ProviderError>;
}
