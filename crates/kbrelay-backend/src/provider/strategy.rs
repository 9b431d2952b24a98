use async_trait::async_trait;
use kbrelay_core::types::model::{FilePurpose, ModelOwner};
use kbrelay_core::types::openai::{ProviderFileObject, VectorStoreFileBinding};
use kbrelay_core::util::{compact_timestamp, local_now};
use std::sync::Arc;

use super::{ProviderApi, ProviderError};

/// What a model owner does when a knowledge base or one of its files changes.
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
  /// Whether files have to be pushed to the vendor at all.
  fn is_remote(&self) -> bool;

  async fn create_knowledge_base(&self, name: &str) -> Result<String, ProviderError>;

  async fn upload_file(
    &self,
    filename: &str,
    bytes: Vec<u8>,
    purpose: FilePurpose,
  ) -> Result<ProviderFileObject, ProviderError>;

  async fn bind_file(
    &self,
    vector_store_id: &str,
    file_id: &str,
  ) -> Result<VectorStoreFileBinding, ProviderError>;
}

pub struct StepFunStrategy {
  api: Arc<dyn ProviderApi>,
}

impl StepFunStrategy {
  pub fn new(api: Arc<dyn ProviderApi>) -> Self {
    Self { api }
  }
}

#[async_trait]
impl ProviderStrategy for StepFunStrategy {
  fn is_remote(&self) -> bool {
    true
  }

  async fn create_knowledge_base(&self, name: &str) -> Result<String, ProviderError> {
    self.api.create_vector_store(name).await
  }

  async fn upload_file(
    &self,
    filename: &str,
    bytes: Vec<u8>,
    purpose: FilePurpose,
  ) -> Result<ProviderFileObject, ProviderError> {
    self.api.upload_file(filename, bytes, purpose).await
  }

  async fn bind_file(
    &self,
    vector_store_id: &str,
    file_id: &str,
  ) -> Result<VectorStoreFileBinding, ProviderError> {
    self
      .api
      .bind_files(vector_store_id, &[file_id.to_string()])
      .await
  }
}

/// Knowledge bases kept on this side only; ids are `name + YYYYMMDDhhmmss`.
pub struct LocalStrategy {
  utc_offset_hours: i8,
}

impl LocalStrategy {
  pub fn new(utc_offset_hours: i8) -> Self {
    Self { utc_offset_hours }
  }
}

#[async_trait]
impl ProviderStrategy for LocalStrategy {
  fn is_remote(&self) -> bool {
    false
  }

  async fn create_knowledge_base(&self, name: &str) -> Result<String, ProviderError> {
    let timestamp = compact_timestamp(local_now(self.utc_offset_hours))
      .map_err(|e| ProviderError::Decode(e.to_string()))?;

    Ok(format!("{}{}", name, timestamp))
  }

  async fn upload_file(
    &self,
    _filename: &str,
    _bytes: Vec<u8>,
    _purpose: FilePurpose,
  ) -> Result<ProviderFileObject, ProviderError> {
    Err(ProviderError::NotImplemented(ModelOwner::Local.to_string()))
  }

  async fn bind_file(
    &self,
    _vector_store_id: &str,
    _file_id: &str,
  ) -> Result<VectorStoreFileBinding, ProviderError> {
    Err(ProviderError::NotImplemented(ModelOwner::Local.to_string()))
  }
}

/// Owners accepted by the API whose vendor integration does not exist yet.
pub struct UnimplementedStrategy {
  owner: ModelOwner,
}

impl UnimplementedStrategy {
  pub fn new(owner: ModelOwner) -> Self {
    Self { owner }
  }
}

#[async_trait]
impl ProviderStrategy for UnimplementedStrategy {
  fn is_remote(&self) -> bool {
    true
  }

  async fn create_knowledge_base(&self, _name: &str) -> Result<String, ProviderError> {
    Err(ProviderError::NotImplemented(self.owner.to_string()))
  }

  async fn upload_file(
    &self,
    _filename: &str,
    _bytes: Vec<u8>,
    _purpose: FilePurpose,
  ) -> Result<ProviderFileObject, ProviderError> {
    Err(ProviderError::NotImplemented(self.owner.to_string()))
  }

  async fn bind_file(
    &self,
    _vector_store_id: &str,
    _file_id: &str,
  ) -> Result<VectorStoreFileBinding, ProviderError> {
    Err(ProviderError::NotImplemented(self.owner.to_string()))
  }
}
