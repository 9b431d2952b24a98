use async_trait::async_trait;
use futures::StreamExt;
use kbrelay_core::types::conf::ProviderConf;
use kbrelay_core::types::model::FilePurpose;
use kbrelay_core::types::openai::{
  ChatMessage, ProviderFileObject, TokenCountRequest, TokenCountResponse, VectorStoreFileBinding,
  VectorStoreObject,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{ProviderApi, ProviderError, UpstreamResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFlavor {
  StepFun,
  OpenAiCompatible,
  Dify,
}

/// Provider client speaking one vendor's REST dialect over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpProvider {
  client: Client,
  flavor: ProviderFlavor,
  base_url: String,
  api_key: String,
}

impl HttpProvider {
  pub fn new(client: Client, flavor: ProviderFlavor, conf: &ProviderConf) -> Self {
    Self {
      client,
      flavor,
      base_url: conf.base_url.trim_end_matches('/').to_string(),
      api_key: conf.api_key.clone(),
    }
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path)
  }

  fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
    builder.bearer_auth(&self.api_key)
  }

  fn require_files_api(&self) -> Result<(), ProviderError> {
    match self.flavor {
      ProviderFlavor::StepFun => Ok(()),
      _ => Err(ProviderError::NotImplemented(self.name().to_string())),
    }
  }

  async fn checked(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();

    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    Err(ProviderError::Upstream { status, body })
  }

  async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let text = Self::checked(response).await?.text().await?;

    serde_json::from_str(&text).map_err(|e| ProviderError::Decode(format!("{}: {}", e, text)))
  }
}

#[async_trait]
impl ProviderApi for HttpProvider {
  fn name(&self) -> &'static str {
    match self.flavor {
      ProviderFlavor::StepFun => "stepfun",
      ProviderFlavor::OpenAiCompatible => "openai-compatible",
      ProviderFlavor::Dify => "dify",
    }
  }

  async fn chat(&self, body: &Value) -> Result<UpstreamResponse, ProviderError> {
    let path = match self.flavor {
      ProviderFlavor::Dify => "chat-messages",
      _ => "chat/completions",
    };

    let response = self
      .authorized(self.client.post(self.url(path)))
      .json(body)
      .send()
      .await?;

    let status = response.status();

    let body = response
      .bytes_stream()
      .map(|chunk| chunk.map_err(std::io::Error::other))
      .boxed();

    Ok(UpstreamResponse { status, body })
  }

  async fn count_tokens(
    &self,
    model: &str,
    messages: &[ChatMessage],
  ) -> Result<u64, ProviderError> {
    self.require_files_api()?;

    let response = self
      .authorized(self.client.post(self.url("token/count")))
      .json(&TokenCountRequest { model, messages })
      .send()
      .await?;

    let counted: TokenCountResponse = Self::decode(response).await?;

    tracing::debug!("model={} total_tokens={}", model, counted.data.total_tokens);

    Ok(counted.data.total_tokens)
  }

  async fn upload_file(
    &self,
    filename: &str,
    bytes: Vec<u8>,
    purpose: FilePurpose,
  ) -> Result<ProviderFileObject, ProviderError> {
    self.require_files_api()?;

    let form = Form::new()
      .text("purpose", purpose.to_string())
      .part("file", Part::bytes(bytes).file_name(filename.to_string()));

    let response = self
      .authorized(self.client.post(self.url("files")))
      .multipart(form)
      .send()
      .await?;

    let file: ProviderFileObject = Self::decode(response).await?;

    tracing::info!(
      "uploaded {} to {} as {} ({})",
      filename,
      self.name(),
      file.id,
      purpose
    );

    Ok(file)
  }

  async fn file_status(&self, file_id: &str) -> Result<ProviderFileObject, ProviderError> {
    self.require_files_api()?;

    let response = self
      .authorized(self.client.get(self.url(&format!("files/{}", file_id))))
      .send()
      .await?;

    Self::decode(response).await
  }

  async fn file_content(&self, file_id: &str) -> Result<String, ProviderError> {
    self.require_files_api()?;

    let response = self
      .authorized(self.client.get(self.url(&format!("files/{}/content", file_id))))
      .send()
      .await?;

    Ok(Self::checked(response).await?.text().await?)
  }

  async fn create_vector_store(&self, name: &str) -> Result<String, ProviderError> {
    self.require_files_api()?;

    let response = self
      .authorized(self.client.post(self.url("vector_stores")))
      .json(&json!({ "name": name }))
      .send()
      .await?;

    let store: VectorStoreObject = Self::decode(response).await?;

    if store.id.is_empty() {
      return Err(ProviderError::Decode(
        "vector store created without an id".to_string(),
      ));
    }

    Ok(store.id)
  }

  async fn bind_files(
    &self,
    vector_store_id: &str,
    file_ids: &[String],
  ) -> Result<VectorStoreFileBinding, ProviderError> {
    self.require_files_api()?;

    let form = Form::new().text("file_ids", file_ids.join(","));

    let response = self
      .authorized(
        self
          .client
          .post(self.url(&format!("vector_stores/{}/files", vector_store_id))),
      )
      .multipart(form)
      .send()
      .await?;

    Self::decode(response).await
  }
}
