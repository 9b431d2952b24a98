use kbrelay_core::types::model::PerformanceLevel;
use kbrelay_core::types::openai::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST chat-messages/{provider}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequestPayload {
  #[serde(default)]
  pub query: String,
  #[serde(default)]
  pub system_prompt: Option<String>,
  #[serde(default, alias = "messages")]
  pub conversation_history: Vec<ChatMessage>,
  #[serde(default)]
  pub file_type: String,
  #[serde(default)]
  pub file_ids: Vec<String>,
  #[serde(default)]
  pub vector_file_ids: Vec<String>,
  #[serde(default)]
  pub performance_level: Option<String>,
  #[serde(default)]
  pub vector_store_id: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub web_search: bool,
  #[serde(default)]
  pub inputs: Option<Value>,
  #[serde(default)]
  pub response_mode: Option<String>,
  #[serde(default)]
  pub conversation_id: Option<String>,
  #[serde(default)]
  pub user: Option<String>,
  #[serde(default)]
  pub files: Vec<Value>,
}

impl ChatRequestPayload {
  /// Absent or unknown tiers resolve to `balanced`.
  pub fn level(&self) -> PerformanceLevel {
    self
      .performance_level
      .as_deref()
      .and_then(|level| level.trim().parse().ok())
      .unwrap_or_default()
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVectorStoreRequest {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub tags: String,
  #[serde(default)]
  pub model_owner: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateVectorStoreRequest {
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub tags: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorStoreResponse {
  pub id: String,
  pub name: String,
  pub display_name: String,
  pub description: String,
  pub tags: String,
  pub model_owner: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerUploadRequest {
  #[serde(default)]
  pub model_owner: String,
  #[serde(default)]
  pub file_id: String,
  #[serde(default)]
  pub purpose: String,
  #[serde(default, rename = "vectorStoreID", alias = "vector_store_id")]
  pub vector_store_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetDataQuery {
  #[serde(default, rename = "type")]
  pub type_: String,
}
