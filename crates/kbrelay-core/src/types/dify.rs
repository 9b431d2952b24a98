use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::openai::ChatCompletionUsage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyChatRequest {
  pub inputs: Value,
  pub query: String,
  pub response_mode: String,
  pub conversation_id: String,
  pub user: String,
  pub files: Vec<Value>,
}

impl DifyChatRequest {
  pub fn is_streaming(&self) -> bool {
    self.response_mode == "streaming"
  }
}

/// One `data:` line of a Dify streaming response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DifyEvent {
  #[serde(default)]
  pub event: String,
  #[serde(default)]
  pub task_id: String,
  #[serde(default)]
  pub message_id: String,
  #[serde(default)]
  pub conversation_id: String,
  #[serde(default)]
  pub answer: Option<String>,
  #[serde(default)]
  pub created_at: i64,
  #[serde(default)]
  pub metadata: Option<DifyMetadata>,
  #[serde(default)]
  pub usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DifyMetadata {
  #[serde(default)]
  pub usage: Option<ChatCompletionUsage>,
}

impl DifyEvent {
  pub fn is_answer(&self) -> bool {
    matches!(self.event.as_str(), "message" | "agent_message")
  }

  pub fn is_end(&self) -> bool {
    self.event == "message_end"
  }

  pub fn final_usage(&self) -> Option<ChatCompletionUsage> {
    self
      .metadata
      .as_ref()
      .and_then(|m| m.usage.clone())
      .or_else(|| self.usage.clone())
  }
}
