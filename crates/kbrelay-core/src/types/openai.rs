use derive_more::{Deref, DerefMut, From};
use either::Either;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use tinyvec::TinyVec;

/// Text content or a multi-part list (images followed by the query text).
pub type MessageContent = Either<String, Vec<ContentPart>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  #[serde(default)]
  pub role: String,
  #[serde(default, with = "either::serde_untagged_optional")]
  pub content: Option<MessageContent>,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self::text("system", content)
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self::text("user", content)
  }

  pub fn user_parts(parts: Vec<ContentPart>) -> Self {
    Self {
      role: "user".to_string(),
      content: Some(Either::Right(parts)),
    }
  }

  fn text(role: &str, content: impl Into<String>) -> Self {
    Self {
      role: role.to_string(),
      content: Some(Either::Left(content.into())),
    }
  }

  /// Messages without a role or without content are never sent upstream.
  pub fn is_blank(&self) -> bool {
    if self.role.trim().is_empty() {
      return true;
    }

    match &self.content {
      None => true,
      Some(Either::Left(text)) => text.is_empty(),
      Some(Either::Right(parts)) => parts.is_empty(),
    }
  }

  pub fn text_content(&self) -> Option<&str> {
    match &self.content {
      Some(Either::Left(text)) => Some(text),
      _ => None,
    }
  }
}

/// Upstream conversation; serializes as a plain array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Deref, DerefMut, From)]
pub struct ChatMessages(Vec<ChatMessage>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
  #[serde(rename = "text")]
  Text { text: String },
  #[serde(rename = "image_url")]
  ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

impl Display for ContentPart {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      ContentPart::Text { text } => write!(f, "{}", text),
      ContentPart::ImageUrl { image_url } => {
        let prefix: String = image_url.url.chars().take(32).collect();
        match &image_url.detail {
          Some(detail) => write!(f, "<IMAGE {}…> ({})", prefix, detail),
          None => write!(f, "<IMAGE {}…>", prefix),
        }
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolStub {
  #[serde(rename = "web_search")]
  WebSearch { function: ToolFunction },
  #[serde(rename = "retrieval")]
  Retrieval { function: ToolFunction },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
  pub description: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
  #[serde(rename = "type")]
  pub type_: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
  pub model: String,
  pub stream: bool,
  pub messages: ChatMessages,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tools: Vec<ToolStub>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tool_choice: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
pub struct TokenCountRequest<'a> {
  pub model: &'a str,
  pub messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
pub struct TokenCountResponse {
  pub data: TokenCountData,
}

#[derive(Debug, Deserialize)]
pub struct TokenCountData {
  pub total_tokens: u64,
}

/// File object returned by the provider's `/files` endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderFileObject {
  pub id: String,
  #[serde(default)]
  pub bytes: i64,
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub filename: Option<String>,
  #[serde(default)]
  pub purpose: Option<String>,
  #[serde(default)]
  pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreObject {
  pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreFileBinding {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub usage_bytes: i64,
  #[serde(default)]
  pub vector_store_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
  pub id: String,
  pub choices: TinyVec<[ChatCompletionChunkChoice; 1]>,
  pub created: i64,
  pub model: String,
  pub system_fingerprint: String,
  pub object: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ChatCompletionChunkChoice {
  pub delta: ChatCompletionChunkDelta,
  pub finish_reason: Option<String>,
  pub index: u64,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ChatCompletionChunkDelta {
  pub content: Option<String>,
  pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionUsage {
  #[serde(default)]
  pub completion_tokens: u64,
  #[serde(default)]
  pub prompt_tokens: u64,
  #[serde(default)]
  pub total_tokens: u64,
}
