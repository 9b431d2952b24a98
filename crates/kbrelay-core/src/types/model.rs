use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Vendor backing a knowledge base.
#[derive(
  Clone, Debug, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumString, Display, AsRefStr,
)]
pub enum ModelOwner {
  #[serde(rename = "stepfun")]
  #[strum(serialize = "stepfun")]
  StepFun,
  #[serde(rename = "zhipu")]
  #[strum(serialize = "zhipu")]
  Zhipu,
  #[serde(rename = "moonshot")]
  #[strum(serialize = "moonshot")]
  Moonshot,
  #[serde(rename = "baichuan")]
  #[strum(serialize = "baichuan")]
  Baichuan,
  #[serde(rename = "local")]
  #[strum(serialize = "local")]
  Local,
}

/// Upstream chat transport selected by the `chat-messages/{provider}` path.
#[derive(
  Clone, Debug, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumString, Display, AsRefStr,
)]
pub enum ChatProvider {
  #[serde(rename = "stepfun")]
  #[strum(serialize = "stepfun")]
  StepFun,
  #[serde(rename = "openai-compatible")]
  #[strum(to_string = "openai-compatible", serialize = "openai")]
  OpenAiCompatible,
  #[serde(rename = "dify")]
  #[strum(serialize = "dify")]
  Dify,
}

#[derive(Clone, Default, Debug, Copy, PartialEq, Eq, EnumString, Display)]
pub enum FileType {
  #[strum(to_string = "img", serialize = "image")]
  Image,
  #[strum(serialize = "video")]
  Video,
  #[strum(serialize = "file")]
  File,
  #[default]
  #[strum(serialize = "text")]
  Text,
}

impl FileType {
  /// Unknown or empty values fall back to plain text.
  pub fn parse_lenient(value: &str) -> Self {
    value.trim().parse().unwrap_or_default()
  }
}

#[derive(Clone, Default, Debug, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum PerformanceLevel {
  #[strum(serialize = "fast")]
  Fast,
  #[default]
  #[strum(serialize = "balanced")]
  Balanced,
  #[strum(serialize = "advanced")]
  Advanced,
}

#[derive(
  Clone, Debug, Copy, PartialEq, Eq, Deserialize, Serialize, EnumString, Display, AsRefStr,
)]
pub enum FilePurpose {
  #[serde(rename = "file-extract")]
  #[strum(serialize = "file-extract")]
  FileExtract,
  #[serde(rename = "retrieval")]
  #[strum(serialize = "retrieval")]
  Retrieval,
}

/// Lifecycle of uploaded files and provider-side files.
#[derive(
  Clone, Debug, Copy, PartialEq, Eq, Deserialize, Serialize, EnumString, Display, AsRefStr,
)]
pub enum FileStatus {
  #[serde(rename = "uploaded")]
  #[strum(serialize = "uploaded")]
  Uploaded,
  #[serde(rename = "processing")]
  #[strum(serialize = "processing")]
  Processing,
  #[serde(rename = "completed")]
  #[strum(serialize = "completed")]
  Completed,
  #[serde(rename = "failed")]
  #[strum(serialize = "failed")]
  Failed,
  #[serde(rename = "success")]
  #[strum(serialize = "success")]
  Success,
}

impl FileStatus {
  pub fn is_done(&self) -> bool {
    matches!(self, Self::Completed | Self::Success)
  }
}
