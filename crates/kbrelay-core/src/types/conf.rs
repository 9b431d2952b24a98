use serde::{Deserialize, Serialize};

use crate::types::model::PerformanceLevel;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackendConf {
  pub log_file_path: String,
  pub log_file_name: String,
  pub bind_addr: String,
  pub api_prefix: String,
  pub database_url: String,
  pub file_path: String,
  pub file_web_host: String,
  #[serde(default)]
  pub allow_origins: Vec<String>,
  pub jwt_secret: String,
  pub utc_offset_hours: i8,
  pub max_upload_bytes: usize,
  pub poll_interval_ms: u64,
  pub poll_timeout_secs: u64,
  #[serde(default)]
  pub stepfun: ProviderConf,
  #[serde(default)]
  pub openai: ProviderConf,
  #[serde(default)]
  pub dify: ProviderConf,
  #[serde(default)]
  pub models: ModelCatalog,
  #[serde(default)]
  pub prompts: PromptConf,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderConf {
  #[serde(default)]
  pub base_url: String,
  #[serde(default)]
  pub api_key: String,
}

/// A model name paired with the largest token count it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelCap {
  pub name: String,
  pub max_tokens: u64,
}

impl ModelCap {
  pub fn new(name: &str, max_tokens: u64) -> Self {
    Self {
      name: name.to_string(),
      max_tokens,
    }
  }

  pub fn fits(&self, count: u64) -> bool {
    count <= self.max_tokens
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierModel {
  pub name: String,
  pub stream: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelCatalog {
  pub image_small: ModelCap,
  pub image_large: ModelCap,
  pub video: String,
  pub fast: ModelCap,
  pub advanced: ModelCap,
  /// Ordered from smallest to largest context window.
  pub balanced: Vec<ModelCap>,
  pub openai_fast: TierModel,
  pub openai_balanced: TierModel,
  pub openai_advanced: TierModel,
}

impl Default for ModelCatalog {
  fn default() -> Self {
    Self {
      image_small: ModelCap::new("step-1v-8k", 4_000),
      image_large: ModelCap::new("step-1v-32k", 25_000),
      video: "step-1.5v-mini".to_string(),
      fast: ModelCap::new("step-1-flash", 10_000),
      advanced: ModelCap::new("step-2-16k", 12_000),
      balanced: vec![
        ModelCap::new("step-1-8k", 6_000),
        ModelCap::new("step-1-32k", 25_000),
        ModelCap::new("step-1-128k", 80_000),
        ModelCap::new("step-1-256k", 180_000),
      ],
      openai_fast: TierModel {
        name: "gpt-4o-mini".to_string(),
        stream: true,
      },
      openai_balanced: TierModel {
        name: "o1-preview".to_string(),
        stream: false,
      },
      openai_advanced: TierModel {
        name: "o1-pro".to_string(),
        stream: true,
      },
    }
  }
}

impl ModelCatalog {
  pub fn openai_model(&self, level: PerformanceLevel) -> &TierModel {
    match level {
      PerformanceLevel::Fast => &self.openai_fast,
      PerformanceLevel::Balanced => &self.openai_balanced,
      PerformanceLevel::Advanced => &self.openai_advanced,
    }
  }

  /// The largest cap of the text ladder, reported when nothing fits.
  pub fn text_ceiling(&self) -> u64 {
    self
      .balanced
      .iter()
      .map(|m| m.max_tokens)
      .chain([self.fast.max_tokens, self.advanced.max_tokens])
      .max()
      .unwrap_or_default()
  }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptConf {
  pub fast: String,
  pub balanced: String,
  pub advanced: String,
  pub web_search_description: String,
  pub retrieval_template: String,
}

impl Default for PromptConf {
  fn default() -> Self {
    Self {
      fast: "You are a fast assistant. Answer briefly and directly.".to_string(),
      balanced: "You are a helpful assistant. Answer accurately and keep a clear structure."
        .to_string(),
      advanced: "You are an expert assistant. Reason carefully step by step before answering."
        .to_string(),
      web_search_description: "Search the internet for up-to-date information.".to_string(),
      retrieval_template: "Find the answer to the question {{query}} in the documents {{knowledge}}. \
        Answer using statements from the documents; if the documents do not contain the answer, \
        tell the user that no relevant information was found."
        .to_string(),
    }
  }
}

impl PromptConf {
  pub fn for_level(&self, level: PerformanceLevel) -> &str {
    match level {
      PerformanceLevel::Fast => &self.fast,
      PerformanceLevel::Balanced => &self.balanced,
      PerformanceLevel::Advanced => &self.advanced,
    }
  }
}
