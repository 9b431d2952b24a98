use serde::{Deserialize, Serialize};

/// `id` stays empty while the owning provider has not assigned one yet.
#[derive(Debug, Default, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnowledgeBase {
  pub id: String,
  pub name: String,
  pub display_name: String,
  pub description: String,
  pub tags: String,
  pub model_owner: String,
  pub creator_id: String,
  pub created_at: i64,
}

impl KnowledgeBase {
  pub fn is_pending(&self) -> bool {
    self.id.is_empty()
  }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UploadedFile {
  pub file_id: String,
  pub filename: String,
  pub file_path: String,
  pub file_type: String,
  pub description: String,
  pub upload_time: i64,
  pub status: String,
  pub username: String,
  pub file_size: i64,
  pub provider_file_id: Option<String>,
  pub provider_purpose: Option<String>,
  pub provider_status: Option<String>,
  pub provider_vector_store_id: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProviderFile {
  pub id: String,
  pub knowledge_base_id: String,
  pub usage_bytes: i64,
  pub uploaded_file_id: Option<String>,
  pub purpose: String,
  pub status: String,
  pub created_at: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileKnowledgeRelation {
  pub file_id: String,
  pub knowledge_base_id: String,
  pub created_at: i64,
}

impl FileKnowledgeRelation {
  pub fn new(file_id: &str, knowledge_base_id: &str, created_at: i64) -> Self {
    Self {
      file_id: file_id.to_string(),
      knowledge_base_id: knowledge_base_id.to_string(),
      created_at,
    }
  }
}

/// One row of the knowledge-base file listing.
#[derive(Debug, Default, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnowledgeBaseFile {
  pub file_id: String,
  pub filename: String,
  pub file_path: String,
  pub file_type: String,
  pub description: String,
  pub upload_time: i64,
  pub status: String,
  pub file_size: i64,
  pub provider_file_id: Option<String>,
  pub provider_purpose: Option<String>,
  pub provider_status: Option<String>,
}
