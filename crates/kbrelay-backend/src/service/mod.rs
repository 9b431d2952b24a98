use kbrelay_core::types::conf::BackendConf;
use sqlx::SqlitePool;

use crate::provider::ProviderRegistry;
use crate::storage::Storage;

pub mod ingestion;
pub mod knowledge_base;
pub mod message_assembler;
pub mod model_selector;
pub mod relay;

/// Borrowed collaborators for one request.
#[derive(Clone, Copy)]
pub struct Workspace<'a> {
  pub config: &'a BackendConf,
  pub pool: &'a SqlitePool,
  pub storage: &'a Storage,
  pub providers: &'a ProviderRegistry,
}
