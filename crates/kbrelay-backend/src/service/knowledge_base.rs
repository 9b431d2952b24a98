use kbrelay_core::types::model::ModelOwner;
use kbrelay_core::types::sqlx::KnowledgeBase;
use kbrelay_core::util::{compact_timestamp, local_now};

use super::Workspace;
use crate::error::{BackendError, NOT_IMPLEMENTED_MSG};
use crate::provider::ProviderError;
use crate::types::request::{CreateVectorStoreRequest, UpdateVectorStoreRequest};

const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_TAGS_CHARS: usize = 200;

/// A stored knowledge base plus a note when its provider did nothing.
#[derive(Debug)]
pub struct Saved {
  pub kb: KnowledgeBase,
  pub warning: Option<String>,
}

fn validate_name(name: &str) -> Result<(), BackendError> {
  let mut chars = name.chars();

  let Some(first) = chars.next() else {
    return Err(BackendError::bad_request("name is required"));
  };

  if !first.is_ascii_alphanumeric() || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
    return Err(BackendError::bad_request(
      "name must start with a letter or digit and contain only letters, digits and underscores",
    ));
  }

  Ok(())
}

fn validate_fields(display_name: &str, description: &str, tags: &str) -> Result<(), BackendError> {
  if display_name.trim().is_empty() {
    return Err(BackendError::bad_request("display_name is required"));
  }
  if description.chars().count() > MAX_DESCRIPTION_CHARS {
    return Err(BackendError::bad_request(format!(
      "description must be at most {} characters",
      MAX_DESCRIPTION_CHARS
    )));
  }
  if tags.chars().count() > MAX_TAGS_CHARS {
    return Err(BackendError::bad_request(format!(
      "tags must be at most {} characters",
      MAX_TAGS_CHARS
    )));
  }

  Ok(())
}

fn parse_owner(model_owner: &str) -> Result<ModelOwner, BackendError> {
  if model_owner.trim().is_empty() {
    return Err(BackendError::bad_request("model_owner is required"));
  }

  model_owner
    .trim()
    .parse()
    .map_err(|_| BackendError::bad_request(format!("Invalid model_owner: {}", model_owner)))
}

fn duplicate_name() -> BackendError {
  BackendError::bad_request("Knowledge base with this name already exists")
}

/// A concurrent create of the same name loses on the primary key.
fn insert_error(err: sqlx::Error) -> BackendError {
  if let sqlx::Error::Database(db) = &err {
    if db.is_unique_violation() {
      return duplicate_name();
    }
  }

  err.into()
}

pub async fn create(
  ws: Workspace<'_>,
  req: CreateVectorStoreRequest,
  username: &str,
) -> Result<Saved, BackendError> {
  validate_name(&req.name)?;
  validate_fields(&req.display_name, &req.description, &req.tags)?;
  let owner = parse_owner(&req.model_owner)?;

  let now = local_now(ws.config.utc_offset_hours);

  let mut kb = KnowledgeBase {
    id: format!("{}{}", req.name, compact_timestamp(now)?),
    name: req.name,
    display_name: req.display_name,
    description: req.description,
    tags: req.tags,
    model_owner: owner.to_string(),
    creator_id: username.to_string(),
    created_at: now.unix_timestamp(),
  };

  match crate::db::get_knowledge_base_by_name(ws.pool, &kb.name).await? {
    Some(existing) if !existing.is_pending() => return Err(duplicate_name()),
    Some(_) => {
      tracing::info!("resuming pending knowledge base {}", kb.name);
      crate::db::update_pending_knowledge_base(ws.pool, &kb).await?;
    }
    None => crate::db::insert_knowledge_base(ws.pool, &kb)
      .await
      .map_err(insert_error)?,
  }

  match ws
    .providers
    .strategy(owner)
    .create_knowledge_base(&kb.name)
    .await
  {
    Ok(id) => {
      crate::db::set_knowledge_base_id(ws.pool, &kb.name, &id).await?;
      kb.id = id;

      tracing::info!("knowledge base {} created as {}", kb.name, kb.id);

      Ok(Saved { kb, warning: None })
    }
    Err(ProviderError::NotImplemented(owner)) => {
      tracing::warn!("{} cannot create knowledge bases, keeping {}", owner, kb.id);

      Ok(Saved {
        kb,
        warning: Some(NOT_IMPLEMENTED_MSG.to_string()),
      })
    }
    Err(err) => {
      crate::db::set_knowledge_base_id(ws.pool, &kb.name, "").await?;

      Err(err.into())
    }
  }
}

/// Updates display fields; a pending record acquires its id in the same transaction.
pub async fn update(
  ws: Workspace<'_>,
  name: &str,
  req: UpdateVectorStoreRequest,
) -> Result<Saved, BackendError> {
  validate_name(name)?;
  validate_fields(&req.display_name, &req.description, &req.tags)?;

  let mut tx = ws.pool.begin().await?;

  let existing = crate::db::get_knowledge_base_by_name(&mut *tx, name)
    .await?
    .ok_or_else(|| BackendError::not_found(format!("Knowledge base {} not found", name)))?;

  crate::db::update_knowledge_base_metadata(
    &mut *tx,
    name,
    &req.display_name,
    &req.description,
    &req.tags,
  )
  .await?;

  let mut warning = None;

  if existing.is_pending() {
    let owner = parse_owner(&existing.model_owner)?;

    match ws.providers.strategy(owner).create_knowledge_base(name).await {
      Ok(id) => {
        crate::db::set_knowledge_base_id(&mut *tx, name, &id).await?;
      }
      Err(ProviderError::NotImplemented(_)) => {
        warning = Some(NOT_IMPLEMENTED_MSG.to_string());
      }
      Err(err) => return Err(err.into()),
    }
  }

  tx.commit().await?;

  let kb = crate::db::get_knowledge_base_by_name(ws.pool, name)
    .await?
    .ok_or_else(|| BackendError::not_found(format!("Knowledge base {} not found", name)))?;

  Ok(Saved { kb, warning })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{FakeProvider, TestBed};
  use axum::http::StatusCode;
  use regex::Regex;

  fn create_req(name: &str, owner: &str) -> CreateVectorStoreRequest {
    CreateVectorStoreRequest {
      name: name.to_string(),
      display_name: "Docs".to_string(),
      description: "team docs".to_string(),
      tags: "a,b".to_string(),
      model_owner: owner.to_string(),
    }
  }

  #[test]
  fn names_are_alphanumeric_with_underscores() {
    assert!(validate_name("docs_1").is_ok());
    assert!(validate_name("1docs").is_ok());
    assert!(validate_name("_docs").is_err());
    assert!(validate_name("docs-1").is_err());
    assert!(validate_name("").is_err());
  }

  #[test]
  fn oversized_fields_are_rejected() {
    assert!(validate_fields("d", &"x".repeat(500), &"t".repeat(200)).is_ok());
    assert!(validate_fields("d", &"x".repeat(501), "").is_err());
    assert!(validate_fields("d", "", &"t".repeat(201)).is_err());
    assert!(validate_fields(" ", "", "").is_err());
  }

  #[tokio::test]
  async fn local_knowledge_base_gets_timestamped_id() {
    let bed = TestBed::new(FakeProvider::default()).await;

    let saved = create(bed.workspace(), create_req("docs1", "local"), "alice")
      .await
      .unwrap();

    assert!(Regex::new(r"^docs1\d{14}$").unwrap().is_match(&saved.kb.id));
    assert_eq!(saved.kb.name, "docs1");
    assert!(saved.warning.is_none());
  }

  #[tokio::test]
  async fn second_create_with_same_name_is_rejected() {
    let bed = TestBed::new(FakeProvider::default().with_vector_store("vs_42")).await;

    let saved = create(bed.workspace(), create_req("docs", "stepfun"), "alice")
      .await
      .unwrap();
    assert_eq!(saved.kb.id, "vs_42");

    let err = create(bed.workspace(), create_req("docs", "stepfun"), "alice")
      .await
      .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn provider_failure_leaves_record_pending_and_resumable() {
    let bed = TestBed::new(FakeProvider::default()).await;

    let err = create(bed.workspace(), create_req("docs", "stepfun"), "alice")
      .await
      .unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let pending = crate::db::get_knowledge_base_by_name(&bed.pool, "docs")
      .await
      .unwrap()
      .unwrap();
    assert!(pending.is_pending());

    let bed = bed.with_stepfun(FakeProvider::default().with_vector_store("vs_1"));
    let saved = create(bed.workspace(), create_req("docs", "stepfun"), "bob")
      .await
      .unwrap();
    assert_eq!(saved.kb.id, "vs_1");
    assert_eq!(saved.kb.creator_id, "bob");
  }

  #[tokio::test]
  async fn unimplemented_owner_degrades_to_a_warning() {
    let bed = TestBed::new(FakeProvider::default()).await;

    let saved = create(bed.workspace(), create_req("kb", "zhipu"), "alice")
      .await
      .unwrap();

    assert_eq!(saved.warning.as_deref(), Some(NOT_IMPLEMENTED_MSG));
    assert!(!saved.kb.is_pending());
  }

  #[tokio::test]
  async fn update_round_trips_display_fields() {
    let bed = TestBed::new(FakeProvider::default()).await;

    create(bed.workspace(), create_req("docs1", "local"), "alice")
      .await
      .unwrap();

    let saved = update(
      bed.workspace(),
      "docs1",
      UpdateVectorStoreRequest {
        display_name: "Renamed".to_string(),
        description: "new".to_string(),
        tags: "x".to_string(),
      },
    )
    .await
    .unwrap();

    assert_eq!(saved.kb.display_name, "Renamed");
    assert_eq!(saved.kb.description, "new");
    assert_eq!(saved.kb.tags, "x");
    assert_eq!(saved.kb.name, "docs1");
    assert_eq!(saved.kb.model_owner, "local");
  }

  #[tokio::test]
  async fn update_of_missing_record_is_not_found() {
    let bed = TestBed::new(FakeProvider::default()).await;

    let err = update(
      bed.workspace(),
      "nope",
      UpdateVectorStoreRequest {
        display_name: "X".to_string(),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn update_acquires_id_for_pending_record() {
    let bed = TestBed::new(FakeProvider::default()).await;

    create(bed.workspace(), create_req("docs", "stepfun"), "alice")
      .await
      .unwrap_err();

    let bed = bed.with_stepfun(FakeProvider::default().with_vector_store("vs_9"));
    let saved = update(
      bed.workspace(),
      "docs",
      UpdateVectorStoreRequest {
        display_name: "Docs".to_string(),
        ..Default::default()
      },
    )
    .await
    .unwrap();

    assert_eq!(saved.kb.id, "vs_9");
  }

  #[tokio::test]
  async fn losing_an_insert_race_is_a_bad_request() {
    let bed = TestBed::new(FakeProvider::default()).await;

    let kb = KnowledgeBase {
      name: "docs".to_string(),
      display_name: "Docs".to_string(),
      model_owner: "local".to_string(),
      ..Default::default()
    };
    crate::db::insert_knowledge_base(&bed.pool, &kb).await.unwrap();

    let err = crate::db::insert_knowledge_base(&bed.pool, &kb)
      .await
      .map_err(insert_error)
      .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
  }
}
