use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use axum::Extension;

use crate::auth::AuthUser;
use crate::error::BackendError;
use crate::service::knowledge_base::{self, Saved};
use crate::types::request::*;
use crate::BackendState;

const KNOWLEDGE_BASES: &str = "knowledge_bases";

fn to_response(saved: Saved) -> VectorStoreResponse {
  VectorStoreResponse {
    id: saved.kb.id,
    name: saved.kb.name,
    display_name: saved.kb.display_name,
    description: saved.kb.description,
    tags: saved.kb.tags,
    model_owner: saved.kb.model_owner,
    warning: saved.warning,
  }
}

pub async fn create_vector_store(
  State(state): State<BackendState>,
  Extension(AuthUser(username)): Extension<AuthUser>,
  Json(req): Json<CreateVectorStoreRequest>,
) -> Result<impl IntoResponse, BackendError> {
  let saved = knowledge_base::create(state.workspace(), req, &username).await?;

  Ok(Json(to_response(saved)))
}

pub async fn update_vector_store(
  State(state): State<BackendState>,
  Path(name): Path<String>,
  Json(req): Json<UpdateVectorStoreRequest>,
) -> Result<impl IntoResponse, BackendError> {
  let saved = knowledge_base::update(state.workspace(), &name, req).await?;

  Ok(Json(to_response(saved)))
}

pub async fn get_data(
  State(state): State<BackendState>,
  Query(query): Query<GetDataQuery>,
) -> Result<impl IntoResponse, BackendError> {
  if query.type_ != KNOWLEDGE_BASES {
    return Err(BackendError::bad_request(format!(
      "Invalid data type: {}",
      query.type_
    )));
  }

  let knowledge_bases = crate::db::list_knowledge_bases(&state.pool).await?;

  Ok(Json(knowledge_bases))
}

pub async fn list_files(
  State(state): State<BackendState>,
  Path(knowledge_base_id): Path<String>,
) -> Result<impl IntoResponse, BackendError> {
  if crate::db::get_knowledge_base_by_id(&state.pool, &knowledge_base_id)
    .await?
    .is_none()
  {
    return Err(BackendError::not_found(format!(
      "Knowledge base {} not found",
      knowledge_base_id
    )));
  }

  let files = crate::db::list_knowledge_base_files(&state.pool, &knowledge_base_id).await?;

  Ok(Json(files))
}
