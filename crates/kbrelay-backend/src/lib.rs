use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use kbrelay_core::types::conf::BackendConf;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use std::{net::SocketAddr, str::FromStr};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::controller::{chat_controller, file_controller, knowledge_base_controller, user_controller};
use crate::provider::ProviderRegistry;
use crate::service::Workspace;
use crate::storage::Storage;

pub mod auth;
pub mod conf;
pub mod controller;
pub mod db;
pub mod error;
pub mod framed_lines;
pub mod provider;
pub mod service;
pub mod storage;
pub mod trace;
pub mod types;

#[cfg(test)]
mod testing;

#[derive(Clone)]
pub struct BackendState {
  pub config: Arc<BackendConf>,
  pub pool: SqlitePool,
  pub storage: Arc<Storage>,
  pub providers: Arc<ProviderRegistry>,
}

impl BackendState {
  pub fn new(
    config: BackendConf,
    pool: SqlitePool,
    storage: Storage,
    providers: ProviderRegistry,
  ) -> Self {
    Self {
      config: Arc::new(config),
      pool,
      storage: Arc::new(storage),
      providers: Arc::new(providers),
    }
  }

  pub fn workspace(&self) -> Workspace<'_> {
    Workspace {
      config: &self.config,
      pool: &self.pool,
      storage: &self.storage,
      providers: &self.providers,
    }
  }
}

pub async fn connect_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
  let options = SqliteConnectOptions::from_str(database_url)?
    .journal_mode(SqliteJournalMode::Wal)
    .create_if_missing(true);

  let pool = SqlitePoolOptions::new().connect_with(options).await?;

  Ok(pool)
}

fn cors_layer(config: &BackendConf) -> CorsLayer {
  let cors = CorsLayer::new()
    .allow_methods([
      Method::GET,
      Method::POST,
      Method::PUT,
      Method::DELETE,
      Method::OPTIONS,
    ])
    .expose_headers([header::CONTENT_LENGTH]);

  let origins: Vec<HeaderValue> = config
    .allow_origins
    .iter()
    .filter_map(|origin| HeaderValue::from_str(origin).ok())
    .collect();

  if origins.is_empty() {
    return cors.allow_headers(Any).allow_origin(Any);
  }

  cors
    .allow_headers([
      header::ORIGIN,
      header::CONTENT_TYPE,
      header::ACCEPT,
      header::AUTHORIZATION,
    ])
    .allow_origin(origins)
    .allow_credentials(true)
}

pub fn build_router(state: BackendState) -> Router {
  let config = state.config.clone();

  let api_routes = Router::new()
    .route(
      "/create-vector-store",
      post(knowledge_base_controller::create_vector_store),
    )
    .route(
      "/update-vector-store/:name",
      put(knowledge_base_controller::update_vector_store),
    )
    .route(
      "/chat-messages/:provider",
      post(chat_controller::create_chat_message),
    )
    .route("/get-data", get(knowledge_base_controller::get_data))
    .route(
      "/knowledge-bases/:id/files",
      get(knowledge_base_controller::list_files),
    )
    .route(
      "/knowledge-uploads-file",
      post(file_controller::upload_knowledge_file),
    )
    .route(
      "/trigger-external-upload",
      post(file_controller::trigger_external_upload),
    )
    .route("/validate-user", get(user_controller::validate_user))
    .route_layer(middleware::from_fn_with_state(
      state.clone(),
      auth::require_user,
    ));

  let prefix = config.api_prefix.trim_end_matches('/');

  let app = if prefix.is_empty() {
    Router::new().merge(api_routes)
  } else {
    Router::new().nest(prefix, api_routes)
  };

  app
    .route("/health", get(user_controller::health))
    .layer(DefaultBodyLimit::max(config.max_upload_bytes))
    .layer(CatchPanicLayer::new())
    .layer(TraceLayer::new_for_http())
    .layer(cors_layer(&config))
    .with_state(state)
}

async fn shutdown_signal() {
  if let Err(err) = tokio::signal::ctrl_c().await {
    tracing::error!("failed to listen for shutdown: {}", err);
  }

  tracing::info!("shutting down");
}

#[tokio::main]
pub async fn run_backend(config: BackendConf) -> anyhow::Result<()> {
  let addr: SocketAddr = config.bind_addr.parse()?;

  if config.jwt_secret.is_empty() {
    tracing::warn!("jwt_secret is empty, every token signed with an empty key is accepted");
  }

  let pool = connect_pool(&config.database_url).await?;

  db::migrate(&pool).await?;

  let storage = Storage::new(&config.file_path, &config.file_web_host)?;
  let providers = ProviderRegistry::from_conf(&config)?;

  let app = build_router(BackendState::new(config, pool, storage, providers));

  tracing::info!("listening on {}", addr);

  let listener = tokio::net::TcpListener::bind(addr).await?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  Ok(())
}

#[tokio::main]
pub async fn run_migrate(config: BackendConf) -> anyhow::Result<()> {
  let pool = connect_pool(&config.database_url).await?;

  db::migrate(&pool).await?;

  tracing::info!("schema ready at {}", config.database_url);

  Ok(())
}
