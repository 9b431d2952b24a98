use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use kbrelay_core::types::dify::DifyChatRequest;
use kbrelay_core::types::model::ChatProvider;
use kbrelay_core::types::openai::{ChatCompletionRequest, ResponseFormat};
use serde_json::Value;

use crate::auth::AuthUser;
use crate::error::BackendError;
use crate::service::message_assembler::assemble;
use crate::service::model_selector::select_model;
use crate::service::relay::{relay, RelayFormat};
use crate::types::request::ChatRequestPayload;
use crate::BackendState;

const DIFY_STREAMING: &str = "streaming";

pub async fn create_chat_message(
  State(state): State<BackendState>,
  Extension(AuthUser(username)): Extension<AuthUser>,
  Path(provider): Path<String>,
  Json(payload): Json<ChatRequestPayload>,
) -> Result<impl IntoResponse, BackendError> {
  let provider: ChatProvider = provider
    .parse()
    .map_err(|_| BackendError::bad_request(format!("Unsupported provider: {}", provider)))?;

  tracing::info!(
    "chat via {} for {}, tier {}, file_type {:?}",
    provider,
    username,
    payload.level(),
    payload.file_type
  );

  match provider {
    ChatProvider::StepFun => stepfun_chat(&state, &payload, &username).await,
    ChatProvider::OpenAiCompatible => openai_chat(&state, &payload, &username).await,
    ChatProvider::Dify => dify_chat(&state, payload, username).await,
  }
}

fn to_value<T: serde::Serialize>(body: &T) -> Result<Value, BackendError> {
  serde_json::to_value(body).map_err(|e| BackendError::UnknownException(e.into()))
}

async fn stepfun_chat(
  state: &BackendState,
  payload: &ChatRequestPayload,
  username: &str,
) -> Result<Response, BackendError> {
  let ws = state.workspace();
  let assembled = assemble(ws, ChatProvider::StepFun, payload, username).await?;

  let api = ws.providers.chat_api(ChatProvider::StepFun);

  let model = select_model(
    api.as_ref(),
    &ws.config.models,
    assembled.file_type,
    assembled.level,
    &assembled.messages,
  )
  .await?;

  tracing::info!("selected {} for {} messages", model, assembled.messages.len());

  let request = ChatCompletionRequest {
    model,
    stream: true,
    messages: assembled.messages,
    tools: assembled.tools,
    tool_choice: Some("auto".to_string()),
    response_format: Some(ResponseFormat {
      type_: "text".to_string(),
    }),
  };

  let upstream = api.chat(&to_value(&request)?).await?;

  relay(upstream, RelayFormat::Passthrough, true).await
}

async fn openai_chat(
  state: &BackendState,
  payload: &ChatRequestPayload,
  username: &str,
) -> Result<Response, BackendError> {
  let ws = state.workspace();
  let assembled = assemble(ws, ChatProvider::OpenAiCompatible, payload, username).await?;

  let tier = ws.config.models.openai_model(assembled.level);

  let request = ChatCompletionRequest {
    model: tier.name.clone(),
    stream: tier.stream,
    messages: assembled.messages,
    tools: assembled.tools,
    tool_choice: None,
    response_format: None,
  };

  let upstream = ws
    .providers
    .chat_api(ChatProvider::OpenAiCompatible)
    .chat(&to_value(&request)?)
    .await?;

  relay(upstream, RelayFormat::Passthrough, tier.stream).await
}

async fn dify_chat(
  state: &BackendState,
  payload: ChatRequestPayload,
  username: String,
) -> Result<Response, BackendError> {
  let request = DifyChatRequest {
    inputs: payload
      .inputs
      .unwrap_or_else(|| Value::Object(Default::default())),
    query: payload.query,
    response_mode: payload
      .response_mode
      .filter(|mode| !mode.trim().is_empty())
      .unwrap_or_else(|| DIFY_STREAMING.to_string()),
    conversation_id: payload.conversation_id.unwrap_or_default(),
    user: payload
      .user
      .filter(|user| !user.trim().is_empty())
      .unwrap_or(username),
    files: payload.files,
  };

  let streaming = request.is_streaming();
  let format = if streaming {
    RelayFormat::Dify
  } else {
    RelayFormat::Passthrough
  };

  let upstream = state
    .providers
    .chat_api(ChatProvider::Dify)
    .chat(&to_value(&request)?)
    .await?;

  relay(upstream, format, streaming).await
}
