use base64::Engine;
use kbrelay_core::types::conf::PromptConf;
use kbrelay_core::types::model::{ChatProvider, FileType, PerformanceLevel};
use kbrelay_core::types::openai::{
  ChatMessage, ChatMessages, ContentPart, ImageUrl, ToolFunction, ToolStub,
};
use std::collections::BTreeMap;

use super::ingestion::extract_for_chat;
use super::Workspace;
use crate::error::BackendError;
use crate::types::request::ChatRequestPayload;

const RETRIEVAL_DESCRIPTION: &str = "Look up relevant passages in the knowledge base.";

#[derive(Debug)]
pub struct AssembledChat {
  pub messages: ChatMessages,
  pub tools: Vec<ToolStub>,
  pub file_type: FileType,
  pub level: PerformanceLevel,
}

/// StepFun always gets a system message; OpenAI-compatible models only on the fast tier.
pub fn system_message(
  provider: ChatProvider,
  level: PerformanceLevel,
  caller_prompt: Option<&str>,
  prompts: &PromptConf,
) -> Option<ChatMessage> {
  let wanted = match provider {
    ChatProvider::StepFun => true,
    ChatProvider::OpenAiCompatible => level == PerformanceLevel::Fast,
    ChatProvider::Dify => false,
  };
  if !wanted {
    return None;
  }

  let content = caller_prompt
    .map(str::trim)
    .filter(|prompt| !prompt.is_empty())
    .unwrap_or_else(|| prompts.for_level(level));

  if content.is_empty() {
    return None;
  }

  Some(ChatMessage::system(content))
}

/// Inserts file contents after the first message, at positions 1, 3, 5 and so on.
pub fn splice_file_contents(messages: &mut Vec<ChatMessage>, contents: Vec<ChatMessage>) {
  let mut index = 1;

  for content in contents {
    let at = index.min(messages.len());
    messages.insert(at, content);
    index += 2;
  }
}

pub fn build_tools(
  provider: ChatProvider,
  payload: &ChatRequestPayload,
  prompts: &PromptConf,
) -> Vec<ToolStub> {
  let mut tools = Vec::new();

  if payload.web_search {
    tools.push(ToolStub::WebSearch {
      function: ToolFunction {
        description: prompts.web_search_description.clone(),
        options: None,
      },
    });
  }

  let vector_store_id = payload.vector_store_id.trim();
  if provider == ChatProvider::StepFun && !vector_store_id.is_empty() {
    let description = if payload.description.trim().is_empty() {
      RETRIEVAL_DESCRIPTION.to_string()
    } else {
      payload.description.clone()
    };

    let options = BTreeMap::from([
      ("vector_store_id".to_string(), vector_store_id.to_string()),
      (
        "prompt_template".to_string(),
        prompts.retrieval_template.clone(),
      ),
    ]);

    tools.push(ToolStub::Retrieval {
      function: ToolFunction {
        description,
        options: Some(options),
      },
    });
  }

  tools
}

/// Stored content type unless it is missing or generic, then a guess from the filename.
fn image_mime(file_type: &str, filename: &str) -> String {
  let file_type = file_type.trim();
  if file_type.is_empty() || file_type == mime_guess::mime::APPLICATION_OCTET_STREAM.as_ref() {
    mime_guess::from_path(filename)
      .first_or_octet_stream()
      .to_string()
  } else {
    file_type.to_string()
  }
}

async fn image_parts(
  ws: Workspace<'_>,
  file_ids: &[String],
  query: &str,
  username: &str,
) -> Result<Vec<ContentPart>, BackendError> {
  let mut parts = Vec::with_capacity(file_ids.len() + 1);

  for file_id in file_ids {
    let file = crate::db::get_user_file(ws.pool, file_id, username)
      .await?
      .ok_or_else(|| BackendError::not_found(format!("File {} not found", file_id)))?;

    let bytes = ws.storage.read(&file.file_path).await?;

    let mime = image_mime(&file.file_type, &file.filename);

    parts.push(ContentPart::ImageUrl {
      image_url: ImageUrl {
        url: format!(
          "data:{};base64,{}",
          mime,
          base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
        detail: Some("high".to_string()),
      },
    });
  }

  parts.push(ContentPart::Text {
    text: query.to_string(),
  });

  Ok(parts)
}

/// Builds the upstream message list and tools for a StepFun or OpenAI-compatible chat.
pub async fn assemble(
  ws: Workspace<'_>,
  provider: ChatProvider,
  payload: &ChatRequestPayload,
  username: &str,
) -> Result<AssembledChat, BackendError> {
  let level = payload.level();
  let file_type = FileType::parse_lenient(&payload.file_type);

  let mut messages = ChatMessages::from(Vec::with_capacity(
    payload.conversation_history.len() + 2,
  ));

  if let Some(system) = system_message(
    provider,
    level,
    payload.system_prompt.as_deref(),
    &ws.config.prompts,
  ) {
    messages.push(system);
  }

  messages.extend(
    payload
      .conversation_history
      .iter()
      .filter(|message| !message.is_blank())
      .cloned(),
  );

  let mut vector_file_ids = payload.vector_file_ids.clone();

  let user = match file_type {
    FileType::Image => {
      ChatMessage::user_parts(image_parts(ws, &payload.file_ids, &payload.query, username).await?)
    }
    FileType::File => {
      let extracted = extract_for_chat(ws, &payload.file_ids, username).await?;
      vector_file_ids.extend(extracted);
      ChatMessage::user(payload.query.clone())
    }
    FileType::Video | FileType::Text => ChatMessage::user(payload.query.clone()),
  };
  messages.push(user);

  let api = ws.providers.stepfun();
  let mut contents = Vec::with_capacity(vector_file_ids.len());
  for file_id in &vector_file_ids {
    let text = api.file_content(file_id).await?;
    if text.is_empty() {
      tracing::warn!("provider file {} has no content", file_id);
      continue;
    }

    contents.push(ChatMessage::user_parts(vec![ContentPart::Text { text }]));
  }
  splice_file_contents(&mut messages, contents);

  Ok(AssembledChat {
    messages,
    tools: build_tools(provider, payload, &ws.config.prompts),
    file_type,
    level,
  })
}
