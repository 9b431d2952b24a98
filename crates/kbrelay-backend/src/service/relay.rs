use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use kbrelay_core::types::dify::DifyEvent;
use kbrelay_core::types::openai::{
  ChatCompletionChunk, ChatCompletionChunkChoice, ChatCompletionChunkDelta,
};
use tinyvec::tiny_vec;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;

use crate::error::BackendError;
use crate::framed_lines::FramedLines;
use crate::provider::UpstreamResponse;

const DIFY_MODEL: &str = "dify";
const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// How one upstream line becomes client bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayFormat {
  /// Non-blank lines are forwarded verbatim as SSE frames.
  Passthrough,
  /// Dify `data:` events reshaped into chat-completion chunks.
  Dify,
}

impl RelayFormat {
  pub fn frame(&self, line: &str) -> Option<Bytes> {
    if line.trim().is_empty() {
      return None;
    }

    match self {
      RelayFormat::Passthrough => Some(Bytes::from(format!("{}\n\n", line))),
      RelayFormat::Dify => dify_frame(line),
    }
  }
}

fn fingerprint() -> String {
  format!("kbrelay-{}", env!("CARGO_PKG_VERSION"))
}

fn dify_chunk(
  event: &DifyEvent,
  content: Option<String>,
  finish_reason: Option<String>,
) -> ChatCompletionChunk {
  let id = if event.task_id.is_empty() {
    event.message_id.clone()
  } else {
    event.task_id.clone()
  };

  ChatCompletionChunk {
    id,
    choices: tiny_vec![ChatCompletionChunkChoice {
      index: 0,
      finish_reason,
      delta: ChatCompletionChunkDelta {
        content,
        role: Some("assistant".to_string()),
      },
    }],
    created: event.created_at,
    model: DIFY_MODEL.to_string(),
    system_fingerprint: fingerprint(),
    object: CHUNK_OBJECT.to_string(),
    usage: None,
  }
}

fn dify_frame(line: &str) -> Option<Bytes> {
  let data = line.trim().strip_prefix("data:")?.trim();

  let event: DifyEvent = match serde_json::from_str(data) {
    Ok(event) => event,
    Err(err) => {
      tracing::warn!("skipping undecodable dify line: {}", err);
      return None;
    }
  };

  if event.is_answer() {
    let chunk = dify_chunk(&event, event.answer.clone(), None);

    return match serde_json::to_string(&chunk) {
      Ok(json) => Some(Bytes::from(format!("data: {}\n\n", json))),
      Err(err) => {
        tracing::error!("failed to encode chunk: {}", err);
        None
      }
    };
  }

  if event.is_end() {
    let mut chunk = dify_chunk(&event, None, Some("stop".to_string()));
    chunk.usage = event.final_usage();

    return match serde_json::to_string(&chunk) {
      Ok(json) => Some(Bytes::from(format!("data: {}\n\ndata: [DONE]\n\n", json))),
      Err(err) => {
        tracing::error!("failed to encode chunk: {}", err);
        None
      }
    };
  }

  tracing::debug!("ignoring dify event {}", event.event);

  None
}

async fn drain(upstream: UpstreamResponse) -> String {
  let mut body = upstream.body;
  let mut buf = Vec::new();

  while let Some(chunk) = body.next().await {
    match chunk {
      Ok(chunk) => buf.extend_from_slice(&chunk),
      Err(_) => break,
    }
  }

  String::from_utf8_lossy(&buf).into_owned()
}

/// Re-streams an upstream chat response line by line.
///
/// A non-2xx status is answered with that status and a generic body; the
/// upstream body is only logged.
pub async fn relay(
  upstream: UpstreamResponse,
  format: RelayFormat,
  streaming: bool,
) -> Result<Response, BackendError> {
  let status = upstream.status;

  if !status.is_success() {
    let body = drain(upstream).await;
    tracing::error!("upstream responded {}: {}", status, body);

    return Err(BackendError::upstream(status));
  }

  let reader = StreamReader::new(upstream.body);
  let lines = LinesStream::new(tokio::io::BufReader::new(reader).lines());
  let framed = FramedLines::new(lines, format);

  let mut response = Response::new(Body::from_stream(framed));
  let headers = response.headers_mut();
  headers.insert(
    header::CONTENT_TYPE,
    HeaderValue::from_static(if streaming {
      "text/event-stream"
    } else {
      "application/json"
    }),
  );
  headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
  headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

  Ok(response)
}
