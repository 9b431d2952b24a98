use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::service::relay::RelayFormat;

/// Turns upstream lines into client frames; a read error ends the stream.
#[pin_project::pin_project]
pub struct FramedLines<T> {
  #[pin]
  inner: T,

  format: RelayFormat,

  is_fused: bool,
}

impl<T> FramedLines<T>
where
  T: Stream<Item = io::Result<String>>,
{
  pub fn new(inner: T, format: RelayFormat) -> Self {
    Self {
      inner,
      format,
      is_fused: false,
    }
  }
}

impl<T> Stream for FramedLines<T>
where
  T: Stream<Item = io::Result<String>>,
{
  type Item = Result<Bytes, Infallible>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let mut this = self.project();

    if *this.is_fused {
      return Poll::Ready(None);
    }

    loop {
      let line = match this.inner.as_mut().poll_next(cx) {
        Poll::Ready(Some(Ok(line))) => line,
        Poll::Ready(Some(Err(err))) => {
          // headers are already sent, the client sees a truncated stream
          tracing::error!("upstream read failed mid-stream: {}", err);
          *this.is_fused = true;

          return Poll::Ready(None);
        }
        Poll::Ready(None) => {
          *this.is_fused = true;

          return Poll::Ready(None);
        }
        Poll::Pending => return Poll::Pending,
      };

      if let Some(frame) = this.format.frame(&line) {
        return Poll::Ready(Some(Ok(frame)));
      }
    }
  }
}
