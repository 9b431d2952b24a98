use kbrelay_core::types::conf::ModelCatalog;
use kbrelay_core::types::model::{FileType, PerformanceLevel};
use kbrelay_core::types::openai::ChatMessage;

use crate::provider::{ProviderApi, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
  #[error("token count {count} exceeds the limit of {limit}")]
  ContextTooLarge { count: u64, limit: u64 },
  #[error(transparent)]
  Provider(#[from] ProviderError),
}

/// Picks the cheapest model whose own tokenizer says the messages fit.
///
/// Every count is a live call to the provider, so the same input can
/// resolve differently if the upstream tokenizer changes.
pub async fn select_model(
  api: &dyn ProviderApi,
  catalog: &ModelCatalog,
  file_type: FileType,
  level: PerformanceLevel,
  messages: &[ChatMessage],
) -> Result<String, SelectionError> {
  match file_type {
    FileType::Image => select_image_model(api, catalog, messages).await,
    FileType::Video => Ok(catalog.video.clone()),
    FileType::File | FileType::Text => select_text_model(api, catalog, level, messages).await,
  }
}

async fn select_image_model(
  api: &dyn ProviderApi,
  catalog: &ModelCatalog,
  messages: &[ChatMessage],
) -> Result<String, SelectionError> {
  let small = &catalog.image_small;
  let large = &catalog.image_large;

  let count = api.count_tokens(&small.name, messages).await?;
  if small.fits(count) {
    return Ok(small.name.clone());
  }
  if !large.fits(count) {
    return Err(SelectionError::ContextTooLarge {
      count,
      limit: large.max_tokens,
    });
  }

  let count = api.count_tokens(&large.name, messages).await?;
  if large.fits(count) {
    return Ok(large.name.clone());
  }

  Err(SelectionError::ContextTooLarge {
    count,
    limit: large.max_tokens,
  })
}

async fn select_text_model(
  api: &dyn ProviderApi,
  catalog: &ModelCatalog,
  level: PerformanceLevel,
  messages: &[ChatMessage],
) -> Result<String, SelectionError> {
  let mut count = api.count_tokens(&catalog.fast.name, messages).await?;

  match level {
    PerformanceLevel::Fast => {
      if catalog.fast.fits(count) {
        return Ok(catalog.fast.name.clone());
      }

      Err(SelectionError::ContextTooLarge {
        count,
        limit: catalog.fast.max_tokens,
      })
    }
    PerformanceLevel::Advanced => {
      let advanced = &catalog.advanced;
      if advanced.fits(count) {
        count = api.count_tokens(&advanced.name, messages).await?;
        if advanced.fits(count) {
          return Ok(advanced.name.clone());
        }
      }

      Err(SelectionError::ContextTooLarge {
        count,
        limit: advanced.max_tokens,
      })
    }
    PerformanceLevel::Balanced => {
      for model in &catalog.balanced {
        // the previous count screens out rungs that cannot fit
        if !model.fits(count) {
          continue;
        }

        count = api.count_tokens(&model.name, messages).await?;
        if model.fits(count) {
          return Ok(model.name.clone());
        }
      }

      Err(SelectionError::ContextTooLarge {
        count,
        limit: catalog
          .balanced
          .last()
          .map(|m| m.max_tokens)
          .unwrap_or_else(|| catalog.text_ceiling()),
      })
    }
  }
}
