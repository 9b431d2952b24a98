use kbrelay_core::types::conf::BackendConf;
use kbrelay_core::types::model::{ChatProvider, ModelOwner};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::strategy::{LocalStrategy, StepFunStrategy, UnimplementedStrategy};
use super::{HttpProvider, ProviderApi, ProviderFlavor, ProviderStrategy};

/// Resolves chat transports by path segment and strategies by model owner.
pub struct ProviderRegistry {
  stepfun: Arc<dyn ProviderApi>,
  openai: Arc<dyn ProviderApi>,
  dify: Arc<dyn ProviderApi>,
  strategies: HashMap<ModelOwner, Arc<dyn ProviderStrategy>>,
}

impl ProviderRegistry {
  pub fn new(
    stepfun: Arc<dyn ProviderApi>,
    openai: Arc<dyn ProviderApi>,
    dify: Arc<dyn ProviderApi>,
    utc_offset_hours: i8,
  ) -> Self {
    let mut strategies: HashMap<ModelOwner, Arc<dyn ProviderStrategy>> = HashMap::new();

    strategies.insert(
      ModelOwner::StepFun,
      Arc::new(StepFunStrategy::new(stepfun.clone())),
    );
    strategies.insert(
      ModelOwner::Local,
      Arc::new(LocalStrategy::new(utc_offset_hours)),
    );
    for owner in [ModelOwner::Zhipu, ModelOwner::Moonshot, ModelOwner::Baichuan] {
      strategies.insert(owner, Arc::new(UnimplementedStrategy::new(owner)));
    }

    Self {
      stepfun,
      openai,
      dify,
      strategies,
    }
  }

  pub fn from_conf(config: &BackendConf) -> anyhow::Result<Self> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()?;

    let stepfun = HttpProvider::new(client.clone(), ProviderFlavor::StepFun, &config.stepfun);
    let openai = HttpProvider::new(
      client.clone(),
      ProviderFlavor::OpenAiCompatible,
      &config.openai,
    );
    let dify = HttpProvider::new(client, ProviderFlavor::Dify, &config.dify);

    Ok(Self::new(
      Arc::new(stepfun),
      Arc::new(openai),
      Arc::new(dify),
      config.utc_offset_hours,
    ))
  }

  pub fn strategy(&self, owner: ModelOwner) -> Arc<dyn ProviderStrategy> {
    self
      .strategies
      .get(&owner)
      .cloned()
      .unwrap_or_else(|| Arc::new(UnimplementedStrategy::new(owner)))
  }

  pub fn chat_api(&self, provider: ChatProvider) -> Arc<dyn ProviderApi> {
    match provider {
      ChatProvider::StepFun => self.stepfun.clone(),
      ChatProvider::OpenAiCompatible => self.openai.clone(),
      ChatProvider::Dify => self.dify.clone(),
    }
  }

  /// Token counting, extraction and file contents always go through StepFun.
  pub fn stepfun(&self) -> Arc<dyn ProviderApi> {
    self.stepfun.clone()
  }
}
