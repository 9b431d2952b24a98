use opendal::services::Fs;
use opendal::Operator;
use std::path::Path;
use time::OffsetDateTime;
use uuid::Uuid;

/// Local file store rooted at `file_path`; records keep the relative path.
#[derive(Clone)]
pub struct Storage {
  op: Operator,
  web_host: String,
}

impl Storage {
  pub fn new(root: &str, web_host: &str) -> anyhow::Result<Self> {
    let mut builder = Fs::default();

    builder.root(root);

    let op: Operator = Operator::new(builder)?.finish();

    Ok(Self {
      op,
      web_host: web_host.trim_end_matches('/').to_string(),
    })
  }

  /// Writes under `<username>/<YYYY-MM-DD>/<uuid>_<basename>` and returns that path.
  pub async fn save(
    &self,
    username: &str,
    filename: &str,
    at: OffsetDateTime,
    bytes: Vec<u8>,
  ) -> anyhow::Result<String> {
    let basename = Path::new(filename)
      .file_name()
      .and_then(|name| name.to_str())
      .unwrap_or("upload");

    let path = format!(
      "{}/{}/{}_{}",
      username,
      kbrelay_core::util::date_dir(at)?,
      Uuid::new_v4(),
      basename
    );

    self.op.write(&path, bytes).await?;

    tracing::info!("stored {}", path);

    Ok(path)
  }

  pub async fn read(&self, path: &str) -> anyhow::Result<Vec<u8>> {
    Ok(self.op.read(path).await?)
  }

  pub fn public_url(&self, path: &str) -> String {
    format!("{}/{}", self.web_host, path)
  }
}
