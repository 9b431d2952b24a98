use kbrelay_core::types::conf::BackendConf;

pub fn init_backend_conf(cli_conf_path: &str) -> Result<BackendConf, anyhow::Error> {
  let config: BackendConf = config::Config::builder()
    .set_default("log_file_path", "logs")?
    .set_default("log_file_name", "kbrelay.log")?
    .set_default("bind_addr", "0.0.0.0:4000")?
    .set_default("api_prefix", "/api")?
    .set_default("database_url", "sqlite://kbrelay.db")?
    .set_default("file_path", "uploads")?
    .set_default("file_web_host", "")?
    .set_default("allow_origins", Vec::<String>::new())?
    .set_default("jwt_secret", "")?
    .set_default("utc_offset_hours", 8)?
    .set_default("max_upload_bytes", 50 * 1024 * 1024)?
    .set_default("poll_interval_ms", 1000)?
    .set_default("poll_timeout_secs", 15)?
    .set_default("stepfun.base_url", "https://api.stepfun.com/v1")?
    .set_default("openai.base_url", "https://api.openai.com/v1")?
    .set_default("dify.base_url", "https://api.dify.ai/v1")?
    .add_source(config::File::with_name("kbrelay.toml").required(false))
    .add_source(config::File::with_name(cli_conf_path).required(false))
    .add_source(
      config::Environment::with_prefix("KR")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("allow_origins")
        .try_parsing(true),
    )
    .build()?
    .try_deserialize()?;

  Ok(config)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn file_overrides_defaults_and_keeps_nested_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
      file,
      r#"
bind_addr = "127.0.0.1:9000"
utc_offset_hours = 0

[stepfun]
api_key = "sk-test"

[models.fast]
name = "step-1-flash"
max_tokens = 5000
"#
    )
    .unwrap();

    let path = file.path().to_string_lossy().to_string();
    let config = init_backend_conf(&path).unwrap();

    assert_eq!(config.bind_addr, "127.0.0.1:9000");
    assert_eq!(config.api_prefix, "/api");
    assert_eq!(config.utc_offset_hours, 0);
    assert_eq!(config.stepfun.api_key, "sk-test");
    assert_eq!(config.stepfun.base_url, "https://api.stepfun.com/v1");
    assert_eq!(config.models.fast.max_tokens, 5000);
    assert_eq!(config.models.balanced.len(), 4);
    assert_eq!(config.poll_timeout_secs, 15);
  }
}
