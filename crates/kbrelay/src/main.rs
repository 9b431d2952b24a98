use clap::Args;
use clap::{Parser, Subcommand};
use kbrelay_backend::conf::init_backend_conf;
use kbrelay_backend::trace::init_backend_tracing;
use kbrelay_backend::{run_backend, run_migrate};
use kbrelay_core::types::conf::BackendConf;

#[derive(Debug, Default, Args)]
pub struct CliConfig {
  #[clap(long, default_value_t = String::from("kbrelay.toml"))]
  pub config: String,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  #[clap(about = "Run the backend")]
  Backend(CliConfig),
  #[clap(about = "Create the database schema and exit")]
  Migrate(CliConfig),
}

fn main() -> Result<(), anyhow::Error> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Backend(cli_config) => {
      let config: BackendConf = init_backend_conf(&cli_config.config)?;

      let _guard = init_backend_tracing(&config)?;

      tracing::info!(
        "bind_addr={} api_prefix={} database_url={}",
        config.bind_addr,
        config.api_prefix,
        config.database_url
      );

      run_backend(config)?;
    }
    Commands::Migrate(cli_config) => {
      let config: BackendConf = init_backend_conf(&cli_config.config)?;

      tracing_subscriber::fmt()
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();

      run_migrate(config)?;
    }
  }

  Ok(())
}
