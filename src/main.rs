mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, TokenCommand};
use mds_exporter::store::default_store_path;
use mds_exporter::{Config, Error, Outcome};

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = run(cli).await;
  if let Err(e) = &result {
    eprintln!("Error: {e}");
  }
  ExitCode::from(commands::exit_status(&result))
}

async fn run(cli: Cli) -> Result<Outcome, Error> {
  let store_path = match cli.store {
    Some(path) => path,
    None => default_store_path()
      .ok_or_else(|| Error::storage("tokens.json", "no data directory found, pass --store"))?,
  };
  let mut config = Config::new(store_path);
  config.api_url = cli.api_url;
  config.request_timeout = commands::request_timeout(cli.timeout);
  config.retry.max_attempts = cli.max_retries;

  match cli.command {
    Command::Token(TokenCommand::Add { name, mds_token }) => {
      commands::add_token(&config, &mds_token, name.as_deref()).map(|_| Outcome::Completed)
    }
    Command::Token(TokenCommand::List) => commands::list_tokens(&config).map(|_| Outcome::Completed),
    Command::Token(TokenCommand::Remove { name }) => {
      commands::remove_token(&config, &name).map(|_| Outcome::Completed)
    }
    Command::Download(args) => commands::download(&config, &args).await,
  }
}

fn init_tracing(verbose: u8) {
  let default_level = match verbose {
    0 => "warn",
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}
