use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use mds_exporter::config::DEFAULT_EXTRACT_URL;
use mds_exporter::TokenSource;

/// Manage MDS API tokens and download MDS extract data. Downloads started from a
/// stored token can be interrupted and resumed; every page moves the token's
/// `last` cursor forward.
#[derive(Parser)]
#[clap(name = "mds-exporter", version)]
pub(crate) struct Cli {
  /// Where named tokens are kept. Defaults to the platform data directory.
  #[clap(long, global = true, env = "MDS_EXPORTER_STORE")]
  pub(crate) store: Option<PathBuf>,
  /// Extract endpoint of the MDS service.
  #[clap(long, global = true, env = "MDS_EXPORTER_API_URL", default_value = DEFAULT_EXTRACT_URL)]
  pub(crate) api_url: String,
  /// Seconds before a single page request is abandoned.
  #[clap(long, global = true, default_value = "120")]
  pub(crate) timeout: u64,
  /// Retries for a page that fails with a timeout, 5xx or rate limit.
  #[clap(long, global = true, default_value = "5")]
  pub(crate) max_retries: u32,
  /// Log more (-v debug, -vv trace). `RUST_LOG` takes precedence.
  #[clap(short, long, global = true, action = clap::ArgAction::Count)]
  pub(crate) verbose: u8,
  #[clap(subcommand)]
  pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
  /// Manage MDS API tokens
  #[clap(subcommand)]
  Token(TokenCommand),
  /// Download MDS data
  Download(DownloadArgs),
}

#[derive(Subcommand)]
pub(crate) enum TokenCommand {
  /// Add a new MDS token
  Add {
    /// Name for the token (a random adjective-noun name is generated if omitted)
    #[clap(long)]
    name: Option<String>,
    /// The MDS resumption token
    mds_token: String,
  },
  /// List all stored tokens
  List,
  /// Remove a token by name
  Remove { name: String },
}

#[derive(Args)]
#[clap(group(ArgGroup::new("source").required(true).args(["name", "token"])))]
pub(crate) struct DownloadArgs {
  /// Stored token as `NAME` or `NAME:VERSION` (base, last or latest; default last)
  #[clap(long)]
  pub(crate) name: Option<String>,
  /// MDS token to use directly; nothing is recorded for it
  #[clap(long)]
  pub(crate) token: Option<String>,
  /// Output file [default: downloads.jsonl, or downloads.jsonl.zst with --compress]
  #[clap(long)]
  pub(crate) output: Option<PathBuf>,
  /// Compress output with zstd
  #[clap(long)]
  pub(crate) compress: bool,
}

impl DownloadArgs {
  pub(crate) fn source(&self) -> TokenSource {
    match (&self.name, &self.token) {
      (Some(name), _) => TokenSource::Named(name.clone()),
      (None, Some(token)) => TokenSource::Direct(token.clone()),
      // clap's required group guarantees one of the two
      (None, None) => TokenSource::Direct(String::new()),
    }
  }
}
