use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use mds_exporter::engine::{Binding, DownloadEngine, Outcome};
use mds_exporter::progress::ProgressHelper;
use mds_exporter::sink::{default_output_path, OutputSink};
use mds_exporter::{
  resolve, resolve_direct, Config, Error, MdsClient, TokenRecord, TokenSource, TokenStore,
};

use crate::cli::DownloadArgs;

const EXIT_INTERRUPTED: u8 = 130;
const PREVIEW_CHARS: usize = 20;

pub(crate) fn add_token(config: &Config, mds_token: &str, name: Option<&str>) -> Result<(), Error> {
  let mut store = TokenStore::open(&config.store_path)?;
  let assigned = store.add(mds_token, name, &mut rand::thread_rng())?;
  println!("Added token '{assigned}'");
  Ok(())
}

pub(crate) fn list_tokens(config: &Config) -> Result<(), Error> {
  let store = TokenStore::open(&config.store_path)?;
  println!(
    "{:<24} {:<24} {:<24} {:<24} {}",
    "Name", "Base", "Last", "Latest", "Least Remaining"
  );
  for record in store.records() {
    println!("{}", list_row(record));
  }
  Ok(())
}

pub(crate) fn remove_token(config: &Config, name: &str) -> Result<(), Error> {
  let mut store = TokenStore::open(&config.store_path)?;
  store.remove(name)?;
  println!("Removed token '{name}'");
  Ok(())
}

pub(crate) async fn download(config: &Config, args: &DownloadArgs) -> Result<Outcome, Error> {
  // store and reference problems must surface before any output file exists;
  // a direct token never opens the store
  let (resolved, mut store) = match args.source() {
    TokenSource::Named(reference) => {
      let store = TokenStore::open(&config.store_path)?;
      let resolved = resolve(&store, &reference)?;
      store.ensure_writable()?;
      (resolved, Some(store))
    }
    TokenSource::Direct(token) => (resolve_direct(&token)?, None),
  };

  let output = args
    .output
    .clone()
    .unwrap_or_else(|| default_output_path(args.compress));
  let sink = OutputSink::open(&output, args.compress)?;

  let client = Client::builder()
    .timeout(config.request_timeout)
    .build()
    .map_err(|e| Error::PermanentFetch(e.into()))?;
  let fetcher = MdsClient::with_url(client, config.api_url.clone());

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupt received, stopping after the current page");
      on_interrupt.cancel();
    }
  });

  let binding = match (resolved.binding.as_ref(), store.as_mut()) {
    (Some(binding), Some(store)) => Some(Binding { store, name: binding.name.clone() }),
    _ => None,
  };
  let progress = ProgressHelper::create(format!("Downloading to {}", output.display()));
  let engine = DownloadEngine::new(&fetcher, config.retry.clone(), cancel).with_progress(progress);

  let report = engine.run(&resolved.token, binding, sink).await?;
  match report.outcome {
    Outcome::Completed => println!(
      "Downloaded {records} records in {pages} pages to `{path}`",
      records = report.records,
      pages = report.pages,
      path = output.display()
    ),
    Outcome::Interrupted => eprintln!(
      "Interrupted after {records} records in {pages} pages; run again to resume",
      records = report.records,
      pages = report.pages
    ),
  }
  Ok(report.outcome)
}

/// Process exit status: 0 when done, 130 when interrupted, 1 on any error.
pub(crate) fn exit_status(result: &Result<Outcome, Error>) -> u8 {
  match result {
    Ok(Outcome::Completed) => 0,
    Ok(Outcome::Interrupted) => EXIT_INTERRUPTED,
    Err(_) => 1,
  }
}

pub(crate) fn request_timeout(seconds: u64) -> Duration {
  Duration::from_secs(seconds.max(1))
}

fn list_row(record: &TokenRecord) -> String {
  let least = record
    .least_remaining()
    .map(|n| n.to_string())
    .unwrap_or_else(|| "-".to_string());
  format!(
    "{:<24} {:<24} {:<24} {:<24} {}",
    record.name(),
    preview(record.base()),
    preview(record.last()),
    preview(record.latest()),
    least
  )
}

fn preview(token: &str) -> String {
  if token.chars().count() <= PREVIEW_CHARS {
    token.to_string()
  } else {
    let head: String = token.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
  }
}
