//! Named MDS API tokens and resumable extract downloads.
//!
//! A [`store::TokenStore`] keeps each token with three cursors: `base` (where it
//! started), `last` (where the most recent run stopped) and `latest` (the deepest
//! point any run reached). [`engine::DownloadEngine`] pages through the extract
//! API from one of those cursors and keeps the store current after every page.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod names;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod sink;
pub mod store;

pub use config::{Config, RetryConfig};
pub use engine::{Binding, DownloadEngine, DownloadReport, Outcome};
pub use error::{Error, FetchError};
pub use model::{Page, TokenRecord, TokenVersion, EXHAUSTED_MARKER};
pub use resolver::{resolve, resolve_direct, resolve_source, RecordBinding, Resolved, TokenSource};
pub use service::{MdsClient, PageFetcher};
pub use sink::OutputSink;
pub use store::TokenStore;
