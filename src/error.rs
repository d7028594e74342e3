use std::path::PathBuf;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("token '{0}' not found")]
  UnknownToken(String),
  #[error("invalid version '{0}'. Use base, last, or latest")]
  InvalidVersion(String),
  #[error("token '{0}' already exists")]
  DuplicateToken(String),
  #[error("invalid token name '{0}': names must be non-empty and contain no ':' or whitespace")]
  InvalidName(String),
  #[error("token value must not be empty")]
  EmptyToken,
  #[error("giving up after {attempts} attempts: {source}")]
  TransientFetch {
    attempts: u32,
    #[source]
    source: FetchError,
  },
  #[error("{0}")]
  PermanentFetch(#[source] FetchError),
  #[error("token store {path}: {message}")]
  Storage { path: PathBuf, message: String },
  #[error("output error: {0}")]
  Output(#[from] std::io::Error),
  #[error("download interrupted")]
  Interrupted,
}

impl Error {
  pub fn storage(path: impl Into<PathBuf>, message: impl ToString) -> Self {
    Error::Storage { path: path.into(), message: message.to_string() }
  }
}

/// Failure of a single page request, before any retry policy is applied.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("request failed: {0}")]
  Network(#[from] reqwest::Error),
  #[error("server answered {status}: {body}")]
  Status {
    status: StatusCode,
    retry_after: Option<Duration>,
    body: String,
  },
  #[error("malformed response: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("protocol error: {0}")]
  Protocol(String),
}

impl FetchError {
  pub fn status(&self) -> Option<StatusCode> {
    match self {
      FetchError::Network(e) => e.status(),
      FetchError::Status { status, .. } => Some(*status),
      FetchError::Decode(_) | FetchError::Protocol(_) => None,
    }
  }

  pub fn retry_after(&self) -> Option<Duration> {
    match self {
      FetchError::Status { retry_after, .. } => *retry_after,
      _ => None,
    }
  }
}

/// Splits failures into the ones worth another attempt and the ones that are not.
pub trait IsRetryable {
  fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
  fn is_retryable(&self) -> bool {
    match self {
      FetchError::Network(e) => match e.status() {
        Some(status) => is_transient_status(status),
        None => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
      },
      FetchError::Status { status, .. } => is_transient_status(*status),
      FetchError::Decode(_) | FetchError::Protocol(_) => false,
    }
  }
}

fn is_transient_status(status: StatusCode) -> bool {
  status.is_server_error()
    || status == StatusCode::TOO_MANY_REQUESTS
    || status == StatusCode::REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
  use super::*;

  fn status_error(code: u16) -> FetchError {
    FetchError::Status {
      status: StatusCode::from_u16(code).unwrap(),
      retry_after: None,
      body: String::new(),
    }
  }

  #[test]
  fn server_errors_and_throttling_are_transient() {
    assert!(status_error(500).is_retryable());
    assert!(status_error(503).is_retryable());
    assert!(status_error(429).is_retryable());
    assert!(status_error(408).is_retryable());
  }

  #[test]
  fn client_errors_are_permanent() {
    assert!(!status_error(400).is_retryable());
    assert!(!status_error(401).is_retryable());
    assert!(!status_error(404).is_retryable());
    assert!(!FetchError::Protocol("no cursor".into()).is_retryable());
  }

  #[test]
  fn retry_after_hint_is_exposed() {
    let error = FetchError::Status {
      status: StatusCode::TOO_MANY_REQUESTS,
      retry_after: Some(Duration::from_secs(7)),
      body: "slow down".into(),
    };

    assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));
    assert_eq!(error.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(error.to_string(), "server answered 429 Too Many Requests: slow down");
  }
}
