use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, FetchError};

/// Stored in place of a cursor once a feed has been read to its end without the
/// service handing out a final cursor.
pub const EXHAUSTED_MARKER: &str = "exhausted";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub remaining: Option<u64>,
}

/// Body of one extract response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub next_url: Option<String>,
    #[serde(default)]
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    /// Cursor for the following page; `None` marks the end of the data.
    pub next_token: Option<String>,
    /// Cursor the service reported alongside the end-of-data page, if any.
    pub final_token: Option<String>,
    pub stats: Stats,
}

impl TryFrom<ExtractResponse> for Page {
    type Error = FetchError;

    fn try_from(response: ExtractResponse) -> Result<Self, FetchError> {
        let ExtractResponse { data, resume, has_next, stats, .. } = response;
        match (has_next, resume) {
            (true, None) => Err(FetchError::Protocol(
                "response announces another page but carries no resume cursor".to_string(),
            )),
            (true, Some(next)) => Ok(Page { records: data, next_token: Some(next), final_token: None, stats }),
            (false, last) => Ok(Page { records: data, next_token: None, final_token: last, stats }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenVersion {
    Base,
    #[default]
    Last,
    Latest,
}

impl FromStr for TokenVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "base" => Ok(TokenVersion::Base),
            "last" => Ok(TokenVersion::Last),
            "latest" => Ok(TokenVersion::Latest),
            invalid => Err(Error::InvalidVersion(invalid.to_string())),
        }
    }
}

impl fmt::Display for TokenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenVersion::Base => "base",
            TokenVersion::Last => "last",
            TokenVersion::Latest => "latest",
        })
    }
}

/// A named token and how far downloads with it have got.
///
/// `base` is fixed at creation. `last` is the resume point of the most recent
/// attempt. `latest` is the deepest point any run has reached and only moves
/// forward, with depth measured by the service's `remaining` counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    name: String,
    base: String,
    last: String,
    latest: String,
    #[serde(default)]
    least_remaining: Option<u64>,
}

impl TokenRecord {
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Self {
        let token = token.into();
        TokenRecord {
            name: name.into(),
            base: token.clone(),
            last: token.clone(),
            latest: token,
            least_remaining: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn last(&self) -> &str {
        &self.last
    }

    pub fn latest(&self) -> &str {
        &self.latest
    }

    pub fn least_remaining(&self) -> Option<u64> {
        self.least_remaining
    }

    pub fn version(&self, version: TokenVersion) -> &str {
        match version {
            TokenVersion::Base => &self.base,
            TokenVersion::Last => &self.last,
            TokenVersion::Latest => &self.latest,
        }
    }

    /// Moves `last` to `token` and, when `remaining` is strictly closer to the end
    /// than anything seen before, `latest` too. Returns whether `latest` moved.
    pub fn advance(&mut self, token: &str, remaining: Option<u64>) -> bool {
        self.last = token.to_string();
        match (remaining, self.least_remaining) {
            (Some(now), Some(best)) if now >= best => false,
            (Some(now), _) => {
                self.latest = token.to_string();
                self.least_remaining = Some(now);
                true
            }
            (None, _) => false,
        }
    }

    pub fn complete(&mut self, token: &str) {
        self.last = token.to_string();
        self.latest = token.to_string();
        self.least_remaining = Some(0);
    }
}
