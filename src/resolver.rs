use crate::error::Error;
use crate::model::TokenVersion;
use crate::store::TokenStore;

/// Which stored record a resolved token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBinding {
    pub name: String,
    pub version: TokenVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub token: String,
    /// `None` for a token given on the command line; such runs persist nothing.
    pub binding: Option<RecordBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Named(String),
    Direct(String),
}

/// Looks up `name` or `name:version` in the store. A bare name means `last`.
pub fn resolve(store: &TokenStore, reference: &str) -> Result<Resolved, Error> {
    let (name, version) = match reference.split_once(':') {
        Some((name, version)) => (name, version.parse::<TokenVersion>()?),
        None => (reference, TokenVersion::default()),
    };
    let record = store
        .get(name)
        .ok_or_else(|| Error::UnknownToken(name.to_string()))?;

    tracing::debug!(name = %name, %version, "resolved stored token");
    Ok(Resolved {
        token: record.version(version).to_string(),
        binding: Some(RecordBinding { name: name.to_string(), version }),
    })
}

pub fn resolve_direct(token: &str) -> Result<Resolved, Error> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::EmptyToken);
    }
    Ok(Resolved { token: token.to_string(), binding: None })
}

pub fn resolve_source(store: &TokenStore, source: &TokenSource) -> Result<Resolved, Error> {
    match source {
        TokenSource::Named(reference) => resolve(store, reference),
        TokenSource::Direct(token) => resolve_direct(token),
    }
}
