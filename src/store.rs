use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::Error;
use crate::model::TokenRecord;
use crate::names::generate_name;

const APP_NAME: &str = "mds-exporter";
const STORE_FILE: &str = "tokens.json";
const NAME_ATTEMPTS: usize = 64;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    tokens: Vec<TokenRecord>,
}

/// Named tokens, kept in a JSON file that is rewritten after every change.
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    records: BTreeMap<String, TokenRecord>,
}

/// `<data dir>/mds-exporter/tokens.json` for the current platform.
pub fn default_store_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join(STORE_FILE))
}

impl TokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) => {
                let file: StoreFile =
                    serde_json::from_str(&content).map_err(|e| Error::storage(&path, e))?;
                file.tokens
                    .into_iter()
                    .map(|record| (record.name().to_string(), record))
                    .collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::storage(&path, e)),
        };
        tracing::debug!(path = %path.display(), tokens = records.len(), "opened token store");
        Ok(TokenStore { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&TokenRecord> {
        self.records.get(name)
    }

    pub fn records(&self) -> impl Iterator<Item = &TokenRecord> {
        self.records.values()
    }

    /// Stores `token` under `name`, or under a fresh generated name. Returns the name used.
    pub fn add<R: Rng + ?Sized>(
        &mut self,
        token: &str,
        name: Option<&str>,
        rng: &mut R,
    ) -> Result<String, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::EmptyToken);
        }
        let name = match name {
            Some(name) => {
                validate_name(name)?;
                if self.records.contains_key(name) {
                    return Err(Error::DuplicateToken(name.to_string()));
                }
                name.to_string()
            }
            None => self.unused_name(rng),
        };

        self.records.insert(name.clone(), TokenRecord::new(name.as_str(), token));
        self.save()?;
        tracing::info!(name = %name, "added token");
        Ok(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<TokenRecord, Error> {
        let record = self
            .records
            .remove(name)
            .ok_or_else(|| Error::UnknownToken(name.to_string()))?;
        self.save()?;
        tracing::info!(name = %name, "removed token");
        Ok(record)
    }

    /// Records that a page was consumed and `token` is the cursor to continue from.
    pub fn record_progress(
        &mut self,
        name: &str,
        token: &str,
        remaining: Option<u64>,
    ) -> Result<(), Error> {
        let record = self
            .records
            .get_mut(name)
            .ok_or_else(|| Error::UnknownToken(name.to_string()))?;
        let deeper = record.advance(token, remaining);
        tracing::debug!(name = %name, ?remaining, latest_moved = deeper, "recorded progress");
        self.save()
    }

    pub fn record_completion(&mut self, name: &str, token: &str) -> Result<(), Error> {
        let record = self
            .records
            .get_mut(name)
            .ok_or_else(|| Error::UnknownToken(name.to_string()))?;
        record.complete(token);
        tracing::debug!(name = %name, "recorded completion");
        self.save()
    }

    /// Rewrites the store unchanged, proving it can be persisted before any
    /// download depends on that.
    pub fn ensure_writable(&self) -> Result<(), Error> {
        self.save()
    }

    fn unused_name<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        for _ in 0..NAME_ATTEMPTS {
            let candidate = generate_name(rng);
            if !self.records.contains_key(&candidate) {
                return candidate;
            }
        }
        // word pairs are running out; disambiguate with a number instead
        let stem = generate_name(rng);
        let mut n = 2u32;
        loop {
            let candidate = format!("{stem}-{n}");
            if !self.records.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Rewrites the whole store through a temp file and an atomic rename.
    fn save(&self) -> Result<(), Error> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| Error::storage(&self.path, e))?;

        let file = StoreFile { tokens: self.records.values().cloned().collect() };
        let content = serde_json::to_vec_pretty(&file).map_err(|e| Error::storage(&self.path, e))?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| Error::storage(&self.path, e))?;
        temp.write_all(&content)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| Error::storage(&self.path, e))?;
        temp.persist(&self.path).map_err(|e| Error::storage(&self.path, e.error))?;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.contains(':') || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}
