//! Reads the `key=value` env file forwarded to the managed containers.
//!
//! The file supplies credentials and connection strings for the compose
//! project. Its values are handed to the orchestrator as process environment;
//! the API key check is a presence heuristic and never gates reconciliation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Keys accepted as the LLM credential, in lookup order.
pub const API_KEY_VARIABLES: &[&str] = &["LLM_API_KEY", "OPENAI_API_KEY"];

/// A credential shorter than this is treated as unset.
pub const MIN_API_KEY_LENGTH: usize = 11;

const PLACEHOLDER_VALUES: &[&str] = &["your-openai-api-key-here", "your_openai_api_key_here"];

/// Parsed env file preserving declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    /// Parses env file content.
    ///
    /// Blank lines, `#` comments and lines without `=` are skipped. A leading
    /// `export ` is ignored and matching surrounding quotes are stripped. Later
    /// declarations of the same key replace earlier ones.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut file = Self::default();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let declaration = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = declaration.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            file.insert(key, unquote(value.trim()));
        }
        file
    }

    /// Loads an env file, returning `None` when it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, EnvFileError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(Self::parse(&content))),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(EnvFileError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn insert(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| existing == key) {
            value.clone_into(&mut entry.1);
            return;
        }
        self.entries.push((key.to_owned(), value.to_owned()));
    }

    /// Returns the value declared for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over declarations in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Classifies the LLM credential.
    ///
    /// The first key from [`API_KEY_VARIABLES`] that is declared decides the
    /// outcome.
    #[must_use]
    pub fn api_key_status(&self) -> ApiKeyStatus {
        let Some((key, value)) = API_KEY_VARIABLES
            .iter()
            .find_map(|key| self.get(key).map(|value| (*key, value)))
        else {
            return ApiKeyStatus::Missing;
        };
        if PLACEHOLDER_VALUES
            .iter()
            .any(|placeholder| value.eq_ignore_ascii_case(placeholder))
        {
            return ApiKeyStatus::Placeholder { key };
        }
        if value.chars().count() < MIN_API_KEY_LENGTH {
            return ApiKeyStatus::TooShort { key };
        }
        ApiKeyStatus::Configured { key }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Outcome of the credential presence heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyStatus {
    /// A plausible credential is present.
    Configured {
        /// Variable that supplied it.
        key: &'static str,
    },
    /// The template placeholder was left in place.
    Placeholder {
        /// Variable holding the placeholder.
        key: &'static str,
    },
    /// The value is empty or shorter than [`MIN_API_KEY_LENGTH`].
    TooShort {
        /// Variable holding the short value.
        key: &'static str,
    },
    /// None of [`API_KEY_VARIABLES`] is declared.
    Missing,
}

/// Errors raised while reading an env file.
#[derive(Debug, Error)]
pub enum EnvFileError {
    /// The file exists but could not be read.
    #[error("failed to read env file {path:?}: {source}")]
    Read {
        /// Env file location.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
