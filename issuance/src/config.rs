//! Property-based configuration store.
//!
//! A [`ConfigStore`] is an ordered `key=value` map with an optional
//! persistence backend. The file backend lives here; the directory backend
//! is provided by the profile crate. Both share the same text format.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration key {0}")]
    MissingKey(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("malformed configuration line {line}: {text:?}")]
    Malformed { line: usize, text: String },
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration backend error: {0}")]
    Backend(String),
}

/// Where a store's properties are persisted.
pub trait ConfigBackend: Send + Sync + fmt::Debug {
    fn load(&self) -> Result<BTreeMap<String, String>, ConfigError>;

    fn store(&self, props: &BTreeMap<String, String>, sync: bool) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    props: BTreeMap<String, String>,
    backend: Option<Arc<dyn ConfigBackend>>,
}

impl ConfigStore {
    /// An in-memory store; `commit` is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_properties<K, V>(props: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            props: props
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            backend: None,
        }
    }

    /// An empty store that commits to `backend`.
    pub fn with_backend(backend: Arc<dyn ConfigBackend>) -> Self {
        Self {
            props: BTreeMap::new(),
            backend: Some(backend),
        }
    }

    /// Load the current contents of `backend`.
    pub fn open(backend: Arc<dyn ConfigBackend>) -> Result<Self, ConfigError> {
        Ok(Self {
            props: backend.load()?,
            backend: Some(backend),
        })
    }

    pub fn get_string(&self, key: &str) -> Result<&str, ConfigError> {
        self.props
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.props
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_boolean(&self, key: &str) -> Result<bool, ConfigError> {
        let value = self.get_string(key)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// `default` when the key is absent; an unparsable value is an error.
    pub fn get_boolean_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_boolean(key) {
            Err(ConfigError::MissingKey(_)) => Ok(default),
            other => other,
        }
    }

    pub fn get_integer_or(&self, key: &str, default: u32) -> Result<u32, ConfigError> {
        match self.props.get(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.clone(),
            }),
        }
    }

    /// Comma-separated list; empty entries are dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.props
            .get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.props.insert(key.into(), value.into());
    }

    pub fn put_boolean(&mut self, key: impl Into<String>, value: bool) {
        self.put_string(key, if value { "true" } else { "false" });
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.props.remove(key)
    }

    /// Detached copy of the keys under `prefix.`, with the prefix stripped.
    pub fn get_sub_store(&self, prefix: &str) -> ConfigStore {
        let dotted = format!("{prefix}.");
        ConfigStore::from_properties(
            self.props
                .range(dotted.clone()..)
                .take_while(|(k, _)| k.starts_with(&dotted))
                .map(|(k, v)| (k[dotted.len()..].to_string(), v.clone())),
        )
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.props
    }

    /// Persist to the backend. `sync` asks the backend to flush to stable
    /// storage before returning.
    pub fn commit(&self, sync: bool) -> Result<(), ConfigError> {
        match &self.backend {
            Some(backend) => backend.store(&self.props, sync),
            None => Ok(()),
        }
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Render properties as sorted `key=value` lines.
pub fn serialize_properties(props: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in props {
        out.push_str(key);
        out.push('=');
        out.push_str(&escape_value(value));
        out.push('\n');
    }
    out
}

/// Parse `key=value` lines; blank lines and `#` comments are ignored.
pub fn parse_properties(text: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut props = BTreeMap::new();
    for (n, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = trimmed.split_once('=').ok_or_else(|| ConfigError::Malformed {
            line: n + 1,
            text: line.to_string(),
        })?;
        props.insert(key.trim().to_string(), unescape_value(value));
    }
    Ok(props)
}

/// Properties persisted in one file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Remove the backing file.
    pub fn delete(&self) -> Result<(), ConfigError> {
        fs::remove_file(&self.path).map_err(|e| self.io_error(e))
    }
}

impl ConfigBackend for FileBackend {
    fn load(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        parse_properties(&text)
    }

    fn store(&self, props: &BTreeMap<String, String>, sync: bool) -> Result<(), ConfigError> {
        // Write a sibling then rename, so readers never see a partial file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp).map_err(|e| self.io_error(e))?;
        file.write_all(serialize_properties(props).as_bytes())
            .map_err(|e| self.io_error(e))?;
        if sync {
            file.sync_all().map_err(|e| self.io_error(e))?;
        }
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}
