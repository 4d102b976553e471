use crate::dictionary::{Dictionary, DictionaryError};
use log::debug;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCALE_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("source locale file not found: {}", .path.display())]
    SourceMissing { path: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid locale dictionary in {}: {source}", .path.display())]
    Dictionary {
        path: PathBuf,
        source: DictionaryError,
    },
    #[error("failed to serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to list locale files in {}: {source}", .path.display())]
    List { path: PathBuf, source: io::Error },
}

/// Reads and writes `{locale}.json` files inside one messages directory.
#[derive(Debug, Clone)]
pub struct LocaleStore {
    dir: PathBuf,
}

impl LocaleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, locale: &str) -> PathBuf {
        self.dir.join(format!("{locale}.{LOCALE_EXTENSION}"))
    }

    /// Loads a target locale. A locale that has no file yet is empty.
    pub fn load(&self, locale: &str) -> Result<Dictionary, StoreError> {
        let path = self.path_for(locale);
        match fs::read_to_string(&path) {
            Ok(content) => parse_dictionary(&path, &content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} does not exist yet, starting empty", path.display());
                Ok(Dictionary::new())
            }
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    /// Loads the authoritative locale; unlike targets it must exist.
    pub fn load_source(&self, locale: &str) -> Result<Dictionary, StoreError> {
        let path = self.path_for(locale);
        match fs::read_to_string(&path) {
            Ok(content) => parse_dictionary(&path, &content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::SourceMissing { path })
            }
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    /// Serializes `dict` and atomically replaces the locale file.
    pub fn save(&self, locale: &str, dict: &Dictionary) -> Result<PathBuf, StoreError> {
        let path = self.path_for(locale);
        let contents = render(dict).map_err(|source| StoreError::Serialize {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, contents.as_bytes()).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        debug!("wrote {}", path.display());
        Ok(path)
    }

    /// SHA-256 of the locale file's bytes, `None` when it does not exist.
    pub fn digest(&self, locale: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(locale);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(hex::encode(Sha256::digest(&bytes)))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    /// Locale tags of every `*.json` file in the directory, sorted.
    pub fn list_locales(&self) -> Result<Vec<String>, StoreError> {
        let list_error = |source| StoreError::List {
            path: self.dir.clone(),
            source,
        };
        let mut locales = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(list_error)? {
            let entry = entry.map_err(list_error)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(LOCALE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if !stem.starts_with('.') {
                    locales.push(stem.to_string());
                }
            }
        }
        locales.sort();
        Ok(locales)
    }
}

fn parse_dictionary(path: &Path, content: &str) -> Result<Dictionary, StoreError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Dictionary::from_value(&value).map_err(|source| StoreError::Dictionary {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty JSON with two-space indentation and a trailing newline.
pub fn render(dict: &Dictionary) -> Result<String, serde_json::Error> {
    let mut rendered = serde_json::to_string_pretty(&dict.to_value())?;
    rendered.push('\n');
    Ok(rendered)
}

/// Writes `contents` to a sibling temp file and renames it over `target`.
///
/// The temp file lives in the target's directory so the rename never crosses
/// filesystems. Readers observe either the old file or the new one.
pub fn write_atomic(target: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = build_temp_path(target);
    let result = write_and_swap(&temp_path, target, contents);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_swap(temp_path: &Path, target: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    #[cfg(target_os = "windows")]
    {
        if let Err(err) = fs::rename(temp_path, target) {
            if err.kind() == io::ErrorKind::AlreadyExists {
                fs::remove_file(target)?;
                fs::rename(temp_path, target)?;
            } else {
                return Err(err);
            }
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        fs::rename(temp_path, target)?;
    }

    Ok(())
}

fn build_temp_path(target: &Path) -> PathBuf {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "locale".into());
    target.with_file_name(format!(".{name}.{suffix}.tmp"))
}
