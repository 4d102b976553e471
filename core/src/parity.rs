//! Read-only audit that every locale carries the source locale's keys.

use crate::dictionary::{flatten, FlatMap};
use crate::store::{LocaleStore, StoreError};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParityError {
    #[error("cannot load source locale `{locale}`: {source}")]
    Source { locale: String, source: StoreError },
    #[error("source locale `{locale}` has an unsupported key layout: {message}")]
    SourceLayout { locale: String, message: String },
    #[error(transparent)]
    List(StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleParity {
    pub locale: String,
    /// Source keys absent from this locale.
    pub missing: Vec<String>,
    /// Keys this locale has that the source does not. Reported, never fatal.
    pub extra: Vec<String>,
    /// Set when the locale file could not be read or flattened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LocaleParity {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParityReport {
    pub source_locale: String,
    pub source_keys: usize,
    pub locales: Vec<LocaleParity>,
}

impl ParityReport {
    pub fn is_ok(&self) -> bool {
        self.locales.iter().all(LocaleParity::is_ok)
    }

    pub fn total_missing(&self) -> usize {
        self.locales.iter().map(|locale| locale.missing.len()).sum()
    }
}

/// Compares every locale file in the store, plus any `expected` locale that
/// has no file yet, against the source locale.
pub fn check_parity(
    store: &LocaleStore,
    source_locale: &str,
    expected: &[String],
) -> Result<ParityReport, ParityError> {
    let source_dict = store
        .load_source(source_locale)
        .map_err(|source| ParityError::Source {
            locale: source_locale.to_string(),
            source,
        })?;
    let source = flatten(&source_dict).map_err(|err| ParityError::SourceLayout {
        locale: source_locale.to_string(),
        message: err.to_string(),
    })?;

    let mut locales: BTreeSet<String> = store
        .list_locales()
        .map_err(ParityError::List)?
        .into_iter()
        .collect();
    locales.extend(expected.iter().cloned());
    locales.remove(source_locale);

    let reports = locales
        .into_iter()
        .map(|locale| check_locale(store, &source, locale))
        .collect();

    Ok(ParityReport {
        source_locale: source_locale.to_string(),
        source_keys: source.len(),
        locales: reports,
    })
}

fn check_locale(store: &LocaleStore, source: &FlatMap, locale: String) -> LocaleParity {
    let target = match store
        .load(&locale)
        .map_err(|err| err.to_string())
        .and_then(|dict| flatten(&dict).map_err(|err| err.to_string()))
    {
        Ok(target) => target,
        Err(message) => {
            warn!("{locale}: {message}");
            return LocaleParity {
                locale,
                missing: Vec::new(),
                extra: Vec::new(),
                error: Some(message),
            };
        }
    };

    let missing: Vec<String> = source
        .keys()
        .filter(|key| !target.contains_key(key))
        .map(str::to_string)
        .collect();
    let extra: Vec<String> = target
        .keys()
        .filter(|key| !source.contains_key(key))
        .map(str::to_string)
        .collect();
    debug!(
        "{locale}: {} missing, {} extra",
        missing.len(),
        extra.len()
    );

    LocaleParity {
        locale,
        missing,
        extra,
        error: None,
    }
}
