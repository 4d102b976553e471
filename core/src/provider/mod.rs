//! Translation providers.
//!
//! A provider turns a batch of source strings into a same-length, same-order
//! batch of translations. Providers never fail a batch: when the backend cannot
//! be reached after the bounded retries, the untranslated input is returned so
//! the affected keys stay candidates for the next run.

pub mod http;
pub mod placeholders;
pub mod retry;

use reqwest::StatusCode;
use retry::{Failure, Retryable};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use http::HttpProvider;

/// Longest token treated as an acronym and left untranslated.
pub const ACRONYM_MAX_CHARS: usize = 10;

pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Translates `texts` into `target_language`.
    ///
    /// The output has exactly `texts.len()` items in input order. Items that
    /// could not be translated are returned unchanged.
    fn translate_batch(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> impl Future<Output = Vec<String>> + Send;
}

/// Returns its input unchanged. Used when no backend should be contacted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProvider;

impl TranslationProvider for PassthroughProvider {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn translate_batch(&self, texts: &[String], _target_language: &str) -> Vec<String> {
        texts.to_vec()
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("the API key was rejected (HTTP {status}): {message}")]
    Unauthorized { status: StatusCode, message: String },
    #[error("translation request failed with HTTP {status}: {message}")]
    Http {
        status: StatusCode,
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("translation request failed: {0}")]
    Network(String),
    #[error("malformed translation response: {0}")]
    MalformedResponse(String),
    #[error("expected {expected} translations, received {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

impl Retryable for ProviderError {
    fn failure(&self) -> Failure {
        match self {
            ProviderError::Http {
                status,
                retry_after,
                ..
            } => Failure::Status {
                status: *status,
                retry_after: *retry_after,
            },
            ProviderError::Network(_) => Failure::Network { retry_after: None },
            ProviderError::Unauthorized { .. }
            | ProviderError::MalformedResponse(_)
            | ProviderError::LengthMismatch { .. } => Failure::Permanent,
        }
    }
}

/// Short all-caps tokens such as `CTR`, `ROAS` or `B2B`.
pub fn is_acronym(text: &str) -> bool {
    let trimmed = text.trim();
    let length = trimmed.chars().count();
    length > 0
        && length <= ACRONYM_MAX_CHARS
        && trimmed.chars().any(char::is_alphabetic)
        && trimmed
            .chars()
            .all(|c| c.is_uppercase() || c.is_ascii_digit() || matches!(c, '-' | '&' | '/'))
}

/// English name of a locale tag, used to phrase translation prompts.
pub fn language_name(tag: &str) -> &str {
    let primary = tag.split(['-', '_']).next().unwrap_or(tag);
    match primary.to_ascii_lowercase().as_str() {
        "en" => "English",
        "he" | "iw" => "Hebrew",
        "ar" => "Arabic",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "ru" => "Russian",
        "tr" => "Turkish",
        "pl" => "Polish",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        _ => tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_acronyms() {
        assert!(is_acronym("CTR"));
        assert!(is_acronym("ROAS"));
        assert!(is_acronym("B2B"));
        assert!(is_acronym("A/B"));
        assert!(!is_acronym("Save"));
        assert!(!is_acronym("ABCDEFGHIJK"));
        assert!(!is_acronym("2024"));
        assert!(!is_acronym("CLICK HERE"));
        assert!(!is_acronym(""));
    }

    #[test]
    fn names_known_languages() {
        assert_eq!(language_name("he"), "Hebrew");
        assert_eq!(language_name("pt-BR"), "Portuguese");
        assert_eq!(language_name("xx"), "xx");
    }

    #[test]
    fn classifies_errors_for_retry() {
        let transient = ProviderError::Http {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "slow down".into(),
            retry_after: None,
        };
        assert!(matches!(transient.failure(), Failure::Status { .. }));

        let rejected = ProviderError::Unauthorized {
            status: StatusCode::UNAUTHORIZED,
            message: "bad key".into(),
        };
        assert_eq!(rejected.failure(), Failure::Permanent);
    }
}
