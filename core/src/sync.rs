//! Batch orchestrator: brings every target locale in line with the source.
//!
//! Per target locale the run loads the file, diffs it against the source,
//! translates the candidates in bounded chunks, merges the results back by
//! candidate index, prunes keys the source no longer has and saves atomically.
//! A failing locale is recorded in the summary and does not stop the others;
//! a missing or invalid source aborts before anything is written.

use crate::config::{ConfigError, SyncConfig};
use crate::diff::{diff_locale_with, obsolete_keys, CandidateReason, TaskItem};
use crate::dictionary::{flatten, unflatten, DictionaryError, FlatMap};
use crate::provider::{is_acronym, TranslationProvider};
use crate::store::{LocaleStore, StoreError};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot load source locale `{locale}`: {source}")]
    Source { locale: String, source: StoreError },
    #[error("source locale `{locale}` has an unsupported key layout: {source}")]
    SourceLayout {
        locale: String,
        source: DictionaryError,
    },
    #[error("`{0}` is the source locale and cannot be a translation target")]
    TargetIsSource(String),
    #[error("sync cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
enum LocaleError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unsupported key layout: {0}")]
    Layout(#[from] DictionaryError),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocaleStatus {
    /// Nothing to translate or prune; the file was left untouched.
    UpToDate,
    /// The file was rewritten.
    Updated,
    /// Candidates were found but nothing changed after merging.
    Unchanged,
    /// Dry run: candidates were reported, nothing was translated or written.
    DryRun,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleSummary {
    pub locale: String,
    /// Candidates sent for translation and merged into the target.
    pub new: usize,
    /// Of `new`, keys the provider returned unchanged (retried next run).
    pub untranslated: usize,
    /// Preserved keys filled with the source value.
    pub copied: usize,
    pub pruned: usize,
    pub status: LocaleStatus,
}

impl LocaleSummary {
    fn empty(locale: &str, status: LocaleStatus) -> Self {
        Self {
            locale: locale.to_string(),
            new: 0,
            untranslated: 0,
            copied: 0,
            pruned: 0,
            status,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, LocaleStatus::Failed { .. })
    }

    /// Candidates that actually came back translated.
    pub fn translated(&self) -> usize {
        self.new - self.untranslated
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub source_locale: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub locales: Vec<LocaleSummary>,
}

impl SyncSummary {
    pub fn has_failures(&self) -> bool {
        self.locales.iter().any(LocaleSummary::is_failed)
    }

    pub fn total_new(&self) -> usize {
        self.locales.iter().map(|locale| locale.new).sum()
    }

    pub fn total_translated(&self) -> usize {
        self.locales.iter().map(LocaleSummary::translated).sum()
    }

    pub fn total_untranslated(&self) -> usize {
        self.locales.iter().map(|locale| locale.untranslated).sum()
    }

    pub fn up_to_date(&self) -> impl Iterator<Item = &LocaleSummary> {
        self.locales
            .iter()
            .filter(|locale| locale.status == LocaleStatus::UpToDate)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
}

pub struct Orchestrator<P> {
    config: SyncConfig,
    store: LocaleStore,
    provider: P,
    cancel: Arc<AtomicBool>,
}

impl<P: TranslationProvider> Orchestrator<P> {
    pub fn new(config: SyncConfig, provider: P) -> Self {
        let store = config.store();
        Self {
            config,
            store,
            provider,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Flag checked between chunks; setting it stops the run before the
    /// current locale is saved.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Syncs every configured target locale.
    pub async fn run(&self, options: SyncOptions) -> Result<SyncSummary, SyncError> {
        let targets = self.config.target_locales.clone();
        self.run_locales(&targets, options).await
    }

    /// Syncs only the given target locales.
    pub async fn run_locales(
        &self,
        locales: &[String],
        options: SyncOptions,
    ) -> Result<SyncSummary, SyncError> {
        let source_locale = self.config.source_locale.as_str();
        if let Some(locale) = locales.iter().find(|locale| *locale == source_locale) {
            return Err(SyncError::TargetIsSource(locale.clone()));
        }

        let started_at = Utc::now();
        let source = self.load_source()?;
        info!(
            "loaded {} keys from source locale {} using provider {}",
            source.len(),
            source_locale,
            self.provider.name()
        );

        let mut summaries = Vec::with_capacity(locales.len());
        for locale in locales {
            if self.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.sync_locale(locale, &source, options).await {
                Ok(summary) => summaries.push(summary),
                Err(LocaleError::Cancelled) => return Err(SyncError::Cancelled),
                Err(err) => {
                    error!("{locale}: {err}");
                    summaries.push(LocaleSummary::empty(
                        locale,
                        LocaleStatus::Failed {
                            message: err.to_string(),
                        },
                    ));
                }
            }
        }

        Ok(SyncSummary {
            source_locale: source_locale.to_string(),
            started_at,
            finished_at: Utc::now(),
            locales: summaries,
        })
    }

    fn load_source(&self) -> Result<FlatMap, SyncError> {
        let locale = &self.config.source_locale;
        let dict = self
            .store
            .load_source(locale)
            .map_err(|source| SyncError::Source {
                locale: locale.clone(),
                source,
            })?;
        flatten(&dict).map_err(|source| SyncError::SourceLayout {
            locale: locale.clone(),
            source,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    async fn sync_locale(
        &self,
        locale: &str,
        source: &FlatMap,
        options: SyncOptions,
    ) -> Result<LocaleSummary, LocaleError> {
        let mut target = flatten(&self.store.load(locale)?)?;
        let skip_acronyms = self.config.provider.skip_acronyms;
        let diff = diff_locale_with(source, &target, &self.config.preserve_keys, |value| {
            skip_acronyms && is_acronym(value)
        });
        let obsolete = obsolete_keys(source, &target);

        if diff.is_empty() && obsolete.is_empty() {
            info!("{locale}: up to date");
            return Ok(LocaleSummary::empty(locale, LocaleStatus::UpToDate));
        }

        info!(
            "{locale}: {} to translate ({} missing, {} placeholders, {} same as source), {} to copy, {} obsolete",
            diff.to_translate.len(),
            diff.count(CandidateReason::Missing),
            diff.count(CandidateReason::Placeholder),
            diff.count(CandidateReason::SameAsSource),
            diff.to_copy.len(),
            obsolete.len()
        );

        if options.dry_run {
            for item in &diff.to_translate {
                info!("{locale}: would translate {} ({:?})", item.key, item.reason);
            }
            return Ok(LocaleSummary {
                new: diff.to_translate.len(),
                copied: diff.to_copy.len(),
                pruned: obsolete.len(),
                ..LocaleSummary::empty(locale, LocaleStatus::DryRun)
            });
        }

        let translations = self.translate_in_chunks(locale, &diff.to_translate).await?;

        let mut changed = 0;
        let mut untranslated = 0;
        for item in &diff.to_translate {
            let value = &translations[item.index];
            if value == &item.source {
                untranslated += 1;
            }
            if target.insert(item.key.as_str(), value.as_str()).as_deref() != Some(value.as_str()) {
                changed += 1;
            }
        }
        for (key, value) in &diff.to_copy {
            if target.insert(key.as_str(), value.as_str()).as_deref() != Some(value.as_str()) {
                changed += 1;
            }
        }
        let pruned = target.retain(|key, _| source.contains_key(key));
        for key in &pruned {
            info!("{locale}: pruned obsolete key {key}");
        }

        if untranslated > 0 {
            warn!("{locale}: {untranslated} strings came back untranslated and will be retried next run");
        }

        let summary = LocaleSummary {
            locale: locale.to_string(),
            new: diff.to_translate.len(),
            untranslated,
            copied: diff.to_copy.len(),
            pruned: pruned.len(),
            status: LocaleStatus::Unchanged,
        };

        if changed == 0 && pruned.is_empty() {
            info!("{locale}: no values changed, leaving file untouched");
            return Ok(summary);
        }

        if self.is_cancelled() {
            return Err(LocaleError::Cancelled);
        }

        let ordered: FlatMap = source
            .keys()
            .filter_map(|key| target.get(key).map(|value| (key, value)))
            .collect();
        let path = self.store.save(locale, &unflatten(&ordered)?)?;
        info!("{locale}: wrote {}", path.display());

        Ok(LocaleSummary {
            status: LocaleStatus::Updated,
            ..summary
        })
    }

    /// Sends candidates to the provider in `batch_size` chunks, one chunk at a
    /// time, and returns the results indexed like `items`.
    async fn translate_in_chunks(
        &self,
        locale: &str,
        items: &[TaskItem],
    ) -> Result<Vec<String>, LocaleError> {
        let mut results: Vec<String> = items.iter().map(|item| item.source.clone()).collect();
        let batch_size = self.config.batch_size.max(1);
        let total_batches = items.len().div_ceil(batch_size);

        for (batch_number, chunk) in items.chunks(batch_size).enumerate() {
            if self.is_cancelled() {
                return Err(LocaleError::Cancelled);
            }
            info!(
                "{locale}: batch {}/{} ({} strings)",
                batch_number + 1,
                total_batches,
                chunk.len()
            );

            let texts: Vec<String> = chunk.iter().map(|item| item.source.clone()).collect();
            let outputs = self.provider.translate_batch(&texts, locale).await;
            if outputs.len() != chunk.len() {
                warn!(
                    "{locale}: provider returned {} results for {} strings, keeping source text for this batch",
                    outputs.len(),
                    chunk.len()
                );
                continue;
            }
            for (item, output) in chunk.iter().zip(outputs) {
                results[item.index] = output;
            }
        }

        Ok(results)
    }
}
