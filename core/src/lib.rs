pub mod config;
pub mod diff;
pub mod dictionary;
pub mod extract;
pub mod parity;
pub mod provider;
pub mod store;
pub mod sync;

pub use config::{ConfigError, ProviderOptions, SyncConfig};
pub use dictionary::{flatten, unflatten, Dictionary, DictionaryError, FlatMap, Node};
pub use diff::{diff_locale, diff_locale_with, obsolete_keys, CandidateReason, LocaleDiff, TaskItem};
pub use extract::{build_report, ExtractReport, KeyScanner, KeyUsage, ScanOptions};
pub use parity::{check_parity, LocaleParity, ParityError, ParityReport};
pub use provider::{HttpProvider, PassthroughProvider, ProviderError, TranslationProvider};
pub use store::{LocaleStore, StoreError};
pub use sync::{
    LocaleStatus, LocaleSummary, Orchestrator, SyncError, SyncOptions, SyncSummary,
};
