#![forbid(unsafe_code)]

mod watch;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use locale_sync_core::{
    build_report, check_parity, flatten, HttpProvider, KeyScanner, LocaleStatus, Orchestrator,
    ParityReport, PassthroughProvider, ScanOptions, SyncConfig, SyncError, SyncOptions,
    SyncSummary, TranslationProvider,
};
use log::{info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILES: [&str; 3] = ["locale-sync.yaml", "locale-sync.yml", "locale-sync.json"];

#[derive(Debug, Parser)]
#[command(
    name = "locale-sync",
    version,
    about = "Keeps translated locale files in sync with the source locale"
)]
struct Cli {
    /// YAML or JSON configuration file. Defaults to ./locale-sync.{yaml,yml,json} when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding `{locale}.json` files
    #[arg(long, global = true)]
    messages_dir: Option<PathBuf>,
    /// Source locale tag
    #[arg(long, global = true)]
    source: Option<String>,
    /// Comma separated target locale tags
    #[arg(long, global = true, value_delimiter = ',')]
    targets: Vec<String>,
    /// Strings sent to the provider per request
    #[arg(long, global = true)]
    batch_size: Option<usize>,
    /// Print machine readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Translate missing and stale keys for every target locale
    Sync {
        /// Report what would be translated without calling the provider or writing files
        #[arg(long)]
        dry_run: bool,
    },
    /// Sync a single target locale
    Translate {
        locale: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-run sync whenever the source locale file changes
    Watch,
    /// Fail when any locale lacks a key the source locale has
    CheckParity,
    /// Scan application sources for translation keys and compare them with the source locale
    Extract {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let ok = match &cli.command {
        Command::Sync { dry_run } => sync(config, None, *dry_run, cli.json).await?,
        Command::Translate { locale, dry_run } => {
            sync(config, Some(locale.clone()), *dry_run, cli.json).await?
        }
        Command::Watch => {
            let api_key = config.require_api_key()?.to_string();
            let provider = HttpProvider::new(&config.provider, &api_key, &config.source_locale)?;
            let orchestrator = Orchestrator::new(config, provider);
            install_ctrl_c(orchestrator.cancel_handle());
            watch::watch(&orchestrator).await?;
            true
        }
        Command::CheckParity => parity(&config, cli.json)?,
        Command::Extract { paths } => extract(&config, paths, cli.json)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// File, then flags, then environment.
fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let path = cli.config.clone().or_else(|| {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.is_file())
    });
    let mut config = match path {
        Some(path) => {
            info!("using configuration {}", path.display());
            SyncConfig::from_file(&path)?
        }
        None => SyncConfig::default(),
    };

    if let Some(dir) = &cli.messages_dir {
        config.messages_dir = dir.clone();
    }
    if let Some(source) = &cli.source {
        config.source_locale = source.clone();
    }
    if !cli.targets.is_empty() {
        config.target_locales = cli
            .targets
            .iter()
            .map(|target| target.trim().to_string())
            .filter(|target| !target.is_empty())
            .collect();
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    config.apply_env(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

async fn sync(
    config: SyncConfig,
    locale: Option<String>,
    dry_run: bool,
    json: bool,
) -> Result<bool> {
    let options = SyncOptions { dry_run };
    let summary = if dry_run {
        execute(Orchestrator::new(config, PassthroughProvider), locale, options).await?
    } else {
        let api_key = config.require_api_key()?.to_string();
        let provider = HttpProvider::new(&config.provider, &api_key, &config.source_locale)?;
        execute(Orchestrator::new(config, provider), locale, options).await?
    };

    print_summary(&summary, json)?;
    Ok(!summary.has_failures())
}

async fn execute<P: TranslationProvider>(
    orchestrator: Orchestrator<P>,
    locale: Option<String>,
    options: SyncOptions,
) -> Result<SyncSummary> {
    let cancel = orchestrator.cancel_handle();
    install_ctrl_c(Arc::clone(&cancel));

    let timeout = orchestrator.config().run_timeout();
    let locales = match locale {
        Some(locale) => vec![locale],
        None => orchestrator.config().target_locales.clone(),
    };
    match tokio::time::timeout(timeout, orchestrator.run_locales(&locales, options)).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            cancel.store(true, Ordering::SeqCst);
            Err(SyncError::Cancelled)
                .with_context(|| format!("sync did not finish within {}s", timeout.as_secs()))
        }
    }
}

pub(crate) fn install_ctrl_c(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            cancel.store(true, Ordering::SeqCst);
        }
    });
}

pub(crate) fn print_summary(summary: &SyncSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    for locale in &summary.locales {
        let status = match &locale.status {
            LocaleStatus::UpToDate => "up to date".to_string(),
            LocaleStatus::Updated => "updated".to_string(),
            LocaleStatus::Unchanged => "unchanged".to_string(),
            LocaleStatus::DryRun => "dry run".to_string(),
            LocaleStatus::Failed { message } => format!("FAILED: {message}"),
        };
        println!(
            "{:<8} {:>4} candidates  {:>4} untranslated  {:>4} copied  {:>4} pruned  {}",
            locale.locale, locale.new, locale.untranslated, locale.copied, locale.pruned, status
        );
    }

    println!("{}", totals_line(summary));
    Ok(())
}

fn totals_line(summary: &SyncSummary) -> String {
    let up_to_date: Vec<&str> = summary
        .up_to_date()
        .map(|locale| locale.locale.as_str())
        .collect();
    let up_to_date = if up_to_date.is_empty() {
        "none".to_string()
    } else {
        up_to_date.join(", ")
    };

    let dry_run = summary
        .locales
        .iter()
        .any(|locale| locale.status == LocaleStatus::DryRun);
    if dry_run {
        return format!(
            "{} keys would be translated; up to date: {up_to_date}",
            summary.total_new()
        );
    }
    let pending = summary.total_untranslated();
    if pending > 0 {
        format!(
            "{} new translations, {pending} still pending; up to date: {up_to_date}",
            summary.total_translated()
        )
    } else {
        format!(
            "{} new translations; up to date: {up_to_date}",
            summary.total_translated()
        )
    }
}

fn parity(config: &SyncConfig, json: bool) -> Result<bool> {
    let report = check_parity(&config.store(), &config.source_locale, &config.target_locales)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_parity(&report);
    }
    Ok(report.is_ok())
}

fn print_parity(report: &ParityReport) {
    for locale in &report.locales {
        if let Some(error) = &locale.error {
            println!("{}: FAILED: {error}", locale.locale);
            continue;
        }
        for key in &locale.missing {
            println!("{}: missing {key}", locale.locale);
        }
        for key in &locale.extra {
            println!("{}: extra {key}", locale.locale);
        }
    }
    if report.is_ok() {
        println!(
            "all {} locales have the {} keys of {}",
            report.locales.len(),
            report.source_keys,
            report.source_locale
        );
    } else {
        println!("{} missing keys", report.total_missing());
    }
}

fn extract(config: &SyncConfig, paths: &[PathBuf], json: bool) -> Result<bool> {
    let store = config.store();
    let source = store.load_source(&config.source_locale)?;
    let source = flatten(&source)?;

    let scanner = KeyScanner::new(ScanOptions::default());
    let (files, usages) = scanner
        .scan(paths)
        .context("failed to scan application sources")?;
    let report = build_report(files, usages, &source);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.is_ok());
    }

    for key in &report.missing_in_source {
        let first = report.used.get(key).and_then(|usages| usages.first());
        match first {
            Some(usage) => println!("missing {key} (used at {}:{})", usage.file, usage.line),
            None => println!("missing {key}"),
        }
    }
    for key in &report.unused_in_source {
        println!("unused {key}");
    }
    println!(
        "{} files scanned, {} keys used, {} missing from {}, {} possibly unused",
        report.files_scanned,
        report.used.len(),
        report.missing_in_source.len(),
        config.source_locale,
        report.unused_in_source.len()
    );
    Ok(report.is_ok())
}
