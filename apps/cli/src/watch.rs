use anyhow::{Context, Result};
use locale_sync_core::{Orchestrator, SyncOptions, TranslationProvider};
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Quiet period after the last file event before a run starts.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Runs an initial sync, then re-syncs whenever the source locale file's
/// content changes. Runs happen on this task one after another.
pub async fn watch<P: TranslationProvider>(orchestrator: &Orchestrator<P>) -> Result<()> {
    let config = orchestrator.config();
    let store = config.store();
    let source_path = store.path_for(&config.source_locale);
    let file_name = source_path
        .file_name()
        .map(|name| name.to_os_string())
        .context("source locale path has no file name")?;
    // Editors often replace the file instead of writing in place, so watch the directory.
    let dir = dunce::canonicalize(store.dir())
        .with_context(|| format!("cannot watch {}", store.dir().display()))?;

    let (tx, mut rx) = unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        let _ = tx.send(event);
    })
    .context("failed to start file watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("cannot watch {}", dir.display()))?;
    info!("watching {} (ctrl-c to stop)", dir.join(&file_name).display());

    let mut digest = SourceDigest::default();
    let cancel = orchestrator.cancel_handle();
    loop {
        match store.digest(&config.source_locale) {
            Ok(current) => {
                if digest.changed(current) {
                    run_once(orchestrator).await;
                } else {
                    debug!("source content unchanged, skipping run");
                }
            }
            Err(err) => error!("{err}"),
        }
        if cancel.load(Ordering::SeqCst) {
            info!("watch stopped");
            return Ok(());
        }

        tokio::select! {
            changed = next_source_change(&mut rx, &file_name) => {
                if !changed {
                    warn!("file watcher closed");
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("watch stopped");
                return Ok(());
            }
        }
        if !settle(&mut rx, DEBOUNCE).await {
            return Ok(());
        }
    }
}

async fn run_once<P: TranslationProvider>(orchestrator: &Orchestrator<P>) {
    let timeout = orchestrator.config().run_timeout();
    let run = orchestrator.run(SyncOptions::default());
    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(summary)) => {
            if let Err(err) = crate::print_summary(&summary, false) {
                error!("{err:#}");
            }
        }
        Ok(Err(err)) => error!("sync failed: {err}"),
        Err(_) => error!("sync did not finish within {}s", timeout.as_secs()),
    }
}

/// Waits for an event touching the source file. `false` once the watcher is gone.
async fn next_source_change(
    rx: &mut UnboundedReceiver<notify::Result<Event>>,
    file_name: &OsString,
) -> bool {
    while let Some(event) = rx.recv().await {
        match event {
            Ok(event) if touches(&event, file_name) => return true,
            Ok(_) => {}
            Err(err) => warn!("watch error: {err}"),
        }
    }
    false
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

/// Drains events until none arrive for `quiet`. `false` if the channel closed.
async fn settle<T>(rx: &mut UnboundedReceiver<T>, quiet: Duration) -> bool {
    loop {
        match tokio::time::timeout(quiet, rx.recv()).await {
            Ok(Some(_)) => continue,
            Ok(None) => return false,
            Err(_) => return true,
        }
    }
}

/// Remembers the last source digest a run was started for.
#[derive(Debug, Default)]
struct SourceDigest {
    last: Option<String>,
}

impl SourceDigest {
    /// True when `current` differs from the last recorded digest. A missing
    /// source file never triggers a run.
    fn changed(&mut self, current: Option<String>) -> bool {
        let Some(current) = current else {
            warn!("source locale file is missing, waiting for it to reappear");
            return false;
        };
        if self.last.as_deref() == Some(current.as_str()) {
            return false;
        }
        self.last = Some(current);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::path::PathBuf;
    use tokio::sync::mpsc::unbounded_channel;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_source_file_changes_count() {
        let name = OsString::from("en.json");
        assert!(touches(
            &event(EventKind::Modify(ModifyKind::Any), "/m/en.json"),
            &name
        ));
        assert!(touches(
            &event(EventKind::Create(CreateKind::File), "/m/en.json"),
            &name
        ));
        assert!(!touches(
            &event(EventKind::Modify(ModifyKind::Any), "/m/fr.json"),
            &name
        ));
        assert!(!touches(
            &event(EventKind::Access(AccessKind::Any), "/m/en.json"),
            &name
        ));
    }

    #[test]
    fn digest_skips_identical_content() {
        let mut digest = SourceDigest::default();
        assert!(digest.changed(Some("abc".into())));
        assert!(!digest.changed(Some("abc".into())));
        assert!(!digest.changed(None));
        assert!(digest.changed(Some("def".into())));
    }

    #[tokio::test]
    async fn settle_drains_a_burst() {
        let (tx, mut rx) = unbounded_channel();
        for n in 0..3 {
            tx.send(n).unwrap();
        }
        assert!(settle(&mut rx, Duration::from_millis(20)).await);
        assert!(rx.try_recv().is_err());

        drop(tx);
        assert!(!settle(&mut rx, Duration::from_millis(20)).await);
    }
}
