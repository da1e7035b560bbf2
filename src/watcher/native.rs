//! Native change watching using the notify crate.

use super::{ChangeWatcher, Subscription, WatchSignal, WatchTarget, signal_channel};
use crate::error::Result;
use crate::path::parent_dir;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::Path;

/// Watches the directory containing the target and filters by file name.
///
/// Watching the directory instead of the file keeps the watch alive across
/// renames and lets the same backend report a name coming back.
#[derive(Debug, Default)]
pub(crate) struct NativeWatcher;

impl NativeWatcher {
    pub(crate) fn new() -> Self {
        Self
    }
}

impl ChangeWatcher for NativeWatcher {
    fn subscribe(&mut self, target: &WatchTarget) -> Result<Subscription> {
        let (tx, rx) = signal_channel();
        let callback_target = target.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let signal = match res {
                    Ok(event) => translate(&callback_target, &event),
                    Err(e) => Some(WatchSignal::Failed(e)),
                };
                if let Some(signal) = signal {
                    tx.send(signal);
                }
            },
            Config::default(),
        )?;

        let dir = parent_dir(target.path());
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %dir.display(), ?target, "native watch registered");

        Ok(Subscription::new(rx, Box::new(watcher)))
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}

/// Translates a directory event into a signal for `target`, if it concerns it.
pub(crate) fn translate(target: &WatchTarget, event: &Event) -> Option<WatchSignal> {
    let name = target.path().file_name()?;
    if !is_event_relevant_to_file(event, name) {
        return None;
    }
    match target {
        WatchTarget::File(_) => translate_file_event(event, name),
        WatchTarget::Reappear(_) => translate_reappear_event(event, name),
    }
}

fn translate_file_event(event: &Event, name: &OsStr) -> Option<WatchSignal> {
    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let from = event.paths.first();
            if from.is_some_and(|p| has_name(p, name)) {
                Some(WatchSignal::PathRenamed(event.paths.get(1).cloned()))
            } else {
                // something else was renamed over our name
                Some(WatchSignal::PathRemoved)
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WatchSignal::PathRemoved),
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchSignal::PathRenamed(None)),
        EventKind::Modify(_) => Some(WatchSignal::DataChanged),
        EventKind::Create(_) | EventKind::Remove(_) => Some(WatchSignal::PathRemoved),
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => Some(WatchSignal::DataChanged),
    }
}

fn translate_reappear_event(event: &Event, name: &OsStr) -> Option<WatchSignal> {
    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => None,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .get(1)
            .filter(|to| has_name(to, name))
            .map(|_| WatchSignal::PathReappeared),
        EventKind::Remove(_) | EventKind::Access(_) => None,
        _ => Some(WatchSignal::PathReappeared),
    }
}

fn has_name(path: &Path, name: &OsStr) -> bool {
    path.file_name() == Some(name)
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &OsStr) -> bool {
    event.paths.iter().any(|path| has_name(path, target_file_name))
}
