//! Change notification for a single tailed path.
//!
//! Two strategies sit behind [`ChangeWatcher`]:
//! - **Native**: OS notifications through the `notify` crate (inotify, FSEvents,
//!   kqueue, ReadDirectoryChangesW), registered on the containing directory.
//! - **Poll**: periodic stats of the path, for filesystems where native
//!   notifications are missing or unreliable.
//!
//! The strategy is picked once per session from [`TailOptions::use_watch`].

mod native;
mod poll;

pub(crate) use native::NativeWatcher;
pub(crate) use poll::PollWatcher;

use crate::config::TailOptions;
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Abstract signal derived from filesystem notifications.
#[derive(Debug)]
pub(crate) enum WatchSignal {
    /// Content of the watched file may have changed.
    DataChanged,
    /// The watched name was renamed away; carries the destination when known.
    PathRenamed(Option<PathBuf>),
    /// The watched name was removed or now points at another file.
    PathRemoved,
    /// An entry showed up under the awaited name.
    PathReappeared,
    /// The notification backend reported a failure.
    Failed(notify::Error),
}

/// What a subscription listens for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WatchTarget {
    /// An open, existing file: data, rename and removal.
    File(PathBuf),
    /// An absent name: waits for it to come back.
    Reappear(PathBuf),
}

impl WatchTarget {
    pub(crate) fn path(&self) -> &Path {
        match self {
            WatchTarget::File(path) | WatchTarget::Reappear(path) => path,
        }
    }
}

/// Creates the signal channel between a backend and its subscription.
///
/// `DataChanged` is level-triggered: while one is queued and not yet taken,
/// further ones are dropped. A read cycle that starts also satisfies any
/// queued one, see [`Subscription::mark_data_read`].
pub(crate) fn signal_channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let data_pending = Arc::new(AtomicBool::new(false));
    (
        SignalSender {
            tx,
            data_pending: data_pending.clone(),
        },
        SignalReceiver { rx, data_pending },
    )
}

/// Backend half of the signal channel.
#[derive(Debug, Clone)]
pub(crate) struct SignalSender {
    tx: mpsc::UnboundedSender<WatchSignal>,
    data_pending: Arc<AtomicBool>,
}

impl SignalSender {
    /// Returns false once the subscription is gone.
    pub(crate) fn send(&self, signal: WatchSignal) -> bool {
        if matches!(signal, WatchSignal::DataChanged)
            && self.data_pending.swap(true, Ordering::AcqRel)
        {
            return !self.tx.is_closed();
        }
        self.tx.send(signal).is_ok()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Session half of the signal channel.
#[derive(Debug)]
pub(crate) struct SignalReceiver {
    rx: mpsc::UnboundedReceiver<WatchSignal>,
    data_pending: Arc<AtomicBool>,
}

/// An active watch. Dropping it releases the underlying OS resources.
pub(crate) struct Subscription {
    signals: SignalReceiver,
    _guard: Box<dyn Send>,
}

impl Subscription {
    pub(crate) fn new(signals: SignalReceiver, guard: Box<dyn Send>) -> Self {
        Self {
            signals,
            _guard: guard,
        }
    }

    /// Returns the next signal, or `None` once the backend has gone away.
    ///
    /// A queued `DataChanged` already covered by a read is skipped.
    pub(crate) async fn next_signal(&mut self) -> Option<WatchSignal> {
        loop {
            let signal = self.signals.rx.recv().await?;
            if matches!(signal, WatchSignal::DataChanged)
                && !self.signals.data_pending.swap(false, Ordering::AcqRel)
            {
                continue;
            }
            return Some(signal);
        }
    }

    /// Called when a read cycle starts: changes seen so far are covered by it.
    pub(crate) fn mark_data_read(&self) {
        self.signals.data_pending.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Capability to subscribe to changes of one path at a time.
pub(crate) trait ChangeWatcher: Send {
    fn subscribe(&mut self, target: &WatchTarget) -> Result<Subscription>;

    /// Name of the backend, for logging.
    fn backend_name(&self) -> &'static str;
}

/// Picks the watcher implementation for a session.
pub(crate) fn create_watcher(options: &TailOptions) -> Box<dyn ChangeWatcher> {
    let watcher: Box<dyn ChangeWatcher> = if options.use_watch() {
        Box::new(NativeWatcher::new())
    } else {
        Box::new(PollWatcher::new(options.poll_interval()))
    };
    tracing::debug!(backend = watcher.backend_name(), "selected change watcher");
    watcher
}
