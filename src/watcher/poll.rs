//! Polling change watcher, for filesystems where native notifications are
//! unavailable or unreliable (e.g., NFS).

use super::{ChangeWatcher, SignalSender, Subscription, WatchSignal, WatchTarget, signal_channel};
use crate::error::Result;
use crate::path::FileIdentity;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What a stat of the watched path looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    identity: Option<FileIdentity>,
    size: u64,
    modified: Option<SystemTime>,
}

impl Snapshot {
    async fn take(path: &Path) -> Option<Self> {
        Self::from_metadata(&tokio::fs::metadata(path).await.ok()?)
    }

    /// Blocking variant, used for the baseline while subscribing.
    fn take_now(path: &Path) -> Option<Self> {
        Self::from_metadata(&std::fs::metadata(path).ok()?)
    }

    fn from_metadata(metadata: &Metadata) -> Option<Self> {
        if !metadata.is_file() {
            return None;
        }
        Some(Self {
            identity: FileIdentity::of(metadata),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Compares two consecutive stats of a watched file.
fn compare(previous: Option<&Snapshot>, current: Option<&Snapshot>) -> Option<WatchSignal> {
    match (previous, current) {
        (Some(_), None) | (None, Some(_)) => Some(WatchSignal::PathRemoved),
        (Some(prev), Some(cur)) if prev.identity != cur.identity => Some(WatchSignal::PathRemoved),
        (Some(prev), Some(cur)) if prev != cur => Some(WatchSignal::DataChanged),
        _ => None,
    }
}

/// Aborts the polling task when the subscription is dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Stat-polling watcher. Each subscription runs its own tokio interval task.
#[derive(Debug, Clone)]
pub(crate) struct PollWatcher {
    poll_interval: Duration,
}

impl PollWatcher {
    pub(crate) fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl ChangeWatcher for PollWatcher {
    fn subscribe(&mut self, target: &WatchTarget) -> Result<Subscription> {
        let (tx, rx) = signal_channel();
        let interval = self.poll_interval;

        let handle = match target.clone() {
            WatchTarget::File(path) => {
                // changes after this point are seen even if the task starts late
                let baseline = Snapshot::take_now(&path);
                tokio::spawn(poll_file(path, baseline, interval, tx))
            }
            WatchTarget::Reappear(path) => tokio::spawn(poll_reappear(path, interval, tx)),
        };
        tracing::debug!(?target, ?interval, "poll watch started");

        Ok(Subscription::new(rx, Box::new(AbortOnDrop(handle))))
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn poll_file(
    path: PathBuf,
    baseline: Option<Snapshot>,
    period: Duration,
    tx: SignalSender,
) {
    let mut previous = baseline;
    let mut interval = ticker(period);
    // the first tick completes immediately
    interval.tick().await;

    while !tx.is_closed() {
        interval.tick().await;
        let current = Snapshot::take(&path).await;
        if let Some(signal) = compare(previous.as_ref(), current.as_ref()) {
            if !tx.send(signal) {
                break;
            }
        }
        previous = current;
    }
}

async fn poll_reappear(path: PathBuf, period: Duration, tx: SignalSender) {
    let mut present = false;
    let mut interval = ticker(period);

    while !tx.is_closed() {
        interval.tick().await;
        let exists = Snapshot::take(&path).await.is_some();
        if exists && !present && !tx.send(WatchSignal::PathReappeared) {
            break;
        }
        present = exists;
    }
}
