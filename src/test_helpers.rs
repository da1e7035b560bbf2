//! Test utilities: scratch log files and a watcher driven by the test.

use crate::error::Result;
use crate::watcher::{
    ChangeWatcher, SignalSender, Subscription, WatchSignal, WatchTarget, signal_channel,
};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new, empty temporary log file
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with initial content
    pub fn with_content(content: &[u8]) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append(content)?;
        Ok(temp_file)
    }

    /// Append raw bytes to the file
    pub fn append(&self, content: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(content)?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file in place (copytruncate-style rotation)
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    /// Cut the file down to `len` bytes, keeping its identity
    pub fn truncate_to(&self, len: u64) -> std::io::Result<()> {
        OpenOptions::new().write(true).open(&self.path)?.set_len(len)
    }

    /// Rename the file within its directory, returning the new path
    pub fn rename_to(&self, name: &str) -> std::io::Result<PathBuf> {
        let target = self.dir().join(name);
        std::fs::rename(&self.path, &target)?;
        Ok(target)
    }

    /// Unlink the file
    pub fn remove(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }

    /// Create a fresh file at the original path
    pub fn recreate(&self, content: &[u8]) -> std::io::Result<()> {
        let mut file = File::create(&self.path)?;
        file.write_all(content)?;
        file.flush()?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A watcher whose signals are injected by the test.
///
/// Every subscription's sender is kept so the channel stays open.
#[derive(Clone, Default)]
pub struct ManualWatcher {
    subscriptions: Arc<Mutex<Vec<(WatchTarget, SignalSender)>>>,
}

impl ManualWatcher {
    pub fn last_target(&self) -> Option<WatchTarget> {
        let subscriptions = self.subscriptions.lock().unwrap();
        subscriptions.last().map(|(target, _)| target.clone())
    }

    /// Delivers `signal` on the most recent subscription.
    pub fn send(&self, signal: WatchSignal) {
        let subscriptions = self.subscriptions.lock().unwrap();
        if let Some((_, tx)) = subscriptions.last() {
            tx.send(signal);
        }
    }
}

impl ChangeWatcher for ManualWatcher {
    fn subscribe(&mut self, target: &WatchTarget) -> Result<Subscription> {
        let (tx, rx) = signal_channel();
        self.subscriptions
            .lock()
            .unwrap()
            .push((target.clone(), tx));
        Ok(Subscription::new(rx, Box::new(())))
    }

    fn backend_name(&self) -> &'static str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[tokio::test]
    async fn test_append_and_truncate() {
        let temp_file = TempLogFile::with_content(b"line 1\n").unwrap();
        temp_file.append(b"line 2\n").unwrap();

        let content = std::fs::read(temp_file.path()).unwrap();
        assert_eq!(content, b"line 1\nline 2\n");

        temp_file.truncate_to(4).unwrap();
        assert_eq!(std::fs::read(temp_file.path()).unwrap(), b"line");

        temp_file.truncate().unwrap();
        assert!(std::fs::read(temp_file.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_remove_recreate() {
        let temp_file = TempLogFile::with_content(b"x").unwrap();

        let moved = temp_file.rename_to("moved.log").unwrap();
        assert!(moved.exists());
        assert!(!temp_file.path().exists());

        temp_file.recreate(b"y").unwrap();
        assert_eq!(std::fs::read(temp_file.path()).unwrap(), b"y");

        temp_file.remove().unwrap();
        assert!(!temp_file.path().exists());
    }

    #[tokio::test]
    async fn test_manual_watcher_records_targets() {
        let mut watcher = ManualWatcher::default();
        let target = WatchTarget::File(PathBuf::from("/tmp/a.log"));
        let mut subscription = watcher.subscribe(&target).unwrap();

        assert_eq!(watcher.last_target(), Some(target));
        watcher.send(WatchSignal::DataChanged);
        assert!(matches!(
            subscription.next_signal().await,
            Some(WatchSignal::DataChanged)
        ));
    }
}
