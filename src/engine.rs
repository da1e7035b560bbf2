//! The tailing state machine.
//!
//! A [`TailSession`] owns the cursor, the open handle and the watch
//! subscription. Watcher signals and read completions are turned into
//! [`Input`] values and applied one at a time by [`TailSession::handle`], so
//! the cursor and lifecycle state are never mutated concurrently.

use crate::config::{BeginAt, OnMove, OnTruncate, TailOptions};
use crate::error::{Error, Result};
use crate::path;
use crate::reader::{ReadLoop, ReadOutcome, SizeCheck, detect_file_truncation};
use crate::stream::{EventSink, TailEvent};
use crate::watcher::{ChangeWatcher, Subscription, WatchSignal, WatchTarget};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Lifecycle of a session.
///
/// A file handle is held exactly in `Idle`, `Reading` and `WaitingForData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleState {
    Starting,
    /// A file was just opened and its first read cycle is queued.
    Idle,
    Reading,
    WaitingForData,
    WaitingForReappear,
    Closed,
}

/// What one read cycle observed: the optional size check and the optional read.
#[derive(Debug)]
pub(crate) struct CycleOutcome {
    size: Option<SizeCheck>,
    read: Option<ReadOutcome>,
}

/// A discrete input to the state machine.
#[derive(Debug)]
pub(crate) enum Input {
    Signal(WatchSignal),
    Read(CycleOutcome),
    /// The active subscription stopped delivering signals.
    WatchClosed,
    Close,
}

pub(crate) struct TailSession {
    path: PathBuf,
    file: Option<File>,
    bytes_read: u64,
    last_size: Option<u64>,
    state: LifecycleState,
    subscription: Option<Subscription>,
    options: TailOptions,
    watcher: Box<dyn ChangeWatcher>,
    reader: ReadLoop,
    sink: EventSink,
    first_read: bool,
    read_requested: bool,
}

impl TailSession {
    /// Opens `path` (already resolved) and registers the initial watch.
    ///
    /// A missing file is an error unless `wait_for_create` is set, in which
    /// case the session starts out waiting for the file to appear.
    pub(crate) async fn open(
        path: PathBuf,
        options: TailOptions,
        watcher: Box<dyn ChangeWatcher>,
        sink: EventSink,
    ) -> Result<Self> {
        let mut session = Self {
            path,
            file: None,
            bytes_read: 0,
            last_size: None,
            state: LifecycleState::Starting,
            subscription: None,
            reader: ReadLoop::new(options.read_buffer_size()),
            options,
            watcher,
            sink,
            first_read: true,
            read_requested: false,
        };

        match File::open(&session.path).await {
            Ok(file) => {
                let target = WatchTarget::File(session.path.clone());
                session.subscription = Some(session.watcher.subscribe(&target)?);
                session.file = Some(file);
                session.apply_begin_offset();
                session.state = LifecycleState::Idle;
                session.read_requested = true;
                debug!(
                    path = %session.path.display(),
                    backend = session.watcher.backend_name(),
                    "tail session opened"
                );
            }
            Err(source) if session.options.wait_for_create() => {
                debug!(
                    path = %session.path.display(),
                    error = %source,
                    "file not present, waiting for it to be created"
                );
                let target = WatchTarget::Reappear(session.path.clone());
                session.subscription = Some(session.watcher.subscribe(&target)?);
                session.state = LifecycleState::WaitingForReappear;
                session.reappeared().await;
            }
            Err(source) => {
                return Err(Error::OpenFailed {
                    path: session.path,
                    source,
                });
            }
        }

        Ok(session)
    }

    /// Drives the session until it closes or `shutdown` fires.
    ///
    /// Shutdown is checked first on every turn; a read interrupted by it is
    /// dropped and never applied.
    pub(crate) async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        while !self.is_closed() {
            let input = if self.read_requested {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => Input::Close,
                    outcome = self.read_cycle() => Input::Read(outcome),
                }
            } else {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => Input::Close,
                    signal = next_signal(&mut self.subscription) => match signal {
                        Some(signal) => Input::Signal(signal),
                        None => Input::WatchClosed,
                    },
                }
            };
            self.handle(input).await;
        }
    }

    /// Applies one input. Inputs arriving after close are dropped.
    pub(crate) async fn handle(&mut self, input: Input) {
        if self.is_closed() {
            debug!(path = %self.path.display(), "input after close ignored");
            return;
        }
        match input {
            Input::Signal(signal) => self.on_signal(signal).await,
            Input::Read(outcome) => self.on_read(outcome).await,
            Input::WatchClosed => {
                let path = self.path.clone();
                self.terminate(Error::WatchClosed { path }).await;
            }
            Input::Close => self.close(),
        }
    }

    /// Stats (when needed) and reads at the cursor without changing any state.
    pub(crate) async fn read_cycle(&mut self) -> CycleOutcome {
        if let Some(subscription) = &self.subscription {
            subscription.mark_data_read();
        }
        let seek_to_end = self.seeks_to_end();
        let size = if self.options.detect_truncate() || seek_to_end {
            Some(ReadLoop::check_size(&self.path).await)
        } else {
            None
        };

        let truncated = matches!(&size, Some(SizeCheck::Size(s)) if self.is_truncated(*s));
        let read = match (&mut self.file, seek_to_end || truncated) {
            (Some(file), false) => Some(self.reader.read_at(file, self.bytes_read).await),
            _ => None,
        };

        CycleOutcome { size, read }
    }

    /// Releases the handle and the watch. Idempotent.
    pub(crate) fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        info!(
            path = %self.path.display(),
            bytes_read = self.bytes_read,
            "tail session closed"
        );
        self.state = LifecycleState::Closed;
        self.read_requested = false;
        self.file = None;
        self.subscription = None;
        self.sink.close();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state == LifecycleState::Closed
    }

    /// Positions the cursor for the first read of the session's lifetime.
    fn apply_begin_offset(&mut self) {
        if let BeginAt::Offset(offset) = self.options.begin_at() {
            self.bytes_read = offset;
        }
    }

    fn seeks_to_end(&self) -> bool {
        self.first_read && self.options.begin_at() == BeginAt::End
    }

    fn is_truncated(&self, size: u64) -> bool {
        self.last_size
            .is_some_and(|last| detect_file_truncation(size, last))
    }

    async fn on_signal(&mut self, signal: WatchSignal) {
        debug!(path = %self.path.display(), ?signal, state = ?self.state, "watch signal");
        match signal {
            WatchSignal::DataChanged => {
                if self.file.is_some() && !self.read_requested {
                    self.read_requested = true;
                    self.state = LifecycleState::Reading;
                }
            }
            WatchSignal::PathRenamed(hint) => self.on_path_changed(hint).await,
            WatchSignal::PathRemoved => self.on_path_changed(None).await,
            WatchSignal::PathReappeared => self.reappeared().await,
            WatchSignal::Failed(e) => self.error(Error::Watcher(e)).await,
        }
    }

    async fn on_read(&mut self, outcome: CycleOutcome) {
        if self.file.is_some() {
            self.state = LifecycleState::Reading;
        }

        if let Some(check) = outcome.size {
            match check {
                SizeCheck::Size(size) => {
                    if self.seeks_to_end() {
                        debug!(path = %self.path.display(), size, "starting at end of file");
                        self.bytes_read = size;
                        self.last_size = Some(size);
                        self.first_read = false;
                        return;
                    }
                    if let Some(old_size) = self.last_size.filter(|&last| detect_file_truncation(size, last)) {
                        info!(path = %self.path.display(), size, old_size, "file truncated");
                        self.emit(TailEvent::Truncate {
                            new_size: size,
                            old_size,
                        })
                        .await;
                        match self.options.on_truncate() {
                            OnTruncate::Reset => {
                                self.bytes_read = 0;
                                self.last_size = Some(size);
                            }
                            OnTruncate::End => self.close(),
                        }
                        return;
                    }
                    self.last_size = Some(size);
                }
                SizeCheck::Missing => {
                    if self.options.on_move() == OnMove::Follow {
                        debug!(path = %self.path.display(), "path missing during size check, expecting a move");
                    } else {
                        let path = self.path.clone();
                        self.error(Error::FileDeleted { path }).await;
                    }
                }
                SizeCheck::Failed(source) => {
                    let path = self.path.clone();
                    self.error(Error::TruncateCheckFailed { path, source }).await;
                }
            }
            if self.is_closed() {
                return;
            }
        }

        if self.seeks_to_end() {
            // size unknown; retry on the next signal
            self.read_requested = false;
            self.state = LifecycleState::WaitingForData;
            return;
        }
        self.first_read = false;

        match outcome.read {
            Some(ReadOutcome::Chunk(data)) => {
                self.bytes_read += data.len() as u64;
                // more may be waiting; the next cycle runs without a new signal
                self.emit(TailEvent::Data(data)).await;
            }
            Some(ReadOutcome::Eof) => {
                self.read_requested = false;
                self.state = LifecycleState::WaitingForData;
                self.emit(TailEvent::Eof).await;
            }
            Some(ReadOutcome::Failed(source)) => {
                self.read_requested = false;
                self.state = LifecycleState::WaitingForData;
                let path = self.path.clone();
                self.error(Error::ReadFailed { path, source }).await;
            }
            None => {
                self.read_requested = false;
                if self.file.is_some() {
                    self.state = LifecycleState::WaitingForData;
                }
            }
        }
    }

    /// Handles a rename or removal reported for the watched name.
    async fn on_path_changed(&mut self, hint: Option<PathBuf>) {
        let Some(file) = self.file.as_ref() else {
            // waiting for reappearance; the old name going away is expected
            return;
        };
        if path::still_names(&self.path, file).await {
            debug!(path = %self.path.display(), "path still names the open file");
            return;
        }

        match path::current_path_of(file, &self.path, hint.as_deref()).await {
            Some(new_path) if new_path != self.path => self.moved(new_path).await,
            _ => self.displaced().await,
        }
    }

    /// The open file has no name left.
    async fn displaced(&mut self) {
        let replaced = tokio::fs::metadata(&self.path).await.is_ok();
        if replaced || self.options.on_move() == OnMove::Stay {
            info!(path = %self.path.display(), replaced, "file gone, waiting for it to reappear");
            self.wait_for_reappear().await;
        } else {
            let path = self.path.clone();
            self.terminate(Error::FileDeleted { path }).await;
        }
    }

    async fn moved(&mut self, new_path: PathBuf) {
        let old_path = self.path.clone();
        info!(
            from = %old_path.display(),
            to = %new_path.display(),
            policy = ?self.options.on_move(),
            "file moved"
        );

        match self.options.on_move() {
            OnMove::End => {
                self.path = new_path;
                self.close();
            }
            OnMove::Exit => {
                self.path = new_path.clone();
                self.error(Error::FileMoved {
                    from: old_path,
                    to: new_path,
                })
                .await;
                if !self.is_closed() {
                    self.resubscribe(WatchTarget::File(self.path.clone())).await;
                }
            }
            OnMove::Stay => {
                self.emit(TailEvent::Move {
                    from: old_path,
                    to: new_path,
                })
                .await;
                if !self.is_closed() {
                    self.wait_for_reappear().await;
                }
            }
            OnMove::Follow => {
                self.path = new_path.clone();
                self.emit(TailEvent::Move {
                    from: old_path,
                    to: new_path,
                })
                .await;
                if !self.is_closed() {
                    self.resubscribe(WatchTarget::File(self.path.clone())).await;
                }
                if !self.is_closed() {
                    self.read_requested = true;
                }
            }
        }
    }

    /// Drops the handle and watches the directory for the original name.
    async fn wait_for_reappear(&mut self) {
        self.file = None;
        self.read_requested = false;
        self.state = LifecycleState::WaitingForReappear;
        self.resubscribe(WatchTarget::Reappear(self.path.clone()))
            .await;
        // the name may already be back
        self.reappeared().await;
    }

    /// Tries to open a file that showed up at the watched name.
    async fn reappeared(&mut self) {
        if self.state != LifecycleState::WaitingForReappear {
            return;
        }
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "not reappeared yet");
                return;
            }
        };
        if !file.metadata().await.is_ok_and(|m| m.is_file()) {
            return;
        }

        info!(path = %self.path.display(), "file reappeared");
        self.file = Some(file);
        self.bytes_read = 0;
        self.last_size = None;
        // nothing read yet, e.g. under wait_for_create
        if self.first_read {
            self.apply_begin_offset();
        }
        self.state = LifecycleState::Idle;
        self.emit(TailEvent::Replace).await;
        if !self.is_closed() {
            self.resubscribe(WatchTarget::File(self.path.clone())).await;
        }
        if !self.is_closed() {
            self.read_requested = true;
        }
    }

    /// Replaces the active subscription. The old one is released first.
    async fn resubscribe(&mut self, target: WatchTarget) {
        self.subscription = None;
        match self.watcher.subscribe(&target) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => self.terminate(e).await,
        }
    }

    /// Reports an error, ending the session only under `end_on_error`.
    async fn error(&mut self, error: Error) {
        if self.options.end_on_error() {
            self.terminate(error).await;
        } else {
            warn!(path = %self.path.display(), %error, "tail error");
            self.emit(TailEvent::Error(error)).await;
        }
    }

    /// Emits a terminal error and closes.
    async fn terminate(&mut self, error: Error) {
        warn!(path = %self.path.display(), %error, "ending tail session");
        self.emit(TailEvent::Error(error)).await;
        self.close();
    }

    /// Hands an event to the sink; a vanished consumer closes the session.
    async fn emit(&mut self, event: TailEvent) {
        if !self.sink.push(event).await {
            debug!(path = %self.path.display(), "consumer gone");
            self.close();
        }
    }
}

async fn next_signal(subscription: &mut Option<Subscription>) -> Option<WatchSignal> {
    match subscription {
        Some(subscription) => subscription.next_signal().await,
        None => std::future::pending().await,
    }
}
