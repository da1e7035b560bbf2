//! The consumer-facing side of a tail session.

use crate::config::TailOptions;
use crate::engine::TailSession;
use crate::error::{Error, Result};
use crate::path;
use crate::watcher::create_watcher;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Something a tail session observed, in the order it observed it.
///
/// The stream ends (yields `None`) after the session closes.
#[derive(Debug)]
pub enum TailEvent {
    /// Newly appended bytes, in file order.
    Data(Vec<u8>),
    /// A new file appeared at the watched path; reading restarts at offset 0.
    Replace,
    /// The tailed file was renamed.
    Move { from: PathBuf, to: PathBuf },
    /// The file shrank below its last observed size.
    Truncate { new_size: u64, old_size: u64 },
    /// The cursor caught up with the end of the file.
    Eof,
    /// An error. Advisory unless it is the last event before the stream ends.
    Error(Error),
}

/// Producer half of the event channel, owned by the session.
///
/// The channel is bounded: pushing waits for the consumer, and events already
/// accepted stay queued until they are read.
#[derive(Debug)]
pub(crate) struct EventSink {
    sender: Option<mpsc::Sender<TailEvent>>,
}

impl EventSink {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<TailEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { sender: Some(tx) }, rx)
    }

    /// Returns false once the consumer is gone or the sink was closed.
    pub(crate) async fn push(&mut self, event: TailEvent) -> bool {
        match &self.sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Signals end-of-stream to the consumer once queued events are drained.
    pub(crate) fn close(&mut self) {
        self.sender = None;
    }
}

/// A stream that follows a file and yields [`TailEvent`]s.
///
/// Not polling the stream is the backpressure signal: the session stops
/// reading once the buffer is full.
pub struct TailStream {
    receiver: mpsc::Receiver<TailEvent>,
    path: PathBuf,
    shutdown_tx: broadcast::Sender<()>,
    _task_handle: JoinHandle<()>,
}

impl TailStream {
    /// Opens `path` and starts tailing it in a background task.
    ///
    /// Fails with [`Error::OpenFailed`] when the file cannot be opened and
    /// `wait_for_create` is off.
    pub async fn open<P: AsRef<Path>>(path: P, options: TailOptions) -> Result<Self> {
        let file_path = path::resolve(path.as_ref())?;

        let (sink, receiver) = EventSink::channel(options.buffer_capacity());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let watcher = create_watcher(&options);
        let session = TailSession::open(file_path.clone(), options, watcher, sink).await?;

        // Spawn background task to drive the state machine
        let task_handle = tokio::spawn(session.run(shutdown_rx));

        Ok(TailStream {
            receiver,
            path: file_path,
            shutdown_tx,
            _task_handle: task_handle,
        })
    }

    /// The resolved path the session started on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ends the session. Events already buffered are still yielded, then the
    /// stream ends. Calling it again has no effect.
    pub fn close(&mut self) {
        let _ = self.shutdown_tx.send(());
        self.receiver.close();
    }

    /// Narrows the stream to data chunks and errors.
    pub fn chunks(self) -> impl Stream<Item = Result<Vec<u8>>> + Unpin {
        tokio_stream::StreamExt::filter_map(self, |event| match event {
            TailEvent::Data(data) => Some(Ok(data)),
            TailEvent::Error(e) => Some(Err(e)),
            _ => None,
        })
    }

    /// Check if the stream has been closed/dropped
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Drop for TailStream {
    fn drop(&mut self) {
        // Send shutdown signal - ignore errors if the task already ended
        let _ = self.shutdown_tx.send(());
    }
}

impl std::fmt::Debug for TailStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailStream")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Stream for TailStream {
    type Item = TailEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OnTruncate;
    use crate::test_helpers::TempLogFile;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn poll_options() -> TailOptions {
        TailOptions::builder()
            .use_watch(false)
            .poll_interval(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    // Helper function to collect stream items with timeout
    async fn collect_events(
        stream: &mut TailStream,
        max_items: usize,
        timeout: Duration,
    ) -> Vec<TailEvent> {
        let mut items = Vec::new();
        let start = tokio::time::Instant::now();

        while items.len() < max_items && start.elapsed() < timeout {
            match tokio::time::timeout(Duration::from_millis(50), stream.next()).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => break, // Stream ended
                Err(_) => {}       // Keep waiting
            }
        }

        items
    }

    /// Collects events up to and including the first data chunk.
    async fn collect_until_data(stream: &mut TailStream, timeout: Duration) -> Vec<TailEvent> {
        let mut items = Vec::new();
        let result = tokio::time::timeout(timeout, async {
            while let Some(item) = stream.next().await {
                let is_data = matches!(item, TailEvent::Data(_));
                items.push(item);
                if is_data {
                    break;
                }
            }
        })
        .await;
        assert!(result.is_ok(), "no data within {:?}: {:?}", timeout, items);
        items
    }

    #[tokio::test]
    async fn test_tail_stream_creation() {
        let temp = TempLogFile::with_content(b"hello\n").unwrap();
        let stream = TailStream::open(temp.path(), poll_options()).await;
        assert!(stream.is_ok());

        let stream = stream.unwrap();
        assert!(!stream.is_closed());
        assert_eq!(stream.path(), temp.path());
    }

    #[tokio::test]
    async fn test_tail_stream_nonexistent_file_fails() {
        let result = TailStream::open("definitely_nonexistent_file_12345.log", poll_options()).await;
        match result {
            Err(Error::OpenFailed { path, .. }) => {
                assert!(path.is_absolute());
                assert!(path.ends_with("definitely_nonexistent_file_12345.log"));
            }
            other => panic!("Expected OpenFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tail_stream_reads_existing_content() {
        let temp = TempLogFile::with_content(b"existing\n").unwrap();
        let mut stream = TailStream::open(temp.path(), poll_options()).await.unwrap();

        let events = collect_events(&mut stream, 2, Duration::from_secs(2)).await;
        assert!(matches!(&events[0], TailEvent::Data(d) if d == b"existing\n"));
        assert!(matches!(events[1], TailEvent::Eof));
    }

    #[tokio::test]
    async fn test_tail_stream_follows_appends() {
        let temp = TempLogFile::with_content(b"").unwrap();
        let mut stream = TailStream::open(temp.path(), poll_options()).await.unwrap();

        let first = collect_events(&mut stream, 1, Duration::from_secs(2)).await;
        assert!(matches!(first.as_slice(), [TailEvent::Eof]));

        temp.append(b"appended\n").unwrap();
        let events = collect_until_data(&mut stream, Duration::from_secs(2)).await;
        assert!(matches!(events.as_slice(), [TailEvent::Data(d)] if d == b"appended\n"));
    }

    #[tokio::test]
    async fn test_tail_stream_truncate_end_terminates() {
        let temp = TempLogFile::with_content(b"some content\n").unwrap();
        let mut stream = TailStream::open(temp.path(), poll_options()).await.unwrap();
        collect_events(&mut stream, 2, Duration::from_secs(2)).await;

        temp.truncate().unwrap();
        temp.append(b"x").unwrap();

        let events = collect_events(&mut stream, 10, Duration::from_secs(2)).await;
        assert!(matches!(
            events.as_slice(),
            [TailEvent::Truncate { old_size: 13, .. }]
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_tail_stream_truncate_reset_continues() {
        let temp = TempLogFile::with_content(b"some content\n").unwrap();
        let options = TailOptions::builder()
            .use_watch(false)
            .poll_interval(Duration::from_millis(10))
            .on_truncate(OnTruncate::Reset)
            .build()
            .unwrap();
        let mut stream = TailStream::open(temp.path(), options).await.unwrap();
        collect_events(&mut stream, 2, Duration::from_secs(2)).await;

        temp.truncate().unwrap();
        temp.append(b"new\n").unwrap();

        let events = collect_until_data(&mut stream, Duration::from_secs(2)).await;
        assert!(matches!(events[0], TailEvent::Truncate { old_size: 13, .. }));
        assert!(matches!(events.last(), Some(TailEvent::Data(d)) if d == b"new\n"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_ends_stream() {
        let temp = TempLogFile::with_content(b"").unwrap();
        let mut stream = TailStream::open(temp.path(), poll_options()).await.unwrap();

        stream.close();
        stream.close();
        assert!(stream.is_closed());

        // drain whatever was queued before the close
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while stream.next().await.is_some() {}
        })
        .await;
        tokio_test::assert_ok!(drained);
    }

    #[tokio::test]
    async fn test_tail_stream_graceful_shutdown_on_drop() {
        let temp = TempLogFile::with_content(b"data\n").unwrap();
        let mut stream = TailStream::open(temp.path(), poll_options()).await.unwrap();

        let first_item = tokio::time::timeout(Duration::from_secs(2), stream.next()).await;
        assert!(first_item.is_ok());

        drop(stream);

        // Give background task time to shut down
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_tail_stream_multiple_streams_independence() {
        let temp = TempLogFile::with_content(b"shared\n").unwrap();
        let stream1 = TailStream::open(temp.path(), poll_options()).await.unwrap();
        let mut stream2 = TailStream::open(temp.path(), poll_options()).await.unwrap();

        drop(stream1);

        let events = collect_events(&mut stream2, 1, Duration::from_secs(2)).await;
        assert!(matches!(&events[0], TailEvent::Data(d) if d == b"shared\n"));
    }

    #[tokio::test]
    async fn test_chunks_skips_lifecycle_events() {
        let temp = TempLogFile::with_content(b"chunk\n").unwrap();
        let stream = TailStream::open(temp.path(), poll_options()).await.unwrap();
        let mut chunks = stream.chunks();

        let first = tokio::time::timeout(Duration::from_secs(2), chunks.next())
            .await
            .expect("chunk should arrive");
        assert_eq!(first.unwrap().unwrap(), b"chunk\n");
    }

    #[tokio::test]
    async fn test_slow_consumer_loses_nothing() {
        let temp = TempLogFile::new().unwrap();
        let options = TailOptions::builder()
            .use_watch(false)
            .poll_interval(Duration::from_millis(10))
            .buffer_capacity(1)
            .read_buffer_size(8)
            .build()
            .unwrap();
        let payload: Vec<u8> = (0..500u32).map(|i| b'a' + (i % 26) as u8).collect();
        temp.append(&payload).unwrap();

        let stream = TailStream::open(temp.path(), options).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut chunks = stream.chunks();
        let mut received = Vec::new();
        while received.len() < payload.len() {
            let chunk = tokio::time::timeout(Duration::from_secs(2), chunks.next())
                .await
                .expect("chunk should arrive")
                .expect("stream should stay open")
                .unwrap();
            received.extend(chunk);
        }
        assert_eq!(received, payload);
    }
}
