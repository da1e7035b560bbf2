//! Tailing options, fixed for the lifetime of a session.

use crate::error::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

/// Default size of a single read from the tailed file.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Default number of events buffered ahead of a slow consumer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Default period of the polling watcher.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Where the cursor starts in the file opened at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginAt {
    /// Start at a byte offset; `Offset(0)` delivers the whole backlog.
    Offset(u64),
    /// Skip the backlog and only deliver bytes appended after the first read.
    End,
}

impl Default for BeginAt {
    fn default() -> Self {
        BeginAt::Offset(0)
    }
}

impl FromStr for BeginAt {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("end") {
            return Ok(BeginAt::End);
        }
        s.trim()
            .parse::<u64>()
            .map(BeginAt::Offset)
            .map_err(|_| format!("expected a byte offset or 'end', got '{}'", s))
    }
}

/// What to do when the tailed path is renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMove {
    /// Keep reading the same file under its new name.
    #[default]
    Follow,
    /// End the stream quietly.
    End,
    /// Report a "file moved" error, ending the stream under `end_on_error`.
    Exit,
    /// Wait for a new file to appear under the original name.
    Stay,
}

impl FromStr for OnMove {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "follow" => Ok(OnMove::Follow),
            "end" => Ok(OnMove::End),
            "exit" | "error" => Ok(OnMove::Exit),
            "stay" => Ok(OnMove::Stay),
            _ => Err(format!(
                "Invalid move policy '{}'. Valid options: follow, end, exit, error, stay",
                s
            )),
        }
    }
}

/// What to do when the file shrinks below its last observed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnTruncate {
    /// End the stream.
    #[default]
    End,
    /// Seek back to the start of the file and keep reading.
    ///
    /// The bytes that survived the truncation are delivered again: a file
    /// cut from 12 bytes down to 5 yields those 5 bytes before anything
    /// appended afterwards.
    Reset,
}

impl FromStr for OnTruncate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "end" => Ok(OnTruncate::End),
            "reset" => Ok(OnTruncate::Reset),
            _ => Err(format!(
                "Invalid truncate policy '{}'. Valid options: end, reset",
                s
            )),
        }
    }
}

/// Returns whether this platform has a native change-notification backend.
pub fn native_watch_supported() -> bool {
    cfg!(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "windows",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly",
    ))
}

/// Immutable tailing configuration.
///
/// Build one with [`TailOptions::builder`] or parse one from key/value pairs
/// with [`TailOptions::from_pairs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOptions {
    begin_at: BeginAt,
    detect_truncate: bool,
    on_move: OnMove,
    on_truncate: OnTruncate,
    end_on_error: bool,
    use_watch: bool,
    wait_for_create: bool,
    poll_interval: Duration,
    buffer_capacity: usize,
    read_buffer_size: usize,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            begin_at: BeginAt::default(),
            detect_truncate: true,
            on_move: OnMove::default(),
            on_truncate: OnTruncate::default(),
            end_on_error: false,
            use_watch: native_watch_supported(),
            wait_for_create: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl TailOptions {
    pub fn builder() -> TailOptionsBuilder {
        TailOptionsBuilder::default()
    }

    /// Parses options from `(key, value)` pairs, rejecting keys it does not know.
    ///
    /// Keys are accepted in camelCase (`onMove`) or snake_case (`on_move`).
    /// `poll_interval` is given in milliseconds.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = Self::builder();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            builder = match key {
                "beginAt" | "begin_at" => builder.begin_at(parse_value(key, value)?),
                "detectTruncate" | "detect_truncate" => {
                    builder.detect_truncate(parse_flag(key, value)?)
                }
                "onMove" | "on_move" => builder.on_move(parse_value(key, value)?),
                "onTruncate" | "on_truncate" => builder.on_truncate(parse_value(key, value)?),
                "endOnError" | "end_on_error" => builder.end_on_error(parse_flag(key, value)?),
                "useWatch" | "use_watch" => builder.use_watch(parse_flag(key, value)?),
                "waitForCreate" | "wait_for_create" => {
                    builder.wait_for_create(parse_flag(key, value)?)
                }
                "pollInterval" | "poll_interval" => {
                    let millis: u64 = parse_value(key, value)?;
                    builder.poll_interval(Duration::from_millis(millis))
                }
                "bufferCapacity" | "buffer_capacity" => {
                    builder.buffer_capacity(parse_value(key, value)?)
                }
                "readBufferSize" | "read_buffer_size" => {
                    builder.read_buffer_size(parse_value(key, value)?)
                }
                _ => {
                    return Err(Error::UnknownOption {
                        key: key.to_string(),
                    });
                }
            };
        }
        builder.build()
    }

    pub fn begin_at(&self) -> BeginAt {
        self.begin_at
    }

    pub fn detect_truncate(&self) -> bool {
        self.detect_truncate
    }

    pub fn on_move(&self) -> OnMove {
        self.on_move
    }

    pub fn on_truncate(&self) -> OnTruncate {
        self.on_truncate
    }

    pub fn end_on_error(&self) -> bool {
        self.end_on_error
    }

    pub fn use_watch(&self) -> bool {
        self.use_watch
    }

    pub fn wait_for_create(&self) -> bool {
        self.wait_for_create
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| Error::InvalidOption {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(Error::InvalidOption {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

/// Builder for [`TailOptions`]; `build` validates the numeric settings.
#[derive(Debug, Clone, Default)]
pub struct TailOptionsBuilder {
    options: TailOptions,
}

impl TailOptionsBuilder {
    pub fn begin_at(mut self, begin_at: BeginAt) -> Self {
        self.options.begin_at = begin_at;
        self
    }

    pub fn detect_truncate(mut self, detect: bool) -> Self {
        self.options.detect_truncate = detect;
        self
    }

    pub fn on_move(mut self, policy: OnMove) -> Self {
        self.options.on_move = policy;
        self
    }

    pub fn on_truncate(mut self, policy: OnTruncate) -> Self {
        self.options.on_truncate = policy;
        self
    }

    pub fn end_on_error(mut self, end: bool) -> Self {
        self.options.end_on_error = end;
        self
    }

    pub fn use_watch(mut self, use_watch: bool) -> Self {
        self.options.use_watch = use_watch;
        self
    }

    pub fn wait_for_create(mut self, wait: bool) -> Self {
        self.options.wait_for_create = wait;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.buffer_capacity = capacity;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.options.read_buffer_size = size;
        self
    }

    pub fn build(self) -> Result<TailOptions> {
        let options = self.options;
        if options.poll_interval.is_zero() {
            return Err(invalid("poll_interval", "must be greater than zero"));
        }
        if options.buffer_capacity == 0 {
            return Err(invalid("buffer_capacity", "must be at least 1"));
        }
        if options.read_buffer_size == 0 {
            return Err(invalid("read_buffer_size", "must be at least 1"));
        }
        Ok(options)
    }
}

fn invalid(key: &str, message: &str) -> Error {
    Error::InvalidOption {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TailOptions::default();
        assert_eq!(options.begin_at(), BeginAt::Offset(0));
        assert!(options.detect_truncate());
        assert_eq!(options.on_move(), OnMove::Follow);
        assert_eq!(options.on_truncate(), OnTruncate::End);
        assert!(!options.end_on_error());
        assert_eq!(options.use_watch(), native_watch_supported());
        assert!(!options.wait_for_create());
        assert_eq!(options.poll_interval(), Duration::from_millis(250));
        assert_eq!(options.buffer_capacity(), 64);
        assert_eq!(options.read_buffer_size(), 16 * 1024);
    }

    #[test]
    fn test_builder_overrides() {
        let options = TailOptions::builder()
            .begin_at(BeginAt::End)
            .on_move(OnMove::Stay)
            .on_truncate(OnTruncate::Reset)
            .end_on_error(true)
            .use_watch(false)
            .wait_for_create(true)
            .poll_interval(Duration::from_millis(20))
            .read_buffer_size(4)
            .build()
            .unwrap();

        assert_eq!(options.begin_at(), BeginAt::End);
        assert_eq!(options.on_move(), OnMove::Stay);
        assert_eq!(options.on_truncate(), OnTruncate::Reset);
        assert!(options.end_on_error());
        assert!(!options.use_watch());
        assert!(options.wait_for_create());
        assert_eq!(options.poll_interval(), Duration::from_millis(20));
        assert_eq!(options.read_buffer_size(), 4);
    }

    #[test]
    fn test_builder_rejects_zero_sizes() {
        assert!(TailOptions::builder().buffer_capacity(0).build().is_err());
        assert!(TailOptions::builder().read_buffer_size(0).build().is_err());
        assert!(
            TailOptions::builder()
                .poll_interval(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_on_move_from_str() {
        assert_eq!("follow".parse::<OnMove>().unwrap(), OnMove::Follow);
        assert_eq!("end".parse::<OnMove>().unwrap(), OnMove::End);
        assert_eq!("exit".parse::<OnMove>().unwrap(), OnMove::Exit);
        assert_eq!("error".parse::<OnMove>().unwrap(), OnMove::Exit);
        assert_eq!("STAY".parse::<OnMove>().unwrap(), OnMove::Stay);
        assert!("rename".parse::<OnMove>().is_err());
    }

    #[test]
    fn test_on_truncate_from_str() {
        assert_eq!("end".parse::<OnTruncate>().unwrap(), OnTruncate::End);
        assert_eq!("reset".parse::<OnTruncate>().unwrap(), OnTruncate::Reset);
        assert!("rewind".parse::<OnTruncate>().is_err());
    }

    #[test]
    fn test_begin_at_from_str() {
        assert_eq!("end".parse::<BeginAt>().unwrap(), BeginAt::End);
        assert_eq!("0".parse::<BeginAt>().unwrap(), BeginAt::Offset(0));
        assert_eq!("1024".parse::<BeginAt>().unwrap(), BeginAt::Offset(1024));
        assert!("-5".parse::<BeginAt>().is_err());
        assert!("start".parse::<BeginAt>().is_err());
    }

    #[test]
    fn test_from_pairs_accepts_both_spellings() {
        let options = TailOptions::from_pairs([
            ("beginAt", "end"),
            ("on_move", "stay"),
            ("onTruncate", "reset"),
            ("end_on_error", "true"),
            ("useWatch", "false"),
            ("poll_interval", "50"),
        ])
        .unwrap();

        assert_eq!(options.begin_at(), BeginAt::End);
        assert_eq!(options.on_move(), OnMove::Stay);
        assert_eq!(options.on_truncate(), OnTruncate::Reset);
        assert!(options.end_on_error());
        assert!(!options.use_watch());
        assert_eq!(options.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_from_pairs_rejects_unknown_key() {
        let result = TailOptions::from_pairs([("separator", "\n")]);
        match result {
            Err(Error::UnknownOption { key }) => assert_eq!(key, "separator"),
            other => panic!("Expected UnknownOption, got {:?}", other),
        }
    }

    #[test]
    fn test_from_pairs_rejects_bad_value() {
        let result = TailOptions::from_pairs([("detectTruncate", "maybe")]);
        assert!(matches!(result, Err(Error::InvalidOption { key, .. }) if key == "detectTruncate"));

        let result = TailOptions::from_pairs([("onMove", "teleport")]);
        assert!(matches!(result, Err(Error::InvalidOption { .. })));
    }

    #[test]
    fn test_from_pairs_empty_is_default() {
        let options = TailOptions::from_pairs(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(options, TailOptions::default());
    }
}
