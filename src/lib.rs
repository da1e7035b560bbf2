//! Live file tailing as an async stream.
//!
//! A tail session follows one file and yields the bytes appended to it,
//! surviving truncation, rename and deletion/re-creation of the file along
//! the way. Each of those is reported as a [`TailEvent`] in the order it was
//! observed.
//!
//! # Example
//!
//! ```rust,no_run
//! use tail_stream::{tail_file, BeginAt, TailEvent, TailOptions};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = TailOptions::builder().begin_at(BeginAt::End).build()?;
//!     let mut stream = tail_file("app.log", options).await?;
//!
//!     while let Some(event) = stream.next().await {
//!         match event {
//!             TailEvent::Data(bytes) => print!("{}", String::from_utf8_lossy(&bytes)),
//!             TailEvent::Error(e) => eprintln!("Error: {}", e),
//!             other => eprintln!("{:?}", other),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod config;
mod engine;
mod error;
mod path;
mod reader;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{
    BeginAt, OnMove, OnTruncate, TailOptions, TailOptionsBuilder, native_watch_supported,
};
pub use error::{Error, ErrorKind, Result};
pub use stream::{TailEvent, TailStream};

use std::path::Path;

/// Starts tailing the file at `path`.
///
/// Relative paths are resolved against the current directory before the
/// file is opened.
///
/// # Example
///
/// ```rust,no_run
/// use tail_stream::{tail_file, TailOptions};
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut chunks = tail_file("app.log", TailOptions::default()).await?.chunks();
///
///     while let Some(chunk) = chunks.next().await {
///         print!("{}", String::from_utf8_lossy(&chunk?));
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail_file<P: AsRef<Path>>(path: P, options: TailOptions) -> Result<TailStream> {
    TailStream::open(path, options).await
}
