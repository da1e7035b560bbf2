use std::env;
use std::process;
use tail_stream::{TailEvent, TailOptions, tail_file};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <file_path> [key=value ...]", args[0]);
        process::exit(1);
    }

    let file_path = &args[1];

    let pairs = args[2..]
        .iter()
        .map(|arg| arg.split_once('=').unwrap_or((arg.as_str(), "")));
    let options = match TailOptions::from_pairs(pairs) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Invalid option: {}", e);
            process::exit(1);
        }
    };

    let mut stream = match tail_file(file_path, options).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Error setting up tail: {}", e);
            process::exit(1);
        }
    };

    info!(path = %stream.path().display(), "tailing");

    let mut stdout = tokio::io::stdout();
    let mut failed = false;
    while let Some(event) = stream.next().await {
        failed = false;
        match event {
            TailEvent::Data(bytes) => {
                if let Err(e) = write_chunk(&mut stdout, &bytes).await {
                    error!("Error writing output: {}", e);
                    process::exit(1);
                }
            }
            TailEvent::Replace => info!("file replaced, reading from the start"),
            TailEvent::Move { from, to } => {
                info!(from = %from.display(), to = %to.display(), "file moved")
            }
            TailEvent::Truncate { new_size, old_size } => {
                info!(new_size, old_size, "file truncated")
            }
            TailEvent::Eof => {}
            TailEvent::Error(e) => {
                warn!(kind = ?e.kind(), "{}", e);
                failed = true;
            }
        }
    }

    // An error as the final event is what ended the session
    if failed {
        process::exit(1);
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(out: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(bytes).await?;
    out.flush().await
}
