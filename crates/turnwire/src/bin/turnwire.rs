// turnwire: encode provider events into wire frames, or decode a wire
// capture into the event log.
//
// Usage:
//   turnwire encode events.jsonl > turn.wire
//   turnwire encode capture.sse --sse --message-id msg_1
//   turnwire decode turn.wire --chunk-size 7
//   turnwire decode --url http://localhost:8080/chat

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::StreamExt as _;
use futures::stream;

use turnwire::errors::TransportError;
use turnwire::prelude::*;

#[derive(Parser)]
#[command(
    name = "turnwire",
    about = "Encode and decode the line-prefixed model turn wire protocol."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode provider events (JSON lines, or SSE with --sse) into frames on stdout.
    Encode {
        /// Input file with one provider event per line.
        input: PathBuf,

        /// Treat the input as a raw server-sent-events capture.
        #[arg(long)]
        sse: bool,

        /// Message id for the `f:` frame (default: random).
        #[arg(long, value_name = "ID")]
        message_id: Option<String>,

        /// Override the text flush threshold in bytes.
        #[arg(long, value_name = "BYTES")]
        flush_bytes: Option<usize>,

        /// Also emit legacy content-part-done lines.
        #[arg(long)]
        content_part_done: bool,
    },
    /// Decode a wire capture and print the final snapshot as JSON.
    Decode {
        /// Wire capture file.
        #[arg(required_unless_present = "url", conflicts_with = "url")]
        input: Option<PathBuf>,

        /// Fetch the wire body from this URL instead of a file.
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Feed the capture in reads of this many bytes.
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,

        /// Override the text coalescing window in milliseconds.
        #[arg(long, value_name = "MS")]
        coalesce_ms: Option<u64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_observability();
    let cli = Cli::parse();

    match cli.command {
        Command::Encode {
            input,
            sse,
            message_id,
            flush_bytes,
            content_part_done,
        } => {
            let mut config = EncoderConfig::from_env()?;
            if let Some(bytes) = flush_bytes {
                config = config.text_flush_threshold(bytes);
            }
            if content_part_done {
                config = config.emit_content_part_done(true);
            }
            encode(input, sse, message_id, config).await
        }
        Command::Decode {
            input,
            url,
            chunk_size,
            coalesce_ms,
        } => {
            let mut config = DecoderConfig::from_env()?;
            if let Some(ms) = coalesce_ms {
                config = config.coalesce_window(Duration::from_millis(ms));
            }
            let response = match (input, url) {
                (_, Some(url)) => {
                    let response = reqwest::get(&url)
                        .await
                        .with_context(|| format!("request to {url} failed"))?;
                    WireResponse::from_reqwest(response)
                }
                (Some(path), None) => {
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    WireResponse::from_bytes(bytes, chunk_size)
                }
                (None, None) => bail!("specify a capture file or --url"),
            };
            decode(response, config).await
        }
    }
}

async fn encode(
    input: PathBuf,
    sse: bool,
    message_id: Option<String>,
    config: EncoderConfig,
) -> anyhow::Result<()> {
    let raw = std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
    let events = if sse {
        let chunks = stream::iter([Ok::<_, TransportError>(Bytes::from(raw))]);
        provider_event_stream(chunks).boxed()
    } else {
        stream::iter(parse_jsonl(&raw)?.into_iter().map(Ok)).boxed()
    };

    let mut encoder = Encoder::new(config);
    if let Some(id) = message_id {
        encoder = encoder.with_message_id(id);
    }
    tracing::info!(message_id = encoder.message_id(), input = %input.display(), "encoding turn");

    let mut frames = Box::pin(encoder.encode(events));
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(frame) = frames.next().await {
        out.write_all(&frame)?;
    }
    out.flush()?;
    Ok(())
}

fn parse_jsonl(raw: &[u8]) -> anyhow::Result<Vec<ProviderEvent>> {
    let text = std::str::from_utf8(raw).context("event file is not UTF-8")?;
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid JSON", index + 1))?;
        match ProviderEvent::from_json(value) {
            Some(event) => events.push(event),
            None => bail!("line {}: event has no \"type\" field", index + 1),
        }
    }
    Ok(events)
}

async fn decode(response: WireResponse, config: DecoderConfig) -> anyhow::Result<()> {
    let mut driver = StreamDriver::new(config);
    let state = driver.begin(response).await;
    tracing::info!(?state, events = driver.events().len(), "decoded turn");

    let snapshot = driver.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if state == TurnState::Errored {
        bail!("turn ended in error");
    }
    Ok(())
}
