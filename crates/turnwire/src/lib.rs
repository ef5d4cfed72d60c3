//! Line-prefixed wire protocol for streaming one model turn.
//!
//! The relay side turns upstream provider events into frames with
//! [`Encoder`]; the client side folds those frames back into an ordered
//! event log with [`StreamDriver`].
//!
//! ```text
//! f:{"messageId":"<id>"}
//! 0:"<text fragment>"
//! t:{"type":"<subtype>", ...}
//! e:{"message":"<string>","details":<any>}
//! ```
//!
//! # Decoding a turn
//!
//! ```no_run
//! use turnwire::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let response = reqwest::get("http://localhost:8080/chat").await?;
//! let mut driver = StreamDriver::new(DecoderConfig::from_env()?).with_user_text("Say hello");
//! let state = driver.begin(WireResponse::from_reqwest(response)).await;
//!
//! println!("{state:?}: {} events", driver.events().len());
//! # Ok(())
//! # }
//! ```

/// Tool-channel payload shapes and the legacy bare-object line.
pub mod channel;
/// Debounced text batching for the decoder.
pub mod coalescer;
/// Encoder and decoder settings.
pub mod config;
/// Read loop and turn state machine.
pub mod driver;
/// Provider events to wire frames.
pub mod encoder;
/// Public error types.
pub mod errors;
/// Decoded event log entries.
pub mod event;
/// Line classification and frame codecs.
pub mod frame;
/// Per-family merge rules over the event log.
pub mod merge;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// HTTP-like response contract consumed by the driver.
pub mod transport;
/// Upstream provider events and SSE decoding.
pub mod upstream;

pub use config::{DecoderConfig, EncoderConfig};
pub use driver::{AbortHandle, StreamDriver, TurnSnapshot};
pub use encoder::{Encoder, sanitize_message};
pub use errors::{ConfigError, TransportError, UpstreamError, WireError};
pub use event::{StreamEvent, TurnState};
pub use frame::{Channel, Frame, classify_line, decode_line};
pub use merge::EventLog;
pub use observability::init_observability;
pub use transport::WireResponse;
pub use upstream::{ProviderEvent, provider_event_stream};
