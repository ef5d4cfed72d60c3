//! Common imports for encoding or decoding a turn.
pub use crate::{
    AbortHandle, DecoderConfig, Encoder, EncoderConfig, ProviderEvent, StreamDriver, StreamEvent,
    TurnSnapshot, TurnState, UpstreamError, WireResponse, init_observability,
    provider_event_stream,
};
