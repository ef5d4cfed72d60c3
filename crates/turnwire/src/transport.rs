use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt as _;
use futures::stream::Stream;

use crate::errors::TransportError;

/// Pull interface over the wire body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send + 'static>>;

const REQUEST_ID_HEADERS: &[&str] = &["x-request-id", "request-id"];

/// HTTP-like response handed to the decoder.
///
/// Success is checked before any body byte is read.
pub struct WireResponse {
    pub status: u16,
    pub status_text: String,
    /// Correlation header surfaced to the caller.
    pub request_id: Option<String>,
    pub body: Option<ByteStream>,
}

impl WireResponse {
    /// A `200 OK` response over the given body.
    pub fn ok<S>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            request_id: None,
            body: Some(Box::pin(body)),
        }
    }

    /// A response whose body is already fully in memory, split into
    /// `chunk_size`-byte reads.
    pub fn from_bytes(bytes: impl Into<Bytes>, chunk_size: usize) -> Self {
        let bytes: Bytes = bytes.into();
        let chunk_size = chunk_size.max(1);
        let chunks: Vec<Result<Bytes, TransportError>> = (0..bytes.len())
            .step_by(chunk_size)
            .map(|start| Ok(bytes.slice(start..(start + chunk_size).min(bytes.len()))))
            .collect();
        Self::ok(futures::stream::iter(chunks))
    }

    pub fn with_status(mut self, status: u16, status_text: impl Into<String>) -> Self {
        self.status = status;
        self.status_text = status_text.into();
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Adapts a `reqwest` response. The body is streamed, never buffered.
    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let status = response.status();
        let request_id = REQUEST_ID_HEADERS.iter().find_map(|name| {
            response
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned)
        });
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            request_id,
            body: Some(Box::pin(body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_bytes_splits_into_fixed_reads() {
        let mut response = WireResponse::from_bytes("abcdefg", 3);
        let body = response.body.take().expect("body");
        let chunks: Vec<_> = body.map(|c| c.expect("chunk")).collect().await;
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"abc"),
                Bytes::from_static(b"def"),
                Bytes::from_static(b"g")
            ]
        );
    }

    #[test]
    fn status_helpers() {
        let response = WireResponse::from_bytes("", 8)
            .with_status(503, "Service Unavailable")
            .with_request_id("req_1");
        assert!(!response.is_success());
        assert_eq!(response.request_id.as_deref(), Some("req_1"));
        assert!(response.without_body().body.is_none());
    }
}
