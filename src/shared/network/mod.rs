use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio_stream::{Stream, StreamExt};
use url::Url;

use crate::shared::errors::FetchError;

#[cfg(feature = "local")]
pub mod http;

pub mod factory;

/// Upper bound on the buffer reserved from a server supplied `Content-Length`.
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send + 'static>>;

/// Response head plus a lazily consumed body.
///
/// Dropping the value drops the body stream, which aborts the underlying request.
pub struct TransportResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl TransportResponse {
    pub fn new(status: u16, content_length: Option<u64>, body: BodyStream) -> Self {
        Self { status, content_length, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into one contiguous buffer.
    pub async fn collect_body(mut self) -> Result<Bytes, FetchError> {
        let capacity = self
            .content_length
            .map_or(0, |len| len.min(MAX_PREALLOCATION) as usize);
        let mut buffer = BytesMut::with_capacity(capacity);
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

/// Transport used to fetch a single resource with a plain GET.
#[async_trait]
pub trait DataTransport: Send + Sync {
    /// Send the request and resolve once the response head is available.
    async fn open(&self, source: &Url) -> Result<TransportResponse, FetchError>;
}
