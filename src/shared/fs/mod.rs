pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::shared::errors::FetchError;

/// Destination for a fully downloaded image.
///
/// Invoked exactly once per completed task, never for failed or cancelled ones.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn deliver(&self, bytes: Bytes, destination_name: &str) -> Result<(), FetchError>;
}

/// Reduce a destination name to a single safe path component.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}
