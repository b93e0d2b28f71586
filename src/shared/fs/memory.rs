use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::shared::{errors::FetchError, fs::ArtifactSink};

/// Keeps delivered images in memory, in delivery order.
#[derive(Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(String, Bytes)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<(String, Bytes)> {
        self.delivered
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.delivered().into_iter().map(|(name, _)| name).collect()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn deliver(&self, bytes: Bytes, destination_name: &str) -> Result<(), FetchError> {
        self.delivered
            .lock()
            .map_err(|err| FetchError::Storage(err.to_string()))?
            .push((destination_name.to_string(), bytes));
        Ok(())
    }
}
