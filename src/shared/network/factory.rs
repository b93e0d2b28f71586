use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;

use crate::shared::network::DataTransport;
#[cfg(feature = "local")]
use crate::shared::network::http::{HttpAdapter, config::HttpArgs};

/// Transports an image can be fetched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportType {
    Http,
}

#[cfg(feature = "local")]
pub fn handle_http(args: HttpArgs, transport_type: TransportType) -> Result<Arc<dyn DataTransport>> {
    match transport_type {
        TransportType::Http => Ok(Arc::new(HttpAdapter::new(args)?)),
    }
}
