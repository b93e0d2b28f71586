pub mod config;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use tracing::{debug, error, instrument};
use url::Url;

use self::config::HttpArgs;
use crate::shared::{
    errors::FetchError,
    network::{DataTransport, TransportResponse},
};

/// http client wrapper for reqwest library.
///
/// Retries are not installed as middleware, the task executor owns the retry policy.
#[derive(Clone)]
pub struct HttpAdapter {
    client: ClientWithMiddleware,
}

impl HttpAdapter {
    #[instrument(name = "new_http_adapter", skip_all)]
    pub fn new(http_args: HttpArgs) -> Result<Self> {
        let try_client = Client::try_from(http_args)
            .context("Can't create http client due to misconfiguration.")?;
        let client: ClientWithMiddleware = ClientBuilder::new(try_client)
            .with(TracingMiddleware::default()) // Enable built-in http client tracing and logging.
            .build();

        Ok(Self { client })
    }
}

#[async_trait]
impl DataTransport for HttpAdapter {
    #[instrument(name = "http_open", skip(self), fields(url = source.as_str()))]
    async fn open(&self, source: &Url) -> Result<TransportResponse, FetchError> {
        let resp = match self.client.get(source.clone()).send().await {
            Ok(resp) => resp,
            Err(err) => {
                error!("could'nt download {source} due to :{err}");
                return Err(err.into());
            }
        };
        let status = resp.status().as_u16();
        let content_length = resp.content_length();
        debug!(status, content_length, "Got response head.");

        // Pull chunks lazily so dropping the body aborts the transfer.
        let body = stream::unfold(Some(resp), |state| async move {
            let mut resp = state?;
            match resp.chunk().await {
                Ok(Some(bytes)) => Some((Ok(bytes), Some(resp))),
                Ok(None) => None,
                Err(err) => {
                    error!(error = %err, "Error reading response chunk");
                    Some((Err(FetchError::from(err)), None))
                }
            }
        });

        Ok(TransportResponse::new(status, content_length, Box::pin(body)))
    }
}
