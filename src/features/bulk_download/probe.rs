use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::features::bulk_download::models::SpeedClass;
use crate::shared::{errors::FetchError, network::DataTransport};

const SLOW_THRESHOLD: Duration = Duration::from_millis(1000);
const MEDIUM_THRESHOLD: Duration = Duration::from_millis(300);
/// Past the slow threshold the answer is already known, no need to wait for a stalled probe.
pub const PROBE_DEADLINE: Duration = Duration::from_millis(3000);

/// Classifies the current connection before a job is planned.
#[async_trait]
pub trait SpeedProbe: Send + Sync {
    async fn probe(&self) -> SpeedClass;
}

pub fn classify(elapsed: Duration) -> SpeedClass {
    if elapsed > SLOW_THRESHOLD {
        SpeedClass::Slow
    } else if elapsed > MEDIUM_THRESHOLD {
        SpeedClass::Medium
    } else {
        SpeedClass::Fast
    }
}

/// Times one small GET against a fixed resource.
///
/// Fails open: any error classifies the connection as medium so a bad probe
/// never blocks a job.
pub struct HttpSpeedProbe {
    transport: Arc<dyn DataTransport>,
    probe_url: Url,
}

impl HttpSpeedProbe {
    pub fn new(transport: Arc<dyn DataTransport>, probe_url: Url) -> Self {
        Self { transport, probe_url }
    }

    /// Probe URL with a cache-busting query parameter appended.
    fn cache_busted_url(&self) -> Url {
        let mut url = self.probe_url.clone();
        url.query_pairs_mut()
            .append_pair("_", &Local::now().timestamp_millis().to_string());
        url
    }

    async fn timed_fetch(&self, url: &Url) -> Result<Duration, FetchError> {
        let started = Instant::now();
        let response = self.transport.open(url).await?;
        if !response.is_success() {
            return Err(FetchError::HttpStatus(response.status));
        }
        response.collect_body().await?;
        Ok(started.elapsed())
    }
}

#[async_trait]
impl SpeedProbe for HttpSpeedProbe {
    #[instrument(name = "speed_probe", skip(self), fields(url = self.probe_url.as_str()))]
    async fn probe(&self) -> SpeedClass {
        let url = self.cache_busted_url();
        let timed = tokio::time::timeout(PROBE_DEADLINE, self.timed_fetch(&url))
            .await
            .unwrap_or(Err(FetchError::Timeout(PROBE_DEADLINE)));
        match timed {
            Ok(elapsed) => {
                let speed = classify(elapsed);
                debug!(elapsed_ms = elapsed.as_millis() as u64, %speed, "Connection probed.");
                speed
            }
            Err(FetchError::Timeout(deadline)) => {
                warn!(deadline_ms = deadline.as_millis() as u64, "Speed probe stalled, assuming slow connection.");
                SpeedClass::Slow
            }
            Err(err) => {
                warn!(error = %err, "Speed probe failed, assuming medium connection.");
                SpeedClass::Medium
            }
        }
    }
}

/// Skips probing and reports a fixed class.
pub struct FixedSpeed(pub SpeedClass);

#[async_trait]
impl SpeedProbe for FixedSpeed {
    async fn probe(&self) -> SpeedClass {
        self.0
    }
}
