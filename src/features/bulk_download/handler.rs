use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use url::Url;

use super::cli::BulkArgs;
use crate::features::bulk_download::manifest::{ManifestEntry, build_items, parse_manifest};
use crate::features::bulk_download::models::{DownloadItem, JobResult, SpeedClass};
use crate::features::bulk_download::observer::{JobObserver, TracingObserver};
use crate::features::bulk_download::probe::{FixedSpeed, HttpSpeedProbe, SpeedProbe};
use crate::features::bulk_download::scheduler::Scheduler;
use crate::shared::fs::local::LocalFsBuilder;
use crate::shared::network::DataTransport;
use crate::shared::network::factory::handle_http;
use crate::shared::progress_tracker::CliProgressTracker;
use crate::utils::default_output_dir;

const DEFAULT_PROBE_PATH: &str = "/favicon.ico";

/// Collect the requested items from positional urls and the manifest file, in that order.
async fn collect_items(args: &BulkArgs) -> Result<Vec<DownloadItem>> {
    let mut entries: Vec<ManifestEntry> =
        args.urls.iter().map(ManifestEntry::from_url).collect();
    if let Some(manifest) = &args.manifest {
        let json = tokio::fs::read_to_string(manifest)
            .await
            .with_context(|| format!("Can't read manifest {}", manifest.display()))?;
        entries.extend(parse_manifest(&json)?);
    }
    if entries.is_empty() {
        bail!("Nothing to download, pass image urls or --manifest.");
    }
    Ok(build_items(entries)?)
}

/// Same-origin favicon of the first image.
fn default_probe_url(items: &[DownloadItem]) -> Option<Url> {
    let first = items.first()?.source_url();
    first.join(DEFAULT_PROBE_PATH).ok()
}

fn speed_probe(args: &BulkArgs, transport: Arc<dyn DataTransport>, items: &[DownloadItem]) -> Arc<dyn SpeedProbe> {
    if let Some(speed) = args.probe_args.speed {
        info!(%speed, "Connection speed set by user, skipping probe.");
        return Arc::new(FixedSpeed(speed));
    }
    match args.probe_args.probe_url.clone().or_else(|| default_probe_url(items)) {
        Some(url) => Arc::new(HttpSpeedProbe::new(transport, url)),
        None => {
            warn!("No probe url available, assuming medium connection.");
            Arc::new(FixedSpeed(SpeedClass::Medium))
        }
    }
}

fn output_dir(args: &BulkArgs) -> Result<PathBuf> {
    match &args.output {
        Some(dir) => Ok(dir.clone()),
        None => default_output_dir().context("Can't find a download directory, pass --output."),
    }
}

pub async fn handle(args: BulkArgs) -> Result<JobResult> {
    let items = collect_items(&args).await?;
    let transport = handle_http(args.http_args.clone(), args.transport)?;
    let root = output_dir(&args)?;
    let sink = LocalFsBuilder::new().root_path(root).build().await?;
    let probe = speed_probe(&args, transport.clone(), &items);
    // Keep stdout clean for the JSON report.
    let observer: Arc<dyn JobObserver> = if args.json {
        Arc::new(TracingObserver)
    } else {
        Arc::new(CliProgressTracker::new())
    };

    let scheduler = Scheduler::builder(transport, Arc::new(sink))
        .probe(probe)
        .observer(observer)
        .retry(args.http_args.retry_args)
        .build();

    let on_interrupt = scheduler.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling download...");
            on_interrupt.cancel();
        }
    });

    let result = scheduler.start(items).await;
    interrupt.abort();
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_probe_url_is_same_origin() {
        let items = build_items(vec![ManifestEntry::from_url(
            "https://cdn.studio.example/gallery/IMG_0001.jpg?sig=1",
        )])
        .unwrap();
        assert_eq!(
            default_probe_url(&items).unwrap().as_str(),
            "https://cdn.studio.example/favicon.ico"
        );
        assert!(default_probe_url(&[]).is_none());
    }

    #[tokio::test]
    async fn test_collect_items_merges_urls_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("album.json");
        tokio::fs::write(
            &manifest,
            r#"[{"url": "https://cdn.example/cover.png", "name": "cover.png"}]"#,
        )
        .await
        .unwrap();
        let args = BulkArgs::try_parse_from([
            "gallery-fetch",
            "https://cdn.example/IMG_1.jpg",
            "--manifest",
            manifest.to_str().unwrap(),
        ])
        .unwrap();

        let items = collect_items(&args).await.unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.destination_name().as_str()).collect();
        assert_eq!(names, vec!["IMG_1.jpg", "cover.png"]);
    }

    #[tokio::test]
    async fn test_collect_items_requires_input() {
        let args = BulkArgs::try_parse_from(["gallery-fetch"]).unwrap();
        assert!(collect_items(&args).await.is_err());
    }
}
