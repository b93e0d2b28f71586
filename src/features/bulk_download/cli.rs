use std::path::PathBuf;

use clap::{Args, Parser};
use url::Url;

use crate::features::bulk_download::models::SpeedClass;
use crate::shared::network::{factory::TransportType, http::config::HttpArgs};
use crate::utils::{parse_output_dir, parse_url};

#[derive(Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct BulkArgs {
    ///Http urls of the images to download.
    pub urls: Vec<String>,
    ///JSON manifest, an array of {"url", "name"?, "id"?, "size"?} objects.
    #[arg(short = 'm', long)]
    pub manifest: Option<PathBuf>,
    ///Directory the images are saved to, defaults to <downloads>/gallery-fetch.
    #[arg(short = 'o', long, value_parser = parse_output_dir)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub probe_args: ProbeArgs,
    ///Transport to use for send and recieving data.
    #[arg(short = 't', long, value_enum, default_value_t = TransportType::Http)]
    pub transport: TransportType,
    ///Print the final job result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
    #[command(flatten)]
    pub http_args: HttpArgs,
}

#[derive(Clone, Debug, Args)]
pub struct ProbeArgs {
    ///Small resource timed once per job to classify the connection,
    /// defaults to /favicon.ico on the first image's origin.
    #[arg(long, value_parser = parse_url, env = "GALLERY_FETCH_PROBE_URL")]
    pub probe_url: Option<Url>,
    ///Skip probing and plan the job for this connection speed.
    #[arg(long, value_enum)]
    pub speed: Option<SpeedClass>,
}
