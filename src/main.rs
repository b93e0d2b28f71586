//! # gallery-fetch
//!
//! Bulk image downloader that adapts its concurrency to the connection.
//!
//! Exit codes: 0 when every image was saved, 1 when any image failed or the job
//! could not start, 130 when cancelled with Ctrl+C.

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::error;

use gallery_fetch::features::bulk_download::{cli::BulkArgs, handler};
use gallery_fetch::utils::init_logging;

const EXIT_FAILURE: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    human_panic::setup_panic!();
    let args = BulkArgs::parse();
    init_logging(args.verbose);
    let json = args.json;

    match handler::handle(args).await {
        Ok(result) => {
            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(text) => println!("{text}"),
                    Err(err) => error!("Can't serialize job result: {err}"),
                }
            }
            for line in &result.errors {
                eprintln!("{} {line}", "failed:".red());
            }
            if result.cancelled {
                ExitCode::from(EXIT_CANCELLED)
            } else if result.succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILURE)
            }
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
