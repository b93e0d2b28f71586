//! utitlity module
use std::path::PathBuf;

use path_clean::PathClean;
use tracing::Level;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

///This method takes a url as a string literal,checks and validate http
/// scheme in the url,parses it and return a Result Url or String
/// type if any error occur.
pub fn parse_url(url: &str) -> Result<Url, String> {
    if url.starts_with("https://") || url.starts_with("http://") {
        return Url::parse(url).map_err(|e| format!("Invalid Url {url} {e}"));
    }
    let new_url = format!("https://{url}");
    Url::parse(&new_url).map_err(|e| format!("Invalid Url {url} {e}"))
}

///Expand `~` and environment variables in a user supplied directory and normalize it.
pub fn parse_output_dir(path: &str) -> Result<PathBuf, String> {
    let expanded = shellexpand::full(path).map_err(|e| format!("Can't expand path {path}: {e}"))?;
    let dir = PathBuf::from(expanded.as_ref()).clean();
    if dir.is_file() {
        return Err(format!("{} is a file, expected a directory.", dir.display()));
    }
    Ok(dir)
}

/// Default download directory: `<user download dir>/gallery-fetch`.
pub fn default_output_dir() -> Option<PathBuf> {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("gallery-fetch"))
}

///Install the global subscriber for the binary, log lines go through the
/// tracing-indicatif stderr writer.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy(); // respects RUST_LOG if user set it

    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(indicatif_layer.get_stderr_writer())
                .with_target(false)
                .compact()
                .with_filter(filter),
        )
        .with(indicatif_layer)
        .init();
}

///Intialize a logger for my tests.
/// # Arguements:
/// * level :This is the log level.
pub fn test_logger_init(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into()) // default = warn
        .from_env_lossy(); // respects RUST_LOG if user set it

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(true) // colors in terminal
                .with_target(false) // cleaner output
                .with_file(false)
                .with_line_number(false)
                .with_test_writer()
                .compact(),
        ) // one-line format, perfect for CLIs
        .try_init();
}
