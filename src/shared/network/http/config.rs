use anyhow::{Error as AnyhowError, Result};
use base64::prelude::*;
use clap::Args;
use cookie::Cookie;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use reqwest::{Proxy, redirect::Policy};
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};

pub use crate::shared::retry::RetryArgs;

#[derive(Args, Debug, Clone)]
pub struct HttpArgs {
    #[command(flatten)]
    pub retry_args: RetryArgs,
    /// Set http basic authentication username used for login to the site.
    #[arg(short = 'U', long, env = "GALLERY_FETCH_HTTP_USERNAME")]
    pub username: Option<String>,
    /// Set http basic authentication password to used for login to the site.
    #[arg(short = 'P', long, env = "GALLERY_FETCH_HTTP_PASSWORD")]
    pub password: Option<SecretString>,
    ///Maximum http redirects this application will make if need be.
    #[arg(long)]
    pub max_redirects: Option<usize>,
    /// Connect timeout (in secs). Whole-request timeouts follow the probed connection speed.
    #[arg(short = 'T', long, default_value_t = 15)]
    pub connect_timeout: u64,
    ///Only http proxies are supported currently.
    #[arg(short = 'p', long)]
    pub proxy_url: Option<String>,
    /// Use a column seperated key value pair e.g key1:value1,key2:value2 for request headers.
    #[arg(long)]
    pub request_headers: Option<String>,
    /// Add http cookies from previous http session.
    #[arg(long)]
    pub http_cookies: Option<String>,
    /// Pin HTTP/1 with `1.1` (or `1`, `1.0`); other values keep the default version negotiation.
    #[arg(long)]
    pub http_version: Option<String>,
}

impl Default for HttpArgs {
    fn default() -> Self {
        Self {
            retry_args: RetryArgs::default(),
            username: None,
            password: None,
            max_redirects: None,
            connect_timeout: 15,
            proxy_url: None,
            request_headers: None,
            http_cookies: None,
            http_version: None,
        }
    }
}

impl TryFrom<HttpArgs> for reqwest::Client {
    type Error = AnyhowError;

    /// Tries to convert an `HttpArgs` into a `reqwest::Client`.
    fn try_from(http_config: HttpArgs) -> Result<Self, Self::Error> {
        build_client_base(http_config)
    }
}

fn build_client_base(http_config: HttpArgs) -> Result<Client, AnyhowError> {
    let mut client_config = ClientBuilder::new();
    info!("Initialized client builder.");

    let policy: Policy = if let Some(max_redirects) = http_config.max_redirects {
        info!("Maximum redirect has been set to {}", max_redirects);
        Policy::limited(max_redirects)
    } else {
        info!("Maximum redirect still default");
        Policy::default()
    };

    // No total request timeout here, every task races its own speed-derived deadline.
    let connect_timeout = Duration::from_secs(http_config.connect_timeout);
    info!("Setting connect timeout to {:?}.", connect_timeout);
    client_config = client_config.connect_timeout(connect_timeout).redirect(policy);

    if let Some(proxy_url) = http_config.proxy_url {
        info!("Setting up user-defined proxy");
        client_config = client_config.proxy(Proxy::all(proxy_url)?);
    } else {
        info!("No user defined proxy.");
        client_config = client_config.no_proxy();
    }

    if let Some(http_version) = http_config.http_version {
        if forces_http1(&http_version) {
            info!("Restricting client to HTTP/1.x.");
            client_config = client_config.http1_only();
        } else {
            warn!("Unsupported http version {http_version}, keeping default version negotiation.");
        }
    }

    let mut request_header_headermap = HeaderMap::new();
    // comma seperated header value e.g name:johndoe,age:23
    if let Some(request_headers_str) = http_config.request_headers {
        info!("Setting up user-defined HTTP headers.");
        for header in request_headers_str.split(',').map(str::trim) {
            let parts: Vec<&str> = header.splitn(2, ':').collect();
            if parts.len() == 2 {
                let name = parts[0].trim();
                let value = parts[1].trim();
                request_header_headermap.insert(
                    reqwest::header::HeaderName::from_str(name)?,
                    HeaderValue::from_str(value)?,
                );
            }
        }
    }

    if let Some(cookies_str) = http_config.http_cookies {
        info!("Setting up user-defined HTTP cookies.");
        match Cookie::parse(cookies_str) {
            Ok(cookie) => {
                request_header_headermap
                    .insert(COOKIE, HeaderValue::from_str(cookie.to_string().as_ref())?);
            }
            Err(err) => {
                error!(error = %err, "Can't sanitize cookie");
            }
        }
    }

    if let Some(username) = http_config.username {
        info!("Setting up http basic authentication.");
        let password = http_config
            .password
            .as_ref()
            .map(|secret| secret.expose_secret().to_string())
            .unwrap_or_default();
        let mut value = HeaderValue::from_str(&basic_auth_value(&username, &password))?;
        value.set_sensitive(true);
        request_header_headermap.insert(AUTHORIZATION, value);
    }

    let client = client_config
        .default_headers(request_header_headermap)
        .build()?;
    info!("Built HTTP client with User configuration");
    Ok(client)
}

/// `1`, `1.0`, `1.1` (optionally `HTTP/` prefixed) pin the client to HTTP/1.
fn forces_http1(version: &str) -> bool {
    let version = version.trim();
    let version = version
        .strip_prefix("HTTP/")
        .or_else(|| version.strip_prefix("http/"))
        .unwrap_or(version);
    matches!(version, "1" | "1.0" | "1.1")
}

fn basic_auth_value(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{username}:{password}")))
}
