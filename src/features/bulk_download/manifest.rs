//! Turning URLs and manifest files into download items.

use std::collections::HashSet;
use std::path::Path;

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::features::bulk_download::models::DownloadItem;
use crate::shared::errors::FetchError;
use crate::shared::fs::sanitize_name;
use crate::utils::parse_url;

/// One entry of a JSON manifest, e.g.
/// `[{"url": "https://cdn.example/IMG_1.jpg", "name": "ceremony-1.jpg"}]`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: Option<String>,
    pub url: String,
    pub name: Option<String>,
    pub size: Option<u64>,
}

impl ManifestEntry {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self { id: None, url: url.into(), name: None, size: None }
    }
}

pub fn parse_manifest(json: &str) -> Result<Vec<ManifestEntry>, FetchError> {
    serde_json::from_str(json)
        .map_err(|err| FetchError::ParseError(format!("Invalid manifest: {err}")))
}

/// Decoded last path segment of `url`, if it has one.
pub fn infer_name(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    // Try to decode percent-encoded UTF-8 strictly first, then fallback to lossy
    let decoded = percent_decode_str(segment).decode_utf8().map_or_else(
        |_| percent_decode_str(segment).decode_utf8_lossy().into_owned(),
        std::borrow::Cow::into_owned,
    );
    (!decoded.trim().is_empty()).then_some(decoded)
}

/// `IMG.jpg` becomes `IMG-2.jpg`, `IMG-3.jpg`, ... on collisions.
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let path = Path::new(&name);
    let stem = path
        .file_stem()
        .map_or_else(|| name.clone(), |s| s.to_string_lossy().into_owned());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let mut n = 2;
    loop {
        let candidate = match &extension {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        if taken.insert(candidate.clone()) {
            debug!(original = %name, renamed = %candidate, "Destination name already used.");
            return candidate;
        }
        n += 1;
    }
}

/// Build job items; ids default to `item-<n>` and names to the URL's last segment.
/// Names are sanitized before collisions are resolved, so no two items share a file.
pub fn build_items(entries: Vec<ManifestEntry>) -> Result<Vec<DownloadItem>, FetchError> {
    let mut taken = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let position = index + 1;
            let url = parse_url(&entry.url).map_err(FetchError::ParseError)?;
            let name = entry
                .name
                .or_else(|| infer_name(&url))
                .map_or_else(|| format!("item-{position}"), |name| sanitize_name(&name));
            let id = entry.id.unwrap_or_else(|| format!("item-{position}"));
            let item = DownloadItem::new(id, url, unique_name(name, &mut taken));
            Ok(match entry.size {
                Some(size) => item.with_expected_size(size),
                None => item,
            })
        })
        .collect()
}
