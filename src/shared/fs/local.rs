use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use opendal::{Operator, services};
use tracing::{debug, info, instrument};

use crate::shared::{
    errors::FetchError,
    fs::{ArtifactSink, sanitize_name},
};

pub struct LocalFsBuilder {
    root_path: Option<PathBuf>,
}

impl LocalFsBuilder {
    pub fn new() -> Self {
        Self { root_path: None }
    }
    ///Root directory for all write operations.
    pub fn root_path(mut self, value: PathBuf) -> Self {
        self.root_path = Some(value);
        self
    }
    pub async fn build(self) -> Result<LocalFs, FetchError> {
        let root_path = self.root_path.ok_or(FetchError::ParseError(
            "Root directory must be provided.".into(),
        ))?;
        tokio::fs::create_dir_all(&root_path).await?;
        let root_path_as_str = root_path.to_str().ok_or(FetchError::ParseError(format!(
            "Can't get valid path object from path {}, invalid path",
            root_path.display()
        )))?;
        let builder = services::Fs::default().root(root_path_as_str);
        let op = Operator::new(builder)?.finish();
        info!(root = %root_path.display(), "Local artifact sink ready.");

        Ok(LocalFs { op, root_path })
    }
}

impl Default for LocalFsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes every delivered image as its own file under one root directory.
pub struct LocalFs {
    op: Operator,
    root_path: PathBuf,
}

impl LocalFs {
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }
}

#[async_trait]
impl ArtifactSink for LocalFs {
    #[instrument(name = "local_fs_deliver", skip(self, bytes), fields(size = bytes.len()))]
    async fn deliver(&self, bytes: Bytes, destination_name: &str) -> Result<(), FetchError> {
        let file_name = sanitize_name(destination_name);
        debug!("Writing {} bytes to {}", bytes.len(), file_name);
        self.op.write(&file_name, bytes).await?;
        Ok(())
    }
}
