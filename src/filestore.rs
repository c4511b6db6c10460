//! Local file system storage for uploaded images.
use std::path::{Component, Path, PathBuf};

use anyhow::{Context as _, bail};
use serde::{Deserialize, Serialize};
use tokio::{fs as async_fs, io::AsyncWriteExt as _};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::{Error, Result, config::StorageConfig};

/// Extensions accepted for every upload category.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Destination category for an upload. Each maps to its own subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadCategory {
    Icon,
    Preview,
    Popup,
}

impl UploadCategory {
    const fn dir(self) -> &'static str {
        match self {
            Self::Icon => "icons",
            Self::Preview => "previews",
            Self::Popup => "popups",
        }
    }

    /// Whether `path` names a single file directly inside this category's directory.
    pub fn holds(self, path: &str) -> bool {
        path.strip_prefix(self.dir())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|name| {
                !name.is_empty()
                    && name != "."
                    && name != ".."
                    && !name.contains(['/', '\\'])
            })
    }
}

/// Where a saved file ended up.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    /// Relative to the storage root, always `/`-separated.
    pub path: String,
    pub url: Url,
}

/// Uploaded files under a single root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    base_url: Url,
}

impl LocalStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.path.clone(),
            base_url: config.base_url.clone(),
        }
    }

    /// Public URL for a stored relative path.
    pub fn public_url(&self, path: &str) -> anyhow::Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(path)
            .with_context(|| format!("cannot render public url for {path}"))
    }

    /// Store `bytes` under a fresh name, keeping the original file's extension.
    pub async fn save(
        &self,
        category: UploadCategory,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| {
                Error::validation(format!(
                    "unsupported file type {file_name:?}, expected one of {}",
                    ALLOWED_EXTENSIONS.join(", ")
                ))
            })?;

        let path = format!("{}/{}.{ext}", category.dir(), Uuid::new_v4());
        let target = self.root.join(&path);
        if let Some(parent) = target.parent() {
            async_fs::create_dir_all(parent)
                .await
                .context("failed to create upload directory")?;
        }

        let mut file = async_fs::File::create(&target)
            .await
            .context("failed to create upload file")?;
        file.write_all(bytes)
            .await
            .context("failed to write upload")?;
        file.flush().await.context("failed to flush upload")?;

        debug!("stored upload at {}", target.display());
        let url = self.public_url(&path)?;
        Ok(StoredFile { path, url })
    }

    /// Remove a stored file. Absent files are not an error.
    pub async fn delete(&self, path: &str) -> anyhow::Result<()> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("refusing to delete {path:?} outside the storage root");
        }

        match async_fs::remove_file(self.root.join(relative)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to delete {path}")),
        }
    }
}
