use crate::domain::ports::BlobStore;
use crate::utils::error::{ReconError, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

const DEFAULT_URI_SCHEME: &str = "gs";

/// Blob store backed by a local directory that mirrors one bucket, for
/// example a gcsfuse mount. Keys are `/`-separated paths under the root.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    bucket: String,
    uri_scheme: String,
}

fn storage_error(key: &str, e: impl std::fmt::Display) -> ReconError {
    ReconError::Storage {
        key: key.to_string(),
        message: e.to_string(),
    }
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
            uri_scheme: DEFAULT_URI_SCHEME.to_string(),
        }
    }

    /// 倉儲讀取時看到的 URI scheme，預設 `gs`
    pub fn with_uri_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.uri_scheme = scheme.into();
        self
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(storage_error(key, "key must be a relative path inside the bucket"));
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    async fn ensure_parent(&self, key: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(key, e))?;
        }
        Ok(())
    }
}

impl BlobStore for LocalBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn uri(&self, key: &str) -> String {
        format!("{}://{}/{}", self.uri_scheme, self.bucket, key)
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        self.ensure_parent(key, &path).await?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| storage_error(key, e))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| storage_error(key, e))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error(key, e)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let source = self.path_for(from)?;
        let target = self.path_for(to)?;
        if !self.exists(from).await? {
            return Ok(false);
        }
        self.ensure_parent(to, &target).await?;

        match tokio::fs::rename(&source, &target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error(from, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(storage_error(prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| storage_error(prefix, e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| storage_error(prefix, e))?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.key_for(&path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(key, e)),
        }
    }
}
