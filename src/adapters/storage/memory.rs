use crate::domain::ports::BlobStore;
use crate::utils::error::{ReconError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process blob store. Clones share the same objects.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    bucket: String,
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// 依字典序列出所有物件
    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

impl BlobStore for MemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn uri(&self, key: &str) -> String {
        format!("mem://{}/{}", self.bucket, key)
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<()> {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ReconError::Storage {
                key: key.to_string(),
                message: "object not found".to_string(),
            })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let mut objects = self.objects.lock().await;
        match objects.remove(from) {
            Some(data) => {
                objects.insert(to.to_string(), data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_clones_share_objects() {
        let store = MemoryBlobStore::new("refunds");
        let other = store.clone();

        block_on(store.put("tmp/a.csv", b"1", "text/csv")).unwrap();

        assert!(block_on(other.exists("tmp/a.csv")).unwrap());
        assert!(block_on(other.rename("tmp/a.csv", "a.csv")).unwrap());
        assert!(!block_on(store.rename("tmp/a.csv", "a.csv")).unwrap());
        assert_eq!(block_on(store.keys()), vec!["a.csv"]);
        assert!(matches!(
            block_on(store.get("tmp/a.csv")),
            Err(ReconError::Storage { .. })
        ));
    }
}
