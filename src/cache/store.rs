/// Key-value storage backends for the detection cache
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Whole-value key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the values present for `keys`; missing keys are simply absent
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Write every pair, replacing existing values
    async fn set(&self, items: HashMap<String, Value>) -> Result<()>;

    async fn remove(&self, keys: &[&str]) -> Result<()>;
}

/// In-memory store (thread-safe)
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let values = self.values.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        self.values.write().await.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.values.write().await;
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Map::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow!("Store file {} is not a JSON object", self.path.display())),
        }
    }

    async fn write_all(&self, map: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json_content = serde_json::to_string_pretty(&Value::Object(map))?;
        tokio::fs::write(&self.path, json_content).await?;
        debug!("💾 Wrote store file {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let _guard = self.lock.lock().await;
        let map = self.read_all().await?;
        Ok(keys
            .iter()
            .filter_map(|key| map.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_all().await?;
        map.extend(items);
        self.write_all(map).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_all().await?;
        for key in keys {
            map.remove(*key);
        }
        self.write_all(map).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn exercise(store: &dyn KeyValueStore) {
        assert!(store.get(&["a"]).await.unwrap().is_empty());

        store
            .set(HashMap::from([
                ("a".to_string(), json!({"x": 1})),
                ("b".to_string(), json!(5)),
            ]))
            .await
            .unwrap();

        let values = store.get(&["a", "b", "c"]).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["a"], json!({"x": 1}));

        store.remove(&["a"]).await.unwrap();
        let values = store.get(&["a", "b"]).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["b"], json!(5));
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("nested").join("store.json"));
        exercise(&store).await;

        // A second handle sees the persisted state
        let reopened = FileStore::new(store.path().to_path_buf());
        assert_eq!(reopened.get(&["b"]).await.unwrap()["b"], json!(5));
    }

    #[test]
    fn test_file_store_rejects_non_object() {
        tokio_test::block_on(async {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("store.json");
            tokio::fs::write(&path, "[1, 2]").await.unwrap();

            let store = FileStore::new(path);
            assert!(store.get(&["a"]).await.is_err());
        });
    }
}
