use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CollectionData, DocumentStore, Filter, validate_collection_name};
use crate::error::Result;
use crate::models::Document;

/// In-process store backing the unit tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<BTreeMap<String, CollectionData>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    async fn collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let store = self.collections.read().await;
        Ok(store.get(collection).map_or(0, |data| data.documents.len()))
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let store = self.collections.read().await;
        Ok(store
            .get(collection)
            .map(|data| data.find(filter))
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let store = self.collections.read().await;
        Ok(store.get(collection).and_then(|data| data.find_one(filter)))
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        validate_collection_name(collection)?;
        if documents.is_empty() {
            return Ok(0);
        }
        let mut store = self.collections.write().await;
        Ok(store
            .entry(collection.to_string())
            .or_default()
            .insert_many(documents))
    }

    async fn replace_all(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        validate_collection_name(collection)?;
        let mut store = self.collections.write().await;
        Ok(store
            .entry(collection.to_string())
            .or_default()
            .replace_all(documents))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let mut store = self.collections.write().await;
        Ok(store
            .get_mut(collection)
            .map_or(0, |data| data.delete_many(filter)))
    }

    async fn delete_one(&self, collection: &str, id: u64) -> Result<bool> {
        let mut store = self.collections.write().await;
        Ok(store
            .get_mut(collection)
            .is_some_and(|data| data.delete_one(id)))
    }

    async fn ensure_unique(&self, collection: &str, field: &str) -> Result<()> {
        validate_collection_name(collection)?;
        let mut store = self.collections.write().await;
        store
            .entry(collection.to_string())
            .or_default()
            .ensure_unique(field);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(title: &str) -> Document {
        let mut d = Document::new();
        d.insert("title".to_string(), json!(title));
        d
    }

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();
        assert_eq!(store.count("springer_x_newest").await.unwrap(), 0);

        let n = store
            .insert_many("springer_x_newest", vec![doc("a"), doc("b")])
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.collections().await.unwrap(), vec!["springer_x_newest"]);

        let found = store
            .find_one("springer_x_newest", &Filter::all().eq("title", "b"))
            .await
            .unwrap();
        assert!(found.is_some());

        assert!(store.delete_one("springer_x_newest", 0).await.unwrap());
        assert_eq!(store.count("springer_x_newest").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_bad_names() {
        let store = MemoryStore::new();
        assert!(store.insert_many("../x", vec![doc("a")]).await.is_err());
    }
}
