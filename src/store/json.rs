//! File-backed store: one pretty-printed `{collection}.json` per collection.
//!
//! ```text
//! data/
//! ├── ieee_agriculture_4_0_newest.json
//! ├── scholar_agriculture_4_0_relevant.json
//! └── talkwalker_alerts_agriculture_4_0.json
//! ```
//!
//! Writes go to a temporary file that is renamed over the previous version, so
//! a crash never leaves a half-written collection behind.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{CollectionData, DocumentStore, Filter, validate_collection_name};
use crate::error::Result;
use crate::models::Document;

#[derive(Debug)]
pub struct JsonStore {
    dir: PathBuf,
    // Serialises read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl JsonStore {
    /// Open (and create if needed) a store rooted at `dir`.
    #[instrument(level = "info", skip_all, fields(dir = %dir.as_ref().display()))]
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, collection: &str) -> Result<PathBuf> {
        validate_collection_name(collection)?;
        Ok(self.dir.join(format!("{collection}.json")))
    }

    async fn load(&self, collection: &str) -> Result<Option<CollectionData>> {
        let path = self.path_of(collection)?;
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, collection: &str, data: &CollectionData) -> Result<()> {
        let path = self.path_of(collection)?;
        let tmp = self.dir.join(format!(".{collection}.json.tmp"));
        let json = serde_json::to_string_pretty(data)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        debug!(collection, documents = data.documents.len(), "Saved collection");
        Ok(())
    }

    /// Load, change and save one collection while holding the lock.
    async fn update<T>(
        &self,
        collection: &str,
        create: bool,
        change: impl FnOnce(&mut CollectionData) -> T,
    ) -> Result<Option<T>> {
        let _guard = self.lock.lock().await;
        let data = match self.load(collection).await? {
            Some(data) => Some(data),
            None if create => Some(CollectionData::default()),
            None => None,
        };
        let Some(mut data) = data else {
            return Ok(None);
        };
        let out = change(&mut data);
        self.save(collection, &data).await?;
        Ok(Some(out))
    }

    async fn read(&self, collection: &str) -> Result<CollectionData> {
        let _guard = self.lock.lock().await;
        Ok(self.load(collection).await?.unwrap_or_default())
    }
}

impl DocumentStore for JsonStore {
    async fn collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(collection) = name.strip_suffix(".json") {
                if validate_collection_name(collection).is_ok() {
                    names.push(collection.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.read(collection).await?.documents.len())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self.read(collection).await?.find(filter))
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.read(collection).await?.find_one(filter))
    }

    #[instrument(level = "info", skip(self, documents), fields(batch = documents.len()))]
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            validate_collection_name(collection)?;
            return Ok(0);
        }
        let inserted = self
            .update(collection, true, |data| data.insert_many(documents))
            .await?;
        Ok(inserted.unwrap_or(0))
    }

    #[instrument(level = "info", skip(self, documents), fields(batch = documents.len()))]
    async fn replace_all(&self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        let inserted = self
            .update(collection, true, |data| {
                let previous = data.documents.len();
                let inserted = data.replace_all(documents);
                debug!(previous, inserted, "Replaced collection content");
                inserted
            })
            .await?;
        Ok(inserted.unwrap_or(0))
    }

    #[instrument(level = "info", skip(self, filter))]
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let deleted = self
            .update(collection, false, |data| data.delete_many(filter))
            .await?;
        Ok(deleted.unwrap_or(0))
    }

    async fn delete_one(&self, collection: &str, id: u64) -> Result<bool> {
        let deleted = self
            .update(collection, false, |data| data.delete_one(id))
            .await?;
        Ok(deleted.unwrap_or(false))
    }

    async fn ensure_unique(&self, collection: &str, field: &str) -> Result<()> {
        self.update(collection, true, |data| data.ensure_unique(field))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(title: &str, url: &str) -> Document {
        let mut d = Document::new();
        d.insert("title".to_string(), json!(title));
        d.insert("url".to_string(), json!(url));
        d
    }

    #[tokio::test]
    async fn test_json_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonStore::open(dir.path()).await.unwrap();
            let n = store
                .insert_many("wiley_x_newest", vec![doc("a", "https://a"), doc("b", "https://b")])
                .await
                .unwrap();
            assert_eq!(n, 2);
        }

        let store = JsonStore::open(dir.path()).await.unwrap();
        assert_eq!(store.collections().await.unwrap(), vec!["wiley_x_newest"]);
        assert_eq!(store.count("wiley_x_newest").await.unwrap(), 2);

        // Ids keep increasing after a reopen.
        store
            .insert_many("wiley_x_newest", vec![doc("c", "https://c")])
            .await
            .unwrap();
        let c = store
            .find_one("wiley_x_newest", &Filter::all().eq("title", "c"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c["_id"], json!(2));
    }

    #[tokio::test]
    async fn test_json_store_unique_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        store.ensure_unique("talkwalker_alerts_x", "url").await.unwrap();
        assert_eq!(store.count("talkwalker_alerts_x").await.unwrap(), 0);

        let store = JsonStore::open(dir.path()).await.unwrap();
        let n = store
            .insert_many(
                "talkwalker_alerts_x",
                vec![doc("a", "https://a"), doc("b", "https://a")],
            )
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_json_store_missing_collection_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        assert_eq!(store.count("nothing").await.unwrap(), 0);
        assert_eq!(store.delete_many("nothing", &Filter::all()).await.unwrap(), 0);
        assert!(!store.delete_one("nothing", 0).await.unwrap());
        assert!(store.collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_replace_all_in_one_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        store
            .insert_many("ieee_x_relevant", vec![doc("a", "https://a"), doc("b", "https://b")])
            .await
            .unwrap();

        let n = store
            .replace_all("ieee_x_relevant", vec![doc("c", "https://c")])
            .await
            .unwrap();
        assert_eq!(n, 1);

        let reopened = JsonStore::open(dir.path()).await.unwrap();
        let docs = reopened.find("ieee_x_relevant", &Filter::all()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], json!("c"));
        assert_eq!(docs[0]["_id"], json!(2));

        // No temporary file is left next to the collection.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_json_store_replace_all_creates_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let n = store
            .replace_all("scholar_x_relevant", vec![doc("a", "https://a")])
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.collections().await.unwrap(), vec!["scholar_x_relevant"]);
    }

    #[tokio::test]
    async fn test_json_store_delete_many_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        store
            .insert_many("ieee_x_relevant", vec![doc("a", "https://a"), doc("b", "https://b")])
            .await
            .unwrap();
        let deleted = store
            .delete_many("ieee_x_relevant", &Filter::all().eq("title", "a"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count("ieee_x_relevant").await.unwrap(), 1);
    }
}
