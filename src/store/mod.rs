//! Document store: named collections of schema-less JSON records.
//!
//! Backends implement [`DocumentStore`]. Both keep each collection as a
//! [`CollectionData`] value and share its query and insert logic, so the file
//! backend and the in-memory test backend behave identically.
//!
//! Filters are conjunctions of field equalities, which is all the collectors,
//! the credibility filter and the dashboard ever ask for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::Document;

pub mod json;
#[cfg(test)]
pub mod memory;

pub use json::JsonStore;
#[cfg(test)]
pub use memory::MemoryStore;

/// Key of the identifier assigned to every stored document.
pub const ID_FIELD: &str = "_id";

pub trait DocumentStore {
    /// Names of the existing collections, sorted.
    async fn collections(&self) -> Result<Vec<String>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>>;

    /// Insert documents, skipping those that violate a unique field.
    /// Returns how many were inserted.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize>;

    /// Swap the whole content of a collection for `documents` in one write,
    /// keeping its unique fields and id sequence. Returns how many were inserted.
    async fn replace_all(&self, collection: &str, documents: Vec<Document>) -> Result<usize>;

    /// Delete every matching document. Returns how many were deleted.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<usize>;

    async fn delete_one(&self, collection: &str, id: u64) -> Result<bool>;

    /// Declare `field` unique within the collection, creating it if needed.
    async fn ensure_unique(&self, collection: &str, field: &str) -> Result<()>;
}

/// Conjunction of `field == value` conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }
}

/// Stored state of one collection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CollectionData {
    /// Fields whose values must be unique across documents.
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl CollectionData {
    pub fn find(&self, filter: &Filter) -> Vec<Document> {
        self.documents
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect()
    }

    pub fn find_one(&self, filter: &Filter) -> Option<Document> {
        self.documents.iter().find(|doc| filter.matches(doc)).cloned()
    }

    /// Unordered insert: documents clashing on a unique field with a stored
    /// document (or an earlier one of the same batch) are skipped.
    pub fn insert_many(&mut self, documents: Vec<Document>) -> usize {
        let mut inserted = 0;
        for mut doc in documents {
            if self.violates_unique(&doc) {
                continue;
            }
            doc.insert(ID_FIELD.to_string(), Value::from(self.next_id));
            self.next_id += 1;
            self.documents.push(doc);
            inserted += 1;
        }
        inserted
    }

    pub fn replace_all(&mut self, documents: Vec<Document>) -> usize {
        self.documents.clear();
        self.insert_many(documents)
    }

    pub fn delete_many(&mut self, filter: &Filter) -> usize {
        let before = self.documents.len();
        self.documents.retain(|doc| !filter.matches(doc));
        before - self.documents.len()
    }

    pub fn delete_one(&mut self, id: u64) -> bool {
        let position = self
            .documents
            .iter()
            .position(|doc| doc.get(ID_FIELD).and_then(Value::as_u64) == Some(id));
        match position {
            Some(index) => {
                self.documents.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn ensure_unique(&mut self, field: &str) {
        if !self.unique.iter().any(|f| f == field) {
            self.unique.push(field.to_string());
        }
    }

    fn violates_unique(&self, doc: &Document) -> bool {
        self.unique.iter().any(|field| match doc.get(field) {
            None | Some(Value::Null) => false,
            Some(value) => self
                .documents
                .iter()
                .any(|existing| existing.get(field) == Some(value)),
        })
    }
}

/// Collection names double as file names, so only `[A-Za-z0-9_.-]` is allowed.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidCollection(name.to_string()))
    }
}

/// The numeric identifier of a stored document.
pub fn document_id(document: &Document) -> Option<u64> {
    document.get(ID_FIELD).and_then(Value::as_u64)
}
