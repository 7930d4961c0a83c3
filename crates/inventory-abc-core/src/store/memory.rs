//! In-memory [`ItemStore`] and [`Retriever`] for testing and embedding.
//!
//! Items live in a `BTreeMap` behind `std::sync::RwLock`. Retrieval is
//! brute-force cosine similarity over every stored snippet of the item.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{ContextSnippet, Item};

use super::{select_top_k, FieldUpdate, ItemStore, Retriever};

struct StoredSnippet {
    product_id: String,
    title: Option<String>,
    text: String,
    vector: Vec<f32>,
}

/// In-memory store for tests and small embedded uses.
pub struct InMemoryStore {
    items: RwLock<BTreeMap<String, Item>>,
    snippets: RwLock<Vec<StoredSnippet>>,
    bulk_writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            snippets: RwLock::new(Vec::new()),
            bulk_writes: AtomicUsize::new(0),
        }
    }

    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.items.write() {
            for item in items {
                map.insert(item.product_id.clone(), item);
            }
        }
        store
    }

    pub fn insert_item(&self, item: Item) -> Result<()> {
        self.items
            .write()
            .map_err(|_| anyhow!("item lock poisoned"))?
            .insert(item.product_id.clone(), item);
        Ok(())
    }

    /// Attach an embedded snippet (e.g. a review) to an item.
    pub fn add_snippet(
        &self,
        product_id: &str,
        title: Option<&str>,
        text: &str,
        vector: Vec<f32>,
    ) -> Result<()> {
        self.snippets
            .write()
            .map_err(|_| anyhow!("snippet lock poisoned"))?
            .push(StoredSnippet {
                product_id: product_id.to_string(),
                title: title.map(str::to_string),
                text: text.to_string(),
                vector,
            });
        Ok(())
    }

    pub fn item(&self, product_id: &str) -> Option<Item> {
        self.items.read().ok()?.get(product_id).cloned()
    }

    /// How many times [`ItemStore::bulk_set_field`] has been called.
    pub fn bulk_writes(&self) -> usize {
        self.bulk_writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn list_item_ids(&self) -> Result<Vec<String>> {
        let items = self.items.read().map_err(|_| anyhow!("item lock poisoned"))?;
        Ok(items.keys().cloned().collect())
    }

    async fn load_items(&self) -> Result<Vec<Item>> {
        let items = self.items.read().map_err(|_| anyhow!("item lock poisoned"))?;
        Ok(items.values().cloned().collect())
    }

    async fn bulk_set_field(&self, updates: &[FieldUpdate]) -> Result<u64> {
        self.bulk_writes.fetch_add(1, Ordering::SeqCst);
        let mut items = self
            .items
            .write()
            .map_err(|_| anyhow!("item lock poisoned"))?;

        // Validate first so the write is all-or-nothing.
        if let Some(missing) = updates
            .iter()
            .find(|u| !items.contains_key(&u.product_id))
        {
            anyhow::bail!("unknown item: {}", missing.product_id);
        }

        for u in updates {
            if let Some(item) = items.get_mut(&u.product_id) {
                item.values.insert(u.field_key.clone(), u.value);
            }
        }
        Ok(updates.len() as u64)
    }
}

#[async_trait]
impl Retriever for InMemoryStore {
    async fn top_k(
        &self,
        query: &[f32],
        product_id: &str,
        k: usize,
        candidate_pool: usize,
    ) -> Result<Vec<ContextSnippet>> {
        let snippets = self
            .snippets
            .read()
            .map_err(|_| anyhow!("snippet lock poisoned"))?;
        let candidates = snippets
            .iter()
            .filter(|s| s.product_id == product_id)
            .map(|s| ContextSnippet {
                product_id: s.product_id.clone(),
                title: s.title.clone(),
                text: s.text.clone(),
                relevance: cosine_similarity(query, &s.vector) as f64,
            })
            .collect();
        Ok(select_top_k(candidates, k, candidate_pool))
    }
}
