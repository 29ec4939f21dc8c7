//! The read-only context-store collaborator seam.
//!
//! The context manager and the frustration analyzer read prior customer
//! data through [`ContextStore`]; the core never writes to it. The
//! in-memory implementation backs serve mode and tests; a deployment
//! swaps in an adapter over its real stores.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use handoff_types::Result;

/// A raw record returned by the store, before relevance scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-assigned id.
    pub id: String,
    /// Record body.
    pub text: String,
    /// Free-form metadata (e.g. `frustration_score`, `vip`, `language`).
    pub metadata: HashMap<String, String>,
    /// Record timestamp.
    pub timestamp: DateTime<Utc>,
}

impl StoredRecord {
    /// Create a record stamped now, with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a metadata key.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Read-only context collaborator.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// The customer's most recent interactions, newest first.
    async fn recent_interactions(&self, user_id: &str, limit: usize)
    -> Result<Vec<StoredRecord>>;

    /// The customer's profile record, if one exists.
    async fn user_profile(&self, user_id: &str) -> Result<Option<StoredRecord>>;

    /// Resolved cases similar to the query.
    async fn similar_cases(&self, query_text: &str, limit: usize) -> Result<Vec<StoredRecord>>;

    /// Knowledge-base articles matching the query.
    async fn knowledge_base_match(
        &self,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecord>>;
}

// ── In-memory implementation ─────────────────────────────────────────────

/// In-memory context store used by serve mode and tests.
///
/// Similar-case and knowledge-base lookups use naive token overlap;
/// real deployments put retrieval behind the trait instead.
#[derive(Default)]
pub struct InMemoryContextStore {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    interactions: HashMap<String, Vec<StoredRecord>>,
    profiles: HashMap<String, StoredRecord>,
    cases: Vec<StoredRecord>,
    articles: Vec<StoredRecord>,
}

impl InMemoryContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interaction for a customer, newest kept first.
    pub fn add_interaction(&self, user_id: &str, record: StoredRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .interactions
            .entry(user_id.to_string())
            .or_default()
            .insert(0, record);
    }

    /// Set a customer's profile record.
    pub fn set_profile(&self, user_id: &str, record: StoredRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.profiles.insert(user_id.to_string(), record);
    }

    /// Add a resolved case available for similarity lookup.
    pub fn add_case(&self, record: StoredRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.cases.push(record);
    }

    /// Add a knowledge-base article.
    pub fn add_article(&self, record: StoredRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.articles.push(record);
    }

    fn overlap_top(pool: &[StoredRecord], query: &str, limit: usize) -> Vec<StoredRecord> {
        let query_tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let mut scored: Vec<(usize, &StoredRecord)> = pool
            .iter()
            .map(|r| {
                let text = r.text.to_lowercase();
                let hits = query_tokens.iter().filter(|t| text.contains(*t)).count();
                (hits, r)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn recent_interactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .interactions
            .get(user_id)
            .map(|v| v.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn user_profile(&self, user_id: &str) -> Result<Option<StoredRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.profiles.get(user_id).cloned())
    }

    async fn similar_cases(&self, query_text: &str, limit: usize) -> Result<Vec<StoredRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Self::overlap_top(&inner.cases, query_text, limit))
    }

    async fn knowledge_base_match(
        &self,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Self::overlap_top(&inner.articles, query_text, limit))
    }
}
