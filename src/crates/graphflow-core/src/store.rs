//! Key-value store capability handed through to run contexts
//!
//! The store is host-provided shared state that outlives any single run. The
//! orchestrator never reads it; it passes the handle through the run context
//! so executors and host code resolve it from the same capability surface.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Async key-value storage
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value by key
    async fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Delete a value by key; returns whether the key existed
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Thread-safe in-memory store for tests and single-process deployments
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in the store
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.write().await.remove(key).is_some())
    }
}
