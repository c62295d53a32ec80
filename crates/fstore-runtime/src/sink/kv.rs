//! Key-value target
//!
//! Keeps the latest feature record per entity key for point lookups.
//! Keys are `[<namespace>:]<feature_set>:<entity_key>`, values are the
//! JSON-encoded [`FeatureRecord`] with every feature tagged by its type.

use super::{Sink, SinkContext, SinkKind};
use crate::error::{Result, RuntimeError};
use chrono::{DateTime, Utc};
use fstore_core::{FeatureRecord, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage behind a [`KeyValueSink`]
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Upsert every entry; later entries for the same key win
    async fn set_many(&self, entries: Vec<(String, String)>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Process-local store, for tests and single-process pipelines
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_many(&self, entries: Vec<(String, String)>) -> Result<()> {
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert(key, value);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }
}

/// Redis-backed store
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis")]
impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            RuntimeError::InvalidConfig(format!("invalid redis url '{}': {}", url, e))
        })?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| RuntimeError::sink_write("redis", format!("connect failed: {}", e)))?;

        tracing::info!("Connected to Redis: {}", url);
        Ok(Self { conn })
    }
}

#[cfg(feature = "redis")]
#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn set_many(&self, entries: Vec<(String, String)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.set(key, value).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| RuntimeError::sink_write("redis", format!("SET failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| RuntimeError::sink_write("redis", format!("GET failed: {}", e)))
    }
}

/// Stored form of a feature value, e.g. `{"type":"string","value":"M"}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
enum StoredValue {
    Null,
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl From<&Value> for StoredValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => StoredValue::Null,
            Value::Bool(b) => StoredValue::Bool(*b),
            // JSON has no NaN or infinity
            Value::Number(n) if !n.is_finite() => StoredValue::Null,
            Value::Number(n) => StoredValue::Number(*n),
            Value::Timestamp(ts) => StoredValue::Timestamp(*ts),
            Value::String(s) => StoredValue::String(s.clone()),
        }
    }
}

impl From<StoredValue> for Value {
    fn from(value: StoredValue) -> Self {
        match value {
            StoredValue::Null => Value::Null,
            StoredValue::Bool(b) => Value::Bool(b),
            StoredValue::Number(n) => Value::Number(n),
            StoredValue::Timestamp(ts) => Value::Timestamp(ts),
            StoredValue::String(s) => Value::String(s),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    entity_key: String,
    timestamp: DateTime<Utc>,
    features: IndexMap<String, StoredValue>,
}

impl From<&FeatureRecord> for StoredRecord {
    fn from(record: &FeatureRecord) -> Self {
        Self {
            entity_key: record.entity_key.clone(),
            timestamp: record.timestamp,
            features: record
                .features
                .iter()
                .map(|(name, value)| (name.clone(), StoredValue::from(value)))
                .collect(),
        }
    }
}

impl From<StoredRecord> for FeatureRecord {
    fn from(stored: StoredRecord) -> Self {
        Self {
            entity_key: stored.entity_key,
            timestamp: stored.timestamp,
            features: stored
                .features
                .into_iter()
                .map(|(name, value)| (name, Value::from(value)))
                .collect(),
        }
    }
}

/// Key-value sink with last-write-wins per entity key
#[derive(Clone)]
pub struct KeyValueSink {
    name: String,
    store: Arc<dyn KeyValueStore>,
    namespace: Option<String>,
}

impl std::fmt::Debug for KeyValueSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueSink")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl KeyValueSink {
    pub fn new(name: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            name: name.into(),
            store,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn store_key(&self, feature_set: &str, entity_key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}:{}", ns, feature_set, entity_key),
            None => format!("{}:{}", feature_set, entity_key),
        }
    }

    /// Latest feature record stored for an entity key
    pub async fn get_latest_feature_vector(
        &self,
        feature_set: &str,
        entity_key: &str,
    ) -> Result<Option<FeatureRecord>> {
        let key = self.store_key(feature_set, entity_key);
        let Some(raw) = self.store.get(&key).await? else {
            debug!(key = %key, "feature vector not found");
            return Ok(None);
        };
        serde_json::from_str::<StoredRecord>(&raw)
            .map(|stored| Some(stored.into()))
            .map_err(|e| {
                RuntimeError::InvalidValue(format!(
                    "stored value for '{}' is not a feature record: {}",
                    key, e
                ))
            })
    }
}

#[async_trait::async_trait]
impl Sink for KeyValueSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::KeyValue
    }

    /// Upserts one entry per distinct entity key and returns how many keys
    /// were written
    async fn write(&self, ctx: &SinkContext, records: &[FeatureRecord]) -> Result<usize> {
        let mut latest: IndexMap<&str, &FeatureRecord> = IndexMap::new();
        for record in records {
            latest.insert(record.entity_key.as_str(), record);
        }

        let mut entries = Vec::with_capacity(latest.len());
        for (key, record) in latest {
            let value = serde_json::to_string(&StoredRecord::from(record))
                .map_err(|e| RuntimeError::sink_write(&self.name, format!("encode failed: {}", e)))?;
            entries.push((self.store_key(&ctx.feature_set, key), value));
        }

        let keys = entries.len();
        self.store
            .set_many(entries)
            .await
            .map_err(|e| match e {
                RuntimeError::SinkWrite { message, .. } => RuntimeError::sink_write(&self.name, message),
                other => RuntimeError::sink_write(&self.name, other.to_string()),
            })?;

        debug!(sink = %self.name, feature_set = %ctx.feature_set, keys, "key-value entries upserted");
        Ok(keys)
    }
}
