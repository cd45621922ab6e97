//! In-memory storage implementation for document stores.
//!
//! Documents live in a map per collection keyed by `(partition_key, id)`, behind an
//! async-aware read-write lock. Every call takes the lock for its own duration only.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use mea::rwlock::RwLock;
use tracing::{debug, trace};

use larder_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::Query,
};

use crate::evaluator::{DocumentEvaluator, sort_documents};

/// `(partition_key, id)`; the ordering doubles as the default query order.
type DocumentKey = (String, String);
type CollectionMap = BTreeMap<DocumentKey, BsonDocument>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// Emulates the query dialect of a real backend: equality conditions joined by AND
/// and a single ORDER BY column, evaluated in memory. Without ORDER BY, results come
/// back ordered by partition key, then id.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data. Documents handed out are copies.
///
/// # Example
///
/// ```ignore
/// use larder_memory::InMemoryStore;
/// use larder::backend::StoreBackend;
/// use bson::{Bson, doc};
///
/// let store = InMemoryStore::new();
/// let recipe = Bson::Document(doc! { "id": "r1", "type": "Recipe" });
///
/// store.insert_document("recipes", "recipe", "r1", recipe).await?;
/// assert!(store.get_document("recipes", "recipe", "r1").await?.is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> ((partition_key, id) -> document)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of documents held in `collection`, across partitions.
    pub async fn len(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }
}

fn key(partition_key: &str, id: &str) -> DocumentKey {
    (partition_key.to_string(), id.to_string())
}

fn into_map(collection: &str, document: Bson) -> DocumentStoreResult<BsonDocument> {
    match document {
        Bson::Document(document) => Ok(document),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected a map-shaped document for {collection}, got {:?}",
            other.element_type(),
        ))),
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson> {
        let document = into_map(collection, document)?;
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        let key = key(partition_key, id);
        if collection_map.contains_key(&key) {
            debug!(collection, partition_key, id, "rejected duplicate insert");
            return Err(DocumentStoreError::conflict(id, partition_key, collection));
        }

        collection_map.insert(key, document.clone());
        trace!(collection, partition_key, id, "document inserted");

        Ok(Bson::Document(document))
    }

    async fn get_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> DocumentStoreResult<Option<Bson>> {
        Ok(
            self.store
                .read()
                .await
                .get(collection)
                .and_then(|collection_map| collection_map.get(&key(partition_key, id)))
                .cloned()
                .map(Bson::Document)
        )
    }

    async fn query_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Bson>> {
        if query.is_unsatisfiable() {
            trace!(collection, "query references a missing parameter");
            return Ok(vec![]);
        }

        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(collection_map) => collection_map,
            None => return Ok(vec![]),
        };

        let mut documents = collection_map
            .values()
            .filter(|document| DocumentEvaluator::matches(document, query))
            .cloned()
            .collect::<Vec<_>>();
        drop(store);

        if let Some(sort) = &query.sort {
            sort_documents(&mut documents, sort);
        }
        trace!(collection, matched = documents.len(), "query evaluated");

        Ok(documents.into_iter().map(Bson::Document).collect())
    }

    async fn replace_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson> {
        let document = into_map(collection, document)?;
        let mut store = self.store.write().await;

        match store
            .get_mut(collection)
            .and_then(|collection_map| collection_map.get_mut(&key(partition_key, id)))
        {
            Some(stored) => {
                *stored = document.clone();
                Ok(Bson::Document(document))
            }
            None => Err(DocumentStoreError::not_found(id, partition_key, collection)),
        }
    }

    async fn delete_document(&self, collection: &str, partition_key: &str, id: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if let Some(collection_map) = store.get_mut(collection) {
            if collection_map.remove(&key(partition_key, id)).is_none() {
                trace!(collection, partition_key, id, "delete of absent document");
            }
        }

        Ok(())
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
