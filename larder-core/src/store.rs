//! Main document store interface.
//!
//! [`DocumentStore`] owns a backend and a [`RetryPolicy`]; typed access goes through
//! [`Container`] handles obtained with [`DocumentStore::container`]. Every container
//! operation is a single logical request run through the retry policy under an
//! optional deadline.
//!
//! # Example
//!
//! ```ignore
//! use larder::prelude::*;
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let recipes = store.container::<Recipe>();
//!
//! recipes.create(recipe, "recipe").await?;
//! let found = recipes.get("r1", "recipe").await?;
//! ```

use std::{marker::PhantomData, time::Duration};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    config::RetryConfig,
    document::{Document, DocumentExt, TYPE_FIELD},
    error::{DocumentStoreError, DocumentStoreResult},
    query::QuerySpec,
    retry::RetryPolicy,
};

/// A document store bound to a specific backend implementation.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    retry: RetryPolicy,
}

/// A document store whose backend was chosen at runtime.
pub type DynDocumentStore = DocumentStore<Box<dyn crate::backend::DynStoreBackend>>;

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the default retry configuration.
    pub fn new(backend: B) -> Self {
        Self::with_retry(backend, RetryConfig::default())
    }

    pub fn with_retry(backend: B, retry: RetryConfig) -> Self {
        Self {
            backend,
            retry: RetryPolicy::new(retry),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Gets a typed handle on the collection `D` lives in.
    pub fn container<D: Document>(&self) -> Container<'_, B, D> {
        Container::new(self)
    }

    /// Checks that the backend is reachable. Not retried.
    pub async fn ping(&self) -> DocumentStoreResult<()> {
        match self.retry.default_deadline() {
            Some(deadline) => timeout_at(deadline, self.backend.ping())
                .await
                .map_err(|_| DocumentStoreError::Timeout {
                    operation: "ping".to_string(),
                    attempts: 1,
                })?,
            None => self.backend.ping().await,
        }
    }

    /// Shuts down the store and releases backend resources.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

impl<B: StoreBackend + 'static> DocumentStore<B> {
    /// Erases the backend type so stores built from different backends share one type.
    pub fn into_dyn(self) -> DynDocumentStore {
        DocumentStore {
            backend: Box::new(self.backend),
            retry: self.retry,
        }
    }
}

impl DynDocumentStore {
    /// Returns the concrete backend if it is a `T`.
    pub fn backend_as<T: StoreBackend + 'static>(&self) -> Option<&T> {
        crate::backend::DynStoreBackend::as_any(&*self.backend).downcast_ref::<T>()
    }
}

#[derive(Debug, Clone, Copy)]
enum Deadline {
    Default,
    After(Duration),
    At(Instant),
}

/// Typed access to the collection holding documents of type `D`.
#[derive(Debug)]
pub struct Container<'a, B: StoreBackend, D: Document> {
    store: &'a DocumentStore<B>,
    deadline: Deadline,
    _marker: PhantomData<fn() -> D>,
}

impl<'a, B: StoreBackend, D: Document> Clone for Container<'a, B, D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            deadline: self.deadline,
            _marker: PhantomData,
        }
    }
}

impl<'a, B: StoreBackend, D: Document> Container<'a, B, D> {
    fn new(store: &'a DocumentStore<B>) -> Self {
        Self {
            store,
            deadline: Deadline::Default,
            _marker: PhantomData,
        }
    }

    /// Returns the name of the underlying collection.
    pub fn name(&self) -> &'static str {
        D::collection_name()
    }

    /// Bounds each subsequent operation, retries included, to `timeout` from its start.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Deadline::After(timeout);
        self
    }

    /// Bounds every subsequent operation by a fixed instant.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Deadline::At(deadline);
        self
    }

    fn deadline(&self) -> Option<Instant> {
        match self.deadline {
            Deadline::Default => self.store.retry.default_deadline(),
            Deadline::After(timeout) => Some(Instant::now() + timeout),
            Deadline::At(instant) => Some(instant),
        }
    }

    /// Inserts a new document under `partition_key`.
    ///
    /// # Errors
    ///
    /// Fails with `Conflict` when a document with the same id already exists in the partition.
    pub async fn create(&self, item: D, partition_key: &str) -> DocumentStoreResult<D> {
        let collection = self.name();
        let id = item.id();
        let document = item.to_bson()?;
        debug!(collection, partition_key, id, "creating document");

        let stored = self
            .store
            .retry
            .execute("create", self.deadline(), || {
                self.store
                    .backend
                    .insert_document(collection, partition_key, id, document.clone())
            })
            .await?;

        D::from_bson(stored)
    }

    /// Fetches a document. Absence is `Ok(None)`, never an error.
    pub async fn get(&self, id: &str, partition_key: &str) -> DocumentStoreResult<Option<D>> {
        let collection = self.name();
        debug!(collection, partition_key, id, "reading document");

        self.store
            .retry
            .execute("get", self.deadline(), || {
                self.store
                    .backend
                    .get_document(collection, partition_key, id)
            })
            .await?
            .map(D::from_bson)
            .transpose()
    }

    /// Runs a query over every partition of the collection.
    ///
    /// The text is parsed before any attempt is made, so syntax errors are never retried.
    pub async fn query(&self, spec: impl Into<QuerySpec>) -> DocumentStoreResult<Vec<D>> {
        let collection = self.name();
        let spec = spec.into();
        let query = spec.compile()?;
        debug!(collection, query = spec.text(), "querying documents");

        self.store
            .retry
            .execute("query", self.deadline(), || {
                self.store
                    .backend
                    .query_documents(collection, &query)
            })
            .await?
            .into_iter()
            .map(D::from_bson)
            .collect()
    }

    /// Returns every document of this type, filtered by its type tag when it has one.
    pub async fn all(&self) -> DocumentStoreResult<Vec<D>> {
        match D::type_tag() {
            Some(tag) => {
                self.query(
                    QuerySpec::new(format!("SELECT * FROM c WHERE c.{TYPE_FIELD} = @type"))
                        .with_param("@type", tag),
                )
                .await
            }
            None => self.query("SELECT * FROM c").await,
        }
    }

    /// Replaces the document at `(id, partition_key)` with `item`.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` when nothing is stored there, and with `InvalidDocument`
    /// when `item` carries a different id.
    pub async fn update(&self, item: D, id: &str, partition_key: &str) -> DocumentStoreResult<D> {
        let collection = self.name();
        if item.id() != id {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "document id {} does not match target id {id}; ids are immutable",
                item.id()
            )));
        }
        let document = item.to_bson()?;
        debug!(collection, partition_key, id, "replacing document");

        let stored = self
            .store
            .retry
            .execute("update", self.deadline(), || {
                self.store
                    .backend
                    .replace_document(collection, partition_key, id, document.clone())
            })
            .await?;

        D::from_bson(stored)
    }

    /// Removes a document; deleting an absent document succeeds.
    pub async fn delete(&self, id: &str, partition_key: &str) -> DocumentStoreResult<()> {
        let collection = self.name();
        debug!(collection, partition_key, id, "deleting document");

        self.store
            .retry
            .execute("delete", self.deadline(), || {
                self.store
                    .backend
                    .delete_document(collection, partition_key, id)
            })
            .await
    }
}
