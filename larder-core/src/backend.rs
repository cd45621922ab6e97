//! Storage backend abstraction for the document store.
//!
//! A [`StoreBackend`] performs single, unretried attempts against some storage; the
//! [`DocumentStore`](crate::store::DocumentStore) wraps each call in the retry policy.
//! Backends report failures using the kinds in [`crate::error`]: a `Conflict` from
//! an insert on an existing key, `NotFound` from a replace of an absent key,
//! `Transient`/`RateLimited` for faults worth retrying, anything else for the rest.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: A trait for dynamic dispatch over backend implementations
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances

use async_trait::async_trait;
use bson::Bson;
use std::{any::Any, fmt::Debug};

use crate::{error::DocumentStoreResult, query::Query};

/// Abstract interface for document storage backends.
///
/// Documents are addressed by `(collection, partition_key, id)` and handed over as
/// BSON maps. Implementations must be thread-safe; concurrent calls on different
/// keys must not interfere, and of two concurrent inserts of the same key at most
/// one may succeed.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a new document.
    ///
    /// Returns the stored document, or `Conflict` if `(partition_key, id)` is taken.
    async fn insert_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson>;

    /// Fetches a document, returning `Ok(None)` when it does not exist.
    async fn get_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> DocumentStoreResult<Option<Bson>>;

    /// Returns every document in the collection, across partitions, matching `query`.
    ///
    /// Results follow `query.sort` when present; otherwise the order is backend
    /// defined but stable for an unchanged collection.
    async fn query_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Bson>>;

    /// Replaces an existing document wholesale, or fails with `NotFound`.
    async fn replace_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson>;

    /// Removes a document. Removing an absent document is not an error.
    async fn delete_document(&self, collection: &str, partition_key: &str, id: &str) -> DocumentStoreResult<()>;

    /// Cheapest round trip the backend offers, for health probes.
    async fn ping(&self) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Object-safe counterpart of [`StoreBackend`], implemented for every backend.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn insert_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson>;
    async fn get_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> DocumentStoreResult<Option<Bson>>;
    async fn query_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Bson>>;
    async fn replace_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson>;
    async fn delete_document(&self, collection: &str, partition_key: &str, id: &str) -> DocumentStoreResult<()>;
    async fn ping(&self) -> DocumentStoreResult<()>;
    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    async fn insert_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson> {
        StoreBackend::insert_document(self, collection, partition_key, id, document).await
    }

    async fn get_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> DocumentStoreResult<Option<Bson>> {
        StoreBackend::get_document(self, collection, partition_key, id).await
    }

    async fn query_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Bson>> {
        StoreBackend::query_documents(self, collection, query).await
    }

    async fn replace_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson> {
        StoreBackend::replace_document(self, collection, partition_key, id, document).await
    }

    async fn delete_document(&self, collection: &str, partition_key: &str, id: &str) -> DocumentStoreResult<()> {
        StoreBackend::delete_document(self, collection, partition_key, id).await
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        StoreBackend::ping(self).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Lets a boxed, type-erased backend sit wherever a [`StoreBackend`] is expected.
#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn insert_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson> {
        DynStoreBackend::insert_document(&**self, collection, partition_key, id, document)
            .await
    }

    async fn get_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> DocumentStoreResult<Option<Bson>> {
        DynStoreBackend::get_document(&**self, collection, partition_key, id)
            .await
    }

    async fn query_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Bson>> {
        DynStoreBackend::query_documents(&**self, collection, query).await
    }

    async fn replace_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson> {
        DynStoreBackend::replace_document(&**self, collection, partition_key, id, document)
            .await
    }

    async fn delete_document(&self, collection: &str, partition_key: &str, id: &str) -> DocumentStoreResult<()> {
        DynStoreBackend::delete_document(&**self, collection, partition_key, id)
            .await
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        DynStoreBackend::ping(&**self).await
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        DynStoreBackend::shutdown_boxed(self).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
