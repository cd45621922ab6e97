//! Convenient re-exports of commonly used types from larder.
//!
//! ```ignore
//! use larder::prelude::*;
//! ```

pub use larder_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    config::{MongoDbConfig, RetryConfig, StoreConfig},
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult, ErrorKind, ErrorReport},
    query::{Query, QuerySpec, Sort, SortDirection},
    store::{Container, DocumentStore, DynDocumentStore},
};
