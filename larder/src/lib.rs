//! Main larder crate providing partitioned document persistence.
//!
//! This crate is the primary entry point. It re-exports the core types from the
//! sub-crates, exposes the storage backends, and offers [`connect`], the factory a
//! composition root calls once to obtain the store it hands to the rest of the
//! application.
//!
//! # Features
//!
//! - **Typed containers** - Create, get, query, update and delete serde documents by `(id, partition key)`
//! - **Query dialect** - `SELECT * FROM c WHERE c.field = @p AND ... ORDER BY c.field DESC`
//! - **Bounded retries** - Exponential backoff with jitter for transient faults, honoured waits when rate limited
//! - **Interchangeable backends** - An in-memory emulator and MongoDB behind one interface
//!
//! # Quick Start
//!
//! ```ignore
//! use larder::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! pub struct RecipeIngredient {
//!     pub id: String,
//!     pub recipe_id: String,
//!     pub position: i32,
//!     pub text: String,
//! }
//!
//! impl Document for RecipeIngredient {
//!     fn id(&self) -> &str { &self.id }
//!     fn collection_name() -> &'static str { "recipes" }
//!     fn type_tag() -> Option<&'static str> { Some("RecipeIngredient") }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::new());
//!     let ingredients = store.container::<RecipeIngredient>();
//!
//!     ingredients.create(ingredient, "r1").await?;
//!
//!     let ordered = ingredients
//!         .query(
//!             QuerySpec::new("SELECT * FROM c WHERE c.recipeId = @r ORDER BY c.position")
//!                 .with_param("@r", "r1"),
//!         )
//!         .await?;
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Choosing a backend at runtime
//!
//! ```ignore
//! let config: StoreConfig = load_settings()?;
//! let store: DynDocumentStore = larder::connect(config).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory emulator for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use larder_core::{backend, config, document, error, query, retry, store};
pub use larder_core::{
    config::StoreConfig,
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    store::{DocumentStore, DynDocumentStore},
};

// Re-export BSON types for convenience
pub use bson;

use tracing::info;

/// In-memory storage backend implementations.
pub mod memory {
    pub use larder_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use larder_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}

/// Builds the store for `config`.
///
/// A MongoDB section selects the MongoDB backend; without one the in-memory store is
/// used. The decision is made once, here, and the returned store is meant to be
/// passed explicitly to whatever needs it.
///
/// # Errors
///
/// Returns `Initialization` when MongoDB is configured but this crate was built
/// without the `mongodb` feature, or when the client cannot be configured.
pub async fn connect(config: StoreConfig) -> DocumentStoreResult<DynDocumentStore> {
    let StoreConfig { retry, mongodb: database } = config;

    match database {
        Some(database) => connect_mongodb(database, retry).await,
        None => {
            info!(backend = "memory", "no database configured, using the in-memory store");
            Ok(DocumentStore::with_retry(memory::InMemoryStore::new(), retry).into_dyn())
        }
    }
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(
    config: config::MongoDbConfig,
    retry: config::RetryConfig,
) -> DocumentStoreResult<DynDocumentStore> {
    use backend::StoreBackendBuilder;

    let backend = mongodb::MongoDbStoreBuilder::from_config(&config)
        .build()
        .await?;
    info!(backend = "mongodb", database = %config.database, "document store connected");

    Ok(DocumentStore::with_retry(backend, retry).into_dyn())
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(
    config: config::MongoDbConfig,
    _retry: config::RetryConfig,
) -> DocumentStoreResult<DynDocumentStore> {
    Err(DocumentStoreError::Initialization(format!(
        "database {} is configured but larder was built without the `mongodb` feature",
        config.database
    )))
}
