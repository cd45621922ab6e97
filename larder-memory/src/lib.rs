//! In-memory document storage backend for larder.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It is the reference backend: it interprets the same query dialect a real backend
//! executes, so code written against one runs unmodified against the other. It is
//! used for local development, tests, and whenever no database is configured.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Partitioned keys** - Documents are addressed by `(partition_key, id)` per collection
//! - **Query emulation** - Equality filters joined by AND plus a single ORDER BY column
//!
//! # Quick Start
//!
//! ```ignore
//! use larder::{DocumentStore, memory::InMemoryStore};
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let recipes = store.container::<Recipe>();
//!
//! recipes.create(recipe, "recipe").await?;
//! ```

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
