//! MongoDB backend implementation for larder.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. It
//! works against self-hosted MongoDB as well as Azure Cosmos DB's MongoDB API, whose
//! throttling responses (code 16500) are reported as rate-limited so the store's
//! retry policy can honour the suggested wait.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! larder = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB or Cosmos DB
//! - **Server-side queries** - The query dialect is translated to a MongoDB filter and sort
//! - **Error classification** - Driver failures map onto conflict, transient and rate-limited kinds
//!
//! # Example
//!
//! ```ignore
//! use larder::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! let store = MongoDbStore::builder("mongodb://localhost:27017", "recipes")
//!     .build()
//!     .await?;
//! ```

mod query;
mod sanitizer;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
