//! Partitioned document persistence with a small query dialect and a bounded retry policy.
//!
//! This crate is the core of the larder project and provides:
//!
//! - **Document traits** ([`document`]) - Core traits for defining and serializing documents
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage backends
//! - **Query dialect** ([`query`]) - Parsing and binding of query text, plus the visitor seam backends evaluate
//! - **Document store** ([`store`]) - Typed containers over a backend with retries and deadlines
//! - **Retry policy** ([`retry`]) - Classification and bounded retry of transient and rate-limited failures
//! - **Configuration** ([`config`]) - Serde-loadable store and retry settings
//! - **Error handling** ([`error`]) - Error kinds, stable codes and result types
//!
//! # Example
//!
//! ```ignore
//! use larder::{Document, DocumentStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Recipe {
//!     pub id: String,
//!     pub title: String,
//! }
//!
//! impl Document for Recipe {
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//!
//!     fn collection_name() -> &'static str {
//!         "recipes"
//!     }
//! }
//! ```

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod query;
pub mod retry;
pub mod store;
