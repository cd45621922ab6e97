use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind as MongoErrorKind, RETRYABLE_WRITE_ERROR, WriteFailure},
    options::ClientOptions,
};
use std::time::Duration;
use tracing::{debug, info};

use larder_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    config::MongoDbConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    query::Query,
};

use crate::{query::MongoQueryTranslator, sanitizer::KeySanitizer};

/// Server code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;
/// Cosmos DB's MongoDB API reports throttling as this code.
const REQUEST_RATE_TOO_LARGE: i32 = 16500;
/// Server codes the driver itself treats as retryable.
const TRANSIENT_CODES: [i32; 13] = [
    6, 7, 89, 91, 189, 262, 9001, 10107, 11600, 11602, 13435, 13436, 50,
];

/// MongoDB (or Cosmos DB MongoDB API) backend.
///
/// Each document is stored with a composite `_id` of `{ pk, id }`, so uniqueness is
/// enforced per partition by the primary index and an unordered query sorts by
/// partition key, then id.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    fn document_key(partition_key: &str, id: &str) -> Document {
        doc! { "pk": partition_key, "id": id }
    }

    fn prepare_document(&self, partition_key: &str, id: &str, document: Bson) -> DocumentStoreResult<Document> {
        let document = match document {
            Bson::Document(document) => document,
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "expected a map-shaped document, got {:?}",
                    other.element_type(),
                )));
            }
        };

        Ok(Document::from_iter(
            std::iter::once(("_id".to_string(), Bson::Document(Self::document_key(partition_key, id))))
                .chain(
                    KeySanitizer::sanitize_document(document)
                        .into_iter()
                        .filter(|(key, _)| key != "_id"),
                ),
        ))
    }

    fn restore_document(document: Document) -> Bson {
        Bson::Document(KeySanitizer::restore_document(
            document
                .into_iter()
                .filter(|(key, _)| key != "_id")
                .collect(),
        ))
    }
}

/// Maps a driver failure onto the store's error taxonomy.
pub(crate) fn classify(err: MongoError) -> DocumentStoreError {
    let message = err.to_string();

    if let Some(classified) = server_code(&err).and_then(|code| classify_code(code, &message)) {
        return classified;
    }
    if err.contains_label(RETRYABLE_WRITE_ERROR) {
        return DocumentStoreError::Transient(message);
    }

    match err.kind.as_ref() {
        MongoErrorKind::Io(_)
        | MongoErrorKind::ServerSelection { .. }
        | MongoErrorKind::ConnectionPoolCleared { .. } => DocumentStoreError::Transient(message),
        _ => DocumentStoreError::Backend(message),
    }
}

/// Classifies a server error code; `None` leaves the decision to the error kind.
pub(crate) fn classify_code(code: i32, message: &str) -> Option<DocumentStoreError> {
    if code == REQUEST_RATE_TOO_LARGE {
        return Some(DocumentStoreError::RateLimited {
            message: message.to_string(),
            retry_after: retry_after_hint(message),
        });
    }
    if TRANSIENT_CODES.contains(&code) {
        return Some(DocumentStoreError::Transient(message.to_string()));
    }
    None
}

/// Extracts the `RetryAfterMs=<n>` hint Cosmos DB embeds in throttling messages.
pub(crate) fn retry_after_hint(message: &str) -> Option<Duration> {
    let (_, rest) = message.split_once("RetryAfterMs=")?;
    let digits = rest
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();

    digits.parse().ok().map(Duration::from_millis)
}

fn server_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        MongoErrorKind::Command(command) => Some(command.code),
        MongoErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        MongoErrorKind::Write(WriteFailure::WriteConcernError(concern)) => Some(concern.code),
        _ => None,
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson> {
        let prepared = self.prepare_document(partition_key, id, document)?;

        self.get_collection(collection)
            .insert_one(&prepared)
            .await
            .map_err(|err| match server_code(&err) {
                Some(DUPLICATE_KEY) => DocumentStoreError::conflict(id, partition_key, collection),
                _ => classify(err),
            })?;

        Ok(Self::restore_document(prepared))
    }

    async fn get_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> DocumentStoreResult<Option<Bson>> {
        Ok(
            self.get_collection(collection)
                .find_one(doc! { "_id": Self::document_key(partition_key, id) })
                .await
                .map_err(classify)?
                .map(Self::restore_document)
        )
    }

    async fn query_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Bson>> {
        if query.is_unsatisfiable() {
            debug!(collection, "skipping mongodb query with a missing parameter");
            return Ok(vec![]);
        }

        let filter = MongoQueryTranslator::filter(query)?;
        debug!(collection, filter = %filter, "running mongodb query");

        Ok(
            self.get_collection(collection)
                .find(filter)
                .sort(MongoQueryTranslator::sort(query.sort.as_ref()))
                .await
                .map_err(classify)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(classify)?
                .into_iter()
                .map(Self::restore_document)
                .collect()
        )
    }

    async fn replace_document(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
        document: Bson,
    ) -> DocumentStoreResult<Bson> {
        let prepared = self.prepare_document(partition_key, id, document)?;

        let result = self
            .get_collection(collection)
            .replace_one(doc! { "_id": Self::document_key(partition_key, id) }, &prepared)
            .await
            .map_err(classify)?;

        if result.matched_count == 0 {
            return Err(DocumentStoreError::not_found(id, partition_key, collection));
        }

        Ok(Self::restore_document(prepared))
    }

    async fn delete_document(&self, collection: &str, partition_key: &str, id: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .delete_one(doc! { "_id": Self::document_key(partition_key, id) })
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }

    pub fn from_config(config: &MongoDbConfig) -> Self {
        Self::new(&config.dsn, &config.database)
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        )
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        info!(database = %self.database, "mongodb client configured");

        Ok(MongoDbStore::new(client, self.database))
    }
}
