//! Core traits for document representation and serialization.
//!
//! Documents are plain serde types. The store never looks inside them beyond
//! converting to and from BSON, so field access during query evaluation is a map
//! lookup on the serialized form rather than runtime type introspection.

use bson::{Bson, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the discriminator property used by [`Document::type_tag`].
pub const TYPE_FIELD: &str = "type";

/// Core trait that all documents stored in a document store must implement.
///
/// Identifiers are caller-supplied strings, unique within a partition. The partition
/// key is never read from the document; every store operation takes it explicitly.
///
/// # Example
///
/// ```ignore
/// use larder::document::Document;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// pub struct Recipe {
///     pub id: String,
///     #[serde(rename = "type")]
///     pub kind: String,
///     pub title: String,
/// }
///
/// impl Document for Recipe {
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn collection_name() -> &'static str {
///         "recipes"
///     }
///
///     fn type_tag() -> Option<&'static str> {
///         Some("Recipe")
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns this document's identifier.
    fn id(&self) -> &str;

    /// Returns the name of the collection this document belongs to.
    ///
    /// Several document types may share one collection and be told apart by their
    /// [`type_tag`](Document::type_tag).
    fn collection_name() -> &'static str;

    /// Value of the `type` discriminator this document type carries, if any.
    fn type_tag() -> Option<&'static str> {
        None
    }
}

/// Extension trait providing serialization/deserialization utilities for documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to a BSON value for storage.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] when the document does not
    /// serialize to a map, or a serialization error.
    fn to_bson(&self) -> DocumentStoreResult<Bson>;

    /// Creates a document from a BSON value.
    fn from_bson(bson: Bson) -> DocumentStoreResult<Self>;

    /// Converts this document to a JSON value.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a document from a JSON value.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_bson(&self) -> DocumentStoreResult<Bson> {
        match serialize_to_bson(self)? {
            bson @ Bson::Document(_) => Ok(bson),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected a map-shaped document for {}, got {:?}",
                D::collection_name(),
                other.element_type(),
            ))),
        }
    }

    fn from_bson(bson: Bson) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
    }

    impl Document for Note {
        fn id(&self) -> &str {
            &self.id
        }

        fn collection_name() -> &'static str {
            "notes"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Bare(String);

    impl Document for Bare {
        fn id(&self) -> &str {
            &self.0
        }

        fn collection_name() -> &'static str {
            "bare"
        }
    }

    #[test]
    fn converts_through_bson_and_json() {
        let note = Note { id: "n1".into(), body: "preheat oven".into() };

        let bson = note.to_bson().unwrap();
        assert_eq!(bson.as_document().unwrap().get_str("body").unwrap(), "preheat oven");
        assert_eq!(Note::from_bson(bson).unwrap(), note);

        let json = note.to_json().unwrap();
        assert_eq!(Note::from_json(json).unwrap(), note);
    }

    #[test]
    fn rejects_documents_that_are_not_maps() {
        let err = Bare("b1".into()).to_bson().unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }
}
