//! Field name escaping for MongoDB compatibility.
//!
//! MongoDB reserves dots (nested paths) and leading dollar signs (operators) in
//! field names, and rejects null bytes. Keys containing them are escaped on the way
//! in and restored on the way out; values are stored untouched so that equality
//! filters see exactly what the caller wrote.

use std::borrow::Cow;
use bson::{Bson, Document};

/// Escapes and restores document keys that MongoDB would misinterpret.
pub(crate) struct KeySanitizer;

impl KeySanitizer {
    /// Character replacements for sanitization
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Escapes a single field name.
    pub(crate) fn sanitize_key(input: &str) -> Cow<'_, str> {
        if !Self::REPLACEMENTS.iter().any(|(target, _)| input.contains(target)) {
            return Cow::Borrowed(input);
        }

        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(target, replacement);
        }
        Cow::Owned(sanitized)
    }

    /// Reverts [`KeySanitizer::sanitize_key`].
    pub(crate) fn restore_key(input: &str) -> Cow<'_, str> {
        if !Self::REPLACEMENTS.iter().any(|(_, replacement)| input.contains(replacement)) {
            return Cow::Borrowed(input);
        }

        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(replacement, target);
        }
        Cow::Owned(restored)
    }

    /// Recursively escapes every key in `document`, including those of nested maps.
    pub(crate) fn sanitize_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(key, value)| (Self::sanitize_key(&key).into_owned(), Self::map_value(value, Self::sanitize_document)))
            .collect()
    }

    /// Recursively restores every key in `document`.
    pub(crate) fn restore_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(key, value)| (Self::restore_key(&key).into_owned(), Self::map_value(value, Self::restore_document)))
            .collect()
    }

    fn map_value(value: Bson, map: fn(Document) -> Document) -> Bson {
        match value {
            Bson::Document(document) => Bson::Document(map(document)),
            Bson::Array(items) => Bson::Array(
                items
                    .into_iter()
                    .map(|item| Self::map_value(item, map))
                    .collect(),
            ),
            other => other,
        }
    }
}
