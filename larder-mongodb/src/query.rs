//! Query translation from a bound larder [`Query`] to MongoDB query syntax.
//!
//! Equality in the query dialect compares string forms, so `c.position = '2'` must
//! also match a stored integer `2`. The translator approximates this by matching any
//! of the typed values whose string form equals the operand, which keeps the filter
//! index-friendly. Field names are matched exactly (MongoDB is case-sensitive).

use bson::{Bson, Document, doc};

use larder_core::{
    error::DocumentStoreError,
    query::{Predicate, Query, QueryVisitor, Sort, SortDirection},
};

use crate::sanitizer::KeySanitizer;

/// Translates bound query filters into MongoDB filter documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub fn filter(query: &Query) -> Result<Document, DocumentStoreError> {
        MongoQueryTranslator.visit_filter(query)
    }

    /// Sort document for `find`. Ties, and queries without ORDER BY, fall back to `_id`,
    /// which orders by partition key, then id.
    pub fn sort(sort: Option<&Sort>) -> Document {
        match sort {
            Some(sort) => {
                let field = KeySanitizer::sanitize_key(&sort.field).into_owned();
                doc! {
                    field: match sort.direction {
                        SortDirection::Asc => 1,
                        SortDirection::Desc => -1,
                    },
                    "_id": 1,
                }
            }
            None => doc! { "_id": 1 },
        }
    }
}

/// Typed values whose string form equals that of `value`.
pub(crate) fn equivalents(value: &Bson) -> Vec<Bson> {
    let text = match value {
        Bson::String(text) => text.clone(),
        Bson::Int32(number) => number.to_string(),
        Bson::Int64(number) => number.to_string(),
        Bson::Double(number) => number.to_string(),
        Bson::Boolean(flag) => flag.to_string(),
        other => return vec![other.clone()],
    };

    let mut values = vec![Bson::String(text.clone())];
    let integer = text
        .parse::<i64>()
        .ok()
        .filter(|number| number.to_string() == text);

    if let Some(number) = integer {
        match i32::try_from(number) {
            Ok(small) => values.push(Bson::Int32(small)),
            Err(_) => values.push(Bson::Int64(number)),
        }
        values.push(Bson::Int64(number));
        values.push(Bson::Double(number as f64));
    } else if let Ok(number) = text.parse::<f64>() {
        if number.is_finite() && number.to_string() == text {
            values.push(Bson::Double(number));
        }
    } else if let Ok(flag) = text.parse::<bool>() {
        values.push(Bson::Boolean(flag));
    }
    values.dedup();
    values
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error> {
        let mut clauses = predicates
            .iter()
            .map(|predicate| self.visit_predicate(predicate))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match clauses.len() {
            0 => doc! {},
            1 => clauses.remove(0),
            _ => doc! { "$and": clauses },
        })
    }

    fn visit_eq(&mut self, field: &str, value: &Bson) -> Result<Self::Output, Self::Error> {
        let field = KeySanitizer::sanitize_key(field).into_owned();

        Ok(doc! { field: { "$in": equivalents(value) } })
    }

    fn visit_unbound(&mut self, _parameter: &str) -> Result<Self::Output, Self::Error> {
        // every stored document has an _id
        Ok(doc! { "_id": { "$exists": false } })
    }
}
