//! Query evaluation for in-memory document filtering and ordering.
//!
//! Equality deliberately compares the *string representation* of both sides: the
//! stored property `2` matches the literal `'2'`, the literal `2` and an `@p` bound to
//! `"2"` alike. Null, array and sub-document properties have no string form and never
//! match. Ordering, on the other hand, is typed: numbers sort numerically and
//! everything else lexicographically.

use std::{borrow::Cow, cmp::Ordering, convert::Infallible};
use bson::{Bson, Document as BsonDocument, datetime::DateTime};

use larder_core::query::{Predicate, Query, QueryVisitor, Sort, SortDirection};

/// Looks a property up by name, ignoring ASCII case. An exact match wins.
pub(crate) fn lookup<'a>(document: &'a BsonDocument, field: &str) -> Option<&'a Bson> {
    document.get(field).or_else(|| {
        document
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(field))
            .map(|(_, value)| value)
    })
}

/// String form used by equality conditions, if the value has one.
pub(crate) fn string_repr(value: &Bson) -> Option<Cow<'_, str>> {
    match value {
        Bson::String(value) => Some(Cow::Borrowed(value)),
        Bson::Int32(value) => Some(Cow::Owned(value.to_string())),
        Bson::Int64(value) => Some(Cow::Owned(value.to_string())),
        Bson::Double(value) => Some(Cow::Owned(value.to_string())),
        Bson::Boolean(value) => Some(Cow::Owned(value.to_string())),
        Bson::Decimal128(value) => Some(Cow::Owned(value.to_string())),
        Bson::ObjectId(value) => Some(Cow::Owned(value.to_hex())),
        _ => None,
    }
}

/// Sortable view of a BSON value.
///
/// Values of different kinds order by kind: missing and null first, then booleans,
/// numbers, datetimes and finally anything with a string form.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    /// All integers and floats normalized to f64
    Number(f64),
    DateTime(DateTime),
    String(Cow<'a, str>),
}

impl<'a> Comparable<'a> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Number(_) => 2,
            Comparable::DateTime(_) => 3,
            Comparable::String(_) => 4,
        }
    }
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            other => match string_repr(other) {
                Some(text) => Comparable::String(text),
                None => Comparable::Null,
            },
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<'a> Eq for Comparable<'a> {}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a> Ord for Comparable<'a> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Decides whether a single stored document satisfies a query filter.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a BsonDocument,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a BsonDocument) -> Self {
        Self { document }
    }

    pub fn matches(document: &'a BsonDocument, query: &Query) -> bool {
        match DocumentEvaluator::new(document).visit_filter(query) {
            Ok(matched) => matched,
            Err(never) => match never {},
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = Infallible;

    fn visit_and(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error> {
        for predicate in predicates {
            if !self.visit_predicate(predicate)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_eq(&mut self, field: &str, value: &Bson) -> Result<Self::Output, Self::Error> {
        let stored = match lookup(self.document, field).and_then(string_repr) {
            Some(stored) => stored,
            None => return Ok(false),
        };

        Ok(string_repr(value).is_some_and(|expected| stored == expected))
    }

    fn visit_unbound(&mut self, _parameter: &str) -> Result<Self::Output, Self::Error> {
        Ok(false)
    }
}

/// Stable sort by a single property; documents without it sort first ascending.
pub(crate) fn sort_documents(documents: &mut [BsonDocument], sort: &Sort) {
    documents.sort_by(|a, b| {
        let left = lookup(a, &sort.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let right = lookup(b, &sort.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);

        match sort.direction {
            SortDirection::Asc => left.cmp(&right),
            SortDirection::Desc => right.cmp(&left),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use larder_core::query::QuerySpec;

    fn matches(document: &BsonDocument, spec: QuerySpec) -> bool {
        DocumentEvaluator::matches(document, &spec.compile().unwrap())
    }

    #[test]
    fn field_names_ignore_case() {
        let ingredient = doc! { "recipeId": "r1", "type": "RecipeIngredient" };

        assert!(matches(&ingredient, QuerySpec::new("SELECT * FROM c WHERE c.RECIPEID = 'r1'")));
        assert!(matches(&ingredient, QuerySpec::new("SELECT * FROM c WHERE c.recipeid = 'r1'")));
    }

    #[test]
    fn equality_compares_string_forms() {
        let ingredient = doc! { "position": 2, "optional": false };

        assert!(matches(&ingredient, QuerySpec::new("SELECT * FROM c WHERE c.position = 2")));
        assert!(matches(&ingredient, QuerySpec::new("SELECT * FROM c WHERE c.position = '2'")));
        assert!(matches(
            &ingredient,
            QuerySpec::new("SELECT * FROM c WHERE c.optional = @o").with_param("@o", "false"),
        ));
        assert!(!matches(&ingredient, QuerySpec::new("SELECT * FROM c WHERE c.position = 3")));
    }

    #[test]
    fn missing_fields_and_parameters_match_nothing() {
        let recipe = doc! { "type": "Recipe", "tags": ["dessert"], "notes": null };

        assert!(!matches(&recipe, QuerySpec::new("SELECT * FROM c WHERE c.title = 'Cookies'")));
        assert!(!matches(&recipe, QuerySpec::new("SELECT * FROM c WHERE c.type = @t")));
        assert!(!matches(&recipe, QuerySpec::new("SELECT * FROM c WHERE c.tags = 'dessert'")));
        assert!(!matches(&recipe, QuerySpec::new("SELECT * FROM c WHERE c.notes = 'null'")));
    }

    #[test]
    fn conditions_are_conjunctive() {
        let ingredient = doc! { "type": "RecipeIngredient", "recipeId": "r1" };
        let both = QuerySpec::new("SELECT * FROM c WHERE c.type = @t AND c.recipeId = @r")
            .with_param("@t", "RecipeIngredient");

        assert!(matches(&ingredient, both.clone().with_param("@r", "r1")));
        assert!(!matches(&ingredient, both.with_param("@r", "r2")));
        assert!(matches(&ingredient, QuerySpec::new("SELECT * FROM c")));
    }

    #[test]
    fn sorts_numbers_numerically() {
        let mut documents = vec![doc! { "position": 10 }, doc! { "position": 9.5 }, doc! { "position": 2_i64 }];
        let sort = Sort { field: "position".into(), direction: SortDirection::Asc };

        sort_documents(&mut documents, &sort);

        let positions: Vec<_> = documents
            .iter()
            .map(|d| string_repr(d.get("position").unwrap()).unwrap().into_owned())
            .collect();
        assert_eq!(positions, ["2", "9.5", "10"]);
    }

    #[test]
    fn sorts_strings_lexicographically_and_missing_first() {
        let mut documents = vec![doc! { "title": "b" }, doc! { "title": "a10" }, doc! {}, doc! { "title": "a2" }];
        let sort = Sort { field: "TITLE".into(), direction: SortDirection::Desc };

        sort_documents(&mut documents, &sort);

        let titles: Vec<_> = documents.iter().map(|d| d.get_str("title").unwrap_or("-")).collect();
        assert_eq!(titles, ["b", "a2", "a10", "-"]);
    }
}
