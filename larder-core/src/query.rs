//! Query text parsing and the visitor seam shared by backends.
//!
//! Queries arrive as text in a small SQL dialect together with a set of named
//! parameters:
//!
//! ```text
//! SELECT * FROM c [WHERE c.field = value (AND c.field = value)*] [ORDER BY c.field [ASC|DESC]]
//! value := @param | 'string' | integer
//! ```
//!
//! Keywords are case-insensitive. Anything outside this grammar (OR, NOT,
//! parentheses, other operators or clauses, nested property paths) is rejected with
//! [`DocumentStoreError::QuerySyntax`] naming the construct; there is no partial parsing.
//!
//! ```ignore
//! use larder::query::QuerySpec;
//!
//! let spec = QuerySpec::new("SELECT * FROM c WHERE c.recipeId = @r ORDER BY c.position")
//!     .with_param("@r", "r1");
//! let query = spec.compile()?;
//! ```

#![allow(clippy::redundant_closure_call)]

use bson::Bson;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9).
    #[default]
    Asc,
    /// Descending order (Z to A, 9 to 0).
    Desc,
}

/// Single-column sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The property name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Right-hand side of an equality condition as written in the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `@name`, resolved from the query parameters. Stored with its leading `@`.
    Parameter(String),
    /// `'text'`
    String(String),
    /// `42`
    Integer(i64),
}

/// `c.field = value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub operand: Operand,
}

/// Parsed but unbound query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// The collection alias named in `FROM`.
    pub alias: String,
    /// Conditions joined by AND.
    pub conditions: Vec<Condition>,
    pub order_by: Option<Sort>,
}

/// A bound filter term.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The property equals the value.
    Eq { field: String, value: Bson },
    /// Refers to a parameter that was not supplied; matches nothing.
    Unbound { parameter: String },
}

/// A parsed query with its parameters resolved, ready for a backend to execute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    /// Conjunction of predicates. Empty means every document matches.
    pub filter: Vec<Predicate>,
    /// Sort specification for results.
    pub sort: Option<Sort>,
}

impl Query {
    /// Parses `text` and binds it against `parameters`.
    pub fn compile(text: &str, parameters: &[(String, Bson)]) -> DocumentStoreResult<Query> {
        Ok(Statement::parse(text)?.bind(parameters))
    }

    /// True when the filter can never match, because a parameter is missing.
    pub fn is_unsatisfiable(&self) -> bool {
        self.filter
            .iter()
            .any(|predicate| matches!(predicate, Predicate::Unbound { .. }))
    }
}

/// Query text together with its named parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    text: String,
    parameters: Vec<(String, Bson)>,
}

impl QuerySpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// Adds (or replaces) a named parameter. The leading `@` is optional.
    pub fn with_param(mut self, name: impl AsRef<str>, value: impl Into<Bson>) -> Self {
        let name = normalize_parameter(name.as_ref());
        let value = value.into();

        match self.parameters.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((name, value)),
        }
        self
    }

    /// Adds every parameter yielded by `params`.
    pub fn with_params<K, V>(self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Bson>,
    {
        params
            .into_iter()
            .fold(self, |spec, (name, value)| spec.with_param(name, value))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[(String, Bson)] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Bson> {
        let name = normalize_parameter(name);
        self.parameters
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value)
    }

    /// Parses the text and binds the parameters.
    pub fn compile(&self) -> DocumentStoreResult<Query> {
        Query::compile(&self.text, &self.parameters)
    }
}

impl From<&str> for QuerySpec {
    fn from(text: &str) -> Self {
        QuerySpec::new(text)
    }
}

impl From<String> for QuerySpec {
    fn from(text: String) -> Self {
        QuerySpec::new(text)
    }
}

fn normalize_parameter(name: &str) -> String {
    if name.starts_with('@') {
        name.to_string()
    } else {
        format!("@{name}")
    }
}

impl Statement {
    /// Parses query text.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::QuerySyntax`] for anything outside the supported grammar.
    pub fn parse(text: &str) -> DocumentStoreResult<Statement> {
        dialect::statement(text)
            .map_err(|error| syntax(format!("malformed query: {error}")))?
            .into_statement()
    }

    /// Resolves parameters. Missing parameters become [`Predicate::Unbound`].
    pub fn bind(&self, parameters: &[(String, Bson)]) -> Query {
        let filter = self
            .conditions
            .iter()
            .map(|condition| match &condition.operand {
                Operand::Parameter(name) => match parameters
                    .iter()
                    .find(|(candidate, _)| normalize_parameter(candidate) == *name)
                {
                    Some((_, value)) => Predicate::Eq {
                        field: condition.field.clone(),
                        value: value.clone(),
                    },
                    None => Predicate::Unbound { parameter: name.clone() },
                },
                Operand::String(text) => Predicate::Eq {
                    field: condition.field.clone(),
                    value: Bson::String(text.clone()),
                },
                Operand::Integer(number) => Predicate::Eq {
                    field: condition.field.clone(),
                    value: Bson::Int64(*number),
                },
            })
            .collect();

        Query {
            filter,
            sort: self.order_by.clone(),
        }
    }
}

/// `alias.field` as written, before the alias is checked against `FROM`.
pub(crate) struct Path<'a> {
    alias: &'a str,
    field: &'a str,
}

impl Path<'_> {
    fn field_under(&self, alias: &str) -> DocumentStoreResult<String> {
        if self.alias.eq_ignore_ascii_case(alias) {
            Ok(self.field.to_string())
        } else {
            Err(syntax(format!("unknown alias '{}'; expected '{alias}'", self.alias)))
        }
    }
}

/// Clauses matched by the grammar. Unsupported constructs are matched too and carried
/// as messages, so the error names the construct instead of a position.
pub(crate) struct Clauses<'a> {
    projection: Result<(), String>,
    alias: &'a str,
    conditions: Option<Result<Vec<(Path<'a>, Operand)>, String>>,
    order_by: Option<Result<(Path<'a>, SortDirection), String>>,
    trailing: Option<String>,
}

impl Clauses<'_> {
    fn into_statement(self) -> DocumentStoreResult<Statement> {
        self.projection.map_err(syntax)?;
        let conditions = self.conditions.transpose().map_err(syntax)?.unwrap_or_default();
        let order_by = self.order_by.transpose().map_err(syntax)?;
        if let Some(message) = self.trailing {
            return Err(syntax(message));
        }

        let alias = self.alias;
        let conditions = conditions
            .into_iter()
            .map(|(path, operand)| {
                Ok(Condition {
                    field: path.field_under(alias)?,
                    operand,
                })
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;
        let order_by = order_by
            .map(|(path, direction)| {
                Ok::<_, DocumentStoreError>(Sort {
                    field: path.field_under(alias)?,
                    direction,
                })
            })
            .transpose()?;

        Ok(Statement {
            alias: alias.to_string(),
            conditions,
            order_by,
        })
    }
}

peg::parser! {
    grammar dialect() for str {
        rule _()
            = quiet!{[' ' | '\n' | '\t' | '\r']*}

        rule num()
            = quiet!{['0'..='9']}
            / expected!("a number")

        rule word() -> &'input str
            = quiet!{$(['a'..='z' | 'A'..='Z' | '_'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']*)}
            / expected!("an identifier")

        // Keywords match whole words in any case.
        rule kw(keyword: &'static str)
            = w:word() {? if w.eq_ignore_ascii_case(keyword) { Ok(()) } else { Err(keyword) } }

        rule clause() -> &'input str
            = w:word() {? if is_clause(w) { Ok(w) } else { Err("a clause") } }

        rule alias() -> &'input str
            = w:word() {? if is_reserved(w) { Err("a collection alias") } else { Ok(w) } }

        rule projection() -> Result<(), String>
            = "*" { Ok(()) }
            / p:$((!(_ kw("FROM")) [_])+) {
                Err(format!("projection '{}' is not supported; only SELECT * is", p.trim()))
            }

        rule property() -> Result<Path<'input>, String>
            = word() "." f:word() ("." word())+ {
                Err(format!("nested property path under '{f}' is not supported"))
            }
            / word() "[" [^ ']']* "]" { Err("bracket property access is not supported".into()) }
            / alias:word() "." field:word() { Ok(Path { alias, field }) }

        // e.g. 'Grandma''s Pie'
        rule string() -> Result<String, String>
            = "'" s:$(([^ '\''] / "''")*) "'" { Ok(s.replace("''", "'")) }
            / "'" [_]* ![_] { Err("unterminated string literal".into()) }

        rule operand() -> Result<Operand, String>
            = "@" name:word() { Ok(Operand::Parameter(format!("@{name}"))) }
            / "@" { Err("parameter name expected after '@'".into()) }
            / s:string() { s.map(Operand::String) }
            / r:$("-"? num()+ "." num()*) {
                Err(format!("non-integer numeric literal {r} is not supported"))
            }
            / i:$("-"? num()+) {
                i.parse().map(Operand::Integer).map_err(|_| format!("invalid integer literal {i}"))
            }
            / property() { Err("comparing two properties is not supported".into()) }
            / w:word() {
                if ["true", "false", "null"].iter().any(|literal| w.eq_ignore_ascii_case(literal)) {
                    Err(format!("{w} literals are not supported"))
                } else {
                    Err(format!("expected a value, found '{w}'"))
                }
            }

        rule operator() -> String
            = o:$("<>" / "<=" / ">=" / "!=" / "<" / ">") { format!("'{o}'") }
            / w:word() { w.to_ascii_uppercase() }

        rule condition() -> Result<(Path<'input>, Operand), String>
            = kw("NOT") { Err("NOT is not supported".into()) }
            / "(" { Err("parenthesized conditions are not supported".into()) }
            / p:property() _ "=" _ v:operand() { p.and_then(|p| v.map(|v| (p, v))) }
            / p:property() _ o:operator() {
                p.and_then(|_| Err(format!("operator {o} is not supported; only '=' is")))
            }
            / t:$([^ ' ' | '\n' | '\t' | '\r']+) { Err(format!("expected a condition, found '{t}'")) }

        rule where_clause() -> Result<Vec<(Path<'input>, Operand)>, String>
            = kw("WHERE") _ conditions:(condition() ++ (_ kw("AND") _)) or:(_ kw("OR") [_]*)? {
                match or {
                    Some(()) => Err("OR is not supported; conditions may only be joined with AND".into()),
                    None => conditions.into_iter().collect(),
                }
            }

        rule direction() -> SortDirection
            = kw("ASC") { SortDirection::Asc }
            / kw("DESC") { SortDirection::Desc }

        rule order_clause() -> Result<(Path<'input>, SortDirection), String>
            = kw("ORDER") _ kw("BY") _ p:property() d:(_ d:direction() { d })? more:(_ "," [_]*)? {
                match more {
                    Some(()) => Err("ORDER BY on more than one property is not supported".into()),
                    None => p.map(|p| (p, d.unwrap_or_default())),
                }
            }

        rule trailing() -> Option<String>
            = _ ![_] { None }
            / _ c:clause() [_]* { Some(format!("{} clause is not supported here", c.to_ascii_uppercase())) }
            / _ rest:$([_]+) { Some(format!("unexpected '{}'", rest.trim_end())) }

        pub rule statement() -> Clauses<'input>
            = _ kw("SELECT") _ projection:projection() _ kw("FROM") _ alias:alias()
              _ conditions:where_clause()? _ order_by:order_clause()? trailing:trailing()
            {
                Clauses { projection, alias, conditions, order_by, trailing }
            }
    }
}

fn syntax(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::QuerySyntax(message.into())
}

const CLAUSES: [&str; 8] = ["WHERE", "ORDER", "GROUP", "OFFSET", "LIMIT", "JOIN", "HAVING", "TOP"];

fn is_clause(word: &str) -> bool {
    CLAUSES.iter().any(|clause| word.eq_ignore_ascii_case(clause))
}

fn is_reserved(word: &str) -> bool {
    is_clause(word)
        || ["SELECT", "FROM", "AND", "OR", "NOT", "BY", "ASC", "DESC", "VALUE"]
            .iter()
            .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

/// Walks a bound [`Query`] filter.
///
/// Implemented by the in-memory evaluator and by translators that turn a filter into
/// a backend-native query.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error>;
    fn visit_eq(&mut self, field: &str, value: &Bson) -> Result<Self::Output, Self::Error>;
    fn visit_unbound(&mut self, parameter: &str) -> Result<Self::Output, Self::Error>;

    fn visit_predicate(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error> {
        match predicate {
            Predicate::Eq { field, value } => self.visit_eq(field, value),
            Predicate::Unbound { parameter } => self.visit_unbound(parameter),
        }
    }

    fn visit_filter(&mut self, query: &Query) -> Result<Self::Output, Self::Error> {
        self.visit_and(&query.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn syntax_message(text: &str) -> String {
        match Statement::parse(text) {
            Err(DocumentStoreError::QuerySyntax(message)) => message,
            other => panic!("expected a syntax error for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_select_all() {
        let statement = Statement::parse("SELECT * FROM c").unwrap();

        assert_eq!(statement.alias, "c");
        assert!(statement.conditions.is_empty());
        assert!(statement.order_by.is_none());
    }

    #[test]
    fn parses_conditions_and_order() {
        let statement = Statement::parse(
            "select * from c where c.recipeId = @r and c.type = 'RecipeIngredient' AND c.position = 2 order by c.position desc",
        )
        .unwrap();

        assert_eq!(
            statement.conditions,
            vec![
                Condition { field: "recipeId".into(), operand: Operand::Parameter("@r".into()) },
                Condition { field: "type".into(), operand: Operand::String("RecipeIngredient".into()) },
                Condition { field: "position".into(), operand: Operand::Integer(2) },
            ]
        );
        assert_eq!(
            statement.order_by,
            Some(Sort { field: "position".into(), direction: SortDirection::Desc })
        );
    }

    #[test]
    fn keywords_match_in_any_case() {
        let statement = Statement::parse("Select * From c Where c.title = 'Pie' Order By c.title Desc").unwrap();

        assert_eq!(statement.conditions.len(), 1);
        assert_eq!(statement.order_by.unwrap().direction, SortDirection::Desc);
    }

    #[test]
    fn unrecognized_statements_name_the_expected_keyword() {
        let message = syntax_message("DELETE FROM c");

        assert!(message.starts_with("malformed query"), "{message}");
        assert!(message.contains("SELECT"), "{message}");
    }

    #[test]
    fn order_defaults_to_ascending() {
        let statement = Statement::parse("SELECT * FROM c ORDER BY c.title").unwrap();

        assert_eq!(statement.order_by.unwrap().direction, SortDirection::Asc);
    }

    #[test]
    fn string_literals_unescape_doubled_quotes() {
        let statement = Statement::parse("SELECT * FROM c WHERE c.title = 'Grandma''s Pie'").unwrap();

        assert_eq!(statement.conditions[0].operand, Operand::String("Grandma's Pie".into()));
    }

    #[test]
    fn negative_integers_are_literals() {
        let statement = Statement::parse("SELECT * FROM c WHERE c.offset = -3").unwrap();

        assert_eq!(statement.conditions[0].operand, Operand::Integer(-3));
    }

    #[test]
    fn rejects_or() {
        assert!(syntax_message("SELECT * FROM c WHERE c.a = 1 OR c.b = 2").contains("OR"));
    }

    #[test]
    fn rejects_not() {
        assert!(syntax_message("SELECT * FROM c WHERE NOT c.a = 1").contains("NOT"));
    }

    #[test]
    fn rejects_parentheses() {
        assert!(syntax_message("SELECT * FROM c WHERE (c.a = 1)").contains("parenthesized"));
    }

    #[test]
    fn rejects_other_operators() {
        assert!(syntax_message("SELECT * FROM c WHERE c.a > 1").contains("'>'"));
        assert!(syntax_message("SELECT * FROM c WHERE c.a != 1").contains("'!='"));
        assert!(syntax_message("SELECT * FROM c WHERE c.a LIKE 'x%'").contains("LIKE"));
    }

    #[test]
    fn rejects_unsupported_clauses_and_projections() {
        assert!(syntax_message("SELECT * FROM c GROUP BY c.type").contains("GROUP"));
        assert!(syntax_message("SELECT * FROM c OFFSET 1 LIMIT 2").contains("OFFSET"));
        assert!(syntax_message("SELECT VALUE c.id FROM c").contains("projection"));
        assert!(syntax_message("SELECT c.id FROM c").contains("projection"));
    }

    #[test]
    fn rejects_nested_paths_and_foreign_aliases() {
        assert!(syntax_message("SELECT * FROM c WHERE c.a.b = 1").contains("nested"));
        assert!(syntax_message("SELECT * FROM c WHERE d.a = 1").contains("alias"));
    }

    #[test]
    fn rejects_multi_column_order() {
        assert!(syntax_message("SELECT * FROM c ORDER BY c.a, c.b").contains("more than one"));
    }

    #[test]
    fn rejects_malformed_literals() {
        assert!(syntax_message("SELECT * FROM c WHERE c.a = 'open").contains("unterminated"));
        assert!(syntax_message("SELECT * FROM c WHERE c.a = 1.5").contains("non-integer"));
        assert!(syntax_message("SELECT * FROM c WHERE c.a = true").contains("true"));
        assert!(syntax_message("SELECT * FROM c WHERE c.a = @").contains("parameter name"));
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(syntax_message("SELECT * FROM c WHERE c.a = 1 c.b").contains("unexpected"));
    }

    #[test]
    fn syntax_errors_classify_as_query_syntax() {
        let err = Query::compile("DELETE FROM c", &[]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::QuerySyntax);
    }

    #[test]
    fn binds_parameters_with_or_without_prefix() {
        let query = QuerySpec::new("SELECT * FROM c WHERE c.type = @t AND c.recipeId = @r")
            .with_param("t", "Recipe")
            .with_param("@r", "r1")
            .compile()
            .unwrap();

        assert_eq!(
            query.filter,
            vec![
                Predicate::Eq { field: "type".into(), value: Bson::String("Recipe".into()) },
                Predicate::Eq { field: "recipeId".into(), value: Bson::String("r1".into()) },
            ]
        );
        assert!(!query.is_unsatisfiable());
    }

    #[test]
    fn missing_parameters_bind_as_unbound() {
        let query = QuerySpec::new("SELECT * FROM c WHERE c.type = @t").compile().unwrap();

        assert_eq!(query.filter, vec![Predicate::Unbound { parameter: "@t".into() }]);
        assert!(query.is_unsatisfiable());
    }

    #[test]
    fn later_parameters_replace_earlier_ones() {
        let spec = QuerySpec::new("SELECT * FROM c")
            .with_params([("@t", "Recipe"), ("t", "RecipeIngredient")]);

        assert_eq!(spec.parameters().len(), 1);
        assert_eq!(spec.parameter("t"), Some(&Bson::String("RecipeIngredient".into())));
    }
}
