//! Query construction, parsing and filtering API.
//!
//! Queries reach the store in one of two shapes:
//!
//! - the mapping form used by document-modeling layers, e.g.
//!   `doc! { "name": "one", "values": { "$in": ["two", "three"] } }`, which is parsed
//!   once at the boundary by [`Expr::from_document`];
//! - the typed form, built with [`Filter`] and [`Query::builder`].
//!
//! Both end up as the same [`Expr`] tree, so evaluators never inspect raw mapping
//! shapes. Supported operators:
//!
//! - Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - Set membership: `$in`, `$nin`
//! - Existence: `$exists`
//! - Logical: `$and`, `$or`, `$nor`, `$not`
//!
//! Anything else fails with [`DocumentStoreError::UnsupportedOperator`].
//!
//! ```ignore
//! use docmock::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("name", "one").and(Filter::in_list("values", vec!["two"])))
//!     .limit(10)
//!     .sort("value", SortDirection::Desc)
//!     .build();
//! ```

use bson::{Bson, Document as BsonDocument, Uuid};

use crate::{
    document::{ID_FIELD, id_to_bson},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone)]
pub struct Sort {
    /// The field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Deep equality.
    Eq,
    /// Negated deep equality. Also matches documents where the field is missing.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// The field value, or any element of an array field value, equals one of the
    /// listed values.
    In,
    /// Negation of [`FieldOp::In`].
    Nin,
}

impl FieldOp {
    /// Maps a `$`-prefixed operator name onto a field operator.
    pub fn from_operator(name: &str) -> Option<Self> {
        match name {
            "$eq" => Some(FieldOp::Eq),
            "$ne" => Some(FieldOp::Ne),
            "$gt" => Some(FieldOp::Gt),
            "$gte" => Some(FieldOp::Gte),
            "$lt" => Some(FieldOp::Lt),
            "$lte" => Some(FieldOp::Lte),
            "$in" => Some(FieldOp::In),
            "$nin" => Some(FieldOp::Nin),
            _ => None,
        }
    }

    /// Returns `true` for operators whose operand must be an array.
    pub fn takes_list(&self) -> bool {
        matches!(self, FieldOp::In | FieldOp::Nin)
    }
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates. An empty `And` matches every document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field path to compare. Dots descend into embedded documents.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// An expression that matches every document.
    pub fn all() -> Self {
        Expr::And(Vec::new())
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses a mapping-shaped query specification.
    ///
    /// Each top-level entry is either a logical operator (`$and`, `$or`, `$nor`) or a
    /// field path mapped to a literal (equality) or an operator mapping. Entries are
    /// combined by implicit conjunction.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::UnsupportedOperator`] for unknown `$` operators
    /// - [`DocumentStoreError::InvalidQuery`] for malformed operands
    pub fn from_document(spec: &BsonDocument) -> DocumentStoreResult<Expr> {
        let mut exprs = spec
            .iter()
            .map(|(key, value)| parse_entry(key, value))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }
}

fn parse_entry(key: &str, value: &Bson) -> DocumentStoreResult<Expr> {
    match key {
        "$and" => Ok(Expr::And(parse_clauses(key, value)?)),
        "$or" => Ok(Expr::Or(parse_clauses(key, value)?)),
        "$nor" => Ok(Expr::Or(parse_clauses(key, value)?).not()),
        op if op.starts_with('$') => Err(DocumentStoreError::UnsupportedOperator(op.to_string())),
        field => parse_criterion(field, value),
    }
}

fn parse_clauses(op: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
    let clauses = value
        .as_array()
        .ok_or_else(|| DocumentStoreError::InvalidQuery(format!("{op} expects an array of queries")))?;

    clauses
        .iter()
        .map(|clause| match clause {
            Bson::Document(spec) => Expr::from_document(spec),
            _ => Err(DocumentStoreError::InvalidQuery(format!("{op} expects an array of queries"))),
        })
        .collect()
}

/// Returns `true` when `spec` is an operator mapping such as `{ "$in": [...] }`.
///
/// A mapping mixing operators with plain keys is rejected, since it is neither a
/// valid literal nor a valid operator set.
pub(crate) fn is_operator_mapping(spec: &BsonDocument) -> DocumentStoreResult<bool> {
    let operators = spec.keys().filter(|key| key.starts_with('$')).count();

    match operators {
        0 => Ok(false),
        n if n == spec.len() => Ok(true),
        _ => Err(DocumentStoreError::InvalidQuery(
            "cannot mix operators and plain fields in one criterion".to_string(),
        )),
    }
}

fn parse_criterion(field: &str, value: &Bson) -> DocumentStoreResult<Expr> {
    match value {
        Bson::Document(spec) if is_operator_mapping(spec)? => parse_operators(field, spec),
        literal => Ok(Expr::field(field.to_string(), FieldOp::Eq, literal.clone())),
    }
}

/// Parses an operator mapping applied to `field`, e.g. `{ "$gte": 1, "$lt": 5 }`.
pub(crate) fn parse_operators(field: &str, spec: &BsonDocument) -> DocumentStoreResult<Expr> {
    let mut exprs = Vec::with_capacity(spec.len());

    for (name, operand) in spec {
        let expr = match name.as_str() {
            "$exists" => match operand {
                Bson::Boolean(flag) => Expr::Exists(field.to_string(), *flag),
                Bson::Int32(n) => Expr::Exists(field.to_string(), *n != 0),
                Bson::Int64(n) => Expr::Exists(field.to_string(), *n != 0),
                _ => return Err(DocumentStoreError::InvalidQuery("$exists expects a boolean".to_string())),
            },
            "$not" => match operand {
                Bson::Document(inner) if is_operator_mapping(inner)? => parse_operators(field, inner)?.not(),
                _ => return Err(DocumentStoreError::InvalidQuery("$not expects an operator mapping".to_string())),
            },
            other => {
                let op = FieldOp::from_operator(other)
                    .ok_or_else(|| DocumentStoreError::UnsupportedOperator(other.to_string()))?;

                if op.takes_list() && operand.as_array().is_none() {
                    return Err(DocumentStoreError::InvalidQuery(format!("{other} expects an array")));
                }

                Expr::field(field.to_string(), op, operand.clone())
            }
        };

        exprs.push(expr);
    }

    Ok(match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    })
}

/// A structured query for retrieving and filtering documents.
///
/// Results come back in collection insertion order unless a sort is given.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match documents. `None` matches everything.
    pub filter: Option<Expr>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub offset: Option<usize>,
    /// Sort specification for results.
    pub sort: Option<Sort>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Creates a query matching the document with the given identity.
    pub fn by_id(id: Uuid) -> Self {
        Query::builder().filter(Filter::id(id)).build()
    }

    /// Parses a mapping-shaped query specification into a query without options.
    pub fn from_document(spec: &BsonDocument) -> DocumentStoreResult<Self> {
        Ok(Query::builder().filter(Expr::from_document(spec)?).build())
    }
}

/// Conversion into a [`Query`] for every shape the collection API accepts.
pub trait IntoQuery {
    /// Converts `self` into a query, validating mapping-shaped specifications.
    fn into_query(self) -> DocumentStoreResult<Query>;
}

impl IntoQuery for Query {
    fn into_query(self) -> DocumentStoreResult<Query> {
        Ok(self)
    }
}

impl IntoQuery for Expr {
    fn into_query(self) -> DocumentStoreResult<Query> {
        Ok(Query::builder().filter(self).build())
    }
}

impl IntoQuery for BsonDocument {
    fn into_query(self) -> DocumentStoreResult<Query> {
        Query::from_document(&self)
    }
}

impl IntoQuery for &BsonDocument {
    fn into_query(self) -> DocumentStoreResult<Query> {
        Query::from_document(self)
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field, or an element of the array field, is one of `values`.
    pub fn in_list<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::In,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where neither the field nor any of its elements is one of `values`.
    pub fn not_in_list<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::Nin,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field is present (a `null` value counts as present).
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Matches the document with the given identity.
    pub fn id(id: Uuid) -> Expr {
        Expr::field(ID_FIELD.to_string(), FieldOp::Eq, id_to_bson(id))
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression for this query.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the sort specification for the query results.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
