//! # Executor
//!
//! The boundary between query building and the database driver.
//!
//! Statements travel as a [`CompiledQuery`]: SQL text using `:name`
//! placeholders plus the values bound to those names. Drivers that only
//! understand positional parameters rewrite the text with
//! [`CompiledQuery::to_positional`].

use crate::error::{Error, Result};
use crate::value::{DbValue, Row};
use async_trait::async_trait;
use std::fmt;

/// Named parameters bound to a statement, in bind order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, DbValue)>,
}

impl Params {
    /// Create an empty parameter map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value, replacing an existing binding with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<DbValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up a binding by name (without the leading `:`)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Whether a name is bound
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over `(name, value)` pairs in bind order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<DbValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Positional placeholder flavor of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` (SQLite, MySQL)
    Question,
    /// `$1`, `$2`, ... (PostgreSQL)
    Numbered,
}

/// Rendered SQL plus its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text with `:name` placeholders
    pub sql: String,
    /// Values bound to the placeholders
    pub params: Params,
}

impl CompiledQuery {
    /// Create a compiled query
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A statement without parameters
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Params::new())
    }

    /// Rewrite named placeholders into positional ones
    ///
    /// Returns the rewritten SQL and the values in positional order. A name
    /// used twice is bound twice.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the SQL uses a placeholder with no binding.
    pub fn to_positional(&self, style: PlaceholderStyle) -> Result<(String, Vec<&DbValue>)> {
        let mut sql = String::with_capacity(self.sql.len());
        let mut values = Vec::new();

        for piece in scan(&self.sql) {
            match piece {
                Piece::Text(text) => sql.push_str(text),
                Piece::Placeholder(name) => {
                    let value = self.params.get(name).ok_or_else(|| Error::Database {
                        message: format!("No value bound for placeholder :{name} in `{}`", self.sql),
                    })?;
                    values.push(value);
                    match style {
                        PlaceholderStyle::Question => sql.push('?'),
                        PlaceholderStyle::Numbered => {
                            sql.push('$');
                            sql.push_str(&values.len().to_string());
                        }
                    }
                }
            }
        }

        Ok((sql, values))
    }

    /// Inline bound values as SQL literals
    ///
    /// For human inspection only. The result is not injection-safe and must
    /// never be sent to a database. Unbound placeholders are left as-is.
    #[must_use]
    pub fn interpolate(&self) -> String {
        scan(&self.sql)
            .map(|piece| match piece {
                Piece::Text(text) => text.to_string(),
                Piece::Placeholder(name) => self
                    .params
                    .get(name)
                    .map_or_else(|| format!(":{name}"), DbValue::to_sql_literal),
            })
            .collect()
    }

    pub(crate) fn failed(&self, source: sqlx::Error) -> Error {
        Error::Query {
            sql: self.sql.clone(),
            params: self.params.to_string(),
            source,
        }
    }
}

/// Abstract database access used by the query builder
///
/// The builder only issues statements; transaction demarcation belongs to the
/// implementor (see [`crate::database::DatabasePool::begin`]).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a query and return every row
    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Row>>;

    /// Run a query and return the first row, if any
    async fn fetch_optional(&self, query: &CompiledQuery) -> Result<Option<Row>>;

    /// Run a statement and return the number of affected rows
    async fn execute(&self, query: &CompiledQuery) -> Result<u64>;

    /// Run an INSERT and return the generated row id
    async fn insert(&self, query: &CompiledQuery) -> Result<i64>;
}

#[derive(Debug, PartialEq, Eq)]
enum Piece<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Split SQL into text and `:name` placeholders
///
/// Quoted literals (`'...'`, `"..."`) and `::` casts are passed through as text.
fn scan(sql: &str) -> impl Iterator<Item = Piece<'_>> {
    let bytes = sql.as_bytes();
    let mut pos = 0;

    std::iter::from_fn(move || {
        if pos >= bytes.len() {
            return None;
        }
        let start = pos;

        if bytes[pos] == b':' && bytes.get(pos + 1).is_some_and(|b| is_name_start(*b)) {
            pos += 1;
            while bytes.get(pos).is_some_and(|b| is_name_char(*b)) {
                pos += 1;
            }
            return Some(Piece::Placeholder(&sql[start + 1..pos]));
        }

        while pos < bytes.len() {
            match bytes[pos] {
                quote @ (b'\'' | b'"') => {
                    pos += 1;
                    while pos < bytes.len() && bytes[pos] != quote {
                        pos += 1;
                    }
                    pos = (pos + 1).min(bytes.len());
                }
                b':' if bytes.get(pos + 1) == Some(&b':') => pos += 2,
                b':' if bytes.get(pos + 1).is_some_and(|b| is_name_start(*b)) => break,
                _ => pos += 1,
            }
        }
        Some(Piece::Text(&sql[start..pos]))
    })
}

const fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

const fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
