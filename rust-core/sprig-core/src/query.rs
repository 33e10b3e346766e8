//! # Query Builder
//!
//! Fluent SQL assembly over an injected [`Executor`].
//!
//! ## Lifecycle
//!
//! Clause methods accumulate state; every executing terminal (`get`, `first`,
//! `count`, `exists`, `pluck`, `value`, `update`, `delete`) renders the
//! statement, clears all clause state and then runs it, so a builder can be
//! reused for independent queries. `count` and `exists` put the caller's
//! select list back afterwards. `insert` and `raw` ignore clause state.
//!
//! A terminal that refuses to run (for example `update` without conditions)
//! returns `Error::InvalidQuery` and leaves the state untouched.
//!
//! ## Example
//!
//! ```ignore
//! let mut users = QueryBuilder::new("users", executor);
//! let admins = users
//!     .where_eq("active", 1)
//!     .where_eq("role", "admin")
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .get()
//!     .await?;
//! ```
//!
//! Conditions render flat and left-to-right, see [`crate::condition`].

use crate::condition::{Binder, Condition, Conditions, Connective};
use crate::error::{Error, Result};
use crate::executor::{CompiledQuery, Executor, Params};
use crate::value::{DbValue, Row};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Sort direction for `ORDER BY`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

impl Direction {
    /// SQL keyword
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(Error::invalid_query(format!(
                "Invalid order direction '{s}', expected ASC or DESC"
            ))),
        }
    }
}

/// Join flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
}

impl JoinKind {
    /// SQL keyword preceding `JOIN`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

#[derive(Debug, Clone)]
struct Join {
    kind: JoinKind,
    table: String,
    first: String,
    operator: String,
    second: String,
}

#[derive(Debug, Clone)]
struct Having {
    column: String,
    operator: String,
    value: DbValue,
}

/// Fluent builder for one table
#[derive(Clone)]
pub struct QueryBuilder {
    executor: Arc<dyn Executor>,
    table: String,
    selects: Vec<String>,
    joins: Vec<Join>,
    conditions: Conditions,
    groups: Vec<String>,
    having: Option<Having>,
    orders: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("table", &self.table)
            .field("sql", &self.to_sql())
            .finish_non_exhaustive()
    }
}

impl QueryBuilder {
    /// Create a builder for `table` running on `executor`
    pub fn new(table: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            table: table.into(),
            selects: Vec::new(),
            joins: Vec::new(),
            conditions: Conditions::new(),
            groups: Vec::new(),
            having: None,
            orders: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Target table
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Accumulated WHERE conditions
    #[must_use]
    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Currently selected columns (empty means `*`)
    #[must_use]
    pub fn selects(&self) -> &[String] {
        &self.selects
    }

    // ---- conditions -------------------------------------------------------

    /// `AND column = value`
    pub fn where_eq(&mut self, column: &str, value: impl Into<DbValue>) -> &mut Self {
        self.where_op(column, "=", value)
    }

    /// `AND column <operator> value`
    pub fn where_op(
        &mut self,
        column: &str,
        operator: &str,
        value: impl Into<DbValue>,
    ) -> &mut Self {
        self.push_basic(Connective::And, column, operator, value.into())
    }

    /// `OR column = value`
    pub fn or_where_eq(&mut self, column: &str, value: impl Into<DbValue>) -> &mut Self {
        self.or_where_op(column, "=", value)
    }

    /// `OR column <operator> value`
    pub fn or_where_op(
        &mut self,
        column: &str,
        operator: &str,
        value: impl Into<DbValue>,
    ) -> &mut Self {
        self.push_basic(Connective::Or, column, operator, value.into())
    }

    /// `AND column LIKE pattern`
    pub fn where_like(&mut self, column: &str, pattern: impl Into<String>) -> &mut Self {
        self.push_basic(Connective::And, column, "LIKE", DbValue::String(pattern.into()))
    }

    /// `OR column LIKE pattern`
    pub fn or_where_like(&mut self, column: &str, pattern: impl Into<String>) -> &mut Self {
        self.push_basic(Connective::Or, column, "LIKE", DbValue::String(pattern.into()))
    }

    /// `AND column IS NULL`
    pub fn where_null(&mut self, column: &str) -> &mut Self {
        self.push(Condition::Null {
            column: column.to_string(),
            negated: false,
        })
    }

    /// `AND column IS NOT NULL`
    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        self.push(Condition::Null {
            column: column.to_string(),
            negated: true,
        })
    }

    /// `AND column IN (...)`
    ///
    /// An empty list renders the always-false `0 = 1`.
    pub fn where_in<V: Into<DbValue>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.push(Condition::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        })
    }

    /// `AND column NOT IN (...)`
    ///
    /// An empty list renders the always-true `1 = 1`.
    pub fn where_not_in<V: Into<DbValue>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.push(Condition::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        })
    }

    /// `AND column BETWEEN low AND high`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` unless exactly two values are given. No
    /// condition is added in that case.
    pub fn where_between<V: Into<DbValue>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<&mut Self> {
        let (low, high) = bounds(column, values)?;
        Ok(self.push(Condition::Between {
            column: column.to_string(),
            low,
            high,
            negated: false,
        }))
    }

    /// `AND column NOT BETWEEN low AND high`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` unless exactly two values are given.
    pub fn where_not_between<V: Into<DbValue>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<&mut Self> {
        let (low, high) = bounds(column, values)?;
        Ok(self.push(Condition::Between {
            column: column.to_string(),
            low,
            high,
            negated: true,
        }))
    }

    fn push_basic(
        &mut self,
        connective: Connective,
        column: &str,
        operator: &str,
        value: DbValue,
    ) -> &mut Self {
        self.conditions.push(
            connective,
            Condition::Basic {
                column: column.to_string(),
                operator: operator.to_string(),
                value,
            },
        );
        self
    }

    fn push(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(Connective::And, condition);
        self
    }

    // ---- clauses ----------------------------------------------------------

    /// Replace the select list
    pub fn select<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.selects = columns.into_iter().map(Into::into).collect();
        self
    }

    /// `INNER JOIN table ON first <operator> second`
    pub fn join(&mut self, table: &str, first: &str, operator: &str, second: &str) -> &mut Self {
        self.join_with(JoinKind::Inner, table, first, operator, second)
    }

    /// `LEFT JOIN table ON first <operator> second`
    pub fn left_join(
        &mut self,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> &mut Self {
        self.join_with(JoinKind::Left, table, first, operator, second)
    }

    /// `RIGHT JOIN table ON first <operator> second`
    pub fn right_join(
        &mut self,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> &mut Self {
        self.join_with(JoinKind::Right, table, first, operator, second)
    }

    /// Append a join of any kind; joins render in call order
    pub fn join_with(
        &mut self,
        kind: JoinKind,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> &mut Self {
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
        });
        self
    }

    /// Replace the `GROUP BY` list
    pub fn group_by<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.groups = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the single `HAVING` predicate; a later call replaces it
    pub fn having(&mut self, column: &str, operator: &str, value: impl Into<DbValue>) -> &mut Self {
        self.having = Some(Having {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        });
        self
    }

    /// Append an `ORDER BY` term
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` if `direction` is not `ASC`/`DESC`
    /// (any case).
    pub fn order_by(&mut self, column: &str, direction: &str) -> Result<&mut Self> {
        let direction = direction.parse()?;
        self.orders.push((column.to_string(), direction));
        Ok(self)
    }

    /// Append an `ORDER BY column DESC` term
    pub fn order_by_desc(&mut self, column: &str) -> &mut Self {
        self.orders.push((column.to_string(), Direction::Desc));
        self
    }

    /// Set `LIMIT`
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Set `OFFSET`
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Page through results; pages start at 1 and lower values are clamped
    ///
    /// The offset saturates at `i64::MAX`, the largest value SQL drivers bind.
    pub fn paginate(&mut self, page: i64, per_page: u64) -> &mut Self {
        let skipped = page.max(1).unsigned_abs() - 1;
        let offset = skipped
            .saturating_mul(per_page)
            .min(i64::MAX.unsigned_abs());
        self.limit(per_page).offset(offset)
    }

    /// Clear every clause, keeping the table and executor
    pub fn reset(&mut self) -> &mut Self {
        self.selects.clear();
        self.joins.clear();
        self.conditions.clear();
        self.groups.clear();
        self.having = None;
        self.orders.clear();
        self.limit = None;
        self.offset = None;
        self
    }

    // ---- rendering --------------------------------------------------------

    /// Render the current SELECT statement and its parameters
    #[must_use]
    pub fn compile(&self) -> CompiledQuery {
        let mut binder = Binder::new();
        let mut parts = Vec::with_capacity(8);

        if self.selects.is_empty() {
            parts.push("SELECT *".to_string());
        } else {
            parts.push(format!("SELECT {}", self.selects.join(", ")));
        }
        parts.push(format!("FROM {}", self.table));

        for join in &self.joins {
            parts.push(format!(
                "{} JOIN {} ON {} {} {}",
                join.kind.as_str(),
                join.table,
                join.first,
                join.operator,
                join.second
            ));
        }

        if let Some(predicate) = self.conditions.render(&mut binder) {
            parts.push(format!("WHERE {predicate}"));
        }

        if !self.groups.is_empty() {
            parts.push(format!("GROUP BY {}", self.groups.join(", ")));
        }

        if let Some(having) = &self.having {
            let placeholder =
                binder.bind(&format!("having_{}", having.column), having.value.clone());
            parts.push(format!(
                "HAVING {} {} {placeholder}",
                having.column, having.operator
            ));
        }

        if !self.orders.is_empty() {
            let terms: Vec<String> = self
                .orders
                .iter()
                .map(|(column, direction)| format!("{column} {}", direction.as_str()))
                .collect();
            parts.push(format!("ORDER BY {}", terms.join(", ")));
        }

        if let Some(limit) = self.limit {
            parts.push(format!("LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("OFFSET {offset}"));
        }

        CompiledQuery::new(parts.join(" "), binder.finish())
    }

    /// SQL text of the current SELECT statement
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.compile().sql
    }

    /// Parameters of the current SELECT statement
    #[must_use]
    pub fn params(&self) -> Params {
        self.compile().params
    }

    /// SELECT statement with values inlined as literals
    ///
    /// Debug output only: values are quoted naively and the result is not
    /// safe to execute.
    #[must_use]
    pub fn debug(&self) -> String {
        self.compile().interpolate()
    }

    fn compile_update(&self, data: Vec<(String, DbValue)>) -> CompiledQuery {
        let mut binder = Binder::new();
        let sets: Vec<String> = data
            .into_iter()
            .map(|(column, value)| {
                let placeholder = binder.bind_named(&format!("set_{column}"), value);
                format!("{column} = {placeholder}")
            })
            .collect();
        let predicate = self.conditions.render(&mut binder).unwrap_or_default();

        CompiledQuery::new(
            format!(
                "UPDATE {} SET {} WHERE {predicate}",
                self.table,
                sets.join(", ")
            ),
            binder.finish(),
        )
    }

    fn compile_delete(&self) -> CompiledQuery {
        let mut binder = Binder::new();
        let predicate = self.conditions.render(&mut binder).unwrap_or_default();
        CompiledQuery::new(
            format!("DELETE FROM {} WHERE {predicate}", self.table),
            binder.finish(),
        )
    }

    fn compile_insert(&self, data: Vec<(String, DbValue)>) -> CompiledQuery {
        let mut binder = Binder::new();
        let mut columns = Vec::with_capacity(data.len());
        let mut placeholders = Vec::with_capacity(data.len());
        for (column, value) in data {
            placeholders.push(binder.bind_named(&column, value));
            columns.push(column);
        }

        CompiledQuery::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            binder.finish(),
        )
    }

    // ---- terminals --------------------------------------------------------

    /// Run the SELECT and return every row
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn get(&mut self) -> Result<Vec<Row>> {
        let query = self.compile();
        self.reset();
        debug!(sql = %query.sql, "Executing select");
        self.executor.fetch_all(&query).await
    }

    /// Run the SELECT with `LIMIT 1` and return the row, if any
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn first(&mut self) -> Result<Option<Row>> {
        let query = self.limit(1).compile();
        self.reset();
        debug!(sql = %query.sql, "Executing select first");
        self.executor.fetch_optional(&query).await
    }

    /// `COUNT(*)` of the matching rows
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn count(&mut self) -> Result<i64> {
        self.count_column("*").await
    }

    /// `COUNT(column)` of the matching rows
    ///
    /// The select list in place before the call is restored afterwards.
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn count_column(&mut self, column: &str) -> Result<i64> {
        let selects = std::mem::replace(
            &mut self.selects,
            vec![format!("COUNT({column}) AS count")],
        );
        let row = self.first().await;
        self.selects = selects;

        Ok(row?
            .and_then(|row| row.get("count").and_then(DbValue::as_i64))
            .unwrap_or(0))
    }

    /// Whether at least one row matches
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn exists(&mut self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// Values of one column across all matching rows
    ///
    /// `column` may be qualified (`users.name`) or aliased (`MAX(age) AS
    /// oldest`); values are read back under the name the driver reports.
    /// Rows lacking the column yield `DbValue::Null`.
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn pluck(&mut self, column: &str) -> Result<Vec<DbValue>> {
        let key = result_key(column);
        let rows = self.select([column]).get().await?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(key).unwrap_or(DbValue::Null))
            .collect())
    }

    /// Value of one column in the first matching row
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn value(&mut self, column: &str) -> Result<Option<DbValue>> {
        let key = result_key(column);
        let row = self.select([column]).first().await?;
        Ok(row.and_then(|mut row| row.remove(key)))
    }

    /// Insert one row and return its generated id
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` for empty `data`, otherwise propagates
    /// executor failures.
    pub async fn insert<K, V>(&self, data: impl IntoIterator<Item = (K, V)>) -> Result<i64>
    where
        K: Into<String>,
        V: Into<DbValue>,
    {
        let data = collect_data(data);
        if data.is_empty() {
            return Err(Error::invalid_query("Data cannot be empty for insert"));
        }

        let query = self.compile_insert(data);
        debug!(sql = %query.sql, "Executing insert");
        self.executor.insert(&query).await
    }

    /// Update matching rows and return the affected count
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` without touching the executor when no
    /// condition has been added or `data` is empty.
    pub async fn update<K, V>(&mut self, data: impl IntoIterator<Item = (K, V)>) -> Result<u64>
    where
        K: Into<String>,
        V: Into<DbValue>,
    {
        if self.conditions.is_empty() {
            return Err(Error::invalid_query(
                "Update requires a WHERE clause; add a condition first",
            ));
        }
        let data = collect_data(data);
        if data.is_empty() {
            return Err(Error::invalid_query("Data cannot be empty for update"));
        }

        let query = self.compile_update(data);
        self.reset();
        debug!(sql = %query.sql, "Executing update");
        self.executor.execute(&query).await
    }

    /// Delete matching rows and return the affected count
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` without touching the executor when no
    /// condition has been added.
    pub async fn delete(&mut self) -> Result<u64> {
        if self.conditions.is_empty() {
            return Err(Error::invalid_query(
                "Delete requires a WHERE clause; add a condition first",
            ));
        }

        let query = self.compile_delete();
        self.reset();
        debug!(sql = %query.sql, "Executing delete");
        self.executor.execute(&query).await
    }

    /// Run arbitrary SQL with named parameters
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn raw(&self, sql: &str, params: Params) -> Result<Vec<Row>> {
        let query = CompiledQuery::new(sql, params);
        debug!(sql = %query.sql, "Executing raw query");
        self.executor.fetch_all(&query).await
    }
}

/// Column name a driver reports for one select expression
fn result_key(column: &str) -> &str {
    let column = column.trim();
    let lower = column.to_ascii_lowercase();
    if let Some(pos) = lower.rfind(" as ") {
        return column[pos + 4..].trim();
    }
    column.rsplit('.').next().unwrap_or(column)
}

fn collect_data<K, V>(data: impl IntoIterator<Item = (K, V)>) -> Vec<(String, DbValue)>
where
    K: Into<String>,
    V: Into<DbValue>,
{
    data.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

fn bounds<V: Into<DbValue>>(
    column: &str,
    values: impl IntoIterator<Item = V>,
) -> Result<(DbValue, DbValue)> {
    let mut values: Vec<DbValue> = values.into_iter().map(Into::into).collect();
    if values.len() != 2 {
        return Err(Error::invalid_query(format!(
            "BETWEEN on '{column}' requires exactly two values, got {}",
            values.len()
        )));
    }
    let high = values.pop().unwrap_or(DbValue::Null);
    let low = values.pop().unwrap_or(DbValue::Null);
    Ok((low, high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::RecordingExecutor;

    fn builder(table: &str) -> (QueryBuilder, Arc<RecordingExecutor>) {
        let exec = Arc::new(RecordingExecutor::new());
        (QueryBuilder::new(table, exec.clone()), exec)
    }

    fn row(pairs: &[(&str, DbValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_default_select() {
        let (qb, _) = builder("users");
        assert_eq!(qb.to_sql(), "SELECT * FROM users");
        assert!(qb.params().is_empty());
    }

    #[test]
    fn test_full_select_rendering() {
        let (mut qb, _) = builder("orders");
        qb.select(["users.name", "COUNT(orders.id) AS total"])
            .join("users", "users.id", "=", "orders.user_id")
            .left_join("coupons", "coupons.id", "=", "orders.coupon_id")
            .where_eq("orders.status", "paid")
            .group_by(["users.name"])
            .having("total", ">", 5)
            .order_by_desc("total")
            .limit(10)
            .offset(20);

        assert_eq!(
            qb.to_sql(),
            "SELECT users.name, COUNT(orders.id) AS total FROM orders \
             INNER JOIN users ON users.id = orders.user_id \
             LEFT JOIN coupons ON coupons.id = orders.coupon_id \
             WHERE orders.status = :orders_status_0 \
             GROUP BY users.name HAVING total > :having_total_1 \
             ORDER BY total DESC LIMIT 10 OFFSET 20"
        );
        let params = qb.params();
        assert_eq!(params.get("orders_status_0"), Some(&DbValue::from("paid")));
        assert_eq!(params.get("having_total_1"), Some(&DbValue::Int(5)));
    }

    #[test]
    fn test_select_overwrites() {
        let (mut qb, _) = builder("t");
        qb.select(["a", "b"]).select(["c"]);
        assert_eq!(qb.to_sql(), "SELECT c FROM t");
    }

    #[test]
    fn test_having_last_call_wins() {
        let (mut qb, _) = builder("t");
        qb.group_by(["a"]).having("n", ">", 1).having("n", "<", 9);
        assert_eq!(qb.to_sql(), "SELECT * FROM t GROUP BY a HAVING n < :having_n_0");
        assert_eq!(qb.params().len(), 1);
    }

    #[test]
    fn test_order_by_direction() {
        let (mut qb, _) = builder("t");
        qb.order_by("a", "desc").unwrap().order_by("b", "Asc").unwrap();
        assert_eq!(qb.to_sql(), "SELECT * FROM t ORDER BY a DESC, b ASC");

        let err = qb.order_by("c", "sideways").unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
        assert_eq!(qb.to_sql(), "SELECT * FROM t ORDER BY a DESC, b ASC");
    }

    #[test]
    fn test_paginate() {
        let (mut qb, _) = builder("t");
        qb.paginate(3, 15);
        assert_eq!(qb.to_sql(), "SELECT * FROM t LIMIT 15 OFFSET 30");
        qb.paginate(0, 15);
        assert_eq!(qb.to_sql(), "SELECT * FROM t LIMIT 15 OFFSET 0");
        qb.paginate(-4, 5);
        assert_eq!(qb.to_sql(), "SELECT * FROM t LIMIT 5 OFFSET 0");
    }

    #[test]
    fn test_paginate_huge_page_saturates() {
        let (mut qb, _) = builder("t");
        qb.paginate(i64::MAX, 10);
        assert_eq!(
            qb.to_sql(),
            format!("SELECT * FROM t LIMIT 10 OFFSET {}", i64::MAX)
        );
        qb.paginate(i64::MAX, 1);
        assert_eq!(
            qb.to_sql(),
            format!("SELECT * FROM t LIMIT 1 OFFSET {}", i64::MAX - 1)
        );
    }

    #[test]
    fn test_result_key() {
        assert_eq!(result_key("name"), "name");
        assert_eq!(result_key("users.name"), "name");
        assert_eq!(result_key("MAX(users.age) AS oldest"), "oldest");
        assert_eq!(result_key("u.email as contact"), "contact");
    }

    #[test]
    fn test_or_where_renders_flat() {
        let (mut qb, _) = builder("t");
        qb.where_eq("a", 1).or_where_eq("b", 2).where_eq("c", 3);
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM t WHERE a = :a_0 OR b = :b_1 AND c = :c_2"
        );
    }

    #[test]
    fn test_like_and_null_and_in() {
        let (mut qb, _) = builder("users");
        qb.where_like("name", "A%")
            .or_where_like("email", "%@example.com")
            .where_not_null("verified_at")
            .where_in("role", ["admin", "editor"])
            .where_not_in("id", Vec::<i64>::new());
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE name LIKE :name_0 OR email LIKE :email_1 \
             AND verified_at IS NOT NULL AND role IN (:role_in_2, :role_in_3) AND 1 = 1"
        );
    }

    #[test]
    fn test_where_between_arity() {
        let (mut qb, _) = builder("people");
        let err = qb.where_between("age", [18, 30, 40]).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
        assert!(qb.conditions().is_empty());
        assert!(qb.params().is_empty());

        qb.where_between("age", [18, 30]).unwrap();
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM people WHERE age BETWEEN :age_min_0 AND :age_max_1"
        );

        assert!(qb.where_not_between("age", [1]).is_err());
        assert_eq!(qb.conditions().len(), 1);
    }

    #[test]
    fn test_debug_inlines_values() {
        let (mut qb, _) = builder("users");
        qb.where_eq("name", "O'Hara").where_eq("deleted_at", DbValue::Null);
        assert_eq!(
            qb.debug(),
            "SELECT * FROM users WHERE name = 'O''Hara' AND deleted_at = NULL"
        );
    }

    #[tokio::test]
    async fn test_update_scenario() {
        let exec = Arc::new(RecordingExecutor::new().with_affected(2));
        let mut qb = QueryBuilder::new("t", exec.clone());

        let affected = qb
            .where_eq("active", 1)
            .where_eq("role", "admin")
            .update([("name", "X")])
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let call = exec.last().unwrap();
        assert_eq!(
            call.sql,
            "UPDATE t SET name = :set_name WHERE active = :active_0 AND role = :role_1"
        );
        let names: Vec<&str> = call.params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["set_name", "active_0", "role_1"]);
        assert_eq!(call.params.get("set_name"), Some(&DbValue::from("X")));
        assert_eq!(call.params.get("active_0"), Some(&DbValue::Int(1)));
        assert_eq!(call.params.get("role_1"), Some(&DbValue::from("admin")));
    }

    #[tokio::test]
    async fn test_update_set_and_where_names_never_collide() {
        let (mut qb, exec) = builder("t");
        qb.where_eq("set_a", 99).update([("a_0", "X")]).await.unwrap();

        let call = exec.last().unwrap();
        assert_eq!(
            call.sql,
            "UPDATE t SET a_0 = :set_a_0 WHERE set_a = :set_a_1"
        );
        assert_eq!(call.params.len(), 2);
        assert_eq!(call.params.get("set_a_0"), Some(&DbValue::from("X")));
        assert_eq!(call.params.get("set_a_1"), Some(&DbValue::Int(99)));
    }

    #[tokio::test]
    async fn test_pluck_and_value_read_qualified_columns() {
        let exec = Arc::new(RecordingExecutor::new().with_rows(vec![
            row(&[("name", DbValue::from("Ada"))]),
            row(&[("name", DbValue::from("Grace"))]),
        ]));
        let mut qb = QueryBuilder::new("users", exec.clone());

        let names = qb.pluck("users.name").await.unwrap();
        assert_eq!(names, vec![DbValue::from("Ada"), DbValue::from("Grace")]);
        assert_eq!(exec.last().unwrap().sql, "SELECT users.name FROM users");

        let first = qb.value("users.name").await.unwrap();
        assert_eq!(first, Some(DbValue::from("Ada")));
    }

    #[tokio::test]
    async fn test_update_without_where_is_refused() {
        let (mut qb, exec) = builder("t");
        qb.order_by_desc("id");
        let err = qb.update([("name", "X")]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
        assert_eq!(exec.call_count(), 0);
        assert_eq!(qb.to_sql(), "SELECT * FROM t ORDER BY id DESC");
    }

    #[tokio::test]
    async fn test_update_with_empty_data_is_refused() {
        let (mut qb, exec) = builder("t");
        qb.where_eq("id", 1);
        let err = qb.update(Vec::<(String, DbValue)>::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
        assert_eq!(exec.call_count(), 0);
        assert_eq!(qb.conditions().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_without_where_is_refused() {
        let (mut qb, exec) = builder("t");
        let err = qb.delete().await.unwrap_err();
        assert!(err.to_string().contains("WHERE"));
        assert_eq!(exec.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_renders_conditions() {
        let (mut qb, exec) = builder("sessions");
        qb.where_op("expires_at", "<", 100).where_null("user_id");
        qb.delete().await.unwrap();
        assert_eq!(
            exec.last().unwrap().sql,
            "DELETE FROM sessions WHERE expires_at < :expires_at_0 AND user_id IS NULL"
        );
    }

    #[tokio::test]
    async fn test_insert() {
        let exec = Arc::new(RecordingExecutor::new().with_insert_id(7));
        let qb = QueryBuilder::new("users", exec.clone());

        let id = qb
            .insert([("name", DbValue::from("Ada")), ("age", DbValue::from(36))])
            .await
            .unwrap();
        assert_eq!(id, 7);
        assert_eq!(
            exec.last().unwrap().sql,
            "INSERT INTO users (name, age) VALUES (:name, :age)"
        );

        let err = qb.insert(Vec::<(String, DbValue)>::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
        assert_eq!(exec.call_count(), 1);
    }

    #[tokio::test]
    async fn test_terminal_resets_state() {
        let (mut qb, exec) = builder("t");
        qb.select(["a"]).where_eq("a", 1).order_by_desc("a").limit(5);
        qb.get().await.unwrap();
        assert_eq!(
            exec.last().unwrap().sql,
            "SELECT a FROM t WHERE a = :a_0 ORDER BY a DESC LIMIT 5"
        );
        assert_eq!(qb.to_sql(), "SELECT * FROM t");

        qb.where_eq("b", 2);
        qb.where_eq("c", 3);
        qb.get().await.unwrap();
        assert_eq!(
            exec.last().unwrap().sql,
            "SELECT * FROM t WHERE b = :b_0 AND c = :c_1"
        );
    }

    #[tokio::test]
    async fn test_reset_happens_on_executor_failure() {
        let exec = Arc::new(RecordingExecutor::new().failing());
        let mut qb = QueryBuilder::new("t", exec.clone());
        qb.where_eq("a", 1);
        assert!(qb.get().await.is_err());
        assert!(qb.conditions().is_empty());
    }

    #[tokio::test]
    async fn test_first_forces_limit() {
        let exec = Arc::new(
            RecordingExecutor::new().with_rows(vec![row(&[("id", DbValue::Int(1))])]),
        );
        let mut qb = QueryBuilder::new("t", exec.clone());
        let found = qb.where_eq("id", 1).first().await.unwrap();
        assert_eq!(found.unwrap().get("id"), Some(&DbValue::Int(1)));
        assert_eq!(
            exec.last().unwrap().sql,
            "SELECT * FROM t WHERE id = :id_0 LIMIT 1"
        );
    }

    #[tokio::test]
    async fn test_count_restores_select() {
        let exec = Arc::new(
            RecordingExecutor::new().with_rows(vec![row(&[("count", DbValue::Int(4))])]),
        );
        let mut qb = QueryBuilder::new("t", exec.clone());
        qb.select(["id", "name"]).where_eq("active", true);

        assert_eq!(qb.count().await.unwrap(), 4);
        assert_eq!(
            exec.last().unwrap().sql,
            "SELECT COUNT(*) AS count FROM t WHERE active = :active_0 LIMIT 1"
        );
        assert_eq!(qb.selects(), ["id".to_string(), "name".to_string()]);
        assert!(qb.conditions().is_empty());
    }

    #[tokio::test]
    async fn test_count_without_row_is_zero() {
        let (mut qb, _) = builder("t");
        assert_eq!(qb.count_column("id").await.unwrap(), 0);
        assert!(!qb.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let exec = Arc::new(
            RecordingExecutor::new().with_rows(vec![row(&[("count", DbValue::from("1"))])]),
        );
        let mut qb = QueryBuilder::new("t", exec);
        assert!(qb.where_eq("email", "a@b.c").exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_pluck_and_value() {
        let exec = Arc::new(RecordingExecutor::new().with_rows(vec![
            row(&[("name", DbValue::from("Ada"))]),
            row(&[("other", DbValue::Int(1))]),
        ]));
        let mut qb = QueryBuilder::new("users", exec.clone());

        let names = qb.pluck("name").await.unwrap();
        assert_eq!(names, vec![DbValue::from("Ada"), DbValue::Null]);
        assert_eq!(exec.last().unwrap().sql, "SELECT name FROM users");

        let name = qb.where_eq("id", 1).value("name").await.unwrap();
        assert_eq!(name, Some(DbValue::from("Ada")));
        assert_eq!(
            exec.last().unwrap().sql,
            "SELECT name FROM users WHERE id = :id_0 LIMIT 1"
        );
        assert!(qb.selects().is_empty());
    }

    #[tokio::test]
    async fn test_raw_keeps_state() {
        let (mut qb, exec) = builder("t");
        qb.where_eq("a", 1);
        let params: Params = [("x", 5)].into_iter().collect();
        qb.raw("SELECT :x AS x", params).await.unwrap();
        assert_eq!(exec.last().unwrap().sql, "SELECT :x AS x");
        assert_eq!(qb.conditions().len(), 1);
    }
}
