//! # Conditions
//!
//! Typed WHERE predicates and the placeholder binder shared by every clause
//! of one rendered statement.
//!
//! Conditions render flat and left-to-right: each one after the first is
//! prefixed with the connective it was added with and no parentheses are
//! inserted. `a = 1 OR b = 2 AND c = 3` is sent to the database exactly like
//! that, so SQL precedence (AND binds tighter) applies.

use crate::executor::Params;
use crate::value::DbValue;

/// Boolean connective joining a condition to the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl Connective {
    /// SQL keyword
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// A single WHERE predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column <operator> value`; the operator is rendered verbatim
    Basic {
        /// Column expression
        column: String,
        /// Comparison operator (`=`, `>`, `LIKE`, ...)
        operator: String,
        /// Bound value
        value: DbValue,
    },
    /// `column IS [NOT] NULL`
    Null {
        /// Column expression
        column: String,
        /// Render `IS NOT NULL`
        negated: bool,
    },
    /// `column [NOT] IN (...)`
    In {
        /// Column expression
        column: String,
        /// Candidate values
        values: Vec<DbValue>,
        /// Render `NOT IN`
        negated: bool,
    },
    /// `column [NOT] BETWEEN low AND high`
    Between {
        /// Column expression
        column: String,
        /// Lower bound
        low: DbValue,
        /// Upper bound
        high: DbValue,
        /// Render `NOT BETWEEN`
        negated: bool,
    },
}

impl Condition {
    fn render(&self, binder: &mut Binder) -> String {
        match self {
            Self::Basic {
                column,
                operator,
                value,
            } => {
                let placeholder = binder.bind(column, value.clone());
                format!("{column} {operator} {placeholder}")
            }
            Self::Null { column, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{column} {keyword}")
            }
            // An empty list can match nothing; NOT IN of nothing matches everything.
            Self::In {
                values, negated, ..
            } if values.is_empty() => (if *negated { "1 = 1" } else { "0 = 1" }).to_string(),
            Self::In {
                column,
                values,
                negated,
            } => {
                let stem = format!("{column}_in");
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| binder.bind(&stem, v.clone()))
                    .collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{column} {keyword} ({})", placeholders.join(", "))
            }
            Self::Between {
                column,
                low,
                high,
                negated,
            } => {
                let min = binder.bind(&format!("{column}_min"), low.clone());
                let max = binder.bind(&format!("{column}_max"), high.clone());
                let keyword = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                format!("{column} {keyword} {min} AND {max}")
            }
        }
    }
}

/// Ordered list of conditions with their connectives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: Vec<(Connective, Condition)>,
}

impl Conditions {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a condition
    pub fn push(&mut self, connective: Connective, condition: Condition) {
        self.entries.push((connective, condition));
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &(Connective, Condition)> {
        self.entries.iter()
    }

    /// Number of conditions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no condition was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every condition
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render the predicate body (without the `WHERE` keyword)
    ///
    /// Returns `None` for an empty list. The first condition's connective is
    /// ignored.
    pub fn render(&self, binder: &mut Binder) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }

        let mut sql = String::new();
        for (i, (connective, condition)) in self.entries.iter().enumerate() {
            if i > 0 {
                sql.push(' ');
                sql.push_str(connective.as_str());
                sql.push(' ');
            }
            sql.push_str(&condition.render(binder));
        }
        Some(sql)
    }
}

/// Generates unique placeholder names for one statement
///
/// Indexed names are `<stem>_<n>` where `n` counts every indexed binding made
/// so far, so the same column can appear in any number of clauses.
#[derive(Debug, Default)]
pub struct Binder {
    params: Params,
    counter: usize,
}

impl Binder {
    /// Start a fresh statement
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value under `<stem>_<n>` and return the `:placeholder` text
    ///
    /// `n` skips ahead past names already taken by [`Binder::bind_named`].
    pub fn bind(&mut self, stem: &str, value: DbValue) -> String {
        let stem = sanitize(stem);
        let name = loop {
            let candidate = format!("{stem}_{}", self.counter);
            self.counter += 1;
            if !self.params.contains(&candidate) {
                break candidate;
            }
        };
        self.params.insert(name.clone(), value);
        format!(":{name}")
    }

    /// Bind a value under an exact name, falling back to an indexed name when
    /// it is already taken
    pub fn bind_named(&mut self, name: &str, value: DbValue) -> String {
        let name = sanitize(name);
        if self.params.contains(&name) {
            return self.bind(&name, value);
        }
        self.params.insert(name.clone(), value);
        format!(":{name}")
    }

    /// Consume the binder, yielding the collected parameters
    #[must_use]
    pub fn finish(self) -> Params {
        self.params
    }
}

/// Replace characters that cannot appear in a placeholder name
fn sanitize(stem: &str) -> String {
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) || name.is_empty() {
        format!("p{name}")
    } else {
        name
    }
}
