//! # Path Pattern Compiler
//!
//! Turns a path template into an anchored regular expression.
//!
//! ## Template grammar
//!
//! - `{name}` - required segment, one or more non-slash characters
//! - `{name?}` - optional segment, zero or more non-slash characters. When the
//!   placeholder follows a `/`, that slash becomes optional with it, so
//!   `/posts/{id?}` matches both `/posts` and `/posts/7`.
//! - anything else is literal text and is matched verbatim (regex
//!   metacharacters included)
//!
//! Placeholder names are `[A-Za-z0-9_]+`. Braces that do not form a valid
//! placeholder are kept as literal text, so compilation only fails when a
//! name is repeated.

use crate::error::{Error, Result};
use crate::params::PathParams;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, optional: bool },
}

/// A compiled path template
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    names: Vec<String>,
    optional: Vec<bool>,
}

impl PathPattern {
    /// Compile a path template into a matcher
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the same placeholder name is
    /// used twice in one template.
    pub fn compile(template: &str) -> Result<Self> {
        let segments = parse_template(template);

        let mut names: Vec<String> = Vec::new();
        let mut optional = Vec::new();
        for segment in &segments {
            if let Segment::Param { name, optional: opt } = segment {
                if names.contains(name) {
                    return Err(Error::InvalidRoutePattern {
                        pattern: template.to_string(),
                        reason: format!("placeholder '{name}' appears more than once"),
                    });
                }
                names.push(name.clone());
                optional.push(*opt);
            }
        }

        let source = build_regex_source(&segments);
        let regex = Regex::new(&source).map_err(|e| Error::InvalidRoutePattern {
            pattern: template.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            names,
            optional,
        })
    }

    /// Match a whole path, returning the captured parameters
    ///
    /// Optional placeholders that captured nothing are left out of the result.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let captures = self.regex.captures(path)?;
        let mut params = PathParams::new();

        for (i, name) in self.names.iter().enumerate() {
            let Some(m) = captures.get(i + 1) else {
                continue;
            };
            if self.optional[i] && m.as_str().is_empty() {
                continue;
            }
            params.insert(name.as_str(), m.as_str());
        }

        Some(params)
    }

    /// The template this pattern was compiled from
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names in template order
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    /// The generated regular expression
    #[must_use]
    pub fn as_regex(&self) -> &str {
        self.regex.as_str()
    }
}

fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        literal.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let placeholder = after
            .find('}')
            .and_then(|end| parse_placeholder(&after[..end]).map(|p| (end, p)));

        match placeholder {
            Some((end, (name, optional))) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Param { name, optional });
                rest = &after[end + 1..];
            }
            None => {
                literal.push('{');
                rest = after;
            }
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

fn parse_placeholder(inner: &str) -> Option<(String, bool)> {
    let (name, optional) = match inner.strip_suffix('?') {
        Some(name) => (name, true),
        None => (inner, false),
    };
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| (name.to_string(), optional))
}

fn build_regex_source(segments: &[Segment]) -> String {
    let mut source = String::from("^");

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Literal(text) => {
                let next_optional = matches!(
                    segments.get(i + 1),
                    Some(Segment::Param { optional: true, .. })
                );
                let text = if next_optional {
                    text.strip_suffix('/').unwrap_or(text)
                } else {
                    text.as_str()
                };
                source.push_str(&regex::escape(text));
            }
            Segment::Param {
                optional: false, ..
            } => source.push_str("([^/]+)"),
            Segment::Param { optional: true, .. } => {
                let after_slash = i
                    .checked_sub(1)
                    .and_then(|j| segments.get(j))
                    .is_some_and(|prev| matches!(prev, Segment::Literal(t) if t.ends_with('/')));
                source.push_str(if after_slash {
                    "(?:/([^/]*))?"
                } else {
                    "([^/]*)"
                });
            }
        }
    }

    source.push('$');
    source
}
