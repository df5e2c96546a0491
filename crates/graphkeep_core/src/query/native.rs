//! Native (SQL) predicate and sort terms.
//!
//! These are the escape hatch for conditions the typed builder cannot
//! express. SQL fragments are evaluated against the `objects` table; use
//! [`attr`] to address record attributes and `unique_id` for the application
//! identity column. Parameters bind to positional `?` placeholders.

use rusqlite::types::Value;

/// SQL expression addressing top-level attribute `name` of a record.
///
/// Plain identifiers address `$.name`; any other key is quoted as
/// `$."key"`. The path is emitted as an escaped SQL string literal.
pub fn attr(name: &str) -> String {
    let path = if is_plain_identifier(name) {
        format!("$.{name}")
    } else {
        format!("$.\"{name}\"")
    };
    format!("json_extract(data, '{}')", path.replace('\'', "''"))
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Pre-built SQL boolean expression plus its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct NativePredicate {
    sql: String,
    params: Vec<Value>,
}

impl NativePredicate {
    pub fn new(sql: impl Into<String>, params: impl IntoIterator<Item = Value>) -> Self {
        Self {
            sql: sql.into(),
            params: params.into_iter().collect(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn and(self, other: NativePredicate) -> Self {
        let mut params = self.params;
        params.extend(other.params);
        Self {
            sql: format!("({}) AND ({})", self.sql, other.sql),
            params,
        }
    }
}

/// One native sort term: a SQL expression and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSort {
    sql: String,
    ascending: bool,
}

impl NativeSort {
    pub fn new(sql: impl Into<String>, ascending: bool) -> Self {
        Self {
            sql: sql.into(),
            ascending,
        }
    }

    /// Sort by record attribute `name`.
    pub fn attr(name: &str, ascending: bool) -> Self {
        Self::new(attr(name), ascending)
    }

    pub fn unique_id(ascending: bool) -> Self {
        Self::new("unique_id", ascending)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    pub(crate) fn to_order_term(&self) -> String {
        let direction = if self.ascending { "ASC" } else { "DESC" };
        format!("{} {direction}", self.sql)
    }
}
