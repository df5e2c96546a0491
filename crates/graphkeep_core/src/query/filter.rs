//! Typed filter and sort builder.

use rusqlite::types::Value;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// Storage address of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldPath {
    /// The application unique-id column.
    UniqueId,
    /// A top-level attribute inside the record's JSON document.
    Attribute(&'static str),
}

impl FieldPath {
    pub(crate) fn sql(&self) -> String {
        match self {
            Self::UniqueId => "unique_id".to_string(),
            Self::Attribute(name) => super::native::attr(name),
        }
    }
}

/// Conversion of a field value into its native bind value.
pub trait FieldValue {
    fn into_sql(self) -> Value;
}

impl FieldValue for String {
    fn into_sql(self) -> Value {
        Value::Text(self)
    }
}

impl FieldValue for i64 {
    fn into_sql(self) -> Value {
        Value::Integer(self)
    }
}

impl FieldValue for i32 {
    fn into_sql(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

impl FieldValue for u32 {
    fn into_sql(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

impl FieldValue for f64 {
    fn into_sql(self) -> Value {
        Value::Real(self)
    }
}

// JSON booleans surface as 1/0 through `json_extract`.
impl FieldValue for bool {
    fn into_sql(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

impl<V: FieldValue> FieldValue for Option<V> {
    fn into_sql(self) -> Value {
        self.map_or(Value::Null, FieldValue::into_sql)
    }
}

/// Typed handle to a field of record type `T` holding values of type `V`.
///
/// Declare one constant per queryable field:
///
/// ```ignore
/// impl Item {
///     pub const NAME: Field<Item, String> = Field::new("name");
/// }
/// ```
pub struct Field<T, V> {
    path: FieldPath,
    _marker: PhantomData<fn() -> (T, V)>,
}

impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Field<T, V> {}

impl<T, V> Debug for Field<T, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field").field("path", &self.path).finish()
    }
}

impl<T, V> Field<T, V> {
    /// Addresses top-level attribute `name`; must be a plain identifier.
    pub const fn new(name: &'static str) -> Self {
        Self {
            path: FieldPath::Attribute(name),
            _marker: PhantomData,
        }
    }

    pub fn ascending(self) -> SortKey<T> {
        SortKey::new(self.path, true)
    }

    pub fn descending(self) -> SortKey<T> {
        SortKey::new(self.path, false)
    }

    pub fn is_null(self) -> FilterExpr<T> {
        FilterExpr::new(FilterNode::IsNull {
            path: self.path,
            negated: false,
        })
    }

    pub fn is_not_null(self) -> FilterExpr<T> {
        FilterExpr::new(FilterNode::IsNull {
            path: self.path,
            negated: true,
        })
    }
}

impl<T> Field<T, String> {
    /// Addresses the application unique-id column of `T`.
    pub const fn unique_id() -> Self {
        Self {
            path: FieldPath::UniqueId,
            _marker: PhantomData,
        }
    }

    /// Substring match.
    pub fn contains(self, needle: impl Into<String>) -> FilterExpr<T> {
        FilterExpr::new(FilterNode::Contains {
            path: self.path,
            needle: needle.into(),
        })
    }
}

impl<T, V: FieldValue> Field<T, V> {
    pub fn eq(self, value: impl Into<V>) -> FilterExpr<T> {
        self.compare(CompareOp::Eq, value.into())
    }

    pub fn ne(self, value: impl Into<V>) -> FilterExpr<T> {
        self.compare(CompareOp::Ne, value.into())
    }

    pub fn gt(self, value: impl Into<V>) -> FilterExpr<T> {
        self.compare(CompareOp::Gt, value.into())
    }

    pub fn ge(self, value: impl Into<V>) -> FilterExpr<T> {
        self.compare(CompareOp::Ge, value.into())
    }

    pub fn lt(self, value: impl Into<V>) -> FilterExpr<T> {
        self.compare(CompareOp::Lt, value.into())
    }

    pub fn le(self, value: impl Into<V>) -> FilterExpr<T> {
        self.compare(CompareOp::Le, value.into())
    }

    pub fn is_in<I>(self, values: I) -> FilterExpr<T>
    where
        I: IntoIterator,
        I::Item: Into<V>,
    {
        FilterExpr::new(FilterNode::In {
            path: self.path,
            values: values
                .into_iter()
                .map(|value| value.into().into_sql())
                .collect(),
        })
    }

    fn compare(self, op: CompareOp, value: V) -> FilterExpr<T> {
        FilterExpr::new(FilterNode::Compare {
            path: self.path,
            op,
            value: value.into_sql(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FilterNode {
    Compare {
        path: FieldPath,
        op: CompareOp,
        value: Value,
    },
    Contains {
        path: FieldPath,
        needle: String,
    },
    In {
        path: FieldPath,
        values: Vec<Value>,
    },
    IsNull {
        path: FieldPath,
        negated: bool,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

impl FilterNode {
    /// Appends this node's SQL to `sql` and its bind values to `params`.
    fn write_sql(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Self::Compare { path, op, value } => {
                let column = path.sql();
                match (op, value) {
                    (CompareOp::Eq, Value::Null) => sql.push_str(&format!("{column} IS NULL")),
                    (CompareOp::Ne, Value::Null) => {
                        sql.push_str(&format!("{column} IS NOT NULL"))
                    }
                    _ => {
                        sql.push_str(&format!("{column} {} ?", op.sql()));
                        params.push(value.clone());
                    }
                }
            }
            Self::Contains { path, needle } => {
                sql.push_str(&format!("instr({}, ?) > 0", path.sql()));
                params.push(Value::Text(needle.clone()));
            }
            Self::In { path, values } => {
                if values.is_empty() {
                    sql.push('0');
                    return;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!("{} IN ({placeholders})", path.sql()));
                params.extend(values.iter().cloned());
            }
            Self::IsNull { path, negated } => {
                let suffix = if *negated { "IS NOT NULL" } else { "IS NULL" };
                sql.push_str(&format!("{} {suffix}", path.sql()));
            }
            Self::And(nodes) => write_joined(nodes, " AND ", "1", sql, params),
            Self::Or(nodes) => write_joined(nodes, " OR ", "0", sql, params),
            Self::Not(node) => {
                sql.push_str("NOT (");
                node.write_sql(sql, params);
                sql.push(')');
            }
        }
    }
}

fn write_joined(
    nodes: &[FilterNode],
    separator: &str,
    identity: &str,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    if nodes.is_empty() {
        sql.push_str(identity);
        return;
    }
    for (index, node) in nodes.iter().enumerate() {
        if index > 0 {
            sql.push_str(separator);
        }
        sql.push('(');
        node.write_sql(sql, params);
        sql.push(')');
    }
}

/// Typed filter expression over record type `T`.
pub struct FilterExpr<T> {
    node: FilterNode,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FilterExpr<T> {
    fn clone(&self) -> Self {
        Self::new(self.node.clone())
    }
}

impl<T> Debug for FilterExpr<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FilterExpr").field(&self.node).finish()
    }
}

impl<T> PartialEq for FilterExpr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<T> FilterExpr<T> {
    fn new(node: FilterNode) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// Conjunction of all `filters`; an empty list matches everything.
    pub fn all(filters: impl IntoIterator<Item = FilterExpr<T>>) -> Self {
        Self::new(FilterNode::And(
            filters.into_iter().map(|filter| filter.node).collect(),
        ))
    }

    /// Disjunction of all `filters`; an empty list matches nothing.
    pub fn any(filters: impl IntoIterator<Item = FilterExpr<T>>) -> Self {
        Self::new(FilterNode::Or(
            filters.into_iter().map(|filter| filter.node).collect(),
        ))
    }

    pub fn and(self, other: FilterExpr<T>) -> Self {
        Self::all([self, other])
    }

    pub fn or(self, other: FilterExpr<T>) -> Self {
        Self::any([self, other])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::new(FilterNode::Not(Box::new(self.node)))
    }

    /// Compiles to a SQL boolean expression with positional `?` parameters.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.node.write_sql(&mut sql, &mut params);
        (sql, params)
    }
}

/// Typed sort key over record type `T`.
pub struct SortKey<T> {
    path: FieldPath,
    ascending: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        Self::new(self.path, self.ascending)
    }
}

impl<T> Debug for SortKey<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortKey")
            .field("path", &self.path)
            .field("ascending", &self.ascending)
            .finish()
    }
}

impl<T> SortKey<T> {
    fn new(path: FieldPath, ascending: bool) -> Self {
        Self {
            path,
            ascending,
            _marker: PhantomData,
        }
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    pub(crate) fn to_native(&self) -> super::NativeSort {
        super::NativeSort::new(self.path.sql(), self.ascending)
    }
}
