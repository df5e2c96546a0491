//! Query specification value.

use super::filter::{FilterExpr, SortKey};
use super::native::{NativePredicate, NativeSort};
use super::request::FetchRequest;
use crate::model::entity::Entity;
use std::fmt::{Debug, Formatter};

/// Native half of a specification: raw predicate and sort terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeSpec {
    pub predicate: Option<NativePredicate>,
    pub sort: Vec<NativeSort>,
}

/// Immutable filter + ordering + limit over record type `T`.
///
/// Built either from the typed builder (`filter`, `order_by`) or from the
/// native escape hatch (`native`). Both halves may coexist: at compile time
/// a native predicate replaces the typed filter and a non-empty native sort
/// list replaces the typed order.
pub struct QuerySpec<T> {
    filter: Option<FilterExpr<T>>,
    order: Vec<SortKey<T>>,
    native: NativeSpec,
    limit: Option<usize>,
}

impl<T> Clone for QuerySpec<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order: self.order.clone(),
            native: self.native.clone(),
            limit: self.limit,
        }
    }
}

impl<T> Debug for QuerySpec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySpec")
            .field("filter", &self.filter)
            .field("order", &self.order)
            .field("native", &self.native)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T> Default for QuerySpec<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> QuerySpec<T> {
    /// Unfiltered, unordered, unlimited.
    pub fn none() -> Self {
        Self {
            filter: None,
            order: Vec::new(),
            native: NativeSpec::default(),
            limit: None,
        }
    }

    pub fn filter(filter: FilterExpr<T>) -> Self {
        Self::none().with_filter(filter)
    }

    /// Typed construction path.
    pub fn custom(
        filter: Option<FilterExpr<T>>,
        order: impl IntoIterator<Item = SortKey<T>>,
        limit: Option<usize>,
    ) -> Self {
        Self {
            filter,
            order: order.into_iter().collect(),
            native: NativeSpec::default(),
            limit,
        }
    }

    /// Native escape-hatch construction path.
    pub fn native(
        predicate: Option<NativePredicate>,
        sort: impl IntoIterator<Item = NativeSort>,
        limit: Option<usize>,
    ) -> Self {
        Self {
            filter: None,
            order: Vec::new(),
            native: NativeSpec {
                predicate,
                sort: sort.into_iter().collect(),
            },
            limit,
        }
    }

    pub fn with_filter(mut self, filter: FilterExpr<T>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Appends a sort key after the ones already declared.
    pub fn order_by(mut self, key: SortKey<T>) -> Self {
        self.order.push(key);
        self
    }

    /// Layers a native override over the typed halves.
    pub fn with_native(mut self, native: NativeSpec) -> Self {
        self.native = native;
        self
    }

    /// Caps the number of matches; `0` means unlimited.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Effective predicate: the native one when present, else the typed filter.
    pub fn predicate(&self) -> Option<NativePredicate> {
        if let Some(predicate) = &self.native.predicate {
            return Some(predicate.clone());
        }
        self.filter.as_ref().map(|filter| {
            let (sql, params) = filter.to_sql();
            NativePredicate::new(sql, params)
        })
    }

    /// Effective sort terms: the native list when non-empty, else the typed keys.
    pub fn sort_terms(&self) -> Vec<NativeSort> {
        if !self.native.sort.is_empty() {
            return self.native.sort.clone();
        }
        self.order.iter().map(SortKey::to_native).collect()
    }
}

impl<T: Entity> QuerySpec<T> {
    /// Compiles to a native fetch request for `T`.
    ///
    /// Faulting stays enabled here; `Entity::fetch_request` switches it off.
    pub fn compile(&self) -> FetchRequest<T> {
        let mut request = FetchRequest::new();
        request.set_predicate(self.predicate());
        request.set_sort(self.sort_terms());
        request.set_limit(self.limit);
        request
    }
}
