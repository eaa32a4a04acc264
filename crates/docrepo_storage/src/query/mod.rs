//! Query evaluation: filter, order, count, paginate.
//!
//! [`execute`] is the reference algorithm behind
//! [`crate::DocumentStore::query_and_fetch`]. It is a plain linear scan with
//! no secondary indexes, kept simple so that other backends can be checked
//! against it.

mod expression;
mod order;
mod page;
mod parser;

pub use expression::Expression;
pub use order::{OrderBy, OrderByItem};
pub use page::{paginate, CountMode, PartialList, TotalSize};

use crate::error::StorageResult;
use docrepo_state::State;
use std::sync::Arc;

/// A query against a document store.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Predicate a document must satisfy.
    pub expression: Expression,
    /// Result ordering.
    pub order_by: OrderBy,
    /// Maximum page size; `0` means no limit (and no offset).
    pub limit: usize,
    /// Number of leading results to skip.
    pub offset: usize,
    /// Counting behavior for the total size.
    pub count: CountMode,
    /// Return fresh copies instead of the store's shared states.
    pub deep_copy: bool,
}

impl Query {
    /// Creates an unpaginated, exactly counted query.
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            order_by: OrderBy::none(),
            limit: 0,
            offset: 0,
            count: CountMode::Exact,
            deep_copy: false,
        }
    }

    /// Parses a textual predicate and ordering into a query.
    ///
    /// # Errors
    ///
    /// Returns `InvalidExpression` if either part fails to parse.
    pub fn parse(predicate: &str, order_by: &str) -> StorageResult<Self> {
        Ok(Self::new(Expression::parse(predicate)?).order_by(OrderBy::parse(order_by)?))
    }

    /// Sets the ordering.
    #[must_use]
    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    /// Sets limit and offset.
    #[must_use]
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Sets the counting behavior.
    #[must_use]
    pub fn count(mut self, count: CountMode) -> Self {
        self.count = count;
        self
    }

    /// Sets deep copy of results.
    #[must_use]
    pub fn deep_copy(mut self, deep_copy: bool) -> Self {
        self.deep_copy = deep_copy;
        self
    }
}

/// Runs a query over candidate states.
///
/// Candidates are expected to be pre-filtered for visibility (ignored ids).
/// Sorting is stable, so candidates that compare equal keep scan order.
///
/// # Errors
///
/// Returns `InvalidExpression` if the predicate fails validation.
pub fn execute<'a, I>(candidates: I, query: &Query) -> StorageResult<PartialList<Arc<State>>>
where
    I: IntoIterator<Item = &'a Arc<State>>,
{
    query.expression.validate()?;

    let mut matched: Vec<Arc<State>> = candidates
        .into_iter()
        .filter(|state| query.expression.matches(state))
        .map(|state| {
            if query.deep_copy {
                Arc::new(State::clone(state))
            } else {
                Arc::clone(state)
            }
        })
        .collect();

    if !query.order_by.is_empty() {
        matched.sort_by(|a, b| query.order_by.compare(a, b));
    }

    let total_size = query.count.total(matched.len());
    paginate(&mut matched, query.limit, query.offset);

    Ok(PartialList {
        items: matched,
        total_size,
    })
}
