//! Result ordering.

use crate::error::{StorageError, StorageResult};
use docrepo_state::State;
use std::cmp::Ordering;

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByItem {
    /// Field to sort on.
    pub field: String,
    /// Sort descending instead of ascending.
    pub descending: bool,
}

/// An ordered list of sort keys; earlier keys take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
    items: Vec<OrderByItem>,
}

impl OrderBy {
    /// No ordering.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Appends an ascending key.
    #[must_use]
    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.items.push(OrderByItem {
            field: field.into(),
            descending: false,
        });
        self
    }

    /// Appends a descending key.
    #[must_use]
    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.items.push(OrderByItem {
            field: field.into(),
            descending: true,
        });
        self
    }

    /// Parses `field [ASC|DESC], ...`.
    ///
    /// An empty string yields no ordering.
    ///
    /// # Errors
    ///
    /// Returns `InvalidExpression` on an empty key or unknown direction.
    pub fn parse(input: &str) -> StorageResult<Self> {
        let mut order = Self::none();
        if input.trim().is_empty() {
            return Ok(order);
        }
        for clause in input.split(',') {
            let mut words = clause.split_whitespace();
            let field = words
                .next()
                .ok_or_else(|| StorageError::invalid_expression("empty ORDER BY key"))?;
            let descending = match words.next().map(str::to_ascii_uppercase).as_deref() {
                None | Some("ASC") => false,
                Some("DESC") => true,
                Some(other) => {
                    return Err(StorageError::invalid_expression(format!(
                        "unknown sort direction '{other}'"
                    )))
                }
            };
            if let Some(extra) = words.next() {
                return Err(StorageError::invalid_expression(format!(
                    "unexpected '{extra}' in ORDER BY"
                )));
            }
            order.items.push(OrderByItem {
                field: field.to_string(),
                descending,
            });
        }
        Ok(order)
    }

    /// Returns the sort keys.
    pub fn items(&self) -> &[OrderByItem] {
        &self.items
    }

    /// Returns true if there is nothing to sort on.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Compares two states key by key.
    ///
    /// An absent field sorts before any present value (after, when
    /// descending). Present values use [`docrepo_state::Value::cmp_total`].
    pub fn compare(&self, a: &State, b: &State) -> Ordering {
        for item in &self.items {
            let ord = match (a.get(&item.field), b.get(&item.field)) {
                (Some(x), Some(y)) => x.cmp_total(y),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return if item.descending { ord.reverse() } else { ord };
            }
        }
        Ordering::Equal
    }
}
