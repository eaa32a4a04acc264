//! Boolean predicates over document fields.

use crate::error::{StorageError, StorageResult};
use docrepo_state::{State, Value};
use std::cmp::Ordering;

/// A boolean expression evaluated against one document state.
///
/// Comparisons against an absent field are false; so `NOT (a = 1)` matches
/// documents without `a` while `a <> 1` does not.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant truth value.
    Constant(bool),
    /// Field equals value (exact, variant-sensitive).
    Eq(String, Value),
    /// Field is present and differs from value.
    NotEq(String, Value),
    /// Field is less than value.
    Lt(String, Value),
    /// Field is less than or equal to value.
    Le(String, Value),
    /// Field is greater than value.
    Gt(String, Value),
    /// Field is greater than or equal to value.
    Ge(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    /// Array field contains value.
    Contains(String, Value),
    /// String field matches a `%`/`_` wildcard pattern.
    Like(String, String),
    /// Field is absent.
    IsNull(String),
    /// Field is present.
    IsNotNull(String),
    /// All operands hold.
    And(Vec<Expression>),
    /// At least one operand holds.
    Or(Vec<Expression>),
    /// Operand does not hold.
    Not(Box<Expression>),
}

impl Expression {
    /// Matches every document.
    pub fn all() -> Self {
        Expression::Constant(true)
    }

    /// Field equals value.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Eq(field.into(), value.into())
    }

    /// Field differs from value.
    pub fn not_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::NotEq(field.into(), value.into())
    }

    /// Array field contains value.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Contains(field.into(), value.into())
    }

    /// Conjunction of both expressions.
    #[must_use]
    pub fn and(self, other: Expression) -> Self {
        match self {
            Expression::And(mut operands) => {
                operands.push(other);
                Expression::And(operands)
            }
            first => Expression::And(vec![first, other]),
        }
    }

    /// Disjunction of both expressions.
    #[must_use]
    pub fn or(self, other: Expression) -> Self {
        match self {
            Expression::Or(mut operands) => {
                operands.push(other);
                Expression::Or(operands)
            }
            first => Expression::Or(vec![first, other]),
        }
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(self) -> Self {
        Expression::Not(Box::new(self))
    }

    /// Checks that the expression can be evaluated.
    ///
    /// Ordering comparisons need a scalar operand; array and object
    /// operands are rejected here, before any document is scanned.
    pub fn validate(&self) -> StorageResult<()> {
        match self {
            Expression::Lt(field, value)
            | Expression::Le(field, value)
            | Expression::Gt(field, value)
            | Expression::Ge(field, value) => {
                if value.is_scalar() {
                    Ok(())
                } else {
                    Err(StorageError::invalid_expression(format!(
                        "cannot order {field} against a non-scalar value"
                    )))
                }
            }
            Expression::And(operands) | Expression::Or(operands) => {
                operands.iter().try_for_each(Expression::validate)
            }
            Expression::Not(operand) => operand.validate(),
            _ => Ok(()),
        }
    }

    /// Evaluates the expression against a state.
    pub fn matches(&self, state: &State) -> bool {
        match self {
            Expression::Constant(b) => *b,
            Expression::Eq(field, value) => state.get(field) == Some(value),
            Expression::NotEq(field, value) => state.get(field).is_some_and(|v| v != value),
            Expression::Lt(field, value) => compare(state, field, value, Ordering::is_lt),
            Expression::Le(field, value) => compare(state, field, value, Ordering::is_le),
            Expression::Gt(field, value) => compare(state, field, value, Ordering::is_gt),
            Expression::Ge(field, value) => compare(state, field, value, Ordering::is_ge),
            Expression::In(field, values) => state.get(field).is_some_and(|v| values.contains(v)),
            Expression::Contains(field, value) => state.array_contains(field, value),
            Expression::Like(field, pattern) => state
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| like(s, pattern)),
            Expression::IsNull(field) => !state.contains_key(field),
            Expression::IsNotNull(field) => state.contains_key(field),
            Expression::And(operands) => operands.iter().all(|e| e.matches(state)),
            Expression::Or(operands) => operands.iter().any(|e| e.matches(state)),
            Expression::Not(operand) => !operand.matches(state),
        }
    }
}

fn compare(state: &State, field: &str, value: &Value, accept: fn(Ordering) -> bool) -> bool {
    state
        .get(field)
        .and_then(|v| v.partial_cmp_scalar(value))
        .is_some_and(accept)
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` any one character.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> State {
        State::with_id("d1")
            .with("title", "Annual report")
            .with("size", 12i64)
            .with("ratio", 0.5)
            .with("tags", Value::from(vec!["finance", "2024"]))
    }

    #[test]
    fn equality_and_inequality() {
        let state = doc();
        assert!(Expression::eq("size", 12i64).matches(&state));
        assert!(!Expression::eq("size", 12.0).matches(&state));
        assert!(Expression::not_eq("size", 13i64).matches(&state));
        assert!(!Expression::not_eq("missing", 1i64).matches(&state));
        assert!(Expression::eq("missing", 1i64).not().matches(&state));
    }

    #[test]
    fn ordering_comparisons() {
        let state = doc();
        assert!(Expression::Lt("size".into(), Value::Long(20)).matches(&state));
        assert!(Expression::Ge("size".into(), Value::Double(12.0)).matches(&state));
        assert!(!Expression::Gt("ratio".into(), Value::Long(1)).matches(&state));
        // mismatched kinds never match
        assert!(!Expression::Lt("title".into(), Value::Long(1)).matches(&state));
    }

    #[test]
    fn boolean_connectives() {
        let state = doc();
        let e = Expression::eq("size", 12i64).and(Expression::eq("title", "nope"));
        assert!(!e.matches(&state));
        let e = Expression::eq("size", 1i64).or(Expression::contains("tags", "finance"));
        assert!(e.matches(&state));
        assert!(Expression::And(vec![]).matches(&state));
        assert!(!Expression::Or(vec![]).matches(&state));
    }

    #[test]
    fn null_checks_and_membership() {
        let state = doc();
        assert!(Expression::IsNull("missing".into()).matches(&state));
        assert!(Expression::IsNotNull("title".into()).matches(&state));
        assert!(Expression::In("size".into(), vec![Value::Long(1), Value::Long(12)]).matches(&state));
        assert!(!Expression::contains("title", "Annual report").matches(&state));
    }

    #[test]
    fn like_patterns() {
        assert!(like("Annual report", "Annual%"));
        assert!(like("Annual report", "%report"));
        assert!(like("Annual report", "A_nual%rep_rt"));
        assert!(like("", "%"));
        assert!(!like("Annual", "Annual_"));
        assert!(!like("abc", "a%d"));
        assert!(Expression::Like("title".into(), "%nual%".into()).matches(&doc()));
    }

    #[test]
    fn validate_rejects_non_scalar_ordering() {
        let e = Expression::eq("a", 1i64).and(Expression::Lt("tags".into(), Value::from(vec![1i64])));
        assert!(matches!(
            e.validate(),
            Err(StorageError::InvalidExpression { .. })
        ));
        assert!(Expression::all().validate().is_ok());
    }
}
