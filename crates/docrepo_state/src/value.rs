//! Dynamic field value type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A dynamic field value.
///
/// Values are tagged variants so that equality is exact: `Long(1)` and
/// `Double(1.0)` are different values, and so are `String("a")` and
/// `Reference("a")`. Ordering across variants is provided separately by
/// [`Value::cmp_total`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Text string.
    String(String),
    /// Signed integer.
    Long(i64),
    /// Floating point number.
    Double(f64),
    /// Boolean value.
    Boolean(bool),
    /// Point in time.
    Date(DateTime<Utc>),
    /// Id of another document.
    Reference(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Nested complex property.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Creates a reference to the document with the given id.
    pub fn reference(id: impl Into<String>) -> Self {
        Value::Reference(id.into())
    }

    /// Creates an array of references.
    pub fn references<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Array(ids.into_iter().map(|id| Value::Reference(id.into())).collect())
    }

    /// Compare two values with a total order.
    ///
    /// Variants are ranked (booleans, numbers, strings, references, dates,
    /// arrays, objects); within a rank values compare by content. `Long` and
    /// `Double` share a rank and compare numerically, ties broken with
    /// `Long` first so the order stays total.
    pub fn cmp_total(&self, other: &Self) -> Ordering {
        let self_rank = self.rank();
        let other_rank = other.rank();
        if self_rank != other_rank {
            return self_rank.cmp(&other_rank);
        }

        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Long(a), Value::Long(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Value::Long(a), Value::Double(b)) => {
                (*a as f64).total_cmp(b).then(Ordering::Less)
            }
            #[allow(clippy::cast_precision_loss)]
            (Value::Double(a), Value::Long(b)) => {
                a.total_cmp(&(*b as f64)).then(Ordering::Greater)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Reference(a), Value::Reference(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (av, bv) in a.iter().zip(b.iter()) {
                    let ord = av.cmp_total(bv);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => {
                for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
                    let ord = ak.cmp(bk).then_with(|| av.cmp_total(bv));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => Ordering::Equal, // same rank implies one of the arms above
        }
    }

    /// Compare two scalar values of the same kind.
    ///
    /// Returns `None` when the values are of different kinds (a string and
    /// a number, say) or when either is an array or object. Numbers of both
    /// variants are mutually comparable and `Long(1)` equals `Double(1.0)`
    /// here, unlike in [`Value::cmp_total`].
    pub fn partial_cmp_scalar(&self, other: &Self) -> Option<Ordering> {
        if !self.is_scalar() || !other.is_scalar() || self.rank() != other.rank() {
            return None;
        }
        match (self, other) {
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Long(_) | Value::Double(_), Value::Long(_) | Value::Double(_)) => {
                Some(self.as_double()?.total_cmp(&other.as_double()?))
            }
            _ => Some(self.cmp_total(other)),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Long(_) | Value::Double(_) => 1,
            Value::String(_) => 2,
            Value::Reference(_) => 3,
            Value::Date(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    /// Returns true for everything but arrays and objects.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// Get this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a referenced id, if it is a reference.
    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Value::Reference(id) => Some(id),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float; integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Long(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a date, if it is one.
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as an object, if it is one.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Long(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Long(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Object(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn equality_is_variant_sensitive() {
        assert_ne!(Value::Long(1), Value::Double(1.0));
        assert_ne!(Value::from("a"), Value::reference("a"));
        assert_eq!(Value::reference("a"), Value::Reference("a".to_string()));
    }

    #[test]
    fn numbers_compare_across_variants() {
        assert_eq!(Value::Long(2).cmp_total(&Value::Double(2.5)), Ordering::Less);
        assert_eq!(Value::Double(3.5).cmp_total(&Value::Long(3)), Ordering::Greater);
        // ties stay total
        assert_eq!(Value::Long(1).cmp_total(&Value::Double(1.0)), Ordering::Less);
        assert_eq!(Value::Double(1.0).cmp_total(&Value::Long(1)), Ordering::Greater);
    }

    #[test]
    fn ranks_order_variants() {
        let mut values = vec![
            Value::from("b"),
            Value::Long(7),
            Value::Boolean(true),
            Value::reference("x"),
            Value::from("a"),
        ];
        values.sort_by(Value::cmp_total);
        assert_eq!(
            values,
            vec![
                Value::Boolean(true),
                Value::Long(7),
                Value::from("a"),
                Value::from("b"),
                Value::reference("x"),
            ]
        );
    }

    #[test]
    fn arrays_compare_elementwise_then_by_length() {
        let short = Value::from(vec![1i64, 2]);
        let long = Value::from(vec![1i64, 2, 0]);
        let bigger = Value::from(vec![1i64, 3]);
        assert_eq!(short.cmp_total(&long), Ordering::Less);
        assert_eq!(long.cmp_total(&bigger), Ordering::Less);
    }

    #[test]
    fn scalar_comparison_requires_same_kind() {
        assert_eq!(
            Value::Long(1).partial_cmp_scalar(&Value::Double(0.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Long(2).partial_cmp_scalar(&Value::Double(2.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Long(1).partial_cmp_scalar(&Value::from("1")), None);
        assert_eq!(
            Value::from(vec![1i64]).partial_cmp_scalar(&Value::from(vec![1i64])),
            None
        );
    }

    #[test]
    fn dates_order_chronologically() {
        let early = Value::from(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let late = Value::from(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(early.cmp_total(&late), Ordering::Less);
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert_eq!(Value::reference("id").as_str(), None);
        assert_eq!(Value::reference("id").as_reference(), Some("id"));
        assert_eq!(Value::Long(42).as_long(), Some(42));
        assert_eq!(Value::Long(42).as_double(), Some(42.0));
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert!(Value::from(vec!["a"]).as_array().is_some());
        assert!(!Value::from(vec!["a"]).is_scalar());
    }

    #[test]
    fn references_builds_array() {
        let v = Value::references(["a", "b"]);
        assert_eq!(
            v,
            Value::Array(vec![Value::reference("a"), Value::reference("b")])
        );
    }

    #[test]
    fn serde_keeps_variant_tags() {
        let v = Value::reference("doc-1");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"type":"reference","value":"doc-1"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
