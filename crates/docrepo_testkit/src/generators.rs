//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use docrepo_state::keys::KEY_ID;
use docrepo_state::{State, Value};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for generating document ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f0-9]{8}").expect("Invalid regex")
}

/// Strategy for generating sibling names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,11}").expect("Invalid regex")
}

/// Strategy for generating user field names (never a reserved key).
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("f_[a-z]{1,6}").expect("Invalid regex")
}

/// Strategy for generating scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::string::string_regex("[a-zA-Z ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::String),
        any::<i64>().prop_map(Value::Long),
        (-1.0e6..1.0e6f64).prop_map(Value::Double),
        any::<bool>().prop_map(Value::Boolean),
        id_strategy().prop_map(Value::Reference),
    ]
}

/// Strategy for generating values, arrays and nested objects included.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(Value::Object),
        ]
    })
}

/// Strategy for generating a state with the given id and a few user fields.
pub fn state_strategy(id: String) -> impl Strategy<Value = State> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..6).prop_map(
        move |fields| {
            let mut state = State::with_id(id.as_str());
            for (key, value) in fields {
                state.set(key, value);
            }
            state
        },
    )
}

/// Strategy for generating states with distinct ids.
pub fn states_strategy(max: usize) -> impl Strategy<Value = Vec<State>> {
    prop::collection::btree_set(id_strategy(), 0..=max).prop_flat_map(|ids: BTreeSet<String>| {
        ids.into_iter().map(state_strategy).collect::<Vec<_>>()
    })
}

/// Strategy for generating states carrying an integer `size` field.
pub fn sized_states_strategy(max: usize) -> impl Strategy<Value = Vec<State>> {
    (
        prop::collection::btree_set(id_strategy(), 0..=max),
        prop::collection::vec(0i64..100, max),
    )
        .prop_map(|(ids, sizes)| {
            ids.into_iter()
                .zip(sizes)
                .map(|(id, size)| State::with_id(id).with("size", size))
                .collect()
        })
}

/// Strategy for generating page windows as `(limit, offset)`.
pub fn page_strategy() -> impl Strategy<Value = (usize, usize)> {
    (0usize..8, 0usize..12)
}

/// Returns true if every state in `states` has a distinct id.
pub fn ids_are_unique(states: &[State]) -> bool {
    let mut seen = BTreeSet::new();
    states
        .iter()
        .all(|state| state.get(KEY_ID).is_some() && seen.insert(state.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrepo_state::keys::is_system_key;

    proptest! {
        #[test]
        fn generated_states_have_unique_ids(states in states_strategy(10)) {
            prop_assert!(ids_are_unique(&states));
        }

        #[test]
        fn field_names_are_never_reserved(name in field_name_strategy()) {
            prop_assert!(!is_system_key(&name));
        }

        #[test]
        fn sized_states_carry_size(states in sized_states_strategy(6)) {
            for state in &states {
                prop_assert!(state.get("size").and_then(Value::as_long).is_some());
            }
        }
    }
}
