//! The counter application reducer.
//!
//! Ports the reference counter semantics: `increase` and `decrease` move
//! the counter by an optional `amount` (default 1); anything else is an
//! unrecognized no-op.

use roomsync_core::{ReduceError, Reducer};
use roomsync_protocol::Event;
use serde_json::{json, Value};

/// Reducer for the shared counter room.
pub struct CounterReducer;

impl Reducer for CounterReducer {
    fn initial_state(&self) -> Value {
        json!({ "counter": 0 })
    }

    fn reduce(&self, state: &Value, event: &Event) -> Result<Option<Value>, ReduceError> {
        let counter = state.get("counter").and_then(Value::as_i64).unwrap_or(0);
        let amount = event.field("amount").and_then(Value::as_i64).unwrap_or(1);

        let next = match event.name.as_str() {
            "increase" => counter.checked_add(amount),
            "decrease" => counter.checked_sub(amount),
            _ => return Ok(None),
        };

        match next {
            Some(value) => Ok(Some(json!({ "counter": value }))),
            None => Err(ReduceError::new("counter out of range")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(CounterReducer.initial_state(), json!({"counter": 0}));
    }

    #[test]
    fn test_increase_defaults_to_one() {
        let patch = CounterReducer
            .reduce(&json!({"counter": 0}), &Event::new("increase", json!({})))
            .unwrap();
        assert_eq!(patch, Some(json!({"counter": 1})));
    }

    #[test]
    fn test_decrease_with_amount() {
        let patch = CounterReducer
            .reduce(
                &json!({"counter": 1}),
                &Event::new("decrease", json!({"amount": 4})),
            )
            .unwrap();
        assert_eq!(patch, Some(json!({"counter": -3})));
    }

    #[test]
    fn test_unknown_event_is_noop() {
        let patch = CounterReducer
            .reduce(&json!({"counter": 0}), &Event::new("frobnicate", json!({})))
            .unwrap();
        assert_eq!(patch, None);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let result = CounterReducer.reduce(
            &json!({"counter": i64::MAX}),
            &Event::new("increase", json!({})),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_counter_field_defaults_to_zero() {
        let patch = CounterReducer
            .reduce(&json!({}), &Event::new("increase", json!({})))
            .unwrap();
        assert_eq!(patch, Some(json!({"counter": 1})));
    }
}
