//! Structural deep merge of a sparse patch into a state object.
//!
//! Nested objects merge key-wise; every other value kind overwrites the
//! existing one. Keys present only in the existing state are kept.

use serde_json::Value;

/// Merge `patch` into `state` in place.
///
/// Total over any pair of values: when either side is not an object the
/// patch replaces the state wholesale (arrays included).
pub fn deep_merge(state: &mut Value, patch: &Value) {
    match (state, patch) {
        (Value::Object(state_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match state_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => {
                        state_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (state, patch) => *state = patch.clone(),
    }
}
