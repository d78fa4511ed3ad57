//! RFC 7396 JSON Merge Patch, used to lay the local config file over the
//! global one.

use serde_json::Value;

/// Apply an RFC 7396 merge patch.
///
/// Objects merge recursively, `null` deletes a key, anything else replaces.
pub fn merge_patch(target: Value, patch: Value) -> Value {
    match (target, patch) {
        (Value::Object(mut target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    target_map.remove(&key);
                    continue;
                }
                let existing = target_map.remove(&key).unwrap_or(Value::Null);
                target_map.insert(key, merge_patch(existing, patch_value));
            }
            Value::Object(target_map)
        }
        (_, patch) => patch,
    }
}
