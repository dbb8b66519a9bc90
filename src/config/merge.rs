//! Field-by-field merging of configuration tiers.
//!
//! Objects merge key by key; every other value in a higher tier replaces the lower
//! one. A `null` in a higher tier means "not specified" and keeps the lower value.

use serde_json::Value;

/// Merge `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(upper)) => {
            for (key, upper_value) in upper {
                let value = match merged.remove(&key) {
                    Some(lower_value) => deep_merge(lower_value, upper_value),
                    None => upper_value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge tiers in order; later tiers win.
pub fn deep_merge_all(tiers: impl IntoIterator<Item = Value>) -> Value {
    tiers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_keys_merge_individually() {
        let base = json!({"server": {"host": "127.0.0.1", "port": 8000}, "pagination": {"page_size": 5}});
        let overlay = json!({"server": {"port": 9000}});
        assert_eq!(
            deep_merge(base, overlay),
            json!({"server": {"host": "127.0.0.1", "port": 9000}, "pagination": {"page_size": 5}})
        );
    }

    #[test]
    fn null_keeps_lower_tier() {
        let base = json!({"delete_policy": {"position": "cascade"}});
        let overlay = json!({"delete_policy": {"position": null}});
        assert_eq!(deep_merge(base, overlay), json!({"delete_policy": {"position": "cascade"}}));
    }

    #[test]
    fn scalars_and_arrays_replace() {
        let base = json!({"a": [1, 2], "b": {"x": 1}});
        let overlay = json!({"a": [3], "b": 7});
        assert_eq!(deep_merge(base, overlay), json!({"a": [3], "b": 7}));
    }

    #[test]
    fn later_tiers_win() {
        let merged = deep_merge_all(vec![
            json!({"auth": {"bcrypt_cost": 12, "session_ttl_hours": 336}}),
            json!({"auth": {"bcrypt_cost": 10}}),
            json!({"auth": {"bcrypt_cost": 4}}),
        ]);
        assert_eq!(merged, json!({"auth": {"bcrypt_cost": 4, "session_ttl_hours": 336}}));
    }
}
