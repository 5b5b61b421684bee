use crate::terraform::model::Properties;
use crate::terraform::tags::{split_token, ListTags};
use serde_json::Value;

const TAGS_PROPERTY: &str = "tags";

/// Merge `source[key]` into `dest[key]`.
///
/// Scalars from the source win. Arrays are unioned by value, except a `tags`
/// array which is merged as list tags. Objects get a shallow key override.
/// On a type mismatch the source wins.
pub fn merge_property(source: &Properties, dest: &mut Properties, key: &str) {
    let Some(src) = source.get(key) else {
        return;
    };

    let merged = match (src, dest.get(key)) {
        (Value::Array(new), Some(Value::Array(_))) if key == TAGS_PROPERTY => {
            let pairs = new.iter().filter_map(Value::as_str).map(split_token);
            ListTags::merge_pairs(dest.get(key), pairs)
        }
        (Value::Array(new), Some(Value::Array(old))) => {
            let mut union = old.clone();
            for item in new {
                if !union.contains(item) {
                    union.push(item.clone());
                }
            }
            Value::Array(union)
        }
        (Value::Object(new), Some(Value::Object(old))) => {
            let mut map = old.clone();
            for (k, v) in new {
                map.insert(k.clone(), v.clone());
            }
            Value::Object(map)
        }
        _ => src.clone(),
    };

    dest.insert(key.to_string(), merged);
}
