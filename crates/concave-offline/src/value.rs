//! Deep remap over structured payload values.
//!
//! The payload is modeled as JSON's recursive sum (`null | bool | number |
//! string | array | object`); remap rewrites only the string case,
//! recursing into arrays and objects, so that optimistic ids carried as
//! foreign keys anywhere in a nested payload are rewritten before the sync
//! handler sees them.

use std::collections::HashMap;

use serde_json::Value;

pub fn deep_remap(value: &Value, id_map: &HashMap<String, String>) -> Value {
    match value {
        Value::String(s) => match id_map.get(s) {
            Some(mapped) => Value::String(mapped.clone()),
            None => Value::String(s.clone()),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| deep_remap(v, id_map)).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), deep_remap(v, id_map))).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rewrites_only_strings_that_are_known_optimistic_ids() {
        let mut id_map = HashMap::new();
        id_map.insert("opt_cat".to_string(), "srv_cat".to_string());

        let payload = json!({
            "title": "buy milk",
            "categoryId": "opt_cat",
            "tags": ["opt_cat", "unrelated"],
            "count": 3,
            "done": false,
            "nested": {"parentId": "opt_cat"},
        });

        let remapped = deep_remap(&payload, &id_map);

        assert_eq!(remapped["categoryId"], "srv_cat");
        assert_eq!(remapped["tags"][0], "srv_cat");
        assert_eq!(remapped["tags"][1], "unrelated");
        assert_eq!(remapped["title"], "buy milk");
        assert_eq!(remapped["count"], 3);
        assert_eq!(remapped["done"], false);
        assert_eq!(remapped["nested"]["parentId"], "srv_cat");
    }

    #[test]
    fn primitives_other_than_strings_pass_through_unchanged() {
        let id_map = HashMap::new();
        let payload = json!(null);
        assert_eq!(deep_remap(&payload, &id_map), json!(null));
    }
}
