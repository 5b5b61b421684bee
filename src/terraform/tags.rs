use crate::terraform::model::{Properties, TagMap, ATTACH_TAG};
use crate::terraform::providers::VmType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire shape of a provider's tags property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagShape {
    /// `["key:value", ...]`
    List,
    /// `{"key": "value", ...}`
    Map,
}

impl TagShape {
    pub fn codec(self) -> &'static dyn TagCodec {
        match self {
            TagShape::List => &ListTags,
            TagShape::Map => &MapTags,
        }
    }
}

/// Converts between a provider's tag representation and a [`TagMap`].
pub trait TagCodec: Send + Sync {
    /// Read tags. A value of the wrong shape yields an empty map.
    fn parse(&self, value: &Value) -> TagMap;

    /// Merge `tags` into the existing value and return the new value.
    fn merge(&self, existing: Option<&Value>, tags: &TagMap) -> Value;
}

pub struct ListTags;
pub struct MapTags;

/// Split a list token on its first colon; a bare token has an empty value.
pub fn split_token(token: &str) -> (String, String) {
    match token.split_once(':') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (token.to_string(), String::new()),
    }
}

/// List tokens can't hold commas, so the attach value is space separated there.
fn attach_value_from_list(value: &str) -> String {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

fn attach_value_to_list(value: &str) -> String {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl ListTags {
    fn parse_pairs(value: Option<&Value>) -> Vec<(String, String)> {
        let Some(Value::Array(items)) = value else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(Value::as_str)
            .map(|token| {
                let (key, mut value) = split_token(token);
                if key == ATTACH_TAG {
                    value = attach_value_from_list(&value);
                }
                (key, value)
            })
            .collect()
    }

    /// Merge ordered pairs: existing tokens keep their position, matching keys
    /// are replaced in place and new keys are appended.
    pub fn merge_pairs<I>(existing: Option<&Value>, tags: I) -> Value
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut pairs: Vec<(String, String)> = Self::parse_pairs(existing)
            .into_iter()
            .map(|(k, v)| normalize_pair(k, v))
            .collect();

        for (key, value) in tags {
            let (key, value) = normalize_pair(key, value);
            match pairs.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => pairs.push((key, value)),
            }
        }

        Value::Array(
            pairs
                .into_iter()
                .map(|(key, value)| {
                    let value = if key == ATTACH_TAG {
                        attach_value_to_list(&value)
                    } else {
                        value
                    };
                    if value.is_empty() {
                        Value::String(key)
                    } else {
                        Value::String(format!("{}:{}", key, value))
                    }
                })
                .collect(),
        )
    }
}

/// Lowercase both sides. Attach values name companion documents and keep their case.
fn normalize_pair(key: String, value: String) -> (String, String) {
    let key = key.to_lowercase();
    if key == ATTACH_TAG {
        (key, value)
    } else {
        (key, value.to_lowercase())
    }
}

impl TagCodec for ListTags {
    fn parse(&self, value: &Value) -> TagMap {
        Self::parse_pairs(Some(value)).into_iter().collect()
    }

    fn merge(&self, existing: Option<&Value>, tags: &TagMap) -> Value {
        Self::merge_pairs(existing, tags.iter().map(|(k, v)| (k.clone(), v.clone())))
    }
}

impl TagCodec for MapTags {
    fn parse(&self, value: &Value) -> TagMap {
        let Value::Object(map) = value else {
            return TagMap::new();
        };
        map.iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key.clone(), value))
            })
            .collect()
    }

    fn merge(&self, existing: Option<&Value>, tags: &TagMap) -> Value {
        let mut map = match existing {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        for (key, value) in tags {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }
}

/// Tags on a VM's properties, in canonical form.
pub fn parse_vm_tags(vm_type: VmType, properties: &Properties) -> TagMap {
    let traits = vm_type.traits();
    properties
        .get(traits.tags_property)
        .map(|value| traits.tag_shape.codec().parse(value))
        .unwrap_or_default()
}

/// Merge tags into a VM's properties using the provider's wire shape.
pub fn merge_vm_tags(vm_type: VmType, properties: &mut Properties, tags: &TagMap) {
    let traits = vm_type.traits();
    let merged = traits
        .tag_shape
        .codec()
        .merge(properties.get(traits.tags_property), tags);
    properties.insert(traits.tags_property.to_string(), merged);
}

/// Logical ID tag, looked up case-insensitively.
pub fn logical_id(tags: &TagMap) -> Option<String> {
    tags.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("logicalid"))
        .map(|(_, value)| value.clone())
}

/// Companion document names recorded in the attach tag.
pub fn attach_refs(tags: &TagMap) -> Vec<String> {
    tags.get(ATTACH_TAG)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tag_map(pairs: &[(&str, &str)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_parse() {
        let tags = ListTags.parse(&json!(["tag1:val1", "tag2:val2:more", "bare", 42]));
        assert_eq!(
            tags,
            tag_map(&[("tag1", "val1"), ("tag2", "val2:more"), ("bare", "")])
        );
    }

    #[test]
    fn test_wrong_shape_is_empty() {
        assert!(ListTags.parse(&json!({"a": "b"})).is_empty());
        assert!(MapTags.parse(&json!(["a:b"])).is_empty());
        assert!(ListTags.parse(&json!(true)).is_empty());
    }

    #[test]
    fn test_list_merge_keeps_order() {
        let merged = ListTags.merge(
            Some(&json!(["Tag2:Val2", "tag3:val3"])),
            &tag_map(&[("tag1", "val1"), ("tag2", "override")]),
        );
        assert_eq!(merged, json!(["tag2:override", "tag3:val3", "tag1:val1"]));
    }

    #[test]
    fn test_list_merge_empty_creates_list() {
        assert_eq!(ListTags.merge(None, &TagMap::new()), json!([]));
        assert_eq!(MapTags.merge(None, &TagMap::new()), json!({}));
    }

    #[test]
    fn test_empty_merge_leaves_tags_unchanged() {
        let list = json!([
            "terraform_demo_swarm_mgr_sl",
            "name:instance-1",
            "tfinstance.attach:default_dedicated_1 managers_global"
        ]);
        let merged = ListTags.merge(Some(&list), &TagMap::new());
        assert!(merged.is_array());
        assert_eq!(merged, list);

        let map = json!({
            "Name": "instance-1",
            "tfinstance.attach": "default_dedicated_1,managers_global",
            "Tier": "Web"
        });
        let merged = MapTags.merge(Some(&map), &TagMap::new());
        assert!(merged.is_object());
        assert_eq!(merged, map);
    }

    #[test]
    fn test_empty_merge_keeps_vm_tag_shape() {
        for (vm_type, tags) in [
            (VmType::SoftLayer, json!(["group:workers"])),
            (VmType::Aws, json!({"Group": "Workers"})),
        ] {
            let mut props = json!({"tags": tags.clone()}).as_object().cloned().unwrap();
            merge_vm_tags(vm_type, &mut props, &TagMap::new());
            assert_eq!(props["tags"], tags);
        }
    }

    #[test]
    fn test_map_merge_overrides() {
        let merged = MapTags.merge(
            Some(&json!({"Name": "old", "keep": "me"})),
            &tag_map(&[("Name", "new"), ("added", "v")]),
        );
        assert_eq!(merged, json!({"Name": "new", "keep": "me", "added": "v"}));
    }

    #[test]
    fn test_list_attach_tag_uses_spaces() {
        let merged = ListTags.merge(
            None,
            &tag_map(&[(ATTACH_TAG, "default_dedicated_1,managers_global")]),
        );
        assert_eq!(
            merged,
            json!(["tfinstance.attach:default_dedicated_1 managers_global"])
        );
        let parsed = ListTags.parse(&merged);
        assert_eq!(
            attach_refs(&parsed),
            vec!["default_dedicated_1", "managers_global"]
        );
    }

    #[test]
    fn test_list_attach_keeps_case() {
        let merged = ListTags.merge(None, &tag_map(&[(ATTACH_TAG, "default_dedicated_MGR1")]));
        assert_eq!(merged, json!(["tfinstance.attach:default_dedicated_MGR1"]));
    }

    #[test]
    fn test_vm_tags_roundtrip_through_properties() {
        let mut props = Properties::new();
        merge_vm_tags(
            VmType::SoftLayer,
            &mut props,
            &tag_map(&[("LogicalID", "logical-id-1"), ("Name", "instance-1234")]),
        );
        assert_eq!(
            props["tags"],
            json!(["logicalid:logical-id-1", "name:instance-1234"])
        );
        let tags = parse_vm_tags(VmType::SoftLayer, &props);
        assert_eq!(logical_id(&tags), Some("logical-id-1".to_string()));
    }

    #[test]
    fn test_logical_id_case_insensitive() {
        assert_eq!(
            logical_id(&tag_map(&[("LOGICALID", "mgr-1")])),
            Some("mgr-1".to_string())
        );
        assert_eq!(logical_id(&tag_map(&[("Name", "x")])), None);
    }
}
