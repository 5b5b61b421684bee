use crate::terraform::model::{Document, Properties};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// {{ var `/self/instId` }} or {{ var "/self/instId" }}
static VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*var\s+[`"]([^`"]*)[`"]\s*\}\}"#).expect("Invalid var regex")
});

pub const VAR_INSTANCE_ID: &str = "/self/instId";
pub const VAR_LOGICAL_ID: &str = "/self/logicalId";
pub const VAR_ATTACH_ID: &str = "/self/dedicated/attachId";

/// Values available to templates inside a VM document.
#[derive(Debug, Clone, Copy)]
pub struct InstanceVars<'a> {
    pub instance_id: &'a str,
    pub logical_id: Option<&'a str>,
    pub attach_id: &'a str,
}

impl InstanceVars<'_> {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            VAR_INSTANCE_ID => Some(self.instance_id),
            VAR_LOGICAL_ID => Some(self.logical_id.unwrap_or("")),
            VAR_ATTACH_ID => Some(self.attach_id),
            _ => None,
        }
    }
}

/// Substitute known variables. Unknown references are left as written.
pub fn render_str(input: &str, vars: &InstanceVars<'_>) -> String {
    VAR_REGEX
        .replace_all(input, |caps: &regex::Captures<'_>| {
            match vars.lookup(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

pub fn render_value(value: &mut Value, vars: &InstanceVars<'_>) {
    match value {
        Value::String(s) => {
            if VAR_REGEX.is_match(s) {
                *s = render_str(s, vars);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| render_value(v, vars)),
        Value::Object(map) => map.values_mut().for_each(|v| render_value(v, vars)),
        _ => {}
    }
}

pub fn render_properties(properties: &mut Properties, vars: &InstanceVars<'_>) {
    properties
        .values_mut()
        .for_each(|v| render_value(v, vars));
}

/// Render every string value in the document.
pub fn render_document(doc: &mut Document, vars: &InstanceVars<'_>) {
    if let Some(resources) = doc.resource.as_mut() {
        for bucket in resources.values_mut() {
            for properties in bucket.values_mut() {
                render_properties(properties, vars);
            }
        }
    }
}
