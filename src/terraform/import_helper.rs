//! Import helper for adopting resources that already exist in the cloud.

use crate::error::{Error, Result};
use crate::terraform::model::{InstanceSpec, Properties};
use crate::terraform::providers::VmType;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Resources of one type known to terraform, keyed by name.
pub type ResourceIndex = BTreeMap<String, Properties>;

/// The terraform operations import relies on.
#[async_trait]
pub trait ImportBackend: Send + Sync {
    /// Resources of `vm_type` currently in state.
    async fn list_resources(&self, vm_type: VmType) -> anyhow::Result<ResourceIndex>;

    /// Bind the existing resource `external_id` to `<vm_type>.<name>`.
    async fn import(&self, vm_type: VmType, name: &str, external_id: &str) -> anyhow::Result<()>;

    /// Live attributes of the resource at `address`.
    async fn show(&self, address: &str) -> anyhow::Result<Properties>;

    /// Best effort removal of a partially imported resource.
    async fn clean(&self, vm_type: VmType, name: &str);
}

pub fn resource_address(vm_type: VmType, name: &str) -> String {
    format!("{}.{}", vm_type.resource_type(), name)
}

/// Import request: the instance spec the resource should match and its
/// external ID.
/// Either both are given or neither.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub spec: Option<InstanceSpec>,
    pub instance_id: Option<String>,
}

impl ImportOptions {
    /// The pair to import, `None` when nothing was requested.
    pub fn validate(&self) -> Result<Option<(&InstanceSpec, &str)>> {
        let id = self.instance_id.as_deref().filter(|id| !id.is_empty());
        match (&self.spec, id) {
            (Some(spec), Some(id)) => Ok(Some((spec, id))),
            (Some(_), None) => Err(Error::ImportIdRequired),
            (None, Some(_)) => Err(Error::ImportSpecRequired),
            (None, None) => Ok(None),
        }
    }
}

/// Whether a resource's `id` attribute matches an external ID.
pub fn matches_external_id(properties: &Properties, external_id: &str) -> bool {
    match properties.get("id") {
        Some(Value::String(s)) => s == external_id,
        Some(Value::Number(n)) => n.to_string() == external_id,
        _ => false,
    }
}

/// A managed resource from `terraform show -json`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownResource {
    pub address: String,
    pub resource_type: String,
    pub name: String,
    pub values: Properties,
}

/// Extract managed resources from `terraform show -json` output, child
/// modules included.
pub fn parse_show_json(output: &str) -> anyhow::Result<Vec<ShownResource>> {
    let json: Value = serde_json::from_str(output)?;
    let mut resources = Vec::new();
    let Some(root) = json.pointer("/values/root_module") else {
        return Ok(resources);
    };
    let mut modules = vec![root];
    while let Some(module) = modules.pop() {
        if let Some(items) = module.get("resources").and_then(Value::as_array) {
            for item in items {
                if item.get("mode").and_then(Value::as_str) != Some("managed") {
                    continue;
                }
                let (Some(address), Some(resource_type), Some(name)) = (
                    item.get("address").and_then(Value::as_str),
                    item.get("type").and_then(Value::as_str),
                    item.get("name").and_then(Value::as_str),
                ) else {
                    continue;
                };
                let values = item
                    .get("values")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                resources.push(ShownResource {
                    address: address.to_string(),
                    resource_type: resource_type.to_string(),
                    name: name.to_string(),
                    values,
                });
            }
        }
        if let Some(children) = module.get("child_modules").and_then(Value::as_array) {
            modules.extend(children.iter());
        }
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_import_options() {
        let spec = InstanceSpec::default();
        let both = ImportOptions {
            spec: Some(spec.clone()),
            instance_id: Some("123".into()),
        };
        assert!(both.validate().unwrap().is_some());
        assert!(ImportOptions::default().validate().unwrap().is_none());

        let no_id = ImportOptions {
            spec: Some(spec),
            instance_id: Some(String::new()),
        };
        assert!(matches!(no_id.validate(), Err(Error::ImportIdRequired)));

        let no_spec = ImportOptions {
            spec: None,
            instance_id: Some("123".into()),
        };
        assert!(matches!(no_spec.validate(), Err(Error::ImportSpecRequired)));
    }

    #[test]
    fn test_matches_external_id() {
        let props = json!({"id": "123"}).as_object().cloned().unwrap();
        assert!(matches_external_id(&props, "123"));
        let props = json!({"id": 123}).as_object().cloned().unwrap();
        assert!(matches_external_id(&props, "123"));
        assert!(!matches_external_id(&Properties::new(), "123"));
    }

    #[test]
    fn test_parse_show_json() {
        let output = json!({
            "values": {"root_module": {
                "resources": [
                    {"address": "aws_instance.instance-1", "mode": "managed", "type": "aws_instance",
                     "name": "instance-1", "values": {"id": "i-1"}},
                    {"address": "data.aws_ami.ubuntu", "mode": "data", "type": "aws_ami",
                     "name": "ubuntu", "values": {}}
                ],
                "child_modules": [{"resources": [
                    {"address": "module.m.aws_instance.x", "mode": "managed", "type": "aws_instance",
                     "name": "x", "values": {"id": "i-2"}}
                ]}]
            }}
        })
        .to_string();

        let resources = parse_show_json(&output).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].address, "aws_instance.instance-1");
        assert_eq!(resources[1].values["id"], json!("i-2"));
    }

    #[test]
    fn test_parse_show_json_empty_state() {
        assert!(parse_show_json(r#"{"format_version": "1.0"}"#)
            .unwrap()
            .is_empty());
    }
}
