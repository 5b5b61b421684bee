//! Provider specific adjustments applied to a VM's properties while
//! provisioning.

use crate::terraform::model::{
    InstanceSpec, Properties, TagMap, LOGICAL_ID_TAG, NAME_TAG, PROP_HOSTNAME_PREFIX,
};
use crate::terraform::providers::{VmType, INSTANCE_LOGICAL_ID_PLACEHOLDER};
use crate::terraform::tags;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use tracing::warn;

/// Merge the caller's tags, a `Name` tag and the logical ID tag into the VM.
pub fn handle_provision_tags(
    spec: &InstanceSpec,
    id: &str,
    vm_type: VmType,
    props: &mut Properties,
) {
    let mut tags: TagMap = spec.tags.clone();
    if !tags.keys().any(|k| k.eq_ignore_ascii_case("name")) {
        tags.insert(NAME_TAG.to_string(), id.to_string());
    }
    if let Some(logical_id) = &spec.logical_id {
        tags.insert(LOGICAL_ID_TAG.to_string(), logical_id.clone());
    }
    tags::merge_vm_tags(vm_type, props, &tags);
}

/// Append `init` to the user data at `key`, after any existing user data.
pub fn add_user_data(map: &mut Map<String, Value>, key: &str, init: &str) {
    let value = match map.get(key).and_then(Value::as_str) {
        Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, init),
        _ => init.to_string(),
    };
    map.insert(key.to_string(), Value::String(value));
}

/// Merge the request's init script into the provider's user data property.
pub fn merge_init_script(spec: &InstanceSpec, vm_type: VmType, props: &mut Properties) {
    if spec.init.is_empty() {
        return;
    }
    let Some((key, parents)) = vm_type.traits().user_data_path.split_last() else {
        return;
    };
    let mut target = props;
    for parent in parents {
        let entry = target
            .entry(parent.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            warn!("Replacing non-object {} to hold user data", parent);
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        target = next;
    }
    add_user_data(target, key, &spec.init);
}

/// Hostname derivation and the logical ID private IP placeholder. Always
/// drops the hostname prefix property.
pub fn apply_platform_updates(
    vm_type: VmType,
    id: &str,
    logical_id: Option<&str>,
    props: &mut Properties,
) {
    let prefix = match props.remove(PROP_HOSTNAME_PREFIX) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    };
    let traits = vm_type.traits();

    if let Some(hostname_property) = traits.hostname_property {
        let hostname = match (prefix, logical_id) {
            (Some(prefix), Some(logical_id)) => format!("{}-{}", prefix, logical_id),
            (Some(prefix), None) => {
                format!("{}-{}", prefix, id.strip_prefix("instance-").unwrap_or(id))
            }
            (None, Some(logical_id)) => logical_id.to_string(),
            (None, None) => id.to_string(),
        };
        props.insert(hostname_property.to_string(), Value::String(hostname));
    }

    if let Some(ip_property) = traits.private_ip_property {
        let is_placeholder = props.get(ip_property).and_then(Value::as_str)
            == Some(INSTANCE_LOGICAL_ID_PLACEHOLDER);
        if is_placeholder {
            match logical_id {
                Some(logical_id) => {
                    props.insert(ip_property.to_string(), Value::String(logical_id.to_string()));
                }
                None => {
                    props.remove(ip_property);
                }
            }
        }
    }
}

/// Base64 encode the user data for providers that require it.
pub fn encode_user_data(vm_type: VmType, props: &mut Properties) {
    let traits = vm_type.traits();
    if !traits.base64_user_data {
        return;
    }
    let Some((key, parents)) = traits.user_data_path.split_last() else {
        return;
    };
    let mut target = props;
    for parent in parents {
        match target.get_mut(*parent) {
            Some(Value::Object(next)) => target = next,
            _ => return,
        }
    }
    if let Some(Value::String(data)) = target.get_mut(*key) {
        *data = STANDARD.encode(data.as_bytes());
    }
}
