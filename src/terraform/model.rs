use crate::error::{Error, Result};
use crate::terraform::providers::VmType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type ResourceType = String;
pub type ResourceName = String;

/// Property bag of a single resource definition.
pub type Properties = Map<String, Value>;

/// resource type -> resource name -> properties
pub type ResourceMap = BTreeMap<ResourceType, BTreeMap<ResourceName, Properties>>;

/// Canonical tag representation, independent of the provider's wire shape.
pub type TagMap = BTreeMap<String, String>;

/// Scope classifier on auxiliary resources, stripped before writing.
pub const PROP_SCOPE: &str = "@scope";

/// Hostname prefix on the VM resource, stripped before writing.
pub const PROP_HOSTNAME_PREFIX: &str = "@hostname_prefix";

pub const SCOPE_DEFAULT: &str = "default";
pub const SCOPE_DEDICATED: &str = "dedicated";

/// Tag on a VM document listing its dedicated/global companion documents.
pub const ATTACH_TAG: &str = "tfinstance.attach";

pub const NAME_TAG: &str = "Name";
pub const LOGICAL_ID_TAG: &str = "LogicalID";

/// A `.tf.json` document: `{"resource": {type: {name: {...}}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceMap>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            resource: Some(ResourceMap::new()),
        }
    }

    /// Parse a spec document given as JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a persisted document; the error names the offending file.
    pub fn from_slice(name: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| Error::InvalidDocument {
            name: name.to_string(),
            source,
        })
    }

    /// Two-space indented JSON, the on-disk form.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
        let mut buff = serde_json::to_vec_pretty(self)?;
        buff.push(b'\n');
        Ok(buff)
    }

    pub fn resources(&self) -> Result<&ResourceMap> {
        self.resource.as_ref().ok_or(Error::NoResourceSection)
    }

    pub fn insert(&mut self, resource_type: &str, name: &str, properties: Properties) {
        self.resource
            .get_or_insert_with(ResourceMap::new)
            .entry(resource_type.to_string())
            .or_default()
            .insert(name.to_string(), properties);
    }

    pub fn properties(&self, resource_type: &str, name: &str) -> Option<&Properties> {
        self.resource.as_ref()?.get(resource_type)?.get(name)
    }

    pub fn properties_mut(&mut self, resource_type: &str, name: &str) -> Option<&mut Properties> {
        self.resource.as_mut()?.get_mut(resource_type)?.get_mut(name)
    }

    /// Every VM type present in the document, in resource type order.
    pub fn vm_types(&self) -> Result<Vec<VmType>> {
        Ok(self
            .resources()?
            .keys()
            .filter_map(|t| VmType::from_resource_type(t))
            .collect())
    }

    /// Locate the VM resource.
    ///
    /// Returns the VM type and its first named definition, `None` when the VM
    /// bucket is empty. Fails with `NoResourceSection` or `VmNotFound`.
    pub fn find_vm(&self) -> Result<(VmType, Option<(&str, &Properties)>)> {
        let resources = self.resources()?;
        for (resource_type, bucket) in resources {
            if let Some(vm_type) = VmType::from_resource_type(resource_type) {
                let first = bucket
                    .iter()
                    .next()
                    .map(|(name, props)| (name.as_str(), props));
                return Ok((vm_type, first));
            }
        }
        Err(Error::VmNotFound)
    }

    /// True when the document has a resource section with no resources in it.
    pub fn is_empty(&self) -> bool {
        self.resource
            .as_ref()
            .map(|r| r.values().all(|bucket| bucket.is_empty()))
            .unwrap_or(true)
    }
}

/// Request to create one instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Composite resource document as JSON text.
    pub properties: String,
    #[serde(default)]
    pub tags: TagMap,
    /// Init script merged into the provider's user data property.
    #[serde(default)]
    pub init: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub logical_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(rename = "type")]
    pub attachment_type: String,
}

/// An instance as reported by describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub id: String,
    pub tags: TagMap,
    pub logical_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyContext {
    /// Permanent removal; companions nobody references any more go too.
    Termination,
    /// Replacement is coming; companions are always kept.
    RollingUpdate,
}
