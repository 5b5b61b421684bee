use crate::error::Result;
use crate::terraform::attach;
use crate::terraform::model::{
    Document, Properties, TagMap, ATTACH_TAG, PROP_HOSTNAME_PREFIX, PROP_SCOPE, SCOPE_DEDICATED,
    SCOPE_DEFAULT,
};
use crate::terraform::providers::VmType;
use crate::terraform::store::{base_name, CurrentFiles, FileMap};
use crate::terraform::tags;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Where an auxiliary resource is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Into the VM's own document.
    Default,
    /// Into a slot document owned by one VM of the group.
    Dedicated { group: String },
    /// Into a document shared by every VM of the scope.
    Global(String),
}

impl Scope {
    pub fn parse(value: Option<&Value>) -> Self {
        let scope = match value {
            None => return Scope::Default,
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                warn!("Ignoring non-string {}: {}", PROP_SCOPE, other);
                return Scope::Default;
            }
        };
        if scope == SCOPE_DEFAULT {
            return Scope::Default;
        }
        match scope.strip_prefix(SCOPE_DEDICATED) {
            Some("") => Scope::Dedicated {
                group: SCOPE_DEFAULT.to_string(),
            },
            Some(rest) if rest.starts_with('-') => {
                let group = &rest[1..];
                Scope::Dedicated {
                    group: if group.is_empty() {
                        SCOPE_DEFAULT.to_string()
                    } else {
                        group.to_string()
                    },
                }
            }
            _ => Scope::Global(scope.to_string()),
        }
    }
}

/// A resource definition with its reserved properties parsed out.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDeclaration {
    pub scope: Scope,
    /// Non-blank string hostname prefix, if one was given.
    pub hostname_prefix: Option<String>,
    pub properties: Properties,
}

impl ResourceDeclaration {
    pub fn from_properties(mut properties: Properties) -> Self {
        let scope = Scope::parse(properties.get(PROP_SCOPE));
        properties.remove(PROP_SCOPE);
        let hostname_prefix = match properties.remove(PROP_HOSTNAME_PREFIX) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        };
        Self {
            scope,
            hostname_prefix,
            properties,
        }
    }
}

/// Output of splitting a composite spec into per-scope documents.
#[derive(Debug, Clone, Default)]
pub struct Decomposed {
    /// Documents to write, keyed by base name.
    pub files: FileMap,
    /// Slot key of the instance's dedicated documents, empty if none.
    pub dedicated_attach_key: String,
    /// Existing file names sharing a base name with an output document.
    pub current_files: BTreeSet<String>,
}

pub struct DecomposeRequest<'a> {
    pub instance_id: &'a str,
    pub logical_id: Option<&'a str>,
    pub vm_type: VmType,
    /// Final VM properties.
    pub vm_properties: Properties,
    /// The composite spec the auxiliary resources come from.
    pub spec: &'a Document,
}

/// Split the composite document into the VM's own document and its
/// dedicated and global companions, tagging the VM with the companions it
/// references.
pub fn decompose(request: DecomposeRequest<'_>, current: &CurrentFiles) -> Result<Decomposed> {
    let id = request.instance_id;
    let vm_resource_type = request.vm_type.resource_type();

    let mut vm_properties = request.vm_properties;
    vm_properties.remove(PROP_SCOPE);

    let mut files = FileMap::new();
    let mut slot_keys: BTreeMap<String, String> = BTreeMap::new();

    for (resource_type, bucket) in request.spec.resources()? {
        if resource_type == vm_resource_type {
            continue;
        }
        for (name, properties) in bucket {
            let declaration = ResourceDeclaration::from_properties(properties.clone());
            let (doc_name, resource_name) = match &declaration.scope {
                Scope::Default => (id.to_string(), format!("{}-{}", id, name)),
                Scope::Dedicated { group } => {
                    let key = slot_keys
                        .entry(group.clone())
                        .or_insert_with(|| match request.logical_id {
                            Some(logical_id) => logical_id.to_string(),
                            None => attach::allocate_slot(current, group),
                        })
                        .clone();
                    (
                        format!("{}_dedicated_{}", group, key),
                        format!("{}-{}-{}", group, key, name),
                    )
                }
                Scope::Global(scope) => {
                    (format!("{}_global", scope), format!("{}-{}", scope, name))
                }
            };
            debug!(
                "Placing {}.{} as {} in {}",
                resource_type, name, resource_name, doc_name
            );
            files
                .entry(doc_name)
                .or_insert_with(Document::new)
                .insert(resource_type, &resource_name, declaration.properties);
        }
    }

    let companions: BTreeSet<&String> = files.keys().filter(|name| name.as_str() != id).collect();
    if !companions.is_empty() {
        let value = companions
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let attach_tags: TagMap = [(ATTACH_TAG.to_string(), value)].into();
        tags::merge_vm_tags(request.vm_type, &mut vm_properties, &attach_tags);
    }

    files
        .entry(id.to_string())
        .or_insert_with(Document::new)
        .insert(vm_resource_type, id, vm_properties);

    let current_files = current
        .keys()
        .filter(|name| {
            base_name(name)
                .map(|base| files.contains_key(base))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    Ok(Decomposed {
        files,
        dedicated_attach_key: slot_keys.into_values().next().unwrap_or_default(),
        current_files,
    })
}
