use crate::terraform::model::Document;
use crate::terraform::store::{base_name, CurrentFiles};
use crate::terraform::tags;
use std::collections::BTreeSet;
use tracing::debug;

/// Dedicated slot keys of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentKeys {
    /// Keys on disk plus keys referenced by any VM.
    pub all: BTreeSet<String>,
    /// Keys on disk that no VM references, sorted.
    pub orphans: Vec<String>,
}

pub fn dedicated_prefix(group: &str) -> String {
    format!("{}_dedicated_", group)
}

/// Companion names listed in a document's VM attach tag.
pub fn document_refs(doc: &Document) -> Vec<String> {
    match doc.find_vm() {
        Ok((vm_type, Some((_, props)))) => {
            tags::attach_refs(&tags::parse_vm_tags(vm_type, props))
        }
        _ => Vec::new(),
    }
}

/// Every companion name referenced by a VM in `current`.
pub fn referenced_companions(current: &CurrentFiles) -> BTreeSet<String> {
    current.values().flat_map(document_refs).collect()
}

pub fn find_dedicated_attachment_keys(current: &CurrentFiles, group: &str) -> AttachmentKeys {
    let prefix = dedicated_prefix(group);

    let referenced: BTreeSet<String> = referenced_companions(current)
        .iter()
        .filter_map(|name| name.strip_prefix(&prefix))
        .map(str::to_string)
        .collect();

    let on_disk: BTreeSet<String> = current
        .keys()
        .filter_map(|name| base_name(name))
        .filter_map(|base| base.strip_prefix(&prefix))
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();

    let orphans = on_disk.difference(&referenced).cloned().collect();
    let all = on_disk.union(&referenced).cloned().collect();
    AttachmentKeys { all, orphans }
}

/// Lowest candidate, compared numerically when any candidate is an integer.
pub fn lowest_orphan_index(candidates: &[String]) -> Option<String> {
    let numeric = candidates
        .iter()
        .filter_map(|c| c.parse::<u64>().ok().map(|n| (n, c)))
        .min_by_key(|(n, _)| *n)
        .map(|(_, c)| c.clone());
    numeric.or_else(|| candidates.iter().min().cloned())
}

/// Pick the slot key for a new dedicated document of `group`: the lowest
/// orphaned key if there is one, otherwise the lowest unused positive integer.
pub fn allocate_slot(current: &CurrentFiles, group: &str) -> String {
    let keys = find_dedicated_attachment_keys(current, group);
    if let Some(orphan) = lowest_orphan_index(&keys.orphans) {
        debug!("Reusing orphaned slot {} of {}", orphan, group);
        return orphan;
    }
    let mut n: u64 = 1;
    while keys.all.contains(&n.to_string()) {
        n += 1;
    }
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::model::{Properties, TagMap, ATTACH_TAG};
    use crate::terraform::providers::VmType;

    fn vm_with_attach(vm_type: &str, attach: &str) -> Document {
        let vm_type = VmType::from_resource_type(vm_type).unwrap();
        let mut props = Properties::new();
        let attach_tags: TagMap = [(ATTACH_TAG.to_string(), attach.to_string())].into();
        tags::merge_vm_tags(vm_type, &mut props, &attach_tags);
        let mut doc = Document::new();
        doc.insert(vm_type.resource_type(), "vm", props);
        doc
    }

    fn storage() -> Document {
        let mut doc = Document::new();
        doc.insert("softlayer_file_storage", "fs", Properties::new());
        doc
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_keys_with_orphans() {
        let mut current = CurrentFiles::new();
        current.insert(
            "instance-1.tf.json".into(),
            vm_with_attach("softlayer_virtual_guest", "managers_dedicated_1,managers_global"),
        );
        current.insert(
            "instance-2.tf.json.new".into(),
            vm_with_attach("aws_instance", "managers_dedicated_4"),
        );
        current.insert("managers_dedicated_1.tf.json".into(), storage());
        current.insert("managers_dedicated_2.tf.json".into(), storage());
        current.insert("managers_dedicated_3.tf.json.new".into(), storage());
        current.insert("workers_dedicated_7.tf.json".into(), storage());

        let keys = find_dedicated_attachment_keys(&current, "managers");
        assert_eq!(keys.orphans, strings(&["2", "3"]));
        assert_eq!(
            keys.all.into_iter().collect::<Vec<_>>(),
            strings(&["1", "2", "3", "4"])
        );
    }

    #[test]
    fn test_keys_no_group_match() {
        let mut current = CurrentFiles::new();
        current.insert(
            "instance-1.tf.json".into(),
            vm_with_attach("aws_instance", "mangers_global"),
        );
        current.insert("managers_dedicated_1.tf.json".into(), storage());
        let keys = find_dedicated_attachment_keys(&current, "scopeID");
        assert_eq!(keys, AttachmentKeys::default());
    }

    #[test]
    fn test_lowest_orphan_index() {
        assert_eq!(
            lowest_orphan_index(&strings(&["8", "9", "10", "a"])),
            Some("8".to_string())
        );
        assert_eq!(
            lowest_orphan_index(&strings(&["zulu", "alpha", "beta"])),
            Some("alpha".to_string())
        );
        assert_eq!(lowest_orphan_index(&[]), None);
    }

    #[test]
    fn test_allocate_slot() {
        let mut current = CurrentFiles::new();
        assert_eq!(allocate_slot(&current, "default"), "1");

        current.insert(
            "instance-1.tf.json".into(),
            vm_with_attach("aws_instance", "default_dedicated_1"),
        );
        current.insert("default_dedicated_1.tf.json".into(), storage());
        assert_eq!(allocate_slot(&current, "default"), "2");

        current.insert("default_dedicated_5.tf.json".into(), storage());
        assert_eq!(allocate_slot(&current, "default"), "5");
    }
}
