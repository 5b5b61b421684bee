use crate::error::{Error, Result};
use crate::terraform::attach;
use crate::terraform::decompose::{decompose, DecomposeRequest};
use crate::terraform::import_helper::{
    matches_external_id, resource_address, ImportBackend, ImportOptions,
};
use crate::terraform::merge::merge_property;
use crate::terraform::model::{
    Description, DestroyContext, Document, InstanceSpec, Properties, TagMap, PROP_HOSTNAME_PREFIX,
    PROP_SCOPE,
};
use crate::terraform::platform;
use crate::terraform::providers::VmType;
use crate::terraform::store::{self, applied_name, DocumentStore, FileMap};
use crate::terraform::tags;
use crate::terraform::template::{self, InstanceVars};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info, warn};

/// Turns instance requests into documents in a [`DocumentStore`] and keeps
/// shared companion documents alive while any VM references them.
pub struct Reconciler {
    store: Box<dyn DocumentStore>,
    last_id: AtomicI64,
}

impl Reconciler {
    pub fn new<S: DocumentStore + 'static>(store: S) -> Self {
        Self {
            store: Box::new(store),
            last_id: AtomicI64::new(0),
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Check that the request properties parse and name at most one VM type.
    pub fn validate(&self, properties: &str) -> Result<()> {
        let doc = Document::parse(properties)?;
        let vm_types = doc.vm_types()?;
        if vm_types.len() > 1 {
            return Err(Error::MultipleVmTypes(join_types(&vm_types)));
        }
        Ok(())
    }

    /// Fresh `instance-<unix seconds>` ID unused by any document.
    pub fn next_instance_id(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let mut candidate = now.max(self.last_id.load(Ordering::SeqCst) + 1);
        loop {
            let id = format!("instance-{}", candidate);
            if !store::document_exists(self.store(), &id)? {
                self.last_id.fetch_max(candidate, Ordering::SeqCst);
                return Ok(id);
            }
            candidate += 1;
        }
    }

    /// Stage the documents for a new instance and return its ID.
    pub fn provision(&self, spec: &InstanceSpec) -> Result<String> {
        let id = self.next_instance_id()?;
        self.provision_as(spec, &id)?;
        Ok(id)
    }

    /// Provision under a caller supplied instance ID.
    pub fn provision_as(&self, spec: &InstanceSpec, id: &str) -> Result<()> {
        let doc = Document::parse(&spec.properties)?;
        let vm_types = doc.vm_types()?;
        if vm_types.len() > 1 {
            return Err(Error::MultipleVmTypes(join_types(&vm_types)));
        }
        let (vm_type, vm) = doc.find_vm()?;
        let (_, vm_properties) = vm.ok_or(Error::NoVmInstance)?;
        let logical_id = spec.logical_id.as_deref();

        let mut props = vm_properties.clone();
        platform::handle_provision_tags(spec, id, vm_type, &mut props);
        platform::merge_init_script(spec, vm_type, &mut props);
        platform::apply_platform_updates(vm_type, id, logical_id, &mut props);

        let current = store::list_current_files(self.store())?;
        let mut decomposed = decompose(
            DecomposeRequest {
                instance_id: id,
                logical_id,
                vm_type,
                vm_properties: props,
                spec: &doc,
            },
            &current,
        )?;

        if let Some(own) = decomposed.files.get_mut(id) {
            let vars = InstanceVars {
                instance_id: id,
                logical_id,
                attach_id: &decomposed.dedicated_attach_key,
            };
            template::render_document(own, &vars);
            if let Some(vm_props) = own.properties_mut(vm_type.resource_type(), id) {
                platform::encode_user_data(vm_type, vm_props);
            }
        }

        store::write_documents(self.store(), &decomposed.files, &decomposed.current_files)?;
        info!(
            "Provisioned {} ({}) with {} documents",
            id,
            vm_type,
            decomposed.files.len()
        );
        Ok(())
    }

    /// Remove an instance's document. On termination, also remove the
    /// companions no surviving VM references.
    pub fn destroy(&self, id: &str, context: DestroyContext) -> Result<()> {
        let (doc, file_name) = store::find_instance_document(self.store(), id)?;
        let refs = attach::document_refs(&doc);

        store::remove_document(self.store(), id)?;
        info!("Destroyed {} ({:?}) from {}", id, context, file_name);

        if context == DestroyContext::RollingUpdate {
            debug!("Rolling update, keeping companions of {}: {:?}", id, refs);
            return Ok(());
        }

        let current = store::list_current_files(self.store())?;
        let referenced = attach::referenced_companions(&current);
        for companion in refs {
            if referenced.contains(&companion) {
                debug!("{} still referenced, keeping it", companion);
                continue;
            }
            if store::remove_document(self.store(), &companion)? {
                info!("Removed orphaned companion {}", companion);
            }
        }
        Ok(())
    }

    /// Merge `labels` into the instance's tags, in place.
    pub fn label(&self, id: &str, labels: &TagMap) -> Result<()> {
        let (mut doc, file_name) = store::find_instance_document(self.store(), id)?;
        let (vm_type, name) = match doc.find_vm()? {
            (_, Some((_, props))) if props.is_empty() => return Err(Error::VmNotFound),
            (vm_type, Some((name, _))) => (vm_type, name.to_string()),
            (_, None) => return Err(Error::VmNotFound),
        };
        if let Some(props) = doc.properties_mut(vm_type.resource_type(), &name) {
            tags::merge_vm_tags(vm_type, props, labels);
        }
        self.store.write(&file_name, &doc.to_json_pretty()?)?;
        info!("Labelled {} with {} tags", id, labels.len());
        Ok(())
    }

    /// Every instance whose tags contain all of `filter`, sorted by ID.
    pub fn describe(&self, filter: &TagMap) -> Result<Vec<Description>> {
        let mut found = Vec::new();
        for (resource_type, vms) in store::scan_local_vms(self.store())? {
            let Some(vm_type) = VmType::from_resource_type(&resource_type) else {
                continue;
            };
            for (name, props) in vms {
                let tags = tags::parse_vm_tags(vm_type, &props);
                if filter.iter().all(|(k, v)| tags.get(k) == Some(v)) {
                    found.push(Description {
                        id: name,
                        logical_id: tags::logical_id(&tags),
                        tags,
                    });
                }
            }
        }
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    /// Import when the options request it. Returns the instance ID.
    pub async fn process_import(
        &self,
        backend: &dyn ImportBackend,
        options: &ImportOptions,
    ) -> Result<Option<String>> {
        match options.validate()? {
            Some((spec, external_id)) => Ok(Some(self.import(backend, external_id, spec).await?)),
            None => Ok(None),
        }
    }

    /// Adopt the existing resource `external_id` and stage a document for it.
    pub async fn import(
        &self,
        backend: &dyn ImportBackend,
        external_id: &str,
        spec: &InstanceSpec,
    ) -> Result<String> {
        let doc = Document::parse(&spec.properties)?;
        let (vm_type, vm) = doc.find_vm()?;
        let (_, spec_props) = vm.ok_or(Error::MissingProperties)?;

        let existing = backend.list_resources(vm_type).await?;
        if let Some((name, _)) = existing
            .iter()
            .find(|(_, props)| matches_external_id(props, external_id))
        {
            info!("{} is already managed as {}", external_id, name);
            return Ok(name.clone());
        }

        let id = self.next_instance_id()?;
        let placeholder = applied_name(&id);
        let mut stub = Document::new();
        stub.insert(vm_type.resource_type(), &id, Properties::new());
        self.store.write(&placeholder, &stub.to_json_pretty()?)?;

        let live = match self.import_live(backend, vm_type, &id, external_id).await {
            Ok(live) => live,
            Err(e) => {
                warn!("Import of {} failed: {}", external_id, e);
                backend.clean(vm_type, &id).await;
                if let Err(cleanup) = store::remove_document(self.store(), &id) {
                    warn!("Failed to remove placeholder for {}: {}", id, cleanup);
                }
                return Err(e);
            }
        };

        let props = import_properties(vm_type, spec_props, &live, &spec.tags);
        let mut own = Document::new();
        own.insert(vm_type.resource_type(), &id, props);
        let files: FileMap = [(id.clone(), own)].into();
        let stale: BTreeSet<String> = [placeholder].into();
        store::write_documents(self.store(), &files, &stale)?;

        info!("Imported {} as {}", external_id, id);
        Ok(id)
    }

    async fn import_live(
        &self,
        backend: &dyn ImportBackend,
        vm_type: VmType,
        id: &str,
        external_id: &str,
    ) -> Result<Properties> {
        backend.import(vm_type, id, external_id).await?;
        Ok(backend.show(&resource_address(vm_type, id)).await?)
    }

    /// Rename staged documents to their applied names.
    pub fn promote_staged(&self) -> Result<Vec<String>> {
        store::promote_staged(self.store())
    }
}

fn join_types(vm_types: &[VmType]) -> String {
    vm_types
        .iter()
        .map(|t| t.resource_type())
        .collect::<Vec<_>>()
        .join(",")
}

/// Properties of an imported VM: the keys the instance spec declares, with live values
/// winning, plus the caller's tags.
pub fn import_properties(
    vm_type: VmType,
    spec_props: &Properties,
    live: &Properties,
    caller_tags: &TagMap,
) -> Properties {
    let mut props = spec_props.clone();
    props.remove(PROP_SCOPE);
    let mut keys: Vec<String> = props.keys().cloned().collect();
    if props.remove(PROP_HOSTNAME_PREFIX).is_some() {
        keys.retain(|k| k != PROP_HOSTNAME_PREFIX);
        keys.push("hostname".to_string());
    }
    for key in &keys {
        merge_property(live, &mut props, key);
    }
    if !caller_tags.is_empty() {
        tags::merge_vm_tags(vm_type, &mut props, caller_tags);
    }
    props
}
