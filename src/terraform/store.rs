use crate::error::{Error, Result};
use crate::terraform::model::{Document, Properties};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Suffix of documents terraform picks up.
pub const APPLIED_SUFFIX: &str = ".tf.json";
/// Suffix of documents written but not yet applied.
pub const STAGED_SUFFIX: &str = ".tf.json.new";

/// Decoded documents keyed by file name, suffix included.
pub type CurrentFiles = BTreeMap<String, Document>;

/// Documents to write, keyed by base name.
pub type FileMap = BTreeMap<String, Document>;

/// resource type -> VM name -> properties
pub type VmIndex = BTreeMap<String, BTreeMap<String, Properties>>;

pub fn applied_name(base: &str) -> String {
    format!("{}{}", base, APPLIED_SUFFIX)
}

pub fn staged_name(base: &str) -> String {
    format!("{}{}", base, STAGED_SUFFIX)
}

/// Base name of a document file, `None` for anything else.
pub fn base_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(STAGED_SUFFIX)
        .or_else(|| file_name.strip_suffix(APPLIED_SUFFIX))
        .filter(|base| !base.is_empty())
}

/// Flat file storage holding the documents.
pub trait DocumentStore: Send + Sync {
    /// Human readable location, used in logs.
    fn location(&self) -> String;
    fn list(&self) -> Result<Vec<String>>;
    fn read(&self, name: &str) -> Result<Vec<u8>>;
    /// Replace the file atomically.
    fn write(&self, name: &str, contents: &[u8]) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
    fn exists(&self, name: &str) -> Result<bool>;
    fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// Documents in a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl DocumentStore for DirStore {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.dir.join(name))?)
    }

    fn write(&self, name: &str, contents: &[u8]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.flush()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        tmp.persist(self.dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        Ok(std::fs::remove_file(self.dir.join(name))?)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.dir.join(name).try_exists()?)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        Ok(std::fs::rename(self.dir.join(from), self.dir.join(to))?)
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A panic while holding the lock leaves the map itself intact.
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn not_found(name: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} not found", name),
    ))
}

impl DocumentStore for MemoryStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.files().keys().cloned().collect())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.files().get(name).cloned().ok_or_else(|| not_found(name))
    }

    fn write(&self, name: &str, contents: &[u8]) -> Result<()> {
        self.files().insert(name.to_string(), contents.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.files()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.files().contains_key(name))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files();
        let contents = files.remove(from).ok_or_else(|| not_found(from))?;
        files.insert(to.to_string(), contents);
        Ok(())
    }
}

/// Decode every applied and staged document. A file that fails to decode
/// fails the whole listing.
pub fn list_current_files(store: &dyn DocumentStore) -> Result<CurrentFiles> {
    let mut current = CurrentFiles::new();
    for name in store.list()? {
        if base_name(&name).is_none() {
            continue;
        }
        let bytes = store.read(&name)?;
        current.insert(name.clone(), Document::from_slice(&name, &bytes)?);
    }
    debug!("Found {} documents in {}", current.len(), store.location());
    Ok(current)
}

/// Every VM in the store, grouped by resource type and name.
///
/// Documents without a VM are skipped. A document with an empty resource
/// section is an error.
pub fn scan_local_vms(store: &dyn DocumentStore) -> Result<VmIndex> {
    let mut index = VmIndex::new();
    for (name, doc) in list_current_files(store)? {
        let resources = doc.resources()?;
        if resources.is_empty() {
            return Err(Error::VmNotFound);
        }
        match doc.find_vm() {
            Ok((vm_type, _)) => {
                if let Some(bucket) = resources.get(vm_type.resource_type()) {
                    let entry = index.entry(vm_type.resource_type().to_string()).or_default();
                    for (vm_name, props) in bucket {
                        entry.insert(vm_name.clone(), props.clone());
                    }
                }
            }
            Err(Error::VmNotFound) => debug!("No VM in {}", name),
            Err(e) => return Err(e),
        }
    }
    Ok(index)
}

/// Stage each document as `<base>.tf.json.new` and remove the stale files
/// listed in `stale`.
pub fn write_documents(
    store: &dyn DocumentStore,
    files: &FileMap,
    stale: &BTreeSet<String>,
) -> Result<()> {
    let mut written = BTreeSet::new();
    for (base, doc) in files {
        let name = staged_name(base);
        store.write(&name, &doc.to_json_pretty()?)?;
        info!("Wrote {} to {}", name, store.location());
        written.insert(name);
    }
    for name in stale {
        if written.contains(name) {
            continue;
        }
        if store.exists(name)? {
            store.remove(name)?;
            debug!("Removed stale document {}", name);
        }
    }
    Ok(())
}

/// Load the document for an instance ID, trying the applied file first.
///
/// Returns the document and the file name it was read from.
pub fn find_instance_document(store: &dyn DocumentStore, id: &str) -> Result<(Document, String)> {
    for name in [applied_name(id), staged_name(id)] {
        if store.exists(&name)? {
            let doc = Document::from_slice(&name, &store.read(&name)?)?;
            // The document has to carry a VM.
            doc.find_vm()?;
            return Ok((doc, name));
        }
    }
    Err(Error::InstanceNotFound(id.to_string()))
}

/// Remove both the applied and the staged file of a base name. Returns
/// whether anything was removed.
pub fn remove_document(store: &dyn DocumentStore, base: &str) -> Result<bool> {
    let mut removed = false;
    for name in [applied_name(base), staged_name(base)] {
        if store.exists(&name)? {
            store.remove(&name)?;
            info!("Removed {} from {}", name, store.location());
            removed = true;
        }
    }
    Ok(removed)
}

/// True if either file of the base name exists.
pub fn document_exists(store: &dyn DocumentStore, base: &str) -> Result<bool> {
    Ok(store.exists(&applied_name(base))? || store.exists(&staged_name(base))?)
}

/// Rename every staged document to its applied name. Returns the promoted
/// base names.
pub fn promote_staged(store: &dyn DocumentStore) -> Result<Vec<String>> {
    let mut promoted = Vec::new();
    for name in store.list()? {
        if let Some(base) = name.strip_suffix(STAGED_SUFFIX) {
            store.rename(&name, &applied_name(base))?;
            promoted.push(base.to_string());
        }
    }
    if !promoted.is_empty() {
        info!("Promoted {} staged documents", promoted.len());
    }
    Ok(promoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn vm_doc(vm_type: &str, name: &str) -> Document {
        let mut doc = Document::new();
        doc.insert(vm_type, name, json!({"k": "v"}).as_object().cloned().unwrap());
        doc
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("instance-1.tf.json"), Some("instance-1"));
        assert_eq!(base_name("instance-1.tf.json.new"), Some("instance-1"));
        assert_eq!(base_name("terraform.tfstate"), None);
        assert_eq!(base_name(".tf.json"), None);
    }

    #[test]
    fn test_write_documents_deterministic() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path());
        let mut files = FileMap::new();
        files.insert("instance-1".to_string(), vm_doc("aws_instance", "instance-1"));

        write_documents(&store, &files, &BTreeSet::new()).unwrap();
        let first = std::fs::read(dir.path().join("instance-1.tf.json.new")).unwrap();
        write_documents(&store, &files, &BTreeSet::new()).unwrap();
        let second = std::fs::read(dir.path().join("instance-1.tf.json.new")).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list().unwrap(), vec!["instance-1.tf.json.new"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dir_store_write_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path());
        store.write("instance-1.tf.json.new", b"{}").unwrap();
        let mode = std::fs::metadata(dir.path().join("instance-1.tf.json.new"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_write_documents_removes_stale_twin() {
        let store = MemoryStore::new();
        store.write("managers_global.tf.json", b"{}").unwrap();
        let mut files = FileMap::new();
        files.insert("managers_global".to_string(), Document::new());
        let stale: BTreeSet<String> = ["managers_global.tf.json".to_string()].into();

        write_documents(&store, &files, &stale).unwrap();
        assert_eq!(store.list().unwrap(), vec!["managers_global.tf.json.new"]);
    }

    #[test]
    fn test_write_documents_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path().join("gone"));
        let mut files = FileMap::new();
        files.insert("instance-1".to_string(), Document::new());
        assert!(write_documents(&store, &files, &BTreeSet::new()).is_err());
    }

    #[test]
    fn test_list_current_files_both_suffixes() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path());
        store
            .write("a.tf.json", &vm_doc("aws_instance", "a").to_json_pretty().unwrap())
            .unwrap();
        store
            .write("b.tf.json.new", &vm_doc("aws_instance", "b").to_json_pretty().unwrap())
            .unwrap();
        store.write("terraform.tfstate", b"not a document").unwrap();

        let current = list_current_files(&store).unwrap();
        let names: Vec<&String> = current.keys().collect();
        assert_eq!(names, vec!["a.tf.json", "b.tf.json.new"]);
    }

    #[test]
    fn test_list_current_files_bad_json() {
        let store = MemoryStore::new();
        store.write("bad.tf.json", b"{").unwrap();
        assert!(list_current_files(&store).is_err());
    }

    #[test]
    fn test_scan_local_vms() {
        let store = MemoryStore::new();
        for (file, vm_type, name) in [
            ("instance-1.tf.json", "softlayer_virtual_guest", "instance-1"),
            ("instance-2.tf.json.new", "softlayer_virtual_guest", "instance-2"),
            ("instance-3.tf.json", "aws_instance", "instance-3"),
        ] {
            store
                .write(file, &vm_doc(vm_type, name).to_json_pretty().unwrap())
                .unwrap();
        }
        let mut storage = Document::new();
        storage.insert("softlayer_file_storage", "fs", Properties::new());
        store
            .write("default_dedicated_1.tf.json", &storage.to_json_pretty().unwrap())
            .unwrap();

        let index = scan_local_vms(&store).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index["softlayer_virtual_guest"].len(), 2);
        assert!(index["aws_instance"].contains_key("instance-3"));
    }

    #[test]
    fn test_scan_local_vms_empty_resource_is_error() {
        let store = MemoryStore::new();
        store
            .write("x.tf.json", &Document::new().to_json_pretty().unwrap())
            .unwrap();
        let err = scan_local_vms(&store).unwrap_err();
        assert_eq!(err.to_string(), "not found");
    }

    #[test]
    fn test_find_instance_document_by_file_name() {
        let store = MemoryStore::new();
        store
            .write(
                "instance-1234.tf.json.new",
                &vm_doc("softlayer_virtual_guest", "host").to_json_pretty().unwrap(),
            )
            .unwrap();
        let (_, name) = find_instance_document(&store, "instance-1234").unwrap();
        assert_eq!(name, "instance-1234.tf.json.new");

        let err = find_instance_document(&store, "instance-9").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_promote_staged() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path());
        store.write("instance-1.tf.json.new", b"{}").unwrap();
        store.write("instance-2.tf.json", b"{}").unwrap();

        let promoted = promote_staged(&store).unwrap();
        assert_eq!(promoted, vec!["instance-1"]);
        assert_eq!(
            store.list().unwrap(),
            vec!["instance-1.tf.json", "instance-2.tf.json"]
        );
    }

    #[test]
    fn test_remove_document_both_suffixes() {
        let store = MemoryStore::new();
        store.write("x.tf.json", b"{}").unwrap();
        store.write("x.tf.json.new", b"{}").unwrap();
        assert!(remove_document(&store, "x").unwrap());
        assert!(!remove_document(&store, "x").unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
