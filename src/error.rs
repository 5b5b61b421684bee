use thiserror::Error;

/// Errors surfaced by the reconciler and its building blocks.
///
/// Callers match on the lookup and validation messages, keep them stable.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no resource section")]
    NoResourceSection,

    #[error("not found")]
    VmNotFound,

    #[error("no-vm-instance-in-spec")]
    NoVmInstance,

    #[error("zero or 1 vm instance per request: {0}")]
    MultipleVmTypes(String),

    #[error("Missing resource properties")]
    MissingProperties,

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Import instance ID required with import instance spec")]
    ImportIdRequired,

    #[error("Import instance spec required with import instance ID")]
    ImportSpecRequired,

    #[error("Invalid document {name}: {source}")]
    InvalidDocument {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the lookup failures a caller may treat as "nothing there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::VmNotFound | Error::InstanceNotFound(_))
    }
}
