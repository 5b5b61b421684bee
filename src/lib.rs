// Re-export modules for testing and external use
pub mod error;

pub mod shared {
    pub mod logging;
}

pub mod terraform {
    pub mod attach;
    pub mod decompose;
    pub mod import_helper;
    pub mod merge;
    pub mod model;
    pub mod platform;
    pub mod providers;
    pub mod service;
    pub mod store;
    pub mod tags;
    pub mod template;
}

pub mod core {
    pub mod reconciler;
    pub mod tfinstance;
}

pub mod config;

// Re-export commonly used types for easier testing and external use
pub use core::reconciler::Reconciler;
pub use core::tfinstance::TfInstance;
pub use error::{Error, Result};
pub use terraform::import_helper::{ImportBackend, ImportOptions};
pub use terraform::model::{Description, DestroyContext, Document, InstanceSpec, TagMap};
pub use terraform::providers::VmType;
pub use terraform::service::TerraformService;
pub use terraform::store::{DirStore, DocumentStore, MemoryStore};
