use crate::config::{self, Config, DIR_ENV_VAR};
use crate::core::reconciler::Reconciler;
use crate::terraform::model::{Description, DestroyContext, InstanceSpec, TagMap};
use crate::terraform::service::TerraformService;
use crate::terraform::store::DirStore;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum TfInstanceError {
    #[error("Terraform binary not found")]
    TerraformNotFound,
}

/// Configured reconciler over a document directory.
pub struct TfInstance {
    config: Config,
    directory: PathBuf,
    reconciler: Reconciler,
}

impl TfInstance {
    pub fn new(config_path: Option<String>, dir: Option<String>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => {
                info!("Using config file: {}", path);
                config::init_from_path(&path)?
            }
            None => config::init_default()?,
        };

        let env_dir = std::env::var(DIR_ENV_VAR).ok();
        if let Some(dir) = &env_dir {
            info!("Found {} environment variable: {}", DIR_ENV_VAR, dir);
        }
        let directory = config.resolve_store_directory(dir.as_deref(), env_dir.as_deref())?;

        if !directory.exists() {
            info!("Creating document directory: {}", directory.display());
            std::fs::create_dir_all(&directory)?;
        }
        info!("Using document directory: {}", directory.display());

        let reconciler = Reconciler::new(DirStore::new(&directory));
        Ok(Self {
            config,
            directory,
            reconciler,
        })
    }

    /// Terraform runner for the document directory.
    pub fn terraform(&self) -> Result<TerraformService, TfInstanceError> {
        let path = TerraformService::locate_binary(self.config.terraform.executable_path.as_deref())
            .map_err(|_| TfInstanceError::TerraformNotFound)?;
        info!("Using Terraform binary: {}", path.display());
        Ok(TerraformService::new(path, self.directory.clone()))
    }

    pub fn validate(&self, properties: &str) -> anyhow::Result<()> {
        Ok(self.reconciler.validate(properties)?)
    }

    pub fn provision(&self, spec: &InstanceSpec) -> anyhow::Result<String> {
        Ok(self.reconciler.provision(spec)?)
    }

    pub fn destroy(&self, id: &str, context: DestroyContext) -> anyhow::Result<()> {
        Ok(self.reconciler.destroy(id, context)?)
    }

    pub fn label(&self, id: &str, labels: &TagMap) -> anyhow::Result<()> {
        Ok(self.reconciler.label(id, labels)?)
    }

    pub fn describe(&self, filter: &TagMap) -> anyhow::Result<Vec<Description>> {
        Ok(self.reconciler.describe(filter)?)
    }

    pub async fn import(&self, external_id: &str, spec: &InstanceSpec) -> anyhow::Result<String> {
        let terraform = self.terraform()?;
        Ok(self.reconciler.import(&terraform, external_id, spec).await?)
    }

    /// Promote staged documents and run `terraform apply`.
    pub async fn apply(&self) -> anyhow::Result<String> {
        let terraform = self.terraform()?;
        let promoted = self.reconciler.promote_staged()?;
        info!("Applying {} promoted documents", promoted.len());
        terraform.init().await?;
        terraform.apply(self.config.terraform.auto_approve).await
    }
}
