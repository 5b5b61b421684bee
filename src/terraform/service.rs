use crate::terraform::import_helper::{
    parse_show_json, resource_address, ImportBackend, ResourceIndex, ShownResource,
};
use crate::terraform::model::Properties;
use crate::terraform::providers::VmType;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("Terraform command failed: {0}")]
    CommandError(String),

    #[error("Terraform binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Invalid JSON output: {0}")]
    JsonParseError(String),

    #[error("Resource not found in state: {0}")]
    ResourceNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Runs the terraform binary against the document directory.
pub struct TerraformService {
    terraform_path: PathBuf,
    project_directory: PathBuf,
}

impl TerraformService {
    pub fn new(terraform_path: PathBuf, project_directory: PathBuf) -> Self {
        debug!(
            "TerraformService initialized with terraform path: {} and project directory: {}",
            terraform_path.display(),
            project_directory.display()
        );
        Self {
            terraform_path,
            project_directory,
        }
    }

    /// Resolve the binary: an explicit path, then `TERRAFORM_BINARY_NAME`
    /// or `terraform` on `PATH`.
    pub fn locate_binary(explicit: Option<&str>) -> Result<PathBuf, TerraformError> {
        if let Some(path) = explicit {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
            return Err(TerraformError::BinaryNotFound(path.display().to_string()));
        }
        let name =
            std::env::var("TERRAFORM_BINARY_NAME").unwrap_or_else(|_| "terraform".to_string());
        which::which(&name).map_err(|_| TerraformError::BinaryNotFound(name))
    }

    async fn run(&self, args: &[&str]) -> Result<Output, TerraformError> {
        debug!("Running terraform {}", args.join(" "));
        let output = Command::new(&self.terraform_path)
            .args(args)
            .current_dir(&self.project_directory)
            .output()
            .await?;
        Ok(output)
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String, TerraformError> {
        let output = self.run(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(TerraformError::CommandError(format!(
                "terraform {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    pub async fn init(&self) -> anyhow::Result<String> {
        Ok(self.run_checked(&["init", "-input=false"]).await?)
    }

    pub async fn apply(&self, auto_approve: bool) -> anyhow::Result<String> {
        let mut args = vec!["apply", "-input=false"];
        if auto_approve {
            args.push("-auto-approve");
        }
        let stdout = self.run_checked(&args).await?;
        info!("Terraform apply finished in {}", self.project_directory.display());
        Ok(stdout)
    }

    async fn shown_resources(&self) -> Result<Vec<ShownResource>, TerraformError> {
        let stdout = self.run_checked(&["show", "-json"]).await?;
        parse_show_json(&stdout).map_err(|e| TerraformError::JsonParseError(e.to_string()))
    }
}

#[async_trait]
impl ImportBackend for TerraformService {
    async fn list_resources(&self, vm_type: VmType) -> anyhow::Result<ResourceIndex> {
        Ok(self
            .shown_resources()
            .await?
            .into_iter()
            .filter(|r| r.resource_type == vm_type.resource_type())
            .map(|r| (r.name, r.values))
            .collect())
    }

    async fn import(&self, vm_type: VmType, name: &str, external_id: &str) -> anyhow::Result<()> {
        let address = resource_address(vm_type, name);
        let output = self
            .run(&["import", "-input=false", address.as_str(), external_id])
            .await?;
        if output.status.success() {
            info!("Imported {} as {}", external_id, address);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.contains("Cannot import non-existent remote object") {
            format!("Resource '{}' does not exist in the cloud provider", external_id)
        } else if stderr.contains("Resource already managed by Terraform") {
            format!("Resource '{}' is already managed by Terraform", address)
        } else {
            format!("Import failed: {}", stderr.trim())
        };
        Err(TerraformError::CommandError(message).into())
    }

    async fn show(&self, address: &str) -> anyhow::Result<Properties> {
        self.shown_resources()
            .await?
            .into_iter()
            .find(|r| r.address == address)
            .map(|r| r.values)
            .ok_or_else(|| TerraformError::ResourceNotFound(address.to_string()).into())
    }

    async fn clean(&self, vm_type: VmType, name: &str) {
        let address = resource_address(vm_type, name);
        match self.run(&["state", "rm", address.as_str()]).await {
            Ok(output) if output.status.success() => debug!("Removed {} from state", address),
            Ok(output) => debug!(
                "Nothing to remove for {}: {}",
                address,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!("Failed to clean {}: {}", address, e),
        }
    }
}
