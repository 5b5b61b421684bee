use crate::terraform::tags::TagShape;
use serde::{Deserialize, Serialize};
use std::fmt;

/// VM resource types the reconciler knows how to manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VmType {
    #[serde(rename = "aws_instance")]
    Aws,
    #[serde(rename = "azurerm_virtual_machine")]
    Azure,
    #[serde(rename = "digitalocean_droplet")]
    DigitalOcean,
    #[serde(rename = "google_compute_instance")]
    Google,
    #[serde(rename = "softlayer_virtual_guest")]
    SoftLayer,
    #[serde(rename = "ibm_compute_vm_instance")]
    IbmCloud,
}

/// Per-provider conventions for tags, user data and derived properties.
#[derive(Debug)]
pub struct ProviderTraits {
    pub tags_property: &'static str,
    pub tag_shape: TagShape,
    /// Path to the user data property; nested for providers that keep it in a block.
    pub user_data_path: &'static [&'static str],
    pub base64_user_data: bool,
    /// Property set from the hostname prefix or logical ID.
    pub hostname_property: Option<&'static str>,
    /// Property where the `INSTANCE_LOGICAL_ID` placeholder is honored.
    pub private_ip_property: Option<&'static str>,
}

/// Placeholder value substituted with the logical ID.
pub const INSTANCE_LOGICAL_ID_PLACEHOLDER: &str = "INSTANCE_LOGICAL_ID";

static AWS: ProviderTraits = ProviderTraits {
    tags_property: "tags",
    tag_shape: TagShape::Map,
    user_data_path: &["user_data"],
    base64_user_data: true,
    hostname_property: None,
    private_ip_property: Some("private_ip"),
};

static AZURE: ProviderTraits = ProviderTraits {
    tags_property: "tags",
    tag_shape: TagShape::Map,
    user_data_path: &["os_profile", "custom_data"],
    base64_user_data: false,
    hostname_property: None,
    private_ip_property: None,
};

static DIGITALOCEAN: ProviderTraits = ProviderTraits {
    tags_property: "tags",
    tag_shape: TagShape::Map,
    user_data_path: &["user_data"],
    base64_user_data: true,
    hostname_property: None,
    private_ip_property: None,
};

static GOOGLE: ProviderTraits = ProviderTraits {
    tags_property: "tags",
    tag_shape: TagShape::Map,
    user_data_path: &["metadata_startup_script"],
    base64_user_data: false,
    hostname_property: None,
    private_ip_property: None,
};

static SOFTLAYER: ProviderTraits = ProviderTraits {
    tags_property: "tags",
    tag_shape: TagShape::List,
    user_data_path: &["user_metadata"],
    base64_user_data: false,
    hostname_property: Some("hostname"),
    private_ip_property: None,
};

static IBMCLOUD: ProviderTraits = ProviderTraits {
    tags_property: "tags",
    tag_shape: TagShape::List,
    user_data_path: &["user_metadata"],
    base64_user_data: false,
    hostname_property: Some("hostname"),
    private_ip_property: None,
};

impl VmType {
    pub const ALL: [VmType; 6] = [
        VmType::Aws,
        VmType::Azure,
        VmType::DigitalOcean,
        VmType::Google,
        VmType::SoftLayer,
        VmType::IbmCloud,
    ];

    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.resource_type() == resource_type)
    }

    pub fn resource_type(self) -> &'static str {
        match self {
            VmType::Aws => "aws_instance",
            VmType::Azure => "azurerm_virtual_machine",
            VmType::DigitalOcean => "digitalocean_droplet",
            VmType::Google => "google_compute_instance",
            VmType::SoftLayer => "softlayer_virtual_guest",
            VmType::IbmCloud => "ibm_compute_vm_instance",
        }
    }

    pub fn traits(self) -> &'static ProviderTraits {
        match self {
            VmType::Aws => &AWS,
            VmType::Azure => &AZURE,
            VmType::DigitalOcean => &DIGITALOCEAN,
            VmType::Google => &GOOGLE,
            VmType::SoftLayer => &SOFTLAYER,
            VmType::IbmCloud => &IBMCLOUD,
        }
    }
}

impl fmt::Display for VmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}
