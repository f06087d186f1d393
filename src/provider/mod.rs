//! Cloud provider operations
//!
//! Every step of provisioning is a single provider call. The trait keeps
//! the driver independent of how those calls are made, so tests can run
//! the whole sequence against [`mock::MockProvider`].

pub mod aws;
pub mod mock;

use crate::InstallError;
use async_trait::async_trait;
use serde::Serialize;

/// TTL of the CNAME record pointing at the instance
pub const CNAME_TTL: u32 = 300;

/// Root device of the Ubuntu AMIs
pub const ROOT_DEVICE: &str = "/dev/sda1";

/// Trait for the cloud provider backing the installer
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Name of this provider (e.g., "aws-cli")
    fn name(&self) -> &'static str;

    /// First architecture of `instance_type` with an Ubuntu image (e.g. `x86_64`)
    async fn instance_architecture(&self, instance_type: &str) -> Result<String, InstallError>;

    /// Current Ubuntu AMI for an architecture and release
    async fn find_image(&self, architecture: &str, release: &str) -> Result<String, InstallError>;

    /// Name of a hosted zone, including its trailing dot
    async fn hosted_zone_name(&self, zone_id: &str) -> Result<String, InstallError>;

    /// Whether any record set named `fqdn` exists in the zone
    async fn record_exists(&self, zone_id: &str, fqdn: &str) -> Result<bool, InstallError>;

    /// Launch an instance and return its ID
    async fn launch_instance(&self, request: &LaunchRequest) -> Result<String, InstallError>;

    /// Public DNS name of an instance; empty until one is assigned
    async fn public_dns_name(&self, instance_id: &str) -> Result<String, InstallError>;

    /// Submit a change batch and return the change ID
    async fn change_records(
        &self,
        zone_id: &str,
        batch: &ChangeBatch,
    ) -> Result<String, InstallError>;
}

/// Everything needed to launch one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub server: String,
    pub roles: String,
    pub image_id: String,
    pub instance_type: String,
    pub iam_profile: String,
    pub security_groups: Vec<String>,
    pub availability_zone: String,
    pub disk_size: u32,
    pub user_data: String,
    pub key_name: Option<String>,
}

impl LaunchRequest {
    /// `run-instances` arguments, with user-data read from `user_data_file`
    pub fn to_cli_args(&self, user_data_file: &str) -> Vec<String> {
        let mut args = vec![
            "ec2".to_string(),
            "run-instances".to_string(),
            "--iam-instance-profile".to_string(),
            format!("Arn={}", self.iam_profile),
            "--image-id".to_string(),
            self.image_id.clone(),
            "--instance-type".to_string(),
            self.instance_type.clone(),
            "--security-group-ids".to_string(),
        ];
        args.extend(self.security_groups.iter().cloned());
        args.extend([
            "--tag-specifications".to_string(),
            format!("ResourceType=instance,Tags={}", self.tags()),
            "--user-data".to_string(),
            format!("file://{}", user_data_file),
            "--monitoring".to_string(),
            "Enabled=true".to_string(),
            "--placement".to_string(),
            format!("AvailabilityZone={}", self.availability_zone),
            "--block-device-mappings".to_string(),
            format!(
                "DeviceName={},Ebs={{VolumeSize={},VolumeType=gp3,Encrypted=true}}",
                ROOT_DEVICE, self.disk_size
            ),
            "--metadata-options".to_string(),
            "InstanceMetadataTags=enabled".to_string(),
        ]);
        if let Some(key) = &self.key_name {
            args.extend(["--key-name".to_string(), key.clone()]);
        }
        args
    }

    /// Tag list in AWS CLI shorthand; the role value is quoted since it may hold commas
    pub fn tags(&self) -> String {
        format!(
            "[{{Key=Name,Value={}}},{{Key=role,Value=\"{}\"}}]",
            self.server, self.roles
        )
    }
}

/// Route 53 change batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeBatch {
    pub comment: String,
    pub changes: Vec<Change>,
}

/// One record change in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Change {
    pub action: String,
    pub resource_record_set: ResourceRecordSet,
}

/// A DNS record set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceRecordSet {
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    #[serde(rename = "TTL")]
    pub ttl: u32,
    pub resource_records: Vec<ResourceRecord>,
}

/// A single record value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceRecord {
    pub value: String,
}

impl ChangeBatch {
    /// Batch creating a CNAME from `hostname` to `target`
    pub fn create_cname(hostname: &str, target: &str, ttl: u32) -> Self {
        Self {
            comment: format!("Add the {} CNAME record", hostname),
            changes: vec![Change {
                action: "CREATE".to_string(),
                resource_record_set: ResourceRecordSet {
                    name: hostname.to_string(),
                    record_type: "CNAME".to_string(),
                    ttl,
                    resource_records: vec![ResourceRecord {
                        value: target.to_string(),
                    }],
                },
            }],
        }
    }
}

/// Architecture component of the Ubuntu image parameter path
pub fn image_architecture(architecture: &str) -> Result<&'static str, InstallError> {
    match architecture {
        "x86_64" => Ok("amd64"),
        "arm64" => Ok("arm64"),
        other => Err(InstallError::invalid_response(
            "describe-instance-types",
            format!("unsupported architecture '{}'", other),
        )),
    }
}

/// First listed architecture that has an Ubuntu image
///
/// Older instance families list `i386` ahead of `x86_64`.
pub fn supported_architecture<S: AsRef<str>>(listed: &[S]) -> Option<&str> {
    listed
        .iter()
        .map(S::as_ref)
        .find(|arch| image_architecture(arch).is_ok())
}

/// SSM parameter holding the current Ubuntu AMI ID
pub fn image_parameter(architecture: &str, release: &str) -> Result<String, InstallError> {
    Ok(format!(
        "/aws/service/canonical/ubuntu/server/{}/stable/current/{}/hvm/ebs-gp2/ami-id",
        release,
        image_architecture(architecture)?
    ))
}
