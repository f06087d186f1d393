//! Mock provider for testing
//!
//! Answers every call from in-memory state and records what was asked, so
//! tests can check the order of calls and what got launched.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use super::{ChangeBatch, CloudProvider, LaunchRequest};
use crate::InstallError;

/// A call received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InstanceArchitecture(String),
    FindImage { architecture: String, release: String },
    HostedZoneName(String),
    RecordExists { zone_id: String, fqdn: String },
    LaunchInstance(LaunchRequest),
    PublicDnsName(String),
    ChangeRecords { zone_id: String, batch: ChangeBatch },
}

/// Mock cloud provider
///
/// # Example
/// ```
/// use install_aws_server::provider::mock::MockProvider;
///
/// let mock = MockProvider::new()
///     .with_zone_name("example.net.")
///     .with_existing_record("pg0.example.net")
///     .with_dns_after_polls(3);
/// ```
pub struct MockProvider {
    architecture: String,
    image_id: String,
    zone_name: String,
    existing_records: HashSet<String>,
    instance_id: String,
    public_dns_name: String,
    dns_after_polls: usize,
    launch_error: Option<String>,
    calls: Mutex<Vec<Call>>,
}

impl MockProvider {
    /// Create a mock with plausible defaults
    pub fn new() -> Self {
        Self {
            architecture: "x86_64".to_string(),
            image_id: "ami-0123456789abcdef0".to_string(),
            zone_name: "example.net.".to_string(),
            existing_records: HashSet::new(),
            instance_id: "i-1234567890abcdef0".to_string(),
            public_dns_name: "ec2-203-0-113-25.compute-1.amazonaws.com".to_string(),
            dns_after_polls: 0,
            launch_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the architecture reported for every instance type
    pub fn with_architecture(mut self, architecture: &str) -> Self {
        self.architecture = architecture.to_string();
        self
    }

    /// Set the hosted zone name (with trailing dot)
    pub fn with_zone_name(mut self, name: &str) -> Self {
        self.zone_name = name.to_string();
        self
    }

    /// Add a record that already exists in the zone
    pub fn with_existing_record(mut self, fqdn: &str) -> Self {
        self.existing_records.insert(fqdn.trim_end_matches('.').to_string());
        self
    }

    /// Report an empty DNS name for the first `polls` lookups
    pub fn with_dns_after_polls(mut self, polls: usize) -> Self {
        self.dns_after_polls = polls;
        self
    }

    /// Set the public DNS name assigned to the instance
    pub fn with_public_dns_name(mut self, name: &str) -> Self {
        self.public_dns_name = name.to_string();
        self
    }

    /// Make instance launch fail
    pub fn with_launch_error(mut self, error: &str) -> Self {
        self.launch_error = Some(error.to_string());
        self
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<Call> {
        self.lock().clone()
    }

    /// Launch requests received so far
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                Call::LaunchInstance(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Change batches received so far
    pub fn changes(&self) -> Vec<ChangeBatch> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                Call::ChangeRecords { batch, .. } => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of DNS name polls received so far
    pub fn dns_polls(&self) -> usize {
        self.lock()
            .iter()
            .filter(|call| matches!(call, Call::PublicDnsName(_)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Call>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: Call) {
        self.lock().push(call);
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn instance_architecture(&self, instance_type: &str) -> Result<String, InstallError> {
        self.record(Call::InstanceArchitecture(instance_type.to_string()));
        Ok(self.architecture.clone())
    }

    async fn find_image(&self, architecture: &str, release: &str) -> Result<String, InstallError> {
        self.record(Call::FindImage {
            architecture: architecture.to_string(),
            release: release.to_string(),
        });
        Ok(self.image_id.clone())
    }

    async fn hosted_zone_name(&self, zone_id: &str) -> Result<String, InstallError> {
        self.record(Call::HostedZoneName(zone_id.to_string()));
        Ok(self.zone_name.clone())
    }

    async fn record_exists(&self, zone_id: &str, fqdn: &str) -> Result<bool, InstallError> {
        self.record(Call::RecordExists {
            zone_id: zone_id.to_string(),
            fqdn: fqdn.to_string(),
        });
        Ok(self.existing_records.contains(fqdn.trim_end_matches('.')))
    }

    async fn launch_instance(&self, request: &LaunchRequest) -> Result<String, InstallError> {
        self.record(Call::LaunchInstance(request.clone()));
        if let Some(error) = &self.launch_error {
            return Err(InstallError::command("aws ec2 run-instances", 255, error.clone()));
        }
        Ok(self.instance_id.clone())
    }

    async fn public_dns_name(&self, instance_id: &str) -> Result<String, InstallError> {
        self.record(Call::PublicDnsName(instance_id.to_string()));
        if self.dns_polls() <= self.dns_after_polls {
            return Ok(String::new());
        }
        Ok(self.public_dns_name.clone())
    }

    async fn change_records(
        &self,
        zone_id: &str,
        batch: &ChangeBatch,
    ) -> Result<String, InstallError> {
        self.record(Call::ChangeRecords {
            zone_id: zone_id.to_string(),
            batch: batch.clone(),
        });
        Ok("/change/C1234567890".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dns_after_polls() {
        let mock = MockProvider::new().with_dns_after_polls(2);

        assert_eq!(mock.public_dns_name("i-1").await.unwrap(), "");
        assert_eq!(mock.public_dns_name("i-1").await.unwrap(), "");
        assert_eq!(
            mock.public_dns_name("i-1").await.unwrap(),
            "ec2-203-0-113-25.compute-1.amazonaws.com"
        );
        assert_eq!(mock.dns_polls(), 3);
    }

    #[tokio::test]
    async fn test_existing_record() {
        let mock = MockProvider::new().with_existing_record("pg0.example.net.");

        assert!(mock.record_exists("Z1", "pg0.example.net").await.unwrap());
        assert!(!mock.record_exists("Z1", "pg1.example.net").await.unwrap());
        assert_eq!(mock.calls().len(), 2);
    }
}
