//! Provisioning driver
//!
//! Runs the steps in order and stops at the first failure:
//! 1. Load configuration and validate roles (no cloud calls)
//! 2. Pick the AMI for the instance type's architecture
//! 3. Work out the hostname and make sure it is not taken
//! 4. Launch the instance with its user-data
//! 5. Wait for a public DNS name
//! 6. Register the hostname as a CNAME for it
//!
//! A launched instance is left running if a later step fails.

use crate::config::{ConfigLoader, InstallConfig};
use crate::provider::{CNAME_TTL, ChangeBatch, CloudProvider, LaunchRequest};
use crate::roles::{DEFAULT_ROLES, RoleSet};
use crate::userdata::{BootVars, UserDataBuilder};
use crate::InstallError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default branch the new server installs from
pub const DEFAULT_BRANCH: &str = "main";

/// Interval between public DNS name lookups
pub const DNS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What to install, as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRequest {
    /// Short server name, the first label of the hostname
    pub server: String,
    /// Comma-separated role names
    pub roles: String,
    /// Branch to install from
    pub branch: String,
    /// EC2 key pair allowed to log in, for debugging
    pub debug_key: Option<String>,
}

impl ServerRequest {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            roles: DEFAULT_ROLES.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            debug_key: None,
        }
    }

    pub fn with_roles(mut self, roles: impl Into<String>) -> Self {
        self.roles = roles.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_debug_key(mut self, key: Option<String>) -> Self {
        self.debug_key = key;
        self
    }
}

/// A request checked against the local configuration and checkout
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub request: ServerRequest,
    pub roles: RoleSet,
    pub config: InstallConfig,
    pub checkout: PathBuf,
}

impl InstallPlan {
    /// Load configuration and validate roles without touching the cloud
    pub async fn prepare(
        request: ServerRequest,
        config_path: impl Into<PathBuf>,
        checkout: impl AsRef<Path>,
    ) -> Result<Self, InstallError> {
        Self::prepare_with(request, ConfigLoader::new(config_path), checkout).await
    }

    /// Like [`InstallPlan::prepare`], with an explicit loader
    pub async fn prepare_with(
        request: ServerRequest,
        loader: ConfigLoader,
        checkout: impl AsRef<Path>,
    ) -> Result<Self, InstallError> {
        let checkout = checkout.as_ref();
        let config = loader.load(&request.roles).await?;
        let roles = RoleSet::validate(&request.roles, checkout)?;
        debug!("Roles {} expand to {}", roles.raw(), roles.full_roles());

        Ok(Self {
            request,
            roles,
            config,
            checkout: checkout.to_path_buf(),
        })
    }
}

/// The result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedServer {
    pub instance_id: String,
    pub hostname: String,
    pub public_dns_name: String,
    pub change_id: String,
}

/// Drives a provider through the provisioning steps
pub struct Provisioner<'a> {
    provider: &'a dyn CloudProvider,
    poll_interval: Duration,
}

impl<'a> Provisioner<'a> {
    pub fn new(provider: &'a dyn CloudProvider) -> Self {
        Self {
            provider,
            poll_interval: DNS_POLL_INTERVAL,
        }
    }

    /// Change the DNS poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run every provisioning step for `plan`
    pub async fn install(&self, plan: &InstallPlan) -> Result<ProvisionedServer, InstallError> {
        let aws = &plan.config.aws;
        let request = &plan.request;
        info!("Provisioning {} via {}", request.server, self.provider.name());

        let architecture = self.provider.instance_architecture(&aws.instance_type).await?;
        let image_id = self
            .provider
            .find_image(&architecture, &aws.ubuntu_release)
            .await?;
        info!("Using {} ({}) for {}", image_id, architecture, aws.instance_type);

        let zone_name = self.provider.hosted_zone_name(&aws.zone_id).await?;
        let hostname = hostname_in_zone(&request.server, &zone_name);
        if self.provider.record_exists(&aws.zone_id, &hostname).await? {
            return Err(InstallError::HostnameExists(hostname));
        }

        let vars = BootVars {
            server: request.server.clone(),
            hostname: hostname.clone(),
            full_roles: plan.roles.full_roles(),
            repo_url: plan.config.repo_url.clone(),
            branch: request.branch.clone(),
        };
        let user_data = UserDataBuilder::new(&plan.checkout).build(&vars).await?;

        let launch = LaunchRequest {
            server: request.server.clone(),
            roles: plan.roles.raw().to_string(),
            image_id,
            instance_type: aws.instance_type.clone(),
            iam_profile: aws.iam_profile.clone(),
            security_groups: aws.security_groups.clone(),
            availability_zone: aws.availability_zone.clone(),
            disk_size: aws.disk_size,
            user_data,
            key_name: request.debug_key.clone(),
        };
        let instance_id = self.provider.launch_instance(&launch).await?;
        info!("Launched {} as {}", hostname, instance_id);

        let public_dns_name = self.wait_for_dns_name(&instance_id).await?;
        info!("{} has public DNS name {}", instance_id, public_dns_name);

        let batch = ChangeBatch::create_cname(&hostname, &public_dns_name, CNAME_TTL);
        let change_id = self.provider.change_records(&aws.zone_id, &batch).await?;
        info!("Submitted CNAME change {}", change_id);

        Ok(ProvisionedServer {
            instance_id,
            hostname,
            public_dns_name,
            change_id,
        })
    }

    /// Poll until the instance has a public DNS name
    ///
    /// There is no timeout: this waits as long as the provider takes.
    async fn wait_for_dns_name(&self, instance_id: &str) -> Result<String, InstallError> {
        loop {
            let name = self.provider.public_dns_name(instance_id).await?;
            if !name.is_empty() {
                return Ok(name);
            }
            info!("(waiting for public DNS name)");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// `<server>.<zone>` with the zone's trailing dot removed
pub fn hostname_in_zone(server: &str, zone_name: &str) -> String {
    let zone = zone_name.strip_suffix('.').unwrap_or(zone_name);
    format!("{}.{}", server, zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;

    #[test]
    fn test_hostname_in_zone() {
        assert_eq!(hostname_in_zone("pg0", "example.net."), "pg0.example.net");
        assert_eq!(hostname_in_zone("pg0", "example.net"), "pg0.example.net");
    }

    #[test]
    fn test_request_defaults() {
        let request = ServerRequest::new("web0");

        assert_eq!(request.roles, "base");
        assert_eq!(request.branch, "main");
        assert_eq!(request.debug_key, None);
        assert_eq!(DNS_POLL_INTERVAL, Duration::from_secs(1));
    }

    #[test]
    fn test_provisioner_polls_every_second() {
        let mock = MockProvider::new();
        assert_eq!(Provisioner::new(&mock).poll_interval, Duration::from_secs(1));

        let fast = Provisioner::new(&mock).with_poll_interval(Duration::from_millis(5));
        assert_eq!(fast.poll_interval, Duration::from_millis(5));
    }
}
