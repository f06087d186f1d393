//! Installer configuration
//!
//! Settings come from an INI file, by default `~/.zulip-install-server.conf`:
//!
//! ```ini
//! [repo]
//! repo_url=git@github.com:zulip/zulip.git
//!
//! [aws]
//! zone_id=Z2U988IEXAMPLE
//! security_groups=sg-01234567
//! instance_type=m4.large
//! iam_profile=arn:aws:iam::123456789012:instance-profile/zulip
//! availability_zone=us-east-1a
//! disk_size=20
//!
//! [aws-postgresql]
//! instance_type=r6g.large
//! ```
//!
//! Keys in `[aws-<roles>]` override the same key in `[aws]`.

pub mod loader;

pub use loader::{ConfigLoader, default_config_path, load_config};

/// Default Ubuntu series used for the AMI lookup
pub const DEFAULT_UBUNTU_RELEASE: &str = "jammy";

/// Fully resolved installer configuration for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Git URL the new server clones its checkout from
    pub repo_url: String,

    /// AWS settings after the per-role override was applied
    pub aws: AwsSettings,
}

/// AWS launch settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsSettings {
    /// Route 53 hosted zone the hostname is registered in
    pub zone_id: String,

    /// Security groups attached to the instance
    pub security_groups: Vec<String>,

    /// EC2 instance type, e.g. `m4.large`
    pub instance_type: String,

    /// IAM instance profile ARN
    pub iam_profile: String,

    /// Placement availability zone
    pub availability_zone: String,

    /// Root volume size in GiB
    pub disk_size: u32,

    /// Region passed to every CLI call, if set
    pub region: Option<String>,

    /// Ubuntu series of the AMI (e.g. `jammy`)
    pub ubuntu_release: String,
}

/// Split a `security_groups` value on commas and whitespace
pub fn parse_security_groups(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_security_groups() {
        assert_eq!(parse_security_groups("sg-1"), vec!["sg-1"]);
        assert_eq!(
            parse_security_groups("sg-1, sg-2 sg-3"),
            vec!["sg-1", "sg-2", "sg-3"]
        );
        assert!(parse_security_groups("  ").is_empty());
    }
}
