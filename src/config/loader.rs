//! Configuration loader
//!
//! Reads the INI file and resolves the AWS section for a role string.

use super::{AwsSettings, DEFAULT_UBUNTU_RELEASE, InstallConfig, parse_security_groups};
use crate::InstallError;
use ini::Ini;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the configuration file under `$HOME`
pub const CONFIG_FILE_NAME: &str = ".zulip-install-server.conf";

const REPO_SECTION: &str = "repo";
const AWS_SECTION: &str = "aws";

/// `$HOME/.zulip-install-server.conf`
pub fn default_config_path() -> Result<PathBuf, InstallError> {
    let home = std::env::var_os("HOME")
        .ok_or_else(|| InstallError::Config("HOME is not set".to_string()))?;
    Ok(PathBuf::from(home).join(CONFIG_FILE_NAME))
}

/// Load the configuration file and resolve settings for `roles`
pub async fn load_config(
    path: impl AsRef<Path>,
    roles: &str,
) -> Result<InstallConfig, InstallError> {
    ConfigLoader::new(path.as_ref()).load(roles).await
}

/// Configuration loader builder
pub struct ConfigLoader {
    path: PathBuf,
    content: Option<String>,
}

impl ConfigLoader {
    /// Create a loader reading from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: None,
        }
    }

    /// Use in-memory INI content instead of reading the file
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Path this loader reads from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and resolve settings for the raw role string
    pub async fn load(self, roles: &str) -> Result<InstallConfig, InstallError> {
        let content = match self.content {
            Some(content) => content,
            None => {
                if !fs::try_exists(&self.path).await? {
                    return Err(InstallError::ConfigNotFound(self.path));
                }
                fs::read_to_string(&self.path).await?
            }
        };

        let ini = Ini::load_from_str(&content)?;
        debug!("Loaded configuration from {}", self.path.display());
        resolve(&ini, roles)
    }
}

/// Resolve the configuration for a role string from parsed INI
pub fn resolve(ini: &Ini, roles: &str) -> Result<InstallConfig, InstallError> {
    let repo_url = ini
        .get_from(Some(REPO_SECTION), "repo_url")
        .ok_or_else(|| missing(REPO_SECTION, "repo_url"))?
        .to_string();

    let lookup = SectionLookup::new(ini, roles);

    let disk_size_raw = lookup.required("disk_size")?;
    let disk_size = disk_size_raw
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|size| *size > 0)
        .ok_or_else(|| {
            InstallError::Config(format!(
                "disk_size must be a positive integer, got '{}'",
                disk_size_raw
            ))
        })?;

    let security_groups = parse_security_groups(lookup.required("security_groups")?);
    if security_groups.is_empty() {
        return Err(InstallError::Config(
            "security_groups must name at least one group".to_string(),
        ));
    }

    let aws = AwsSettings {
        zone_id: lookup.required("zone_id")?.to_string(),
        security_groups,
        instance_type: lookup.required("instance_type")?.to_string(),
        iam_profile: lookup.required("iam_profile")?.to_string(),
        availability_zone: lookup.required("availability_zone")?.to_string(),
        disk_size,
        region: lookup.optional("region").map(String::from),
        ubuntu_release: lookup
            .optional("ubuntu_release")
            .unwrap_or(DEFAULT_UBUNTU_RELEASE)
            .to_string(),
    };

    Ok(InstallConfig { repo_url, aws })
}

fn missing(section: &str, key: &str) -> InstallError {
    InstallError::Config(format!("missing key '{}' in section [{}]", key, section))
}

/// Looks keys up in `[aws-<roles>]` first, then `[aws]`
struct SectionLookup<'a> {
    ini: &'a Ini,
    role_section: String,
}

impl<'a> SectionLookup<'a> {
    fn new(ini: &'a Ini, roles: &str) -> Self {
        Self {
            ini,
            role_section: format!("{}-{}", AWS_SECTION, roles),
        }
    }

    fn optional(&self, key: &str) -> Option<&'a str> {
        if let Some(value) = self.ini.get_from(Some(self.role_section.as_str()), key) {
            debug!("Using {} from [{}]", key, self.role_section);
            return Some(value);
        }
        self.ini.get_from(Some(AWS_SECTION), key)
    }

    fn required(&self, key: &str) -> Result<&'a str, InstallError> {
        self.optional(key).ok_or_else(|| missing(AWS_SECTION, key))
    }
}
