//! Puppet role handling
//!
//! Roles are given as a comma-separated list of short profile names. Each
//! must have a manifest under `puppet/zulip_ops/manifests/profile/` in the
//! checkout, and is expanded to its fully qualified Puppet class.

use crate::InstallError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Puppet class prefix for fleet profiles
pub const PROFILE_PREFIX: &str = "zulip_ops::profile::";

/// Role used when none is given
pub const DEFAULT_ROLES: &str = "base";

/// Manifest directory relative to the checkout root
const PROFILE_MANIFEST_DIR: &str = "puppet/zulip_ops/manifests/profile";

/// A validated list of roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    raw: String,
    names: Vec<String>,
}

impl RoleSet {
    /// Parse `roles` and check each one against the manifests in `checkout`
    pub fn validate(roles: &str, checkout: impl AsRef<Path>) -> Result<Self, InstallError> {
        let checkout = checkout.as_ref();
        let names: Vec<String> = roles.split(',').map(String::from).collect();

        for name in &names {
            let manifest = manifest_path(checkout, name);
            if name.is_empty() || name.contains('/') || !manifest.is_file() {
                return Err(InstallError::UnknownRole(name.clone()));
            }
            debug!("Found manifest for role {}: {}", name, manifest.display());
        }

        Ok(Self {
            raw: roles.to_string(),
            names,
        })
    }

    /// The role string as given on the command line
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Short role names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Fully qualified Puppet classes, comma-joined
    pub fn full_roles(&self) -> String {
        expand_roles(&self.names)
    }
}

/// `a,b` -> `zulip_ops::profile::a,zulip_ops::profile::b`
pub fn expand_roles<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| format!("{}{}", PROFILE_PREFIX, name.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Path of the manifest file for `role` under `checkout`
pub fn manifest_path(checkout: &Path, role: &str) -> PathBuf {
    checkout
        .join(PROFILE_MANIFEST_DIR)
        .join(format!("{}.pp", role))
}
