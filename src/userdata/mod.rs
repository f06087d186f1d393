//! User-data generation
//!
//! The boot script handed to a new instance is a short variable header
//! followed by the checkout's `bootstrap-aws-installer`. The AWS CLI
//! bootstrap script is embedded inline right after the installer's `AWS=`
//! line, so the instance needs nothing but the user-data to get started.

use crate::InstallError;
use minijinja::{Environment, context};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Installer template relative to the checkout root
pub const INSTALLER_TEMPLATE: &str = "tools/setup/bootstrap-aws-installer";

/// Script embedded into the installer, relative to the checkout root
pub const AWSCLI_SCRIPT: &str = "tools/setup/bootstrap-awscli";

/// Lines starting with this prefix are followed by the embedded script
pub const INLINE_MARKER: &str = "AWS=";

const HEADER_TEMPLATE: &str = "#!/usr/bin/env bash
SERVER={{ server }}
HOSTNAME={{ hostname }}
FULL_ROLES={{ full_roles }}
REPO_URL={{ repo_url }}
BRANCH={{ branch }}";

/// Variables exported at the top of the boot script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootVars {
    pub server: String,
    pub hostname: String,
    pub full_roles: String,
    pub repo_url: String,
    pub branch: String,
}

/// Render the variable header, terminated by a newline
pub fn render_header(vars: &BootVars) -> Result<String, InstallError> {
    let mut env = Environment::new();
    env.add_template("header", HEADER_TEMPLATE)
        .map_err(|e| InstallError::Template(format!("Template parse error: {}", e)))?;

    let tmpl = env
        .get_template("header")
        .map_err(|e| InstallError::Template(format!("Template error: {}", e)))?;

    let mut rendered = tmpl
        .render(context! {
            server => &vars.server,
            hostname => &vars.hostname,
            full_roles => &vars.full_roles,
            repo_url => &vars.repo_url,
            branch => &vars.branch,
        })
        .map_err(|e| InstallError::Template(format!("Template render error: {}", e)))?;

    rendered.push('\n');
    Ok(rendered)
}

/// Insert `script` after every line of `template` that starts with `marker`
pub fn splice_after(template: &str, marker: &str, script: &str) -> String {
    let mut out = String::with_capacity(template.len() + script.len());

    for line in template.split_inclusive('\n') {
        out.push_str(line);
        if line.starts_with(marker) {
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(script);
            if !script.is_empty() && !script.ends_with('\n') {
                out.push('\n');
            }
        }
    }

    out
}

/// Assemble a full boot script from its parts
pub fn assemble(vars: &BootVars, installer: &str, awscli: &str) -> Result<String, InstallError> {
    let mut script = render_header(vars)?;
    script.push_str(&splice_after(installer, INLINE_MARKER, awscli));
    Ok(script)
}

/// Builds user-data from the bootstrap scripts in a checkout
#[derive(Debug, Clone)]
pub struct UserDataBuilder {
    checkout: PathBuf,
}

impl UserDataBuilder {
    /// Create a builder reading templates from `checkout`
    pub fn new(checkout: impl AsRef<Path>) -> Self {
        Self {
            checkout: checkout.as_ref().to_path_buf(),
        }
    }

    /// Path of the installer template
    pub fn installer_path(&self) -> PathBuf {
        self.checkout.join(INSTALLER_TEMPLATE)
    }

    /// Path of the embedded AWS CLI bootstrap script
    pub fn awscli_path(&self) -> PathBuf {
        self.checkout.join(AWSCLI_SCRIPT)
    }

    /// Build the boot script for `vars`
    pub async fn build(&self, vars: &BootVars) -> Result<String, InstallError> {
        let installer = read_script(&self.installer_path()).await?;
        let awscli = read_script(&self.awscli_path()).await?;

        let script = assemble(vars, &installer, &awscli)?;
        debug!("Generated {} bytes of user-data", script.len());
        Ok(script)
    }
}

async fn read_script(path: &Path) -> Result<String, InstallError> {
    fs::read_to_string(path).await.map_err(|e| {
        InstallError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars() -> BootVars {
        BootVars {
            server: "postgres0".to_string(),
            hostname: "postgres0.example.net".to_string(),
            full_roles: "zulip_ops::profile::postgresql".to_string(),
            repo_url: "git@github.com:zulip/zulip.git".to_string(),
            branch: "main".to_string(),
        }
    }

    #[test]
    fn test_render_header() {
        let header = render_header(&vars()).unwrap();
        assert_eq!(
            header,
            "#!/usr/bin/env bash\n\
             SERVER=postgres0\n\
             HOSTNAME=postgres0.example.net\n\
             FULL_ROLES=zulip_ops::profile::postgresql\n\
             REPO_URL=git@github.com:zulip/zulip.git\n\
             BRANCH=main\n"
        );
    }

    #[test]
    fn test_render_header_branch_verbatim() {
        let mut vars = vars();
        vars.branch = "feature/a&b<c>".to_string();

        let header = render_header(&vars).unwrap();
        assert!(header.contains("BRANCH=feature/a&b<c>\n"));
    }

    #[test]
    fn test_splice_after_marker() {
        let template = "set -e\nAWS=/srv/awscli\n$AWS --version\n";
        let spliced = splice_after(template, INLINE_MARKER, "install awscli\n");

        assert_eq!(
            spliced,
            "set -e\nAWS=/srv/awscli\ninstall awscli\n$AWS --version\n"
        );
    }

    #[test]
    fn test_splice_without_marker() {
        let template = "set -e\necho hi\n";
        assert_eq!(splice_after(template, INLINE_MARKER, "x\n"), template);
    }

    #[test]
    fn test_splice_marker_on_last_line() {
        let spliced = splice_after("AWS=x", INLINE_MARKER, "y");
        assert_eq!(spliced, "AWS=x\ny\n");
    }

    #[test]
    fn test_splice_ignores_indented_marker() {
        let template = "  AWS=x\n";
        assert_eq!(splice_after(template, INLINE_MARKER, "y\n"), template);
    }

    #[tokio::test]
    async fn test_builder_reads_checkout() {
        let temp = TempDir::new().unwrap();
        let setup = temp.path().join("tools/setup");
        fs::create_dir_all(&setup).await.unwrap();
        fs::write(setup.join("bootstrap-aws-installer"), "AWS=aws\nrun\n")
            .await
            .unwrap();
        fs::write(setup.join("bootstrap-awscli"), "fetch awscli\n")
            .await
            .unwrap();

        let script = UserDataBuilder::new(temp.path()).build(&vars()).await.unwrap();

        assert!(script.starts_with("#!/usr/bin/env bash\nSERVER=postgres0\n"));
        assert!(script.ends_with("BRANCH=main\nAWS=aws\nfetch awscli\nrun\n"));
    }

    #[tokio::test]
    async fn test_builder_missing_template() {
        let temp = TempDir::new().unwrap();
        let err = UserDataBuilder::new(temp.path()).build(&vars()).await.unwrap_err();

        match err {
            InstallError::Io(e) => assert!(e.to_string().contains("bootstrap-aws-installer")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
