//! install-aws-server - provision a role-tagged EC2 server
//!
//! Reads `~/.zulip-install-server.conf`, launches an Ubuntu instance with a
//! bootstrap script for the given Puppet roles, and registers
//! `<server>.<zone>` in Route 53.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use install_aws_server::config::default_config_path;
use install_aws_server::provider::aws::AwsCli;
use install_aws_server::provision::DEFAULT_BRANCH;
use install_aws_server::roles::DEFAULT_ROLES;
use install_aws_server::{InstallError, InstallPlan, Provisioner, ServerRequest};

#[derive(Parser)]
#[command(name = "install-aws-server")]
#[command(
    author,
    version,
    about = "Installs an empty Ubuntu server in AWS with a Zulip server role"
)]
struct Cli {
    /// Local part of the hostname (e.g. postgres0)
    server: String,

    /// Comma-separated Puppet profiles under zulip_ops::profile (e.g. postgresql)
    #[arg(long, default_value = DEFAULT_ROLES)]
    roles: String,

    /// Branch to install from
    #[arg(long, default_value = DEFAULT_BRANCH)]
    branch: String,

    /// EC2 key pair to allow SSH logins with, for debugging
    #[arg(long, value_name = "USERNAME")]
    debug_key: Option<String>,

    /// Configuration file (default: ~/.zulip-install-server.conf)
    #[arg(long, env = "INSTALL_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Root of the Zulip checkout holding the manifests and bootstrap scripts
    #[arg(long, env = "ZULIP_CHECKOUT", default_value = ".")]
    checkout: PathBuf,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG directives take precedence over -v
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// `--help` and `--version` exit 0, usage errors exit 1
fn usage_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() { 1 } else { 0 }
}

async fn run(cli: Cli) -> Result<(), InstallError> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    let request = ServerRequest::new(cli.server)
        .with_roles(cli.roles)
        .with_branch(cli.branch)
        .with_debug_key(cli.debug_key);

    let plan = InstallPlan::prepare(request, config_path, &cli.checkout).await?;

    let provider = AwsCli::new().with_region(plan.config.aws.region.clone());
    let server = Provisioner::new(&provider).install(&plan).await?;

    info!("Change {} submitted", server.change_id);
    println!(
        "Instance {} is {} ({})",
        server.instance_id, server.hostname, server.public_dns_name
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(&e));
        }
    };
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["install-aws-server", "web0"]).unwrap();

        assert_eq!(cli.server, "web0");
        assert_eq!(cli.roles, "base");
        assert_eq!(cli.branch, "main");
        assert_eq!(cli.debug_key, None);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_flags_verbatim() {
        let cli = Cli::try_parse_from([
            "install-aws-server",
            "--roles=a,b",
            "--branch=release/9.x",
            "--debug-key=alice",
            "-vv",
            "multi0",
        ])
        .unwrap();

        assert_eq!(cli.roles, "a,b");
        assert_eq!(cli.branch, "release/9.x");
        assert_eq!(cli.debug_key, Some("alice".to_string()));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_missing_server_exits_1() {
        let err = Cli::try_parse_from(["install-aws-server"]).err().unwrap();

        assert!(err.use_stderr());
        assert_eq!(usage_exit_code(&err), 1);
    }

    #[test]
    fn test_unknown_flag_exits_1() {
        let err = Cli::try_parse_from(["install-aws-server", "--bogus", "web0"])
            .err()
            .unwrap();

        assert_eq!(usage_exit_code(&err), 1);
    }

    #[test]
    fn test_help_and_version_exit_0() {
        for flag in ["--help", "--version"] {
            let err = Cli::try_parse_from(["install-aws-server", flag]).err().unwrap();

            assert!(!err.use_stderr());
            assert_eq!(usage_exit_code(&err), 0);
        }
    }
}
