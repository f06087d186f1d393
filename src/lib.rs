//! install-aws-server library
//!
//! Provisions a single EC2 instance for a Puppet-managed server fleet:
//! picks an AMI, launches the instance with role tags and a bootstrap
//! user-data script, waits for its public DNS name and registers a CNAME
//! for it in Route 53.
//!
//! # Design Principles
//!
//! - **Fail fast**: every step aborts the run on error, nothing is retried
//! - **Local checks first**: configuration and roles are validated before
//!   any cloud call is made
//! - **Provider seam**: cloud calls go through [`provider::CloudProvider`],
//!   backed by the `aws` CLI in production and a mock in tests

pub mod config;
pub mod provider;
pub mod provision;
pub mod roles;
pub mod userdata;

mod error;

pub use error::InstallError;
pub use provision::{InstallPlan, ProvisionedServer, Provisioner, ServerRequest};
