//! AWS provider backed by the `aws` command line tool
//!
//! Each operation runs one `aws` subcommand with `--output json` and
//! deserializes the part of the response it needs.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{
    ChangeBatch, CloudProvider, LaunchRequest, image_parameter, supported_architecture,
};
use crate::InstallError;

/// Default name of the AWS CLI executable
pub const AWS_CLI: &str = "aws";

/// Provider that shells out to the AWS CLI
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    region: Option<String>,
}

impl AwsCli {
    pub fn new() -> Self {
        Self {
            program: AWS_CLI.to_string(),
            region: None,
        }
    }

    /// Use a different executable (absolute path or name on `PATH`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pass `--region` to every call
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Run one CLI call and deserialize its JSON output
    async fn call<T: DeserializeOwned>(&self, args: &[String]) -> Result<T, InstallError> {
        let mut full_args: Vec<String> = args.to_vec();
        full_args.extend(["--output".to_string(), "json".to_string()]);
        if let Some(region) = &self.region {
            full_args.extend(["--region".to_string(), region.clone()]);
        }

        // e.g. "aws ec2 run-instances"
        let description = format!("{} {}", self.program, args[..args.len().min(2)].join(" "));
        debug!("Running: {} {:?}", self.program, full_args);

        let output = Command::new(&self.program)
            .args(&full_args)
            .output()
            .await
            .map_err(|e| InstallError::command(&description, -1, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InstallError::command(
                description,
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            ));
        }

        trace!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstanceTypes {
    #[serde(default)]
    instance_types: Vec<InstanceTypeInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceTypeInfo {
    processor_info: ProcessorInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessorInfo {
    #[serde(default)]
    supported_architectures: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameters {
    #[serde(default)]
    parameters: Vec<Parameter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetHostedZone {
    hosted_zone: HostedZone,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostedZone {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListRecordSets {
    #[serde(default)]
    resource_record_sets: Vec<RecordSetName>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordSetName {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstances {
    #[serde(default)]
    instances: Vec<InstanceInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<InstanceInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceInfo {
    instance_id: String,
    #[serde(default)]
    public_dns_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeRecordSets {
    change_info: ChangeInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeInfo {
    id: String,
}

/// Route 53 returns names fully qualified
fn qualified(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

async fn write_temp(content: &str) -> Result<NamedTempFile, InstallError> {
    let file = NamedTempFile::new()?;
    tokio::fs::write(file.path(), content).await?;
    Ok(file)
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl CloudProvider for AwsCli {
    fn name(&self) -> &'static str {
        "aws-cli"
    }

    async fn instance_architecture(&self, instance_type: &str) -> Result<String, InstallError> {
        let response: DescribeInstanceTypes = self
            .call(&args(&["ec2", "describe-instance-types", "--instance-types", instance_type]))
            .await?;

        let listed = response
            .instance_types
            .into_iter()
            .next()
            .map(|info| info.processor_info.supported_architectures)
            .unwrap_or_default();

        supported_architecture(listed.as_slice())
            .map(String::from)
            .ok_or_else(|| {
                InstallError::invalid_response(
                    "describe-instance-types",
                    format!(
                        "no supported architecture for {} (listed: {:?})",
                        instance_type, listed
                    ),
                )
            })
    }

    async fn find_image(&self, architecture: &str, release: &str) -> Result<String, InstallError> {
        let parameter = image_parameter(architecture, release)?;
        let response: GetParameters = self
            .call(&args(&["ssm", "get-parameters", "--names", &parameter]))
            .await?;

        response
            .parameters
            .into_iter()
            .next()
            .map(|p| p.value)
            .ok_or_else(|| {
                InstallError::invalid_response("get-parameters", format!("no AMI at {}", parameter))
            })
    }

    async fn hosted_zone_name(&self, zone_id: &str) -> Result<String, InstallError> {
        let response: GetHostedZone = self
            .call(&args(&["route53", "get-hosted-zone", "--id", zone_id]))
            .await?;
        Ok(response.hosted_zone.name)
    }

    async fn record_exists(&self, zone_id: &str, fqdn: &str) -> Result<bool, InstallError> {
        let response: ListRecordSets = self
            .call(&args(&[
                "route53",
                "list-resource-record-sets",
                "--hosted-zone-id",
                zone_id,
            ]))
            .await?;

        let wanted = qualified(fqdn);
        Ok(response
            .resource_record_sets
            .iter()
            .any(|set| set.name.eq_ignore_ascii_case(&wanted)))
    }

    async fn launch_instance(&self, request: &LaunchRequest) -> Result<String, InstallError> {
        let user_data = write_temp(&request.user_data).await?;
        let path = user_data.path().display().to_string();

        let response: RunInstances = self.call(&request.to_cli_args(&path)).await?;

        response
            .instances
            .into_iter()
            .next()
            .map(|i| i.instance_id)
            .ok_or_else(|| InstallError::invalid_response("run-instances", "no instance returned"))
    }

    async fn public_dns_name(&self, instance_id: &str) -> Result<String, InstallError> {
        let response: DescribeInstances = self
            .call(&args(&["ec2", "describe-instances", "--instance-ids", instance_id]))
            .await?;

        let instance = response
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| {
                InstallError::invalid_response(
                    "describe-instances",
                    format!("instance {} not found", instance_id),
                )
            })?;

        Ok(instance.public_dns_name.unwrap_or_default())
    }

    async fn change_records(
        &self,
        zone_id: &str,
        batch: &ChangeBatch,
    ) -> Result<String, InstallError> {
        let batch_file = write_temp(&serde_json::to_string_pretty(batch)?).await?;
        let batch_arg = format!("file://{}", batch_file.path().display());

        let response: ChangeRecordSets = self
            .call(&args(&[
                "route53",
                "change-resource-record-sets",
                "--hosted-zone-id",
                zone_id,
                "--change-batch",
                &batch_arg,
            ]))
            .await?;

        Ok(response.change_info.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified() {
        assert_eq!(qualified("pg0.example.net"), "pg0.example.net.");
        assert_eq!(qualified("pg0.example.net."), "pg0.example.net.");
    }

    #[test]
    fn test_parse_describe_instances() {
        let json = r#"{"Reservations":[{"Instances":[{"InstanceId":"i-1","PublicDnsName":""}]}]}"#;
        let parsed: DescribeInstances = serde_json::from_str(json).unwrap();
        let instance = &parsed.reservations[0].instances[0];

        assert_eq!(instance.instance_id, "i-1");
        assert_eq!(instance.public_dns_name.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_instance_types() {
        let json = r#"{"InstanceTypes":[{"InstanceType":"m6g.large","ProcessorInfo":{
            "SupportedArchitectures":["arm64"],"SustainedClockSpeedInGhz":2.5}}]}"#;
        let parsed: DescribeInstanceTypes = serde_json::from_str(json).unwrap();

        assert_eq!(
            parsed.instance_types[0].processor_info.supported_architectures,
            vec!["arm64"]
        );
    }

    #[tokio::test]
    async fn test_missing_program() {
        let cli = AwsCli::new().with_program("/nonexistent/aws");
        let err = cli.hosted_zone_name("Z1").await.unwrap_err();

        assert!(matches!(err, InstallError::Command { status: -1, .. }));
    }
}
