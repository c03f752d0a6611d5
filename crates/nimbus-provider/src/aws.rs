//! `aws` CLI backend.
//!
//! Each provider operation runs one `aws ec2 ...` child process with
//! JSON output. Credentials from `nimbus.toml` are passed to the child
//! through its environment and never logged.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use nimbus_core::config::ProviderSection;
use nimbus_core::{Instance, InstanceState};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{CloudProvider, LaunchRequest, Reservation};
use crate::record::RawRecord;

/// Provider backed by the AWS command line tool.
#[derive(Debug, Clone)]
pub struct AwsCliProvider {
    program: String,
    region: String,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
}

impl AwsCliProvider {
    pub fn new(section: &ProviderSection) -> Self {
        Self {
            program: "aws".to_string(),
            region: section.region.clone(),
            access_key_id: section.access_key_id.clone(),
            secret_access_key: section.secret_access_key.clone(),
        }
    }

    /// Use a different executable (e.g. a wrapper script).
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    async fn run(&self, args: &[String]) -> ProviderResult<Vec<u8>> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("ec2")
            .args(args)
            .arg("--output")
            .arg("json")
            .env("AWS_DEFAULT_REGION", &self.region);
        if let Some(key) = &self.access_key_id {
            cmd.env("AWS_ACCESS_KEY_ID", key);
        }
        if let Some(secret) = &self.secret_access_key {
            cmd.env("AWS_SECRET_ACCESS_KEY", secret);
        }

        debug!(program = %self.program, ?args, "running provider command");
        let output = cmd.output().await.map_err(|source| ProviderError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ProviderError::Command {
                command: format!("{} ec2 {}", self.program, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl CloudProvider for AwsCliProvider {
    async fn launch_instances(&self, request: &LaunchRequest) -> ProviderResult<Reservation> {
        let args = vec![
            "run-instances".to_string(),
            "--image-id".to_string(),
            request.image_id.clone(),
            "--count".to_string(),
            format!("{}:{}", request.min_count, request.max_count),
            "--key-name".to_string(),
            request.key_name.clone(),
        ];
        let stdout = self.run(&args).await?;
        let reservation: ReservationJson = parse_json(&stdout)?;
        Ok(reservation.into_reservation())
    }

    async fn describe_instances(&self) -> ProviderResult<Vec<RawRecord>> {
        let stdout = self.run(&["describe-instances".to_string()]).await?;
        let output: DescribeJson = parse_json(&stdout)?;
        Ok(output.into_records())
    }

    async fn terminate_instances(&self, ids: &[String]) -> ProviderResult<()> {
        let mut args = vec!["terminate-instances".to_string(), "--instance-ids".to_string()];
        args.extend(ids.iter().cloned());
        self.run(&args).await?;
        Ok(())
    }
}

fn parse_json<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> ProviderResult<T> {
    serde_json::from_slice(bytes).map_err(|e| ProviderError::Parse(e.to_string()))
}

// ── Response shapes ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeJson {
    #[serde(default)]
    reservations: Vec<ReservationJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReservationJson {
    reservation_id: String,
    #[serde(default)]
    owner_id: String,
    #[serde(default)]
    instances: Vec<InstanceJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceJson {
    instance_id: String,
    image_id: String,
    #[serde(default)]
    public_dns_name: String,
    #[serde(default)]
    private_dns_name: String,
    state: StateJson,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StateJson {
    name: String,
}

impl InstanceJson {
    fn to_instance(&self) -> Instance {
        Instance {
            id: self.instance_id.clone(),
            image_id: self.image_id.clone(),
            public_addr: self.public_dns_name.clone(),
            private_addr: self.private_dns_name.clone(),
            state: InstanceState::parse(&self.state.name),
        }
    }
}

impl ReservationJson {
    fn into_reservation(self) -> Reservation {
        Reservation {
            instances: self.instances.iter().map(InstanceJson::to_instance).collect(),
            id: self.reservation_id,
        }
    }
}

impl DescribeJson {
    fn into_records(self) -> Vec<RawRecord> {
        let mut records = Vec::new();
        for reservation in &self.reservations {
            records.push(RawRecord::reservation(
                &reservation.reservation_id,
                &reservation.owner_id,
            ));
            for instance in &reservation.instances {
                records.push(RawRecord::instance(&instance.to_instance()));
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE: &str = r#"{
      "Reservations": [
        {
          "ReservationId": "r-1",
          "OwnerId": "123456789012",
          "Instances": [
            {
              "InstanceId": "i-aaa",
              "ImageId": "ami-master",
              "PublicDnsName": "ec2-1.compute-1.amazonaws.com",
              "PrivateDnsName": "ip-10-0-0-1.ec2.internal",
              "State": { "Code": 16, "Name": "running" }
            }
          ]
        },
        {
          "ReservationId": "r-2",
          "OwnerId": "123456789012",
          "Instances": [
            {
              "InstanceId": "i-bbb",
              "ImageId": "ami-worker",
              "PublicDnsName": "",
              "PrivateDnsName": "",
              "State": { "Code": 0, "Name": "pending" }
            }
          ]
        }
      ]
    }"#;

    #[test]
    fn describe_json_becomes_tagged_rows() {
        let output: DescribeJson = parse_json(DESCRIBE.as_bytes()).unwrap();
        let records = output.into_records();
        let tags: Vec<_> = records.iter().map(|r| r.tag().to_string()).collect();
        assert_eq!(tags, vec!["RESERVATION", "INSTANCE", "RESERVATION", "INSTANCE"]);

        let master = records[1].to_instance().unwrap();
        assert_eq!(master.id, "i-aaa");
        assert_eq!(master.private_addr, "ip-10-0-0-1.ec2.internal");
        assert_eq!(master.state, InstanceState::Running);

        let worker = records[3].to_instance().unwrap();
        assert_eq!(worker.state, InstanceState::Pending);
        assert_eq!(worker.public_addr, "");
    }

    #[test]
    fn empty_describe_has_no_rows() {
        let output: DescribeJson = parse_json(b"{}").unwrap();
        assert!(output.into_records().is_empty());
    }

    #[test]
    fn run_instances_json_becomes_reservation() {
        let json = r#"{
          "ReservationId": "r-9",
          "OwnerId": "1",
          "Groups": [],
          "Instances": [
            { "InstanceId": "i-1", "ImageId": "ami-w", "State": { "Name": "pending" } },
            { "InstanceId": "i-2", "ImageId": "ami-w", "State": { "Name": "pending" } }
          ]
        }"#;
        let reservation: ReservationJson = parse_json(json.as_bytes()).unwrap();
        let reservation = reservation.into_reservation();
        assert_eq!(reservation.id, "r-9");
        assert_eq!(reservation.instances.len(), 2);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_json::<DescribeJson>(b"not json").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let provider = AwsCliProvider::new(&ProviderSection {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
        })
        .with_program("/nonexistent/aws-cli-for-tests");
        let err = provider.describe_instances().await.unwrap_err();
        assert!(matches!(err, ProviderError::Spawn { .. }));
    }
}
