use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

/// APIs the pipeline needs active in the target project. Enabling one that is
/// already enabled is a no-op on the platform side.
pub const REQUIRED_SERVICES: &[&str] = &[
    "run.googleapis.com",
    "cloudbuild.googleapis.com",
    "aiplatform.googleapis.com",
    "integrations.googleapis.com",
    "connectors.googleapis.com",
];

#[derive(Debug, Error)]
pub enum GcloudError {
    #[error("could not launch gcloud (is the Google Cloud SDK on PATH?): {0}")]
    Spawn(#[source] std::io::Error),

    /// Streamed command failed; its output already went to the terminal.
    #[error("`gcloud {command}` exited with code {code}")]
    Exited { command: String, code: i32 },

    /// Captured command failed; stderr is carried verbatim.
    #[error("`gcloud {command}` exited with code {code}: {stderr}")]
    Query {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`gcloud {command}` returned no URL for the service")]
    NoUrl { command: String },

    #[error("could not parse `gcloud {command}` output: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings applied at `gcloud run deploy` time. The platform creates the
/// service if absent and updates it in place otherwise; the call is the same
/// either way.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub region: String,
    pub port: u16,
    pub service_account: String,
    pub allow_unauthenticated: bool,
    pub env: Vec<(String, String)>,
}

/// Shape of `gcloud run services describe --format json` (Knative service).
#[derive(Debug, Default, Deserialize)]
pub struct ServiceDescription {
    #[serde(default)]
    pub spec: ServiceSpecBlock,
    #[serde(default)]
    pub status: ServiceStatusBlock,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceSpecBlock {
    #[serde(default)]
    pub template: RevisionTemplate,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevisionTemplate {
    #[serde(default)]
    pub spec: RevisionSpec,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevisionSpec {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    #[serde(rename = "serviceAccountName")]
    pub service_account_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerSpec {
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceStatusBlock {
    pub url: Option<String>,
    #[serde(rename = "latestReadyRevisionName")]
    pub latest_ready_revision_name: Option<String>,
}

/// Remote platform boundary. One method per external call the pipeline makes,
/// so stages can be exercised against a recording mock.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn set_active_project(&self, project: &str) -> Result<(), GcloudError>;
    async fn enable_services(&self, services: &[&str]) -> Result<(), GcloudError>;
    async fn submit_build(&self, source_dir: &Path, image_ref: &str) -> Result<(), GcloudError>;
    async fn deploy_service(
        &self,
        name: &str,
        image_ref: &str,
        spec: &ServiceSpec,
    ) -> Result<(), GcloudError>;
    async fn service_url(&self, name: &str, region: &str) -> Result<String, GcloudError>;
    async fn describe_service(
        &self,
        name: &str,
        region: &str,
    ) -> Result<ServiceDescription, GcloudError>;
}

/// Real implementation that shells out to the `gcloud` binary.
pub struct Gcloud;

impl Gcloud {
    /// Run with inherited stdio so long-running commands (builds, deploys)
    /// stream their progress straight to the terminal.
    async fn run_streaming(&self, args: &[String]) -> Result<(), GcloudError> {
        let status = Command::new("gcloud")
            .args(args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(GcloudError::Spawn)?;
        if status.success() {
            Ok(())
        } else {
            Err(GcloudError::Exited {
                command: args.join(" "),
                code: status.code().unwrap_or(-1),
            })
        }
    }

    /// Run with captured output for quick queries; failure carries stderr.
    async fn run_captured(&self, args: &[String]) -> Result<String, GcloudError> {
        let output = Command::new("gcloud")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(GcloudError::Spawn)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(GcloudError::Query {
                command: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn enable_args(services: &[&str]) -> Vec<String> {
    let mut args = vec!["services".to_string(), "enable".to_string()];
    args.extend(services.iter().map(|s| s.to_string()));
    args
}

fn build_args(source_dir: &Path, image_ref: &str) -> Vec<String> {
    vec![
        "builds".to_string(),
        "submit".to_string(),
        source_dir.display().to_string(),
        "--tag".to_string(),
        image_ref.to_string(),
    ]
}

fn deploy_args(name: &str, image_ref: &str, spec: &ServiceSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "deploy".to_string(),
        name.to_string(),
        "--image".to_string(),
        image_ref.to_string(),
        "--platform".to_string(),
        "managed".to_string(),
        "--region".to_string(),
        spec.region.clone(),
        "--port".to_string(),
        spec.port.to_string(),
        "--service-account".to_string(),
        spec.service_account.clone(),
    ];
    if spec.allow_unauthenticated {
        args.push("--allow-unauthenticated".to_string());
    }
    if !spec.env.is_empty() {
        let pairs: Vec<String> = spec
            .env
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        args.push("--set-env-vars".to_string());
        args.push(pairs.join(","));
    }
    args
}

fn describe_args(name: &str, region: &str, format: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        "services".to_string(),
        "describe".to_string(),
        name.to_string(),
        "--platform".to_string(),
        "managed".to_string(),
        "--region".to_string(),
        region.to_string(),
        "--format".to_string(),
        format.to_string(),
    ]
}

#[async_trait]
impl CloudApi for Gcloud {
    async fn set_active_project(&self, project: &str) -> Result<(), GcloudError> {
        let args = vec![
            "config".to_string(),
            "set".to_string(),
            "project".to_string(),
            project.to_string(),
        ];
        self.run_captured(&args).await.map(|_| ())
    }

    async fn enable_services(&self, services: &[&str]) -> Result<(), GcloudError> {
        self.run_streaming(&enable_args(services)).await
    }

    async fn submit_build(&self, source_dir: &Path, image_ref: &str) -> Result<(), GcloudError> {
        self.run_streaming(&build_args(source_dir, image_ref)).await
    }

    async fn deploy_service(
        &self,
        name: &str,
        image_ref: &str,
        spec: &ServiceSpec,
    ) -> Result<(), GcloudError> {
        self.run_streaming(&deploy_args(name, image_ref, spec)).await
    }

    async fn service_url(&self, name: &str, region: &str) -> Result<String, GcloudError> {
        let args = describe_args(name, region, "value(status.url)");
        let stdout = self.run_captured(&args).await?;
        let url = stdout.trim();
        if url.is_empty() {
            return Err(GcloudError::NoUrl {
                command: args.join(" "),
            });
        }
        Ok(url.to_string())
    }

    async fn describe_service(
        &self,
        name: &str,
        region: &str,
    ) -> Result<ServiceDescription, GcloudError> {
        let args = describe_args(name, region, "json");
        let stdout = self.run_captured(&args).await?;
        serde_json::from_str(&stdout).map_err(|source| GcloudError::Parse {
            command: args.join(" "),
            source,
        })
    }
}
