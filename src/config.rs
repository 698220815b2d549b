use std::path::PathBuf;

use thiserror::Error;

/// Environment variables injected into the deployed service. The agent reads
/// these at its own startup; they are set at deploy time, never from files.
pub const ENV_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_REGION: &str = "GOOGLE_CLOUD_LOCATION";
pub const ENV_CONNECTION: &str = "CONNECTION_NAME";
pub const ENV_MODEL: &str = "GEMINI_MODEL";

pub const DEFAULT_PROJECT: &str = "sadproject2025";
pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_SERVICE: &str = "servicenow-agent";
pub const DEFAULT_CONNECTION: &str = "sn-connector-prod";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error)]
#[error("missing required value for {field}")]
pub struct MissingValue {
    pub field: &'static str,
}

/// Deployment parameters, resolved once per invocation. Every later stage
/// reads from this and nothing mutates it.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub project: String,
    pub region: String,
    pub service: String,
    pub service_account: String,
    pub connection: String,
    pub model: String,
    pub port: u16,
    pub source_dir: PathBuf,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            region: DEFAULT_REGION.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            service_account: default_service_account(DEFAULT_SERVICE, DEFAULT_PROJECT),
            connection: DEFAULT_CONNECTION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            port: DEFAULT_PORT,
            source_dir: PathBuf::from("."),
        }
    }
}

/// Default runtime identity for a service in a project.
pub fn default_service_account(service: &str, project: &str) -> String {
    format!("{}@{}.iam.gserviceaccount.com", service, project)
}

impl DeployConfig {
    /// Reject empty parameters before anything talks to the platform, so a
    /// bad run leaves no partial remote state behind.
    pub fn validate(&self) -> Result<(), MissingValue> {
        let fields = [
            ("project", self.project.trim()),
            ("region", self.region.trim()),
            ("service", self.service.trim()),
            ("service-account", self.service_account.trim()),
            ("connection", self.connection.trim()),
            ("model", self.model.trim()),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                return Err(MissingValue { field });
            }
        }
        if self.port == 0 {
            return Err(MissingValue { field: "port" });
        }
        if self.source_dir.as_os_str().is_empty() {
            return Err(MissingValue { field: "source" });
        }
        Ok(())
    }

    /// Image destination Cloud Build pushes to and Cloud Run pulls from.
    pub fn image_ref(&self) -> String {
        format!("gcr.io/{}/{}", self.project, self.service)
    }

    /// Env var mapping passed to `gcloud run deploy --set-env-vars`.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        vec![
            (ENV_PROJECT.to_string(), self.project.clone()),
            (ENV_REGION.to_string(), self.region.clone()),
            (ENV_CONNECTION.to_string(), self.connection.clone()),
            (ENV_MODEL.to_string(), self.model.clone()),
        ]
    }
}
