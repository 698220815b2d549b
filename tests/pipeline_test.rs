// Pipeline behavior against a recording mock of the gcloud boundary:
// stage ordering, fail-fast, and the non-fatal URL lookup.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use snagent_deploy::config::DeployConfig;
use snagent_deploy::deploy::{run_pipeline, PipelineError};
use snagent_deploy::gcloud::{
    CloudApi, GcloudError, ServiceDescription, ServiceSpec, REQUIRED_SERVICES,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    SetProject(String),
    EnableServices(Vec<String>),
    SubmitBuild { source: PathBuf, image: String },
    DeployService {
        name: String,
        image: String,
        port: u16,
        service_account: String,
        allow_unauthenticated: bool,
        env: Vec<(String, String)>,
    },
    ServiceUrl { name: String, region: String },
}

#[derive(Default)]
struct MockApi {
    calls: Mutex<Vec<Call>>,
    fail_set_project: bool,
    fail_enable: bool,
    fail_build: bool,
    fail_deploy: bool,
    fail_url: bool,
}

impl MockApi {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(command: &str) -> GcloudError {
        GcloudError::Exited {
            command: command.to_string(),
            code: 1,
        }
    }
}

#[async_trait]
impl CloudApi for MockApi {
    async fn set_active_project(&self, project: &str) -> Result<(), GcloudError> {
        self.record(Call::SetProject(project.to_string()));
        if self.fail_set_project {
            return Err(Self::failure("config set project"));
        }
        Ok(())
    }

    async fn enable_services(&self, services: &[&str]) -> Result<(), GcloudError> {
        self.record(Call::EnableServices(
            services.iter().map(|s| s.to_string()).collect(),
        ));
        if self.fail_enable {
            return Err(Self::failure("services enable"));
        }
        Ok(())
    }

    async fn submit_build(&self, source_dir: &Path, image_ref: &str) -> Result<(), GcloudError> {
        self.record(Call::SubmitBuild {
            source: source_dir.to_path_buf(),
            image: image_ref.to_string(),
        });
        if self.fail_build {
            return Err(Self::failure("builds submit"));
        }
        Ok(())
    }

    async fn deploy_service(
        &self,
        name: &str,
        image_ref: &str,
        spec: &ServiceSpec,
    ) -> Result<(), GcloudError> {
        self.record(Call::DeployService {
            name: name.to_string(),
            image: image_ref.to_string(),
            port: spec.port,
            service_account: spec.service_account.clone(),
            allow_unauthenticated: spec.allow_unauthenticated,
            env: spec.env.clone(),
        });
        if self.fail_deploy {
            return Err(Self::failure("run deploy"));
        }
        Ok(())
    }

    async fn service_url(&self, name: &str, region: &str) -> Result<String, GcloudError> {
        self.record(Call::ServiceUrl {
            name: name.to_string(),
            region: region.to_string(),
        });
        if self.fail_url {
            return Err(Self::failure("run services describe"));
        }
        Ok(format!("https://{}-abc.a.run.app", name))
    }

    async fn describe_service(
        &self,
        _name: &str,
        _region: &str,
    ) -> Result<ServiceDescription, GcloudError> {
        Ok(ServiceDescription::default())
    }
}

fn test_config() -> DeployConfig {
    DeployConfig {
        project: "p1".to_string(),
        region: "r1".to_string(),
        service: "svc".to_string(),
        service_account: "svc@p1.iam.gserviceaccount.com".to_string(),
        connection: "c1".to_string(),
        model: "m1".to_string(),
        port: 8080,
        source_dir: PathBuf::from("."),
    }
}

#[tokio::test]
async fn successful_run_issues_each_remote_call_exactly_once() {
    let api = MockApi::default();
    let cfg = test_config();

    let url = run_pipeline(&cfg, &api).await.unwrap();
    assert_eq!(url.as_deref(), Some("https://svc-abc.a.run.app"));

    let calls = api.calls();
    assert_eq!(calls.len(), 5);
    assert_eq!(calls[0], Call::SetProject("p1".to_string()));
    assert_eq!(
        calls[1],
        Call::EnableServices(REQUIRED_SERVICES.iter().map(|s| s.to_string()).collect())
    );
    assert_eq!(
        calls[2],
        Call::SubmitBuild {
            source: PathBuf::from("."),
            image: "gcr.io/p1/svc".to_string(),
        }
    );
    assert_eq!(
        calls[3],
        Call::DeployService {
            name: "svc".to_string(),
            image: "gcr.io/p1/svc".to_string(),
            port: 8080,
            service_account: "svc@p1.iam.gserviceaccount.com".to_string(),
            allow_unauthenticated: true,
            env: vec![
                ("GOOGLE_CLOUD_PROJECT".to_string(), "p1".to_string()),
                ("GOOGLE_CLOUD_LOCATION".to_string(), "r1".to_string()),
                ("CONNECTION_NAME".to_string(), "c1".to_string()),
                ("GEMINI_MODEL".to_string(), "m1".to_string()),
            ],
        }
    );
    assert_eq!(
        calls[4],
        Call::ServiceUrl {
            name: "svc".to_string(),
            region: "r1".to_string(),
        }
    );
}

#[tokio::test]
async fn deploy_uses_the_image_the_build_produced() {
    let api = MockApi::default();
    run_pipeline(&test_config(), &api).await.unwrap();

    let calls = api.calls();
    let built = match &calls[2] {
        Call::SubmitBuild { image, .. } => image.clone(),
        other => panic!("expected build, got {:?}", other),
    };
    match &calls[3] {
        Call::DeployService { image, .. } => assert_eq!(*image, built),
        other => panic!("expected deploy, got {:?}", other),
    }
    assert!(built.contains("svc"));
}

#[tokio::test]
async fn invalid_config_makes_no_remote_calls() {
    let api = MockApi::default();
    let cfg = DeployConfig {
        project: String::new(),
        ..test_config()
    };

    let err = run_pipeline(&cfg, &api).await.unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn project_selection_failure_stops_before_enabling_services() {
    let api = MockApi {
        fail_set_project: true,
        ..MockApi::default()
    };

    let err = run_pipeline(&test_config(), &api).await.unwrap_err();
    assert!(matches!(err, PipelineError::Environment(_)));
    assert_eq!(api.calls(), vec![Call::SetProject("p1".to_string())]);
}

#[tokio::test]
async fn enable_failure_stops_before_build() {
    let api = MockApi {
        fail_enable: true,
        ..MockApi::default()
    };

    let err = run_pipeline(&test_config(), &api).await.unwrap_err();
    assert!(matches!(err, PipelineError::Environment(_)));
    let calls = api.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls
        .iter()
        .any(|call| matches!(call, Call::SubmitBuild { .. })));
}

#[tokio::test]
async fn build_failure_suppresses_deploy_and_url_lookup() {
    let api = MockApi {
        fail_build: true,
        ..MockApi::default()
    };

    let err = run_pipeline(&test_config(), &api).await.unwrap_err();
    assert!(matches!(err, PipelineError::Build(_)));
    let calls = api.calls();
    assert!(calls
        .iter()
        .any(|call| matches!(call, Call::SubmitBuild { .. })));
    assert!(!calls
        .iter()
        .any(|call| matches!(call, Call::DeployService { .. })));
    assert!(!calls
        .iter()
        .any(|call| matches!(call, Call::ServiceUrl { .. })));
}

#[tokio::test]
async fn deploy_failure_is_its_own_error_kind() {
    let api = MockApi {
        fail_deploy: true,
        ..MockApi::default()
    };

    let err = run_pipeline(&test_config(), &api).await.unwrap_err();
    assert!(matches!(err, PipelineError::Deploy(_)));
    assert!(!api
        .calls()
        .iter()
        .any(|call| matches!(call, Call::ServiceUrl { .. })));
}

#[tokio::test]
async fn url_lookup_failure_does_not_fail_a_completed_deploy() {
    let api = MockApi {
        fail_url: true,
        ..MockApi::default()
    };

    let url = run_pipeline(&test_config(), &api).await.unwrap();
    assert_eq!(url, None);
    assert!(api
        .calls()
        .iter()
        .any(|call| matches!(call, Call::DeployService { .. })));
}

#[tokio::test]
async fn rerunning_the_pipeline_repeats_identical_idempotent_calls() {
    let api = MockApi::default();
    let cfg = test_config();

    run_pipeline(&cfg, &api).await.unwrap();
    run_pipeline(&cfg, &api).await.unwrap();

    let calls = api.calls();
    assert_eq!(calls.len(), 10);
    // Second run targets the same named service with the same arguments, so
    // the platform updates in place instead of creating a duplicate.
    assert_eq!(calls[1], calls[6]);
    assert_eq!(calls[3], calls[8]);
}
