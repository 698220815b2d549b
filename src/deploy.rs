use thiserror::Error;

use crate::config::{DeployConfig, MissingValue};
use crate::gcloud::{CloudApi, GcloudError, ServiceSpec, REQUIRED_SERVICES};

/// A stage failure aborts every remaining stage. The report stage is the one
/// exception: its failure is downgraded to a warning in `run_pipeline` and
/// never surfaces here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] MissingValue),

    #[error("environment preparation failed: {0}")]
    Environment(#[source] GcloudError),

    #[error("container build failed: {0}")]
    Build(#[source] GcloudError),

    #[error("deploy failed: {0}")]
    Deploy(#[source] GcloudError),
}

/// Run the whole pipeline: validate, prepare the project, build the image,
/// deploy it, then look up the service URL.
///
/// Returns the URL on full success, or `None` when the deploy succeeded but
/// the URL lookup did not. Re-running the pipeline is always safe: enabling
/// services and deploying are idempotent, and each build produces a fresh
/// image.
pub async fn run_pipeline(
    cfg: &DeployConfig,
    api: &dyn CloudApi,
) -> Result<Option<String>, PipelineError> {
    cfg.validate()?;

    println!("Selecting project {}", cfg.project);
    api.set_active_project(&cfg.project)
        .await
        .map_err(PipelineError::Environment)?;

    println!("Enabling required services:");
    for service in REQUIRED_SERVICES {
        println!("  {}", service);
    }
    api.enable_services(REQUIRED_SERVICES)
        .await
        .map_err(PipelineError::Environment)?;
    println!(
        "Note: {} must already hold its Vertex AI and Integration Connectors roles; this tool does not grant or verify them.",
        cfg.service_account
    );

    let image_ref = cfg.image_ref();
    println!(
        "\nBuilding {} from {}",
        image_ref,
        cfg.source_dir.display()
    );
    println!("This may take several minutes...");
    api.submit_build(&cfg.source_dir, &image_ref)
        .await
        .map_err(PipelineError::Build)?;

    // The build just succeeded in this same run; only now is deploy reachable.
    println!("\nDeploying {} to Cloud Run ({})", cfg.service, cfg.region);
    let spec = ServiceSpec {
        region: cfg.region.clone(),
        port: cfg.port,
        service_account: cfg.service_account.clone(),
        allow_unauthenticated: true,
        env: cfg.env_vars(),
    };
    api.deploy_service(&cfg.service, &image_ref, &spec)
        .await
        .map_err(PipelineError::Deploy)?;

    println!("\nDeploy complete.");
    match api.service_url(&cfg.service, &cfg.region).await {
        Ok(url) => {
            println!("Service URL: {}", url);
            Ok(Some(url))
        }
        Err(error) => {
            println!(
                "Warning: deployed, but could not retrieve the service URL: {}",
                error
            );
            Ok(None)
        }
    }
}

/// Show the live state of the deployed service without touching it.
pub async fn print_status(
    cfg: &DeployConfig,
    api: &dyn CloudApi,
) -> Result<(), Box<dyn std::error::Error>> {
    cfg.validate()?;

    let desc = api.describe_service(&cfg.service, &cfg.region).await?;

    println!("Service: {} ({})", cfg.service, cfg.region);
    match desc.status.url.as_deref() {
        Some(url) => println!("  URL: {}", url),
        None => println!("  URL: not yet available"),
    }
    if let Some(revision) = desc.status.latest_ready_revision_name.as_deref() {
        println!("  Latest ready revision: {}", revision);
    }
    if let Some(container) = desc.spec.template.spec.containers.first() {
        if let Some(image) = container.image.as_deref() {
            println!("  Image: {}", image);
        }
    }
    if let Some(account) = desc.spec.template.spec.service_account_name.as_deref() {
        println!("  Service account: {}", account);
    }
    Ok(())
}
