use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snagent_deploy::config::{self, DeployConfig};
use snagent_deploy::deploy;
use snagent_deploy::gcloud::Gcloud;

#[derive(Parser)]
#[command(
    name = "snagent-deploy",
    version,
    about = "Build and deploy the ServiceNow agent to Cloud Run"
)]
struct Cli {
    /// Google Cloud project ID
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT", default_value = config::DEFAULT_PROJECT)]
    project: String,

    /// Deployment region
    #[arg(long, env = "GOOGLE_CLOUD_LOCATION", default_value = config::DEFAULT_REGION)]
    region: String,

    /// Cloud Run service name
    #[arg(long, env = "SERVICE_NAME", default_value = config::DEFAULT_SERVICE)]
    service: String,

    /// Runtime service account (default: <service>@<project>.iam.gserviceaccount.com)
    #[arg(long, env = "SERVICE_ACCOUNT")]
    service_account: Option<String>,

    /// Application Integration connection the agent talks to
    #[arg(long, env = "CONNECTION_NAME", default_value = config::DEFAULT_CONNECTION)]
    connection: String,

    /// Gemini model the agent uses
    #[arg(long, env = "GEMINI_MODEL", default_value = config::DEFAULT_MODEL)]
    model: String,

    /// Container port the service listens on
    #[arg(long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Source directory submitted to Cloud Build
    #[arg(long, default_value = ".")]
    source: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: enable APIs, build, deploy, print the URL (default)
    Up,

    /// Show the deployed service's URL, revision, and image
    Status,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = resolve_config(&cli);
    let api = Gcloud;

    match cli.command.unwrap_or(Commands::Up) {
        Commands::Up => {
            deploy::run_pipeline(&cfg, &api).await?;
            Ok(())
        }
        Commands::Status => deploy::print_status(&cfg, &api).await,
    }
}

fn resolve_config(cli: &Cli) -> DeployConfig {
    let service_account = cli
        .service_account
        .clone()
        .unwrap_or_else(|| config::default_service_account(&cli.service, &cli.project));
    DeployConfig {
        project: cli.project.clone(),
        region: cli.region.clone(),
        service: cli.service.clone(),
        service_account,
        connection: cli.connection.clone(),
        model: cli.model.clone(),
        port: cli.port,
        source_dir: cli.source.clone(),
    }
}
