//! kube-deploy - CI step that deploys a templated Kubernetes resource
//!
//! Renders the manifest template with the step's variables, applies the
//! resulting object and, for deployments, waits for the rollout to settle.
//! The process exit status reflects the outcome.

use deploy_lib::config::{secret_data, template_variables};
use deploy_lib::decode::{decode, decode_autoscaler};
use deploy_lib::render::render_file;
use deploy_lib::{build_client, DeployError, DesiredResource, KubeCluster, Outcome, RunConfig};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod output;

use config::{LogFormat, PluginConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let config = match PluginConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Text);
            output::print_error(&format!("failed to load configuration: {:#}", e));
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_format);
    info!(version = VERSION, "Starting kube-deploy");

    let (target, outcome) = match prepare(&config).await {
        Ok((desired, run_config, cluster)) => {
            let target = output::describe(desired.kind().as_str(), desired.name());
            let outcome = deploy_lib::run(&cluster, desired, &run_config).await;
            (target, outcome)
        }
        Err(e) => (output::describe("manifest", ""), Outcome::Failed(e)),
    };

    output::report(&target, &outcome);
    ExitCode::from(outcome.exit_code())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

/// Everything that happens before the first write to the cluster
async fn prepare(
    config: &PluginConfig,
) -> Result<(DesiredResource, RunConfig, KubeCluster), DeployError> {
    config.validate()?;

    let variables = template_variables(std::env::vars());
    debug!(count = variables.len(), "Collected template variables");

    let mut run_config = config.run_config(secret_data(&variables))?;

    output::print_info(&format!("Rendering {}", config.template));
    let desired = decode(&render_file(Path::new(&config.template), &variables)?)?;

    if let Some(path) = config.hpa_template.as_deref() {
        output::print_info(&format!("Rendering autoscaler {}", path.display()));
        run_config.autoscaler = Some(decode_autoscaler(&render_file(path, &variables)?)?);
    }

    let client = build_client(&config.connection_settings()).await?;
    Ok((desired, run_config, KubeCluster::new(client)))
}
