use lambda_runtime::{LambdaEvent, service_fn};
use log::{info, warn};
use log_retention_enforcer::{Config, Response, enforce_retention, logs_client, set_up_logger};
use serde_json::Value;
use std::error::Error;

type LambdaError = Box<dyn Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    set_up_logger(module_path!(), false)?;

    let func = service_fn(function);
    lambda_runtime::run(func).await?;
    Ok(())
}

async fn function(_event: LambdaEvent<Value>) -> Result<Response, LambdaError> {
    let config = Config::from_env()?;
    info!("Enforcing log retention in {}", config.region);

    let client = logs_client(&config).await;
    let report = enforce_retention(&client, config.retention_days).await?;

    if report.failed.is_empty() {
        info!("Applied retention to {} log group(s)", report.applied.len());
    } else {
        warn!(
            "Applied retention to {} log group(s), failed for {}",
            report.applied.len(),
            report.failed.len()
        );
    }

    Ok(Response::success())
}
