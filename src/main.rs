use anyhow::{Result, bail};
use clap::{Arg, ArgAction, Command, value_parser};
use log::{debug, info};
use log_retention_enforcer::{
    Config, DEFAULT_REGION, enforce_retention, logs_client, set_up_logger,
};

#[derive(Debug)]
struct Args {
    verbose: bool,
    environment: String,
    region: String,
    retention_days: i32,
}

fn parse_args() -> Args {
    let matches = Command::new("log-retention-enforcer")
        .version("0.1")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose mode. Outputs DEBUG and higher log messages."),
        )
        .arg(
            Arg::new("environment")
                .short('e')
                .long("environment")
                .env("ENVIRONMENT")
                .default_value("local")
                .help("Deployment environment. prd, stg, and sandbox target the real endpoint; anything else targets a local emulator."),
        )
        .arg(
            Arg::new("region")
                .short('r')
                .long("region")
                .env("REGION")
                .default_value(DEFAULT_REGION)
                .help("AWS region to enforce log retention in."),
        )
        .arg(
            Arg::new("retention-days")
                .short('d')
                .long("retention-days")
                .env("RETENTION_DAYS")
                .value_parser(value_parser!(i32))
                .default_value("545")
                .help("Retention period, in days, to apply to log groups without one."),
        )
        .get_matches();

    Args {
        verbose: matches.get_flag("verbose"),
        environment: matches
            .get_one::<String>("environment")
            .expect("environment has a default")
            .clone(),
        region: matches
            .get_one::<String>("region")
            .expect("region has a default")
            .clone(),
        retention_days: *matches
            .get_one::<i32>("retention-days")
            .expect("retention-days has a default"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    set_up_logger(module_path!(), args.verbose)?;
    debug!("{args:?}");

    let config = Config::new(
        &args.environment,
        Some(args.region),
        Some(args.retention_days),
    );
    info!("Enforcing log retention in {}", config.region);

    let client = logs_client(&config).await;
    let report = enforce_retention(&client, config.retention_days).await?;

    info!(
        "Applied retention to {} log group(s), {} failure(s)",
        report.applied.len(),
        report.failed.len()
    );

    if !report.failed.is_empty() {
        bail!(
            "Failed to update retention for {} log group(s)",
            report.failed.len()
        );
    }

    Ok(())
}
