use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::ConfigLoader;
use aws_config::retry::RetryConfig;
use aws_sdk_cloudwatchlogs::Client;
use aws_sdk_cloudwatchlogs::config::{Credentials, Region};
use chrono::Utc;
use log::{LevelFilter, debug, info, trace, warn};
use serde::Serialize;
use std::env;

pub const APP_NAME: &str = "log_retention_enforcer";

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_RETENTION_DAYS: i32 = 545;
pub const LOCAL_ENDPOINT: &str = "http://localhost:4566";

/// Environments that talk to the real CloudWatch Logs endpoint. Anything
/// else is pointed at a local emulator.
const DEPLOYMENT_ENVIRONMENTS: [&str; 3] = ["prd", "stg", "sandbox"];

/// Retention periods CloudWatch Logs accepts for put_retention_policy.
pub const VALID_RETENTION_DAYS: [i32; 17] = [
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1827, 3653,
];

#[derive(Debug, Clone)]
pub struct Config {
    pub region: String,
    pub retention_days: i32,
    /// Set when targeting a local emulator instead of the real endpoint.
    pub endpoint_url: Option<String>,
}

impl Config {
    pub fn new(environment: &str, region: Option<String>, retention_days: Option<i32>) -> Self {
        let endpoint_url = if DEPLOYMENT_ENVIRONMENTS.contains(&environment) {
            None
        } else {
            Some(LOCAL_ENDPOINT.to_string())
        };

        Self {
            region: region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            retention_days: retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            endpoint_url,
        }
    }

    pub fn from_env() -> Result<Self> {
        let environment = env::var("ENVIRONMENT").unwrap_or_default();
        let region = env::var("REGION").ok();

        let retention_days = env::var("RETENTION_DAYS")
            .ok()
            .map(|value| {
                value
                    .parse::<i32>()
                    .with_context(|| format!("Failed to parse RETENTION_DAYS: {value:?}"))
            })
            .transpose()?;

        Ok(Self::new(&environment, region, retention_days))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogGroupDescriptor {
    pub name: String,
    pub retention_in_days: Option<i32>,
}

/// One page of a describe-log-groups listing.
#[derive(Debug, Default)]
pub struct LogGroupPage {
    pub log_groups: Vec<LogGroupDescriptor>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionTarget {
    pub log_group_name: String,
    pub retention_days: i32,
}

#[derive(Debug)]
pub struct RetentionFailure {
    pub target: RetentionTarget,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct RetentionReport {
    pub applied: Vec<RetentionTarget>,
    pub failed: Vec<RetentionFailure>,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub response: &'static str,
}

impl Response {
    pub fn success() -> Self {
        Self {
            response: "success",
        }
    }
}

/// The two CloudWatch Logs capabilities this routine needs. Kept as a
/// trait so tests can substitute a recording double for the SDK client.
#[async_trait]
pub trait CloudWatchLogs {
    async fn log_groups_page(&self, next_token: Option<String>) -> Result<LogGroupPage>;

    async fn set_retention(&self, log_group_name: &str, retention_days: i32) -> Result<()>;
}

#[async_trait]
impl CloudWatchLogs for Client {
    async fn log_groups_page(&self, next_token: Option<String>) -> Result<LogGroupPage> {
        let describe_output = self
            .describe_log_groups()
            .set_next_token(next_token)
            .send()
            .await
            .context("Failed to describe log groups")?;

        let log_groups = describe_output
            .log_groups
            .unwrap_or_default()
            .into_iter()
            .filter_map(|log_group| match log_group.log_group_name {
                Some(name) => Some(LogGroupDescriptor {
                    name,
                    retention_in_days: log_group.retention_in_days,
                }),
                None => {
                    warn!("Skipping log group with no name");
                    None
                }
            })
            .collect();

        Ok(LogGroupPage {
            log_groups,
            next_token: describe_output.next_token,
        })
    }

    async fn set_retention(&self, log_group_name: &str, retention_days: i32) -> Result<()> {
        self.put_retention_policy()
            .log_group_name(log_group_name)
            .retention_in_days(retention_days)
            .send()
            .await
            .with_context(|| {
                format!("Failed to set retention policy for log group: {log_group_name}")
            })?;

        Ok(())
    }
}

pub async fn logs_client(config: &Config) -> Client {
    let mut aws_config = ConfigLoader::default()
        .region(Region::new(config.region.clone()))
        .retry_config(RetryConfig::standard());

    if let Some(endpoint_url) = &config.endpoint_url {
        // Local emulators accept any static credentials.
        aws_config = aws_config
            .endpoint_url(endpoint_url)
            .credentials_provider(Credentials::new("test", "test", None, None, "local"));
    }

    Client::new(&aws_config.load().await)
}

pub fn validate_retention_days(retention_days: i32) -> Result<()> {
    if VALID_RETENTION_DAYS.contains(&retention_days) {
        Ok(())
    } else {
        Err(anyhow!(
            "Invalid retention_days value {retention_days}, valid values are {VALID_RETENTION_DAYS:?}"
        ))
    }
}

async fn all_log_groups(client: &(impl CloudWatchLogs + Sync)) -> Result<Vec<LogGroupDescriptor>> {
    let mut next_token = None;
    let mut log_groups = Vec::new();
    let mut page_count = 0;

    loop {
        trace!("Describing log groups (next_token={next_token:?})");

        let page = client.log_groups_page(next_token).await?;

        page_count += 1;
        debug!(
            "Described log groups page {page_count} ({} log group(s))",
            page.log_groups.len()
        );

        log_groups.extend(page.log_groups);

        next_token = page.next_token;
        if next_token.is_none() {
            info!(
                "Found {} log group(s) across {page_count} page(s)",
                log_groups.len()
            );
            break Ok(log_groups);
        }
    }
}

/// Selects log groups with no retention policy at all. A present value of
/// any kind, zero included, means the group already has one.
pub fn without_retention(
    log_groups: &[LogGroupDescriptor],
    retention_days: i32,
) -> Vec<RetentionTarget> {
    log_groups
        .iter()
        .filter(|log_group| log_group.retention_in_days.is_none())
        .map(|log_group| RetentionTarget {
            log_group_name: log_group.name.clone(),
            retention_days,
        })
        .collect()
}

async fn apply_retention(
    client: &(impl CloudWatchLogs + Sync),
    targets: Vec<RetentionTarget>,
) -> RetentionReport {
    let mut report = RetentionReport::default();

    for target in targets {
        match client
            .set_retention(&target.log_group_name, target.retention_days)
            .await
        {
            Ok(()) => {
                info!(
                    "Updated retention for log group {} to {} day(s)",
                    target.log_group_name, target.retention_days
                );
                report.applied.push(target);
            }
            Err(e) => {
                warn!(
                    "Failed to update retention for log group {}: {e:#}",
                    target.log_group_name
                );
                report.failed.push(RetentionFailure {
                    target,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    report
}

/// Lists every log group, selects those without a retention policy, and
/// applies `retention_days` to each. Per-group update failures are
/// collected in the report rather than aborting the remaining targets.
pub async fn enforce_retention(
    client: &(impl CloudWatchLogs + Sync),
    retention_days: i32,
) -> Result<RetentionReport> {
    validate_retention_days(retention_days)?;

    let log_groups = all_log_groups(client).await?;
    trace!("Log groups: {log_groups:?}");

    let targets = without_retention(&log_groups, retention_days);
    debug!("Log groups without retention: {targets:?}");

    if targets.is_empty() {
        info!("All log groups already have a retention policy");
        return Ok(RetentionReport::default());
    }

    Ok(apply_retention(client, targets).await)
}

pub fn set_up_logger(calling_module: &str, verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Warn)
        .level_for(APP_NAME, level)
        .level_for(calling_module.to_string(), level)
        .chain(std::io::stdout())
        .apply()?;

    Ok(())
}
