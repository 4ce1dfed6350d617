pub mod bootstrap;
pub mod catalog;
pub mod cleanup;
pub mod open_ports;

use anyhow::Context;
use outpost_cloud::{ComputeGateway, InMemoryGateway};
use outpost_cloud_aws::Ec2Gateway;
use std::path::PathBuf;
use std::sync::Arc;

/// Region used by `--mock` when none is given
pub const MOCK_REGION: &str = "us-east-1";

/// Where commands are sent
pub struct Target {
    pub config: Option<PathBuf>,
    pub region: Option<String>,
    pub mock: bool,
}

/// Build the gateway for this invocation
pub async fn connect(target: &Target) -> anyhow::Result<Arc<dyn ComputeGateway>> {
    if target.mock {
        let region = target.region.as_deref().unwrap_or(MOCK_REGION);
        tracing::info!("using in-memory gateway for {}", region);
        return Ok(Arc::new(InMemoryGateway::new(region)));
    }

    let path = match &target.config {
        Some(path) => path.clone(),
        None => outpost_config::find_config_file()?,
    };
    let mut config = outpost_config::load(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if let Some(region) = &target.region {
        config.region = region.clone();
    }

    let gateway = Ec2Gateway::connect(&config).await?;
    Ok(Arc::new(gateway))
}
