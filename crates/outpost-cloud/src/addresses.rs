//! Elastic address helpers

use crate::error::{CloudError, Result};
use crate::gateway::ComputeGateway;
use crate::model::{AddressDomain, Server};

/// Allocate a new elastic address and return its public IP
pub async fn provision_public_ip(
    gateway: &dyn ComputeGateway,
    domain: AddressDomain,
) -> Result<String> {
    let address = gateway.create_address(domain).await?;
    tracing::info!("Provisioned {} address {}", domain, address.public_ip);
    Ok(address.public_ip)
}

/// Bind an existing elastic address to a server
pub async fn associate_with_server(
    gateway: &dyn ComputeGateway,
    public_ip: &str,
    server: &Server,
) -> Result<()> {
    let address = gateway
        .get_address(public_ip)
        .await?
        .ok_or_else(|| CloudError::ResourceNotFound(format!("address {}", public_ip)))?;
    gateway.associate_address(&address, &server.id).await?;
    tracing::info!("Associated {} with server {}", public_ip, server.id);
    Ok(())
}
