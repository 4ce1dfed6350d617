//! Block volume helpers

use crate::error::{CloudError, Result};
use crate::gateway::ComputeGateway;
use crate::model::{Server, Volume, VolumeRequest};

/// Create a volume in the server's availability zone and attach it at `device`
pub async fn create_and_attach_volume(
    gateway: &dyn ComputeGateway,
    name: &str,
    size_gb: i32,
    server: &Server,
    device: &str,
) -> Result<Volume> {
    let availability_zone = server.availability_zone.clone().ok_or_else(|| {
        CloudError::ResourceNotFound(format!("availability zone of server {}", server.id))
    })?;

    let mut volume = gateway
        .create_volume(&VolumeRequest {
            name: name.to_string(),
            size_gb,
            availability_zone,
        })
        .await?;
    gateway.attach_volume(&volume.id, &server.id, device).await?;
    tracing::info!(
        "Attached {}GB volume {} to server {} at {}",
        size_gb,
        volume.id,
        server.id,
        device
    );

    volume.server_id = Some(server.id.clone());
    volume.device = Some(device.to_string());
    Ok(volume)
}

/// Volume attached to `server` at `device`, if any
pub async fn find_server_device(
    gateway: &dyn ComputeGateway,
    server: &Server,
    device: &str,
) -> Result<Option<Volume>> {
    Ok(gateway
        .list_server_volumes(&server.id)
        .await?
        .into_iter()
        .find(|v| v.device.as_deref() == Some(device)))
}
