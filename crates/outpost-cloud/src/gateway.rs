//! Compute gateway trait definition

use crate::error::Result;
use crate::model::{
    Address, AddressDomain, IngressGrant, KeyPair, LiveRule, SecurityGroup, Server,
    ServerAttributes, Volume, VolumeRequest,
};
use async_trait::async_trait;
use std::path::PathBuf;

/// Capability interface over a remote compute API
///
/// Implementations own the transport, including any transport-level retries.
/// Everything above this trait (reconciliation, bootstrap, cleanup) only sees
/// typed resources and [`CloudError`](crate::CloudError) values.
#[async_trait]
pub trait ComputeGateway: Send + Sync {
    /// Region this gateway is connected to
    fn region(&self) -> &str;

    // Security groups

    /// Look up a security group by name
    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>>;

    /// Look up a security group by id
    ///
    /// Names repeat across VPCs; an id names exactly one group.
    async fn find_security_group_by_id(&self, group_id: &str) -> Result<Option<SecurityGroup>>;

    /// Create a security group
    ///
    /// Fails with `ResourceAlreadyExists` when a group with that name exists.
    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> Result<SecurityGroup>;

    async fn list_security_groups(&self) -> Result<Vec<SecurityGroup>>;

    /// Current ingress rules of a group
    async fn list_ip_permissions(&self, group: &SecurityGroup) -> Result<Vec<LiveRule>>;

    /// Authorize one protocol/range/CIDR on a group
    async fn authorize_port_range(&self, group: &SecurityGroup, grant: &IngressGrant)
    -> Result<()>;

    async fn delete_security_group(&self, group: &SecurityGroup) -> Result<()>;

    // Servers

    /// Submit an instance creation call
    async fn create_server(&self, attributes: &ServerAttributes) -> Result<Server>;

    async fn get_server(&self, id: &str) -> Result<Option<Server>>;

    /// Commit a created instance (name, tags) and return its refreshed view
    ///
    /// Fails with `ResourceNotFound` while the provider does not list a
    /// just-created instance yet.
    async fn save_server(&self, server: &Server) -> Result<Server>;

    async fn list_servers(&self) -> Result<Vec<Server>>;

    async fn delete_server(&self, id: &str) -> Result<()>;

    /// Post-boot configuration of a reachable server
    async fn run_setup(&self, server: &Server, private_keys: &[PathBuf]) -> Result<()>;

    // Elastic addresses

    async fn create_address(&self, domain: AddressDomain) -> Result<Address>;

    async fn get_address(&self, public_ip: &str) -> Result<Option<Address>>;

    async fn list_addresses(&self) -> Result<Vec<Address>>;

    async fn associate_address(&self, address: &Address, server_id: &str) -> Result<()>;

    async fn delete_address(&self, address: &Address) -> Result<()>;

    // Networking

    /// Create a VPC, returning its id
    async fn create_vpc(&self, name: &str, cidr_block: &str) -> Result<String>;

    /// Create a subnet, returning its id
    async fn create_subnet(&self, vpc_id: &str, cidr_block: &str) -> Result<String>;

    /// Create an internet gateway attached to the VPC, returning its id
    async fn create_internet_gateway(&self, vpc_id: &str) -> Result<String>;

    // Volumes

    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume>;

    async fn attach_volume(&self, volume_id: &str, server_id: &str, device: &str) -> Result<()>;

    async fn list_server_volumes(&self, server_id: &str) -> Result<Vec<Volume>>;

    // Key pairs

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>>;

    async fn delete_key_pair(&self, name: &str) -> Result<()>;
}
