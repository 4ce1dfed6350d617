//! ComputeGateway implementation over the EC2 API

use crate::convert;
use crate::error::{AwsError, SdkResultExt, absent_if_not_found};
use crate::ssh::{self, RemoteShell};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Credentials;
use aws_sdk_ec2::types::{
    Filter, InstanceType, IpPermission, IpRange, Placement, ResourceType,
    SecurityGroup as AwsSecurityGroup, Tag, TagSpecification,
};
use outpost_cloud::{
    Address, AddressDomain, CloudError, ComputeGateway, IngressGrant, KeyPair, LiveRule, Result,
    SecurityGroup, Server, ServerAttributes, ServerState, Volume, VolumeRequest,
};
use outpost_config::ProviderConfig;
use std::path::PathBuf;

pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const SESSION_TOKEN: &str = "aws_session_token";

const DEFAULT_SSH_USER: &str = "ubuntu";
const DEFAULT_FLAVOR: &str = "m1.small";

fn filter(name: &str, value: &str) -> Filter {
    Filter::builder().name(name).values(value).build()
}

fn tag(key: &str, value: &str) -> Tag {
    Tag::builder().key(key).value(value).build()
}

fn name_tags(resource: ResourceType, name: &str) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource)
        .tags(tag("Name", name))
        .build()
}

fn missing(operation: &'static str, field: &'static str) -> AwsError {
    AwsError::MissingField { operation, field }
}

/// Static credentials from the provider configuration, if any
fn static_credentials(config: &ProviderConfig) -> crate::error::Result<Option<Credentials>> {
    match (
        config.credential(ACCESS_KEY_ID),
        config.credential(SECRET_ACCESS_KEY),
    ) {
        (Some(id), Some(secret)) => Ok(Some(Credentials::new(
            id,
            secret,
            config.credential(SESSION_TOKEN).map(str::to_string),
            None,
            "outpost-config",
        ))),
        (Some(_), None) => Err(AwsError::IncompleteCredentials(
            ACCESS_KEY_ID,
            SECRET_ACCESS_KEY,
        )),
        (None, Some(_)) => Err(AwsError::IncompleteCredentials(
            SECRET_ACCESS_KEY,
            ACCESS_KEY_ID,
        )),
        (None, None) => Ok(None),
    }
}

/// EC2-backed gateway
pub struct Ec2Gateway {
    client: Client,
    region: String,
    ssh_user: String,
}

impl Ec2Gateway {
    /// Build a client for the configured region
    ///
    /// Uses the configured static credentials when both key id and secret are
    /// present, otherwise the SDK's default provider chain.
    pub async fn connect(config: &ProviderConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(credentials) = static_credentials(config)? {
            loader = loader.credentials_provider(credentials);
        }
        let sdk_config = loader.load().await;

        tracing::debug!("connected EC2 client for region {}", config.region);
        Ok(Self::from_client(Client::new(&sdk_config), &config.region))
    }

    pub fn from_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
            ssh_user: DEFAULT_SSH_USER.to_string(),
        }
    }

    /// Login user for `run_setup`
    pub fn with_ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = user.into();
        self
    }

    async fn describe_groups(&self, filters: Vec<Filter>) -> Result<Vec<AwsSecurityGroup>> {
        let mut groups = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .describe_security_groups()
                .set_filters(Some(filters.clone()).filter(|f| !f.is_empty()))
                .set_next_token(next_token)
                .send()
                .await
                .or_gateway("describe_security_groups")?;
            groups.extend(output.security_groups().iter().cloned());
            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => return Ok(groups),
            }
        }
    }

    async fn describe_servers(&self, instance_ids: Vec<String>) -> Result<Vec<Server>> {
        let mut servers = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .describe_instances()
                .set_instance_ids(Some(instance_ids.clone()).filter(|ids| !ids.is_empty()))
                .set_next_token(next_token)
                .send()
                .await
                .or_gateway("describe_instances")?;
            servers.extend(
                output
                    .reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .filter_map(convert::server),
            );
            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => return Ok(servers),
            }
        }
    }

    /// Security group ids for VPC launches; accepts ids or names
    async fn resolve_group_ids(&self, groups: &[String]) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(groups.len());
        for group in groups {
            if group.starts_with("sg-") {
                ids.push(group.clone());
                continue;
            }
            let found = self.find_security_group(group).await?.ok_or_else(|| {
                CloudError::ResourceNotFound(format!("security group {}", group))
            })?;
            ids.push(found.group_id);
        }
        Ok(ids)
    }
}

#[async_trait]
impl ComputeGateway for Ec2Gateway {
    fn region(&self) -> &str {
        &self.region
    }

    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>> {
        let groups = self.describe_groups(vec![filter("group-name", name)]).await?;
        if groups.len() > 1 {
            tracing::warn!(
                "{} security groups are named {}, using the first one",
                groups.len(),
                name
            );
        }
        Ok(groups.iter().find_map(convert::security_group))
    }

    async fn find_security_group_by_id(&self, group_id: &str) -> Result<Option<SecurityGroup>> {
        let groups = self
            .describe_groups(vec![filter("group-id", group_id)])
            .await?;
        Ok(groups.iter().find_map(convert::security_group))
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> Result<SecurityGroup> {
        let output = self
            .client
            .create_security_group()
            .group_name(name)
            .description(description)
            .set_vpc_id(vpc_id.map(str::to_string))
            .send()
            .await
            .or_gateway("create_security_group")?;
        let group_id = output
            .group_id()
            .ok_or_else(|| missing("create_security_group", "group_id"))?;

        Ok(SecurityGroup {
            name: name.to_string(),
            group_id: group_id.to_string(),
            description: description.to_string(),
            vpc_id: vpc_id.map(str::to_string),
        })
    }

    async fn list_security_groups(&self) -> Result<Vec<SecurityGroup>> {
        let groups = self.describe_groups(Vec::new()).await?;
        Ok(groups.iter().filter_map(convert::security_group).collect())
    }

    async fn list_ip_permissions(&self, group: &SecurityGroup) -> Result<Vec<LiveRule>> {
        let groups = self
            .describe_groups(vec![filter("group-id", &group.group_id)])
            .await?;
        Ok(groups
            .first()
            .map(|g| convert::live_rules(g.ip_permissions()))
            .unwrap_or_default())
    }

    async fn authorize_port_range(
        &self,
        group: &SecurityGroup,
        grant: &IngressGrant,
    ) -> Result<()> {
        let permission = IpPermission::builder()
            .ip_protocol(grant.protocol.as_str())
            .from_port(grant.port_range.from)
            .to_port(grant.port_range.to)
            .ip_ranges(IpRange::builder().cidr_ip(&grant.cidr).build())
            .build();

        self.client
            .authorize_security_group_ingress()
            .group_id(&group.group_id)
            .ip_permissions(permission)
            .send()
            .await
            .or_gateway("authorize_security_group_ingress")?;
        Ok(())
    }

    async fn delete_security_group(&self, group: &SecurityGroup) -> Result<()> {
        self.client
            .delete_security_group()
            .group_id(&group.group_id)
            .send()
            .await
            .or_gateway("delete_security_group")?;
        Ok(())
    }

    async fn create_server(&self, attributes: &ServerAttributes) -> Result<Server> {
        let flavor = attributes.flavor_id.as_deref().unwrap_or(DEFAULT_FLAVOR);
        let mut request = self
            .client
            .run_instances()
            .image_id(&attributes.image_id)
            .key_name(&attributes.key_name)
            .instance_type(InstanceType::from(flavor))
            .min_count(1)
            .max_count(1)
            .set_subnet_id(attributes.subnet_id.clone());

        if let Some(zone) = &attributes.availability_zone {
            request = request.placement(Placement::builder().availability_zone(zone).build());
        }

        if attributes.is_vpc() {
            let ids = self.resolve_group_ids(&attributes.groups).await?;
            request = request.set_security_group_ids(Some(ids).filter(|ids| !ids.is_empty()));
        } else if !attributes.groups.is_empty() {
            request = request.set_security_groups(Some(attributes.groups.clone()));
        }

        let mut tags: Vec<Tag> = attributes
            .tags
            .iter()
            .map(|(k, v)| tag(k, v))
            .collect();
        if let Some(name) = &attributes.name {
            tags.push(tag("Name", name));
        }
        if !tags.is_empty() {
            request = request.tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .set_tags(Some(tags))
                    .build(),
            );
        }

        let output = request.send().await.or_gateway("run_instances")?;
        let server = output
            .instances()
            .first()
            .and_then(convert::server)
            .ok_or_else(|| missing("run_instances", "instance"))?;

        tracing::info!("Requested instance {} ({})", server.id, flavor);
        Ok(server)
    }

    async fn get_server(&self, id: &str) -> Result<Option<Server>> {
        let servers = absent_if_not_found(self.describe_servers(vec![id.to_string()]).await)?;
        Ok(servers.and_then(|s| s.into_iter().next()))
    }

    async fn save_server(&self, server: &Server) -> Result<Server> {
        if let Some(name) = &server.name {
            self.client
                .create_tags()
                .resources(&server.id)
                .tags(tag("Name", name))
                .send()
                .await
                .or_gateway("create_tags")?;
        }

        self.get_server(&server.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("server {}", server.id)))
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        let servers = self.describe_servers(Vec::new()).await?;
        Ok(servers
            .into_iter()
            .filter(|s| s.state != ServerState::Terminated)
            .collect())
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        self.client
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .or_gateway("terminate_instances")?;
        Ok(())
    }

    async fn run_setup(&self, server: &Server, private_keys: &[PathBuf]) -> Result<()> {
        let host = server
            .host()
            .ok_or_else(|| AwsError::NoPublicAddress(server.id.clone()))?;
        let shell = RemoteShell::new(host, &self.ssh_user, private_keys);

        tracing::info!("Waiting for sshd on {}...", host);
        shell.wait_for_sshd().await?;

        let public_key = match private_keys.first() {
            Some(key) => {
                let path = ssh::public_key_path(key);
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => Some(contents),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::debug!("no public key at {}", path.display());
                        None
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => None,
        };

        let attributes = serde_json::to_string(server)?;
        for command in ssh::setup_commands(&attributes, public_key.as_deref()) {
            shell.run(&command).await?;
        }

        tracing::info!("Configured server {}", server.id);
        Ok(())
    }

    async fn create_address(&self, domain: AddressDomain) -> Result<Address> {
        let output = self
            .client
            .allocate_address()
            .domain(convert::domain_type(domain))
            .send()
            .await
            .or_gateway("allocate_address")?;

        Ok(Address {
            public_ip: output
                .public_ip()
                .ok_or_else(|| missing("allocate_address", "public_ip"))?
                .to_string(),
            allocation_id: output.allocation_id().map(str::to_string),
            domain: convert::address_domain(output.domain()),
            server_id: None,
        })
    }

    async fn get_address(&self, public_ip: &str) -> Result<Option<Address>> {
        let output = self
            .client
            .describe_addresses()
            .filters(filter("public-ip", public_ip))
            .send()
            .await
            .or_gateway("describe_addresses")?;
        Ok(output.addresses().iter().find_map(convert::address))
    }

    async fn list_addresses(&self) -> Result<Vec<Address>> {
        let output = self
            .client
            .describe_addresses()
            .send()
            .await
            .or_gateway("describe_addresses")?;
        Ok(output.addresses().iter().filter_map(convert::address).collect())
    }

    async fn associate_address(&self, address: &Address, server_id: &str) -> Result<()> {
        let request = self.client.associate_address().instance_id(server_id);
        let request = match (&address.domain, &address.allocation_id) {
            (AddressDomain::Vpc, Some(allocation_id)) => request.allocation_id(allocation_id),
            _ => request.public_ip(&address.public_ip),
        };
        request.send().await.or_gateway("associate_address")?;
        Ok(())
    }

    async fn delete_address(&self, address: &Address) -> Result<()> {
        let request = self.client.release_address();
        let request = match &address.allocation_id {
            Some(allocation_id) => request.allocation_id(allocation_id),
            None => request.public_ip(&address.public_ip),
        };
        request.send().await.or_gateway("release_address")?;
        Ok(())
    }

    async fn create_vpc(&self, name: &str, cidr_block: &str) -> Result<String> {
        let output = self
            .client
            .create_vpc()
            .cidr_block(cidr_block)
            .tag_specifications(name_tags(ResourceType::Vpc, name))
            .send()
            .await
            .or_gateway("create_vpc")?;
        let vpc_id = output
            .vpc()
            .and_then(|v| v.vpc_id())
            .ok_or_else(|| missing("create_vpc", "vpc_id"))?;
        Ok(vpc_id.to_string())
    }

    async fn create_subnet(&self, vpc_id: &str, cidr_block: &str) -> Result<String> {
        let output = self
            .client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr_block)
            .send()
            .await
            .or_gateway("create_subnet")?;
        let subnet_id = output
            .subnet()
            .and_then(|s| s.subnet_id())
            .ok_or_else(|| missing("create_subnet", "subnet_id"))?;
        Ok(subnet_id.to_string())
    }

    async fn create_internet_gateway(&self, vpc_id: &str) -> Result<String> {
        let output = self
            .client
            .create_internet_gateway()
            .send()
            .await
            .or_gateway("create_internet_gateway")?;
        let gateway_id = output
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .ok_or_else(|| missing("create_internet_gateway", "internet_gateway_id"))?
            .to_string();

        self.client
            .attach_internet_gateway()
            .internet_gateway_id(&gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .or_gateway("attach_internet_gateway")?;
        Ok(gateway_id)
    }

    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume> {
        let output = self
            .client
            .create_volume()
            .size(request.size_gb)
            .availability_zone(&request.availability_zone)
            .tag_specifications(name_tags(ResourceType::Volume, &request.name))
            .send()
            .await
            .or_gateway("create_volume")?;

        Ok(Volume {
            id: output
                .volume_id()
                .ok_or_else(|| missing("create_volume", "volume_id"))?
                .to_string(),
            name: Some(request.name.clone()),
            size_gb: output.size().unwrap_or(request.size_gb),
            availability_zone: request.availability_zone.clone(),
            device: None,
            server_id: None,
        })
    }

    async fn attach_volume(&self, volume_id: &str, server_id: &str, device: &str) -> Result<()> {
        self.client
            .attach_volume()
            .volume_id(volume_id)
            .instance_id(server_id)
            .device(device)
            .send()
            .await
            .or_gateway("attach_volume")?;
        Ok(())
    }

    async fn list_server_volumes(&self, server_id: &str) -> Result<Vec<Volume>> {
        let output = self
            .client
            .describe_volumes()
            .filters(filter("attachment.instance-id", server_id))
            .send()
            .await
            .or_gateway("describe_volumes")?;
        Ok(output.volumes().iter().filter_map(convert::volume).collect())
    }

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>> {
        let output = self
            .client
            .describe_key_pairs()
            .send()
            .await
            .or_gateway("describe_key_pairs")?;
        Ok(output.key_pairs().iter().filter_map(convert::key_pair).collect())
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.client
            .delete_key_pair()
            .key_name(name)
            .send()
            .await
            .or_gateway("delete_key_pair")?;
        Ok(())
    }
}
