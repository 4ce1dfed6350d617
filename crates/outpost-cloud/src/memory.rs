//! In-process compute gateway
//!
//! Backs simulated runs (`--mock`) and the test suites. Every call except
//! [`ComputeGateway::region`] is appended to a call log that can be inspected
//! afterwards, and failures can be injected per operation.

use crate::error::{CloudError, Result};
use crate::gateway::ComputeGateway;
use crate::model::{
    Address, AddressDomain, IngressGrant, KeyPair, LiveRule, SecurityGroup, Server,
    ServerAttributes, ServerState, Volume, VolumeRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub operation: String,
    pub detail: String,
}

impl GatewayCall {
    pub fn new(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

/// When simulated servers start reporting `running`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Running once `get_server` has been called this many times for it
    AfterPolls(u32),
    Never,
}

#[derive(Debug)]
struct GroupEntry {
    group: SecurityGroup,
    rules: Vec<LiveRule>,
}

#[derive(Debug)]
struct State {
    /// Keyed by group id; names repeat across VPCs
    groups: BTreeMap<String, GroupEntry>,
    servers: BTreeMap<String, Server>,
    addresses: Vec<Address>,
    volumes: Vec<Volume>,
    key_pairs: Vec<KeyPair>,
    vpcs: Vec<String>,
    calls: Vec<GatewayCall>,
    /// operation -> successful calls left before it starts failing
    failures: HashMap<String, usize>,
    raced_groups: HashSet<String>,
    readiness: Readiness,
    polls: HashMap<String, u32>,
    /// Server reads that miss before a server shows up
    visibility_lag: u32,
    lookups: HashMap<String, u32>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08x}", prefix, self.next_id)
    }

    /// First group with this name, in creation order
    fn group_named(&self, name: &str) -> Option<&GroupEntry> {
        self.groups.values().find(|e| e.group.name == name)
    }

    /// Count a read of `id` and report whether it still misses
    fn still_hidden(&mut self, id: &str) -> bool {
        if !self.servers.contains_key(id) {
            return false;
        }
        let lag = self.visibility_lag;
        let seen = self.lookups.entry(id.to_string()).or_insert(0);
        *seen += 1;
        *seen <= lag
    }
}

/// Compute gateway that keeps all resources in memory
pub struct InMemoryGateway {
    region: String,
    state: Mutex<State>,
}

impl InMemoryGateway {
    /// New gateway with an empty `default` security group
    pub fn new(region: impl Into<String>) -> Self {
        let gateway = Self {
            region: region.into(),
            state: Mutex::new(State {
                groups: BTreeMap::new(),
                servers: BTreeMap::new(),
                addresses: Vec::new(),
                volumes: Vec::new(),
                key_pairs: Vec::new(),
                vpcs: Vec::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                raced_groups: HashSet::new(),
                readiness: Readiness::AfterPolls(0),
                polls: HashMap::new(),
                visibility_lag: 0,
                lookups: HashMap::new(),
                next_id: 0,
            }),
        };
        gateway.seed_security_group("default", "default group", None);
        gateway
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log a call and apply any injected failure for it
    fn record(&self, operation: &str, detail: impl Into<String>) -> Result<()> {
        let call = GatewayCall::new(operation, detail);
        tracing::debug!("in-memory {} {}", call.operation, call.detail);
        let mut state = self.state();
        state.calls.push(call);
        if let Some(remaining) = state.failures.get_mut(operation) {
            if *remaining == 0 {
                return Err(CloudError::gateway(operation, "injected failure"));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    pub fn set_readiness(&self, readiness: Readiness) {
        self.state().readiness = readiness;
    }

    /// Make each server miss its first `reads` `get_server`/`save_server` calls
    ///
    /// Mirrors a provider whose reads lag behind a fresh launch.
    pub fn set_visibility_lag(&self, reads: u32) {
        self.state().visibility_lag = reads;
    }

    /// Make `operation` fail on every call
    pub fn fail_on(&self, operation: &str) {
        self.fail_after(operation, 0);
    }

    /// Let `operation` succeed `successes` times, then fail
    pub fn fail_after(&self, operation: &str, successes: usize) {
        self.state()
            .failures
            .insert(operation.to_string(), successes);
    }

    /// Simulate another client creating `name` between lookup and create
    pub fn race_group_creation(&self, name: &str) {
        self.state().raced_groups.insert(name.to_string());
    }

    pub fn seed_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> SecurityGroup {
        let mut state = self.state();
        let group = SecurityGroup {
            name: name.to_string(),
            group_id: state.next_id("sg"),
            description: description.to_string(),
            vpc_id: vpc_id.map(str::to_string),
        };
        state.groups.insert(
            group.group_id.clone(),
            GroupEntry {
                group: group.clone(),
                rules: Vec::new(),
            },
        );
        group
    }

    pub fn seed_rule(&self, group_name: &str, rule: LiveRule) {
        let mut state = self.state();
        if let Some(entry) = state
            .groups
            .values_mut()
            .find(|e| e.group.name == group_name)
        {
            entry.rules.push(rule);
        }
    }

    pub fn seed_server(&self, server: Server) {
        self.state().servers.insert(server.id.clone(), server);
    }

    pub fn seed_address(&self, address: Address) {
        self.state().addresses.push(address);
    }

    pub fn seed_key_pair(&self, name: &str) {
        self.state().key_pairs.push(KeyPair {
            name: name.to_string(),
            fingerprint: None,
        });
    }

    pub fn find_group(&self, name: &str) -> Option<SecurityGroup> {
        self.state().group_named(name).map(|e| e.group.clone())
    }

    pub fn rules_of(&self, group_name: &str) -> Vec<LiveRule> {
        self.state()
            .group_named(group_name)
            .map(|e| e.rules.clone())
            .unwrap_or_default()
    }

    pub fn rules_of_id(&self, group_id: &str) -> Vec<LiveRule> {
        self.state()
            .groups
            .get(group_id)
            .map(|e| e.rules.clone())
            .unwrap_or_default()
    }

    pub fn servers(&self) -> Vec<Server> {
        self.state().servers.values().cloned().collect()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.state().addresses.clone()
    }

    pub fn volumes(&self) -> Vec<Volume> {
        self.state().volumes.clone()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn calls_named(&self, operation: &str) -> Vec<GatewayCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl ComputeGateway for InMemoryGateway {
    fn region(&self) -> &str {
        &self.region
    }

    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>> {
        self.record("find_security_group", name)?;
        Ok(self.find_group(name))
    }

    async fn find_security_group_by_id(&self, group_id: &str) -> Result<Option<SecurityGroup>> {
        self.record("find_security_group_by_id", group_id)?;
        Ok(self.state().groups.get(group_id).map(|e| e.group.clone()))
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> Result<SecurityGroup> {
        self.record("create_security_group", name)?;
        let raced = self.state().raced_groups.remove(name);
        if raced {
            self.seed_security_group(name, description, vpc_id);
        }
        let taken = self
            .state()
            .groups
            .values()
            .any(|e| e.group.name == name && e.group.vpc_id.as_deref() == vpc_id);
        if taken {
            return Err(CloudError::ResourceAlreadyExists(format!(
                "security group {}",
                name
            )));
        }
        Ok(self.seed_security_group(name, description, vpc_id))
    }

    async fn list_security_groups(&self) -> Result<Vec<SecurityGroup>> {
        self.record("list_security_groups", "")?;
        Ok(self
            .state()
            .groups
            .values()
            .map(|e| e.group.clone())
            .collect())
    }

    async fn list_ip_permissions(&self, group: &SecurityGroup) -> Result<Vec<LiveRule>> {
        self.record("list_ip_permissions", &group.name)?;
        self.state()
            .groups
            .get(&group.group_id)
            .map(|e| e.rules.clone())
            .ok_or_else(|| CloudError::ResourceNotFound(format!("security group {}", group.name)))
    }

    async fn authorize_port_range(
        &self,
        group: &SecurityGroup,
        grant: &IngressGrant,
    ) -> Result<()> {
        self.record(
            "authorize_port_range",
            format!(
                "{} {} {} {}",
                group.name, grant.protocol, grant.port_range, grant.cidr
            ),
        )?;
        let mut state = self.state();
        let entry = state.groups.get_mut(&group.group_id).ok_or_else(|| {
            CloudError::ResourceNotFound(format!("security group {}", group.name))
        })?;
        let rule = LiveRule::from(grant);
        if entry.rules.contains(&rule) {
            return Err(CloudError::ResourceAlreadyExists(format!(
                "permission {} {} {}",
                grant.protocol, grant.port_range, grant.cidr
            )));
        }
        entry.rules.push(rule);
        Ok(())
    }

    async fn delete_security_group(&self, group: &SecurityGroup) -> Result<()> {
        self.record("delete_security_group", &group.name)?;
        let mut state = self.state();
        if state
            .servers
            .values()
            .any(|s| s.in_group(&group.name, &group.group_id))
        {
            return Err(CloudError::gateway(
                "delete_security_group",
                format!("group {} still has dependent instances", group.name),
            ));
        }
        state.groups.remove(&group.group_id);
        Ok(())
    }

    async fn create_server(&self, attributes: &ServerAttributes) -> Result<Server> {
        self.record("create_server", &attributes.image_id)?;
        let mut state = self.state();
        let id = state.next_id("i");
        let groups = if attributes.groups.is_empty() {
            vec!["default".to_string()]
        } else {
            attributes.groups.clone()
        };
        // Like the provider, accept either group ids or names
        let group_ids = groups
            .iter()
            .filter_map(|g| {
                state
                    .groups
                    .get(g)
                    .or_else(|| state.group_named(g))
                    .map(|e| e.group.group_id.clone())
            })
            .collect();
        let public_ip = format!("203.0.113.{}", state.next_id % 250 + 1);
        let server = Server {
            id: id.clone(),
            name: attributes.name.clone(),
            state: ServerState::Pending,
            groups,
            group_ids,
            public_ip: Some(public_ip),
            dns_name: None,
            availability_zone: Some(
                attributes
                    .availability_zone
                    .clone()
                    .unwrap_or_else(|| format!("{}a", self.region)),
            ),
            image_id: Some(attributes.image_id.clone()),
            flavor_id: attributes.flavor_id.clone(),
            key_name: Some(attributes.key_name.clone()),
            subnet_id: attributes.subnet_id.clone(),
            launched_at: Some(Utc::now()),
        };
        state.servers.insert(id, server.clone());
        Ok(server)
    }

    async fn get_server(&self, id: &str) -> Result<Option<Server>> {
        self.record("get_server", id)?;
        let mut state = self.state();
        if state.still_hidden(id) {
            return Ok(None);
        }
        let polls = {
            let count = state.polls.entry(id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let readiness = state.readiness;
        Ok(state.servers.get_mut(id).map(|server| {
            if server.state == ServerState::Pending
                && matches!(readiness, Readiness::AfterPolls(n) if polls > n)
            {
                server.state = ServerState::Running;
            }
            server.clone()
        }))
    }

    async fn save_server(&self, server: &Server) -> Result<Server> {
        self.record("save_server", &server.id)?;
        let mut state = self.state();
        if state.still_hidden(&server.id) {
            return Err(CloudError::ResourceNotFound(format!("server {}", server.id)));
        }
        let stored = state
            .servers
            .get_mut(&server.id)
            .ok_or_else(|| CloudError::ResourceNotFound(format!("server {}", server.id)))?;
        stored.name = server.name.clone();
        Ok(stored.clone())
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        self.record("list_servers", "")?;
        Ok(self.servers())
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        self.record("delete_server", id)?;
        self.state()
            .servers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CloudError::ResourceNotFound(format!("server {}", id)))
    }

    async fn run_setup(&self, server: &Server, private_keys: &[PathBuf]) -> Result<()> {
        let keys: Vec<String> = private_keys
            .iter()
            .map(|k| k.display().to_string())
            .collect();
        self.record("run_setup", format!("{} {}", server.id, keys.join(",")))
    }

    async fn create_address(&self, domain: AddressDomain) -> Result<Address> {
        self.record("create_address", domain.to_string())?;
        let mut state = self.state();
        let allocation_id = state.next_id("eipalloc");
        let address = Address {
            public_ip: format!("198.51.100.{}", state.next_id % 250 + 1),
            allocation_id: Some(allocation_id),
            domain,
            server_id: None,
        };
        state.addresses.push(address.clone());
        Ok(address)
    }

    async fn get_address(&self, public_ip: &str) -> Result<Option<Address>> {
        self.record("get_address", public_ip)?;
        Ok(self
            .state()
            .addresses
            .iter()
            .find(|a| a.public_ip == public_ip)
            .cloned())
    }

    async fn list_addresses(&self) -> Result<Vec<Address>> {
        self.record("list_addresses", "")?;
        Ok(self.addresses())
    }

    async fn associate_address(&self, address: &Address, server_id: &str) -> Result<()> {
        self.record(
            "associate_address",
            format!("{} {}", address.public_ip, server_id),
        )?;
        let mut state = self.state();
        if !state.servers.contains_key(server_id) {
            return Err(CloudError::ResourceNotFound(format!("server {}", server_id)));
        }
        let stored = state
            .addresses
            .iter_mut()
            .find(|a| a.public_ip == address.public_ip)
            .ok_or_else(|| CloudError::ResourceNotFound(format!("address {}", address.public_ip)))?;
        stored.server_id = Some(server_id.to_string());
        Ok(())
    }

    async fn delete_address(&self, address: &Address) -> Result<()> {
        self.record("delete_address", &address.public_ip)?;
        self.state()
            .addresses
            .retain(|a| a.public_ip != address.public_ip);
        Ok(())
    }

    async fn create_vpc(&self, name: &str, cidr_block: &str) -> Result<String> {
        self.record("create_vpc", format!("{} {}", name, cidr_block))?;
        let mut state = self.state();
        let id = state.next_id("vpc");
        state.vpcs.push(id.clone());
        Ok(id)
    }

    async fn create_subnet(&self, vpc_id: &str, cidr_block: &str) -> Result<String> {
        self.record("create_subnet", format!("{} {}", vpc_id, cidr_block))?;
        let mut state = self.state();
        if !state.vpcs.iter().any(|v| v == vpc_id) {
            return Err(CloudError::ResourceNotFound(format!("vpc {}", vpc_id)));
        }
        Ok(state.next_id("subnet"))
    }

    async fn create_internet_gateway(&self, vpc_id: &str) -> Result<String> {
        self.record("create_internet_gateway", vpc_id)?;
        let mut state = self.state();
        if !state.vpcs.iter().any(|v| v == vpc_id) {
            return Err(CloudError::ResourceNotFound(format!("vpc {}", vpc_id)));
        }
        Ok(state.next_id("igw"))
    }

    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume> {
        self.record(
            "create_volume",
            format!("{} {}GB", request.name, request.size_gb),
        )?;
        let mut state = self.state();
        let volume = Volume {
            id: state.next_id("vol"),
            name: Some(request.name.clone()),
            size_gb: request.size_gb,
            availability_zone: request.availability_zone.clone(),
            device: None,
            server_id: None,
        };
        state.volumes.push(volume.clone());
        Ok(volume)
    }

    async fn attach_volume(&self, volume_id: &str, server_id: &str, device: &str) -> Result<()> {
        self.record(
            "attach_volume",
            format!("{} {} {}", volume_id, server_id, device),
        )?;
        let mut state = self.state();
        let volume = state
            .volumes
            .iter_mut()
            .find(|v| v.id == volume_id)
            .ok_or_else(|| CloudError::ResourceNotFound(format!("volume {}", volume_id)))?;
        volume.server_id = Some(server_id.to_string());
        volume.device = Some(device.to_string());
        Ok(())
    }

    async fn list_server_volumes(&self, server_id: &str) -> Result<Vec<Volume>> {
        self.record("list_server_volumes", server_id)?;
        Ok(self
            .state()
            .volumes
            .iter()
            .filter(|v| v.server_id.as_deref() == Some(server_id))
            .cloned()
            .collect())
    }

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>> {
        self.record("list_key_pairs", "")?;
        Ok(self.state().key_pairs.clone())
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.record("delete_key_pair", name)?;
        self.state().key_pairs.retain(|k| k.name != name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_becomes_ready_after_configured_polls() {
        let gateway = InMemoryGateway::new("us-east-1");
        gateway.set_readiness(Readiness::AfterPolls(2));
        let server = gateway
            .create_server(&ServerAttributes {
                image_id: "ami-1".to_string(),
                key_name: "key".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let states: Vec<ServerState> = {
            let mut states = Vec::new();
            for _ in 0..3 {
                states.push(gateway.get_server(&server.id).await.unwrap().unwrap().state);
            }
            states
        };

        assert_eq!(
            states,
            vec![
                ServerState::Pending,
                ServerState::Pending,
                ServerState::Running
            ]
        );
        assert_eq!(server.groups, vec!["default".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_logged_and_returned() {
        let gateway = InMemoryGateway::new("us-east-1");
        gateway.fail_on("list_servers");

        tokio_test::assert_err!(gateway.list_servers().await);
        tokio_test::assert_ok!(gateway.list_addresses().await);
        assert_eq!(gateway.count_calls("list_servers"), 1);
    }

    #[tokio::test]
    async fn test_group_with_members_cannot_be_deleted() {
        let gateway = InMemoryGateway::new("us-east-1");
        let group = gateway.find_group("default").unwrap();
        gateway
            .create_server(&ServerAttributes {
                image_id: "ami-1".to_string(),
                key_name: "key".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(gateway.delete_security_group(&group).await.is_err());
        assert!(gateway.find_group("default").is_some());
    }

    #[tokio::test]
    async fn test_group_names_repeat_across_vpcs() {
        let gateway = InMemoryGateway::new("us-east-1");
        let first = gateway
            .create_security_group("web", "web", Some("vpc-a"))
            .await
            .unwrap();
        let second = gateway
            .create_security_group("web", "web", Some("vpc-b"))
            .await
            .unwrap();
        let again = gateway.create_security_group("web", "web", Some("vpc-b")).await;

        assert_ne!(first.group_id, second.group_id);
        assert!(again.unwrap_err().is_already_exists());
        let by_id = gateway
            .find_security_group_by_id(&second.group_id)
            .await
            .unwrap();
        assert_eq!(by_id, Some(second));
    }

    #[tokio::test]
    async fn test_new_server_is_invisible_during_lag() {
        let gateway = InMemoryGateway::new("us-east-1");
        gateway.set_visibility_lag(2);
        let server = gateway
            .create_server(&ServerAttributes {
                image_id: "ami-1".to_string(),
                key_name: "key".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(gateway.get_server(&server.id).await.unwrap().is_none());
        assert!(matches!(
            gateway.save_server(&server).await,
            Err(CloudError::ResourceNotFound(_))
        ));
        assert!(gateway.get_server(&server.id).await.unwrap().is_some());
        tokio_test::assert_ok!(gateway.save_server(&server).await);
    }
}
