//! Removal of orphaned and named resources

use crate::error::Result;
use crate::gateway::ComputeGateway;
use crate::model::Server;
use std::sync::Arc;

/// Result of tearing down a security group and its servers
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Ids of destroyed servers
    pub servers_deleted: Vec<String>,

    /// Whether the group itself was deleted
    pub group_deleted: bool,

    /// Provider errors that were logged instead of returned
    pub warnings: Vec<String>,
}

/// Deletes resources nothing else refers to
pub struct ResourceCleanupSweeper {
    gateway: Arc<dyn ComputeGateway>,
}

impl ResourceCleanupSweeper {
    pub fn new(gateway: Arc<dyn ComputeGateway>) -> Self {
        Self { gateway }
    }

    /// Delete every elastic address that is not bound to a server
    pub async fn sweep_unattached_addresses(&self) -> Result<usize> {
        let mut deleted = 0;
        for address in self.gateway.list_addresses().await? {
            if address.is_attached() {
                continue;
            }
            tracing::info!("Deleting IP address {}...", address.public_ip);
            self.gateway.delete_address(&address).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Servers that belong to the named security group
    pub async fn servers_with_group(&self, group_name: &str) -> Result<Vec<Server>> {
        let Some(group) = self.gateway.find_security_group(group_name).await? else {
            tracing::warn!("no security group {} was found", group_name);
            return Ok(Vec::new());
        };

        Ok(self
            .gateway
            .list_servers()
            .await?
            .into_iter()
            .filter(|s| s.in_group(&group.name, &group.group_id))
            .collect())
    }

    /// Destroy every server in the group, then the group itself
    ///
    /// Servers may still be terminating when the group is deleted, so a
    /// provider error on that last step is logged and recorded, not returned.
    pub async fn delete_security_group_and_servers(
        &self,
        group_name: &str,
    ) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let Some(group) = self.gateway.find_security_group(group_name).await? else {
            tracing::warn!("no security group {} was found", group_name);
            return Ok(report);
        };

        for server in self.gateway.list_servers().await? {
            if !server.in_group(&group.name, &group.group_id) {
                continue;
            }
            tracing::info!("Destroying server {}...", server.id);
            self.gateway.delete_server(&server.id).await?;
            report.servers_deleted.push(server.id);
        }

        tracing::info!("Destroying security group {}...", group.name);
        match self.gateway.delete_security_group(&group).await {
            Ok(()) => report.group_deleted = true,
            Err(e) => {
                tracing::warn!("could not delete security group {}: {}", group.name, e);
                report.warnings.push(e.to_string());
            }
        }

        Ok(report)
    }

    /// Delete a key pair if it is registered; returns whether one was deleted
    pub async fn delete_key_pair(&self, name: &str) -> Result<bool> {
        let exists = self
            .gateway
            .list_key_pairs()
            .await?
            .iter()
            .any(|k| k.name == name);
        if !exists {
            return Ok(false);
        }

        tracing::info!("Deleting key pair {}...", name);
        self.gateway.delete_key_pair(name).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryGateway;
    use crate::model::{Address, AddressDomain, ServerState};

    fn member(id: &str, group: &str) -> Server {
        Server {
            id: id.to_string(),
            state: ServerState::Running,
            groups: vec![group.to_string()],
            ..Default::default()
        }
    }

    fn address(ip: &str, server_id: Option<&str>) -> Address {
        Address {
            public_ip: ip.to_string(),
            allocation_id: None,
            domain: AddressDomain::Standard,
            server_id: server_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_sweeps_only_unattached_addresses() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.seed_address(address("54.0.0.1", None));
        gateway.seed_address(address("54.0.0.2", Some("i-1")));
        gateway.seed_address(address("54.0.0.3", None));

        let deleted = ResourceCleanupSweeper::new(gateway.clone())
            .sweep_unattached_addresses()
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        let remaining: Vec<String> = gateway
            .addresses()
            .into_iter()
            .map(|a| a.public_ip)
            .collect();
        assert_eq!(remaining, vec!["54.0.0.2".to_string()]);
    }

    #[tokio::test]
    async fn test_deletes_members_then_group() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.seed_security_group("inception", "inception", None);
        gateway.seed_server(member("i-1", "inception"));
        gateway.seed_server(member("i-2", "other"));
        gateway.seed_server(member("i-3", "inception"));

        let report = ResourceCleanupSweeper::new(gateway.clone())
            .delete_security_group_and_servers("inception")
            .await
            .unwrap();

        assert_eq!(report.servers_deleted, vec!["i-1".to_string(), "i-3".to_string()]);
        assert!(report.group_deleted);
        assert!(gateway.find_group("inception").is_none());
        assert_eq!(gateway.servers().len(), 1);
    }

    #[tokio::test]
    async fn test_group_deletion_error_is_a_warning() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.seed_security_group("inception", "inception", None);
        gateway.seed_server(member("i-1", "inception"));
        gateway.fail_on("delete_security_group");

        let report = ResourceCleanupSweeper::new(gateway.clone())
            .delete_security_group_and_servers("inception")
            .await
            .unwrap();

        assert_eq!(report.servers_deleted, vec!["i-1".to_string()]);
        assert!(!report.group_deleted);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_group_is_not_an_error() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let sweeper = ResourceCleanupSweeper::new(gateway.clone());

        assert!(sweeper.servers_with_group("nope").await.unwrap().is_empty());
        let report = sweeper
            .delete_security_group_and_servers("nope")
            .await
            .unwrap();
        assert!(!report.group_deleted);
        assert_eq!(gateway.count_calls("list_servers"), 0);
    }

    #[tokio::test]
    async fn test_delete_key_pair() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.seed_key_pair("inception");
        let sweeper = ResourceCleanupSweeper::new(gateway.clone());

        assert!(sweeper.delete_key_pair("inception").await.unwrap());
        assert!(!sweeper.delete_key_pair("inception").await.unwrap());
        assert_eq!(gateway.count_calls("delete_key_pair"), 1);
    }
}
