//! Security group reconciliation
//!
//! Brings a named security group in line with a set of desired ingress rules
//! by opening only the rules that are not already covered. Nothing is ever
//! narrowed, merged or revoked, so running a reconciliation again is safe.

use crate::error::{CloudError, Result};
use crate::gateway::ComputeGateway;
use crate::model::{IngressGrant, LiveRule, PortSpec, SecurityGroup};
use std::sync::Arc;

/// Outcome of a reconciliation call
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub group: SecurityGroup,

    /// Whether the group was created by this call
    pub created: bool,

    /// Grants authorized by this call, in application order
    pub opened: Vec<IngressGrant>,
}

impl ReconcileReport {
    pub fn rules_opened(&self) -> usize {
        self.opened.len()
    }
}

/// True when some live rule already authorizes `grant`
///
/// This is a coverage test: a live rule with the same protocol and CIDR whose
/// range contains the requested range satisfies it.
pub fn is_port_open(live: &[LiveRule], grant: &IngressGrant) -> bool {
    live.iter().any(|rule| rule.covers(grant))
}

/// Opens missing ingress rules on security groups
pub struct SecurityGroupReconciler {
    gateway: Arc<dyn ComputeGateway>,
}

impl SecurityGroupReconciler {
    pub fn new(gateway: Arc<dyn ComputeGateway>) -> Self {
        Self { gateway }
    }

    /// Get-or-create `group_name`, then open every desired rule it lacks
    ///
    /// The live rule set is read once. Grants applied before a gateway error
    /// stay applied; calling again picks up where the failed call stopped.
    pub async fn reconcile(
        &self,
        group_name: &str,
        description: &str,
        desired: &[PortSpec],
    ) -> Result<ReconcileReport> {
        let (group, created) = self.get_or_create_group(group_name, description).await?;
        let opened = self.open_missing(&group, desired).await?;

        Ok(ReconcileReport {
            group,
            created,
            opened,
        })
    }

    /// Open the desired rules an existing group does not cover yet
    pub async fn open_missing(
        &self,
        group: &SecurityGroup,
        desired: &[PortSpec],
    ) -> Result<Vec<IngressGrant>> {
        let mut live = self.gateway.list_ip_permissions(group).await?;
        let mut opened = Vec::new();

        for spec in desired {
            for grant in spec.grants() {
                if is_port_open(&live, &grant) {
                    tracing::debug!(
                        "{} ports {} {} already open from {}",
                        spec.name,
                        grant.protocol.as_str().to_uppercase(),
                        grant.port_range,
                        grant.cidr
                    );
                    continue;
                }

                self.authorize(group, &grant).await?;
                tracing::info!(
                    "opened {} ports {} {} from IP range {}",
                    spec.name,
                    grant.protocol.as_str().to_uppercase(),
                    grant.port_range,
                    grant.cidr
                );
                live.push(LiveRule::from(&grant));
                opened.push(grant);
            }
        }

        if opened.is_empty() {
            tracing::info!("no additional ports opened on {}", group.name);
        }

        Ok(opened)
    }

    /// Authorize a single grant without consulting the live rule set
    ///
    /// A provider that reports the grant as a duplicate is treated as success.
    pub async fn authorize(&self, group: &SecurityGroup, grant: &IngressGrant) -> Result<()> {
        match self.gateway.authorize_port_range(group, grant).await {
            Err(e) if e.is_already_exists() => {
                tracing::debug!("{} already authorized on {}", grant.port_range, group.name);
                Ok(())
            }
            other => other,
        }
    }

    /// Reuse the named group, or create it
    ///
    /// A concurrent creator can win the race between lookup and create; the
    /// resulting "already exists" is turned into a second lookup.
    pub async fn get_or_create_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<(SecurityGroup, bool)> {
        if let Some(group) = self.gateway.find_security_group(name).await? {
            tracing::info!("Reusing security group {}", name);
            return Ok((group, false));
        }

        match self
            .gateway
            .create_security_group(name, description, None)
            .await
        {
            Ok(group) => {
                tracing::info!("Created security group {}", name);
                Ok((group, true))
            }
            Err(e) if e.is_already_exists() => {
                tracing::debug!("security group {} appeared concurrently, reusing it", name);
                let group = self.gateway.find_security_group(name).await?.ok_or_else(|| {
                    CloudError::ResourceNotFound(format!("security group {}", name))
                })?;
                Ok((group, false))
            }
            Err(e) => Err(e),
        }
    }
}
