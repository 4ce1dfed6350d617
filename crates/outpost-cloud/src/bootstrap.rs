//! Server bootstrap
//!
//! Drives one bootstrap request through its phases:
//!
//! ```text
//! Created -> IngressEnsured -> Provisioned -> Ready -> Configured
//!    \            \                \            \
//!     +------------+----------------+------------+--> Failed
//! ```
//!
//! Request validation happens before the first gateway call, so an incomplete
//! request never leaves anything behind on the provider. A failure after the
//! creation call leaves the instance in place; resubmitting the request
//! creates a new one.

use crate::error::{CloudError, Result};
use crate::gateway::ComputeGateway;
use crate::images::RegionImageTable;
use crate::model::{IngressGrant, PortSpec, SecurityGroup, Server, ServerAttributes};
use crate::reconcile::{SecurityGroupReconciler, is_port_open};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Group the provider assigns when a server is created without one
const DEFAULT_GROUP: &str = "default";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Phase of a bootstrap request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Created,
    IngressEnsured,
    Provisioned,
    Ready,
    Configured,
    Failed,
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::IngressEnsured => "ingress-ensured",
            Self::Provisioned => "provisioned",
            Self::Ready => "ready",
            Self::Configured => "configured",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the caller wants booted
#[derive(Debug, Clone, Default)]
pub struct BootstrapRequest {
    /// Boot image; the region's default image is used when absent
    pub image_id: Option<String>,

    /// Registered key pair name (required)
    pub key_name: Option<String>,

    /// Local private key matching `key_name` (required, never sent)
    pub private_key_path: Option<PathBuf>,

    /// Presence selects VPC mode
    pub subnet_id: Option<String>,

    /// Extra ingress rules for the server's primary group
    pub ports: Vec<PortSpec>,

    pub name: Option<String>,
    pub flavor_id: Option<String>,
    pub groups: Vec<String>,
    pub availability_zone: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl BootstrapRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    pub fn private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn subnet_id(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet_id = Some(subnet_id.into());
        self
    }

    pub fn flavor_id(mut self, flavor_id: impl Into<String>) -> Self {
        self.flavor_id = Some(flavor_id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn ports(mut self, ports: Vec<PortSpec>) -> Self {
        self.ports = ports;
        self
    }

    /// Split into the remote payload and the local-only parts
    fn prepare(self, images: &RegionImageTable, region: &str) -> Result<PreparedRequest> {
        let key_name = self
            .key_name
            .ok_or(CloudError::MissingRequiredAttribute("key_name"))?;
        let private_key_path = self
            .private_key_path
            .ok_or(CloudError::MissingRequiredAttribute("private_key_path"))?;
        let image_id = match self.image_id {
            Some(image_id) => image_id,
            None => images.lookup(region)?.to_string(),
        };

        Ok(PreparedRequest {
            attributes: ServerAttributes {
                image_id,
                key_name,
                name: self.name,
                flavor_id: self.flavor_id,
                subnet_id: self.subnet_id,
                availability_zone: self.availability_zone,
                groups: self.groups,
                tags: self.tags,
            },
            private_key_path,
            ports: self.ports,
        })
    }
}

struct PreparedRequest {
    attributes: ServerAttributes,
    private_key_path: PathBuf,
    ports: Vec<PortSpec>,
}

/// Knobs for a bootstrap run
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Skip readiness polling and post-boot setup (simulated runs)
    pub skip_remote_side_effects: bool,

    pub poll_interval: Duration,

    /// Give up waiting for the server after this long
    pub ready_timeout: Duration,

    /// Also guarantee ssh ingress for servers launched into a VPC subnet
    pub ensure_vpc_ingress: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            skip_remote_side_effects: false,
            poll_interval: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(300),
            ensure_vpc_ingress: false,
        }
    }
}

/// Result of a successful bootstrap
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub server: Server,

    /// Phases completed, in order
    pub phases: Vec<BootstrapPhase>,

    /// Ingress rules opened on the server's group
    pub rules_opened: usize,

    /// Requested port rules left unopened because the server is in a VPC
    pub ports_skipped: usize,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Runs bootstrap requests against a gateway
pub struct BootstrapOrchestrator {
    gateway: Arc<dyn ComputeGateway>,
    reconciler: SecurityGroupReconciler,
    images: RegionImageTable,
    options: BootstrapOptions,
}

impl BootstrapOrchestrator {
    pub fn new(
        gateway: Arc<dyn ComputeGateway>,
        images: RegionImageTable,
        options: BootstrapOptions,
    ) -> Self {
        Self {
            reconciler: SecurityGroupReconciler::new(gateway.clone()),
            gateway,
            images,
            options,
        }
    }

    pub fn options(&self) -> &BootstrapOptions {
        &self.options
    }

    /// Create, secure, wait for and configure one server
    pub async fn bootstrap(&self, request: BootstrapRequest) -> Result<BootstrapReport> {
        let started_at = Utc::now();
        let mut phases = Vec::new();

        match self.run(request, &mut phases).await {
            Ok((server, rules_opened, ports_skipped)) => Ok(BootstrapReport {
                server,
                phases,
                rules_opened,
                ports_skipped,
                started_at,
                finished_at: Utc::now(),
            }),
            Err(e) => {
                let reached = phases
                    .last()
                    .map(|p: &BootstrapPhase| p.to_string())
                    .unwrap_or_else(|| "validation".to_string());
                tracing::error!(
                    phase = %BootstrapPhase::Failed,
                    last_completed = %reached,
                    "bootstrap failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: BootstrapRequest,
        phases: &mut Vec<BootstrapPhase>,
    ) -> Result<(Server, usize, usize)> {
        let prepared = request.prepare(&self.images, self.gateway.region())?;
        let vpc = prepared.attributes.is_vpc();
        let ports_skipped = if self.leaves_ingress(vpc) {
            prepared.ports.len()
        } else {
            0
        };

        tracing::info!(
            "Creating server from image {} in {}",
            prepared.attributes.image_id,
            self.gateway.region()
        );
        let server = self.gateway.create_server(&prepared.attributes).await?;
        phases.push(BootstrapPhase::Created);

        let rules_opened = self.ensure_ingress(&server, vpc, &prepared.ports).await?;
        phases.push(BootstrapPhase::IngressEnsured);

        let server = self.commit(&server).await?;
        phases.push(BootstrapPhase::Provisioned);

        if self.options.skip_remote_side_effects {
            tracing::info!("Simulated run, not waiting for server {}", server.id);
            phases.push(BootstrapPhase::Ready);
            phases.push(BootstrapPhase::Configured);
            return Ok((server, rules_opened, ports_skipped));
        }

        let server = self.wait_until_ready(&server).await?;
        phases.push(BootstrapPhase::Ready);

        self.gateway
            .run_setup(&server, std::slice::from_ref(&prepared.private_key_path))
            .await?;
        phases.push(BootstrapPhase::Configured);
        tracing::info!("Server {} is configured", server.id);

        Ok((server, rules_opened, ports_skipped))
    }

    fn leaves_ingress(&self, vpc: bool) -> bool {
        vpc && !self.options.ensure_vpc_ingress
    }

    fn poll_interval(&self) -> Duration {
        self.options.poll_interval.max(MIN_POLL_INTERVAL)
    }

    /// Save the new server, retrying while the provider cannot see it yet
    ///
    /// Reads right after a launch may miss the instance. The retries share
    /// the `ready_timeout` bound.
    async fn commit(&self, server: &Server) -> Result<Server> {
        let interval = self.poll_interval();
        let started = Instant::now();
        let deadline = started + self.options.ready_timeout;

        loop {
            match self.gateway.save_server(server).await {
                Err(CloudError::ResourceNotFound(what)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CloudError::BootstrapTimeout {
                            server_id: server.id.clone(),
                            waited: now - started,
                        });
                    }
                    tracing::debug!("{} is not listed yet, retrying in {:?}", what, interval);
                    sleep(interval.min(deadline - now)).await;
                }
                saved => return saved,
            }
        }
    }

    /// Make sure the server's primary group accepts ssh, plus any requested ports
    ///
    /// Servers inside a VPC are left alone unless `ensure_vpc_ingress` is set.
    pub async fn ensure_ingress(
        &self,
        server: &Server,
        vpc: bool,
        ports: &[PortSpec],
    ) -> Result<usize> {
        if self.leaves_ingress(vpc) {
            if ports.is_empty() {
                tracing::debug!("server {} is in a VPC, leaving its ingress untouched", server.id);
            } else {
                tracing::warn!(
                    "server {} is in a VPC, {} requested port rule(s) were not opened \
                     (enable ensure_vpc_ingress to open them)",
                    server.id,
                    ports.len()
                );
            }
            return Ok(0);
        }

        let group = self.primary_group(server).await?;

        let mut opened = 0;
        let ssh = IngressGrant::ssh_from_anywhere();
        let live = self.gateway.list_ip_permissions(&group).await?;
        if !is_port_open(&live, &ssh) {
            self.reconciler.authorize(&group, &ssh).await?;
            tracing::info!("opened ssh port 22 on security group {}", group.name);
            opened += 1;
        }

        if !ports.is_empty() {
            opened += self.reconciler.open_missing(&group, ports).await?.len();
        }

        Ok(opened)
    }

    /// The server's first security group, by id when the server carries ids
    async fn primary_group(&self, server: &Server) -> Result<SecurityGroup> {
        if let Some(group_id) = server.group_ids.first() {
            if let Some(group) = self.gateway.find_security_group_by_id(group_id).await? {
                return Ok(group);
            }
            tracing::debug!("security group {} not found by id, trying its name", group_id);
        }

        let name = server
            .groups
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_GROUP);
        self.gateway
            .find_security_group(name)
            .await?
            .ok_or_else(|| {
                CloudError::gateway(
                    "find_security_group",
                    format!("security group {} of server {} not found", name, server.id),
                )
            })
    }

    /// Poll until the server reports running, bounded by `ready_timeout`
    ///
    /// `server` must already be listed by the provider, so a server missing
    /// from a poll has disappeared and fails with `Gateway`. No poll is
    /// issued after the deadline. Dropping the returned future stops polling.
    pub async fn wait_until_ready(&self, server: &Server) -> Result<Server> {
        let interval = self.poll_interval();
        let started = Instant::now();
        let deadline = started + self.options.ready_timeout;

        loop {
            let current = self.gateway.get_server(&server.id).await?.ok_or_else(|| {
                CloudError::gateway(
                    "get_server",
                    format!("server {} disappeared while starting", server.id),
                )
            })?;

            if current.is_ready() {
                tracing::info!(
                    "Server {} is ready after {:?}",
                    current.id,
                    started.elapsed()
                );
                return Ok(current);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CloudError::BootstrapTimeout {
                    server_id: server.id.clone(),
                    waited: now - started,
                });
            }

            tracing::debug!(
                "server {} is {}, checking again in {:?}",
                current.id,
                current.state,
                interval
            );
            sleep(interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryGateway, Readiness};
    use crate::model::{ANY_IPV4, LiveRule, PortRange, Protocol, ServerState};

    fn orchestrator(
        gateway: &Arc<InMemoryGateway>,
        options: BootstrapOptions,
    ) -> BootstrapOrchestrator {
        BootstrapOrchestrator::new(gateway.clone(), RegionImageTable::default(), options)
    }

    fn complete_request() -> BootstrapRequest {
        BootstrapRequest::new()
            .key_name("inception")
            .private_key_path("/home/me/.ssh/inception")
            .flavor_id("m1.small")
    }

    #[tokio::test]
    async fn test_missing_key_name_makes_no_calls() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let request = BootstrapRequest::new().private_key_path("/tmp/key");

        let err = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(request)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::MissingRequiredAttribute("key_name")));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_private_key_path_makes_no_calls() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let request = BootstrapRequest::new().key_name("inception");

        let err = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(request)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CloudError::MissingRequiredAttribute("private_key_path")
        ));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unmapped_region_without_image() {
        let gateway = Arc::new(InMemoryGateway::new("mars-north-1"));

        let err = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request())
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::UnsupportedRegion(ref r) if r == "mars-north-1"));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_image_skips_region_lookup() {
        let gateway = Arc::new(InMemoryGateway::new("mars-north-1"));

        let report = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request().image_id("ami-custom"))
            .await
            .unwrap();

        assert_eq!(report.server.image_id.as_deref(), Some("ami-custom"));
    }

    #[tokio::test]
    async fn test_full_bootstrap_opens_ssh_once_and_configures() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));

        let report = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request())
            .await
            .unwrap();

        assert_eq!(
            report.phases,
            vec![
                BootstrapPhase::Created,
                BootstrapPhase::IngressEnsured,
                BootstrapPhase::Provisioned,
                BootstrapPhase::Ready,
                BootstrapPhase::Configured,
            ]
        );
        assert_eq!(report.server.state, ServerState::Running);
        assert_eq!(report.server.image_id.as_deref(), Some("ami-c30360aa"));
        assert_eq!(report.rules_opened, 1);
        assert_eq!(report.ports_skipped, 0);

        let authorizations = gateway.calls_named("authorize_port_range");
        assert_eq!(authorizations.len(), 1);
        assert_eq!(authorizations[0].detail, "default tcp 22..22 0.0.0.0/0");

        let setup = gateway.calls_named("run_setup");
        assert_eq!(setup.len(), 1);
        assert!(setup[0].detail.ends_with("/home/me/.ssh/inception"));
    }

    #[tokio::test]
    async fn test_existing_ssh_rule_is_not_reopened() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.seed_rule(
            "default",
            LiveRule {
                protocol: "tcp".to_string(),
                from_port: 22,
                to_port: 22,
                ip_ranges: vec![ANY_IPV4.to_string()],
            },
        );

        let report = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request())
            .await
            .unwrap();

        assert_eq!(report.rules_opened, 0);
        assert_eq!(gateway.count_calls("authorize_port_range"), 0);
    }

    #[tokio::test]
    async fn test_requested_ports_are_reconciled_on_primary_group() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.seed_security_group("inception", "inception", None);
        let ports = vec![
            PortSpec::tcp("ssh", PortRange::single(22)),
            PortSpec {
                name: "mosh".to_string(),
                protocol: Protocol::Udp,
                port_range: PortRange::new(60000, 60050).unwrap(),
                ip_ranges: vec![ANY_IPV4.to_string()],
            },
        ];

        let report = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request().group("inception").ports(ports))
            .await
            .unwrap();

        assert_eq!(report.rules_opened, 2);
        assert_eq!(gateway.rules_of("inception").len(), 2);
        assert!(gateway.rules_of("default").is_empty());
    }

    #[tokio::test]
    async fn test_vpc_mode_skips_ingress() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));

        let report = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request().subnet_id("subnet-123"))
            .await
            .unwrap();

        assert_eq!(report.rules_opened, 0);
        assert_eq!(report.ports_skipped, 0);
        assert_eq!(gateway.count_calls("find_security_group"), 0);
        assert_eq!(gateway.count_calls("find_security_group_by_id"), 0);
        assert_eq!(gateway.count_calls("authorize_port_range"), 0);
        assert_eq!(report.server.subnet_id.as_deref(), Some("subnet-123"));
    }

    #[tokio::test]
    async fn test_vpc_mode_reports_skipped_ports() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let ports = vec![
            PortSpec::tcp("http", PortRange::single(80)),
            PortSpec::tcp("https", PortRange::single(443)),
        ];

        let report = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request().subnet_id("subnet-123").ports(ports))
            .await
            .unwrap();

        assert_eq!(report.rules_opened, 0);
        assert_eq!(report.ports_skipped, 2);
        assert_eq!(gateway.count_calls("authorize_port_range"), 0);
    }

    #[tokio::test]
    async fn test_primary_group_is_resolved_by_id() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let other = gateway.seed_security_group("web", "web", Some("vpc-a"));
        let own = gateway.seed_security_group("web", "web", Some("vpc-b"));
        let mut server = gateway
            .create_server(&ServerAttributes {
                image_id: "ami-1".to_string(),
                key_name: "key".to_string(),
                subnet_id: Some("subnet-b".to_string()),
                groups: vec![own.group_id.clone()],
                ..Default::default()
            })
            .await
            .unwrap();
        server.groups = vec!["web".to_string()];
        let options = BootstrapOptions {
            ensure_vpc_ingress: true,
            ..Default::default()
        };

        let opened = orchestrator(&gateway, options)
            .ensure_ingress(&server, true, &[])
            .await
            .unwrap();

        assert_eq!(opened, 1);
        assert_eq!(gateway.rules_of_id(&own.group_id).len(), 1);
        assert!(gateway.rules_of_id(&other.group_id).is_empty());
        assert_eq!(gateway.count_calls("find_security_group"), 0);
    }

    #[tokio::test]
    async fn test_missing_primary_group_is_gateway_error() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let mut server = gateway
            .create_server(&ServerAttributes {
                image_id: "ami-1".to_string(),
                key_name: "key".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        server.groups = vec!["gone".to_string()];
        server.group_ids = vec!["sg-gone".to_string()];

        let err = orchestrator(&gateway, BootstrapOptions::default())
            .ensure_ingress(&server, false, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Gateway(_)));
    }

    #[tokio::test]
    async fn test_vpc_mode_with_ingress_guarantee() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let options = BootstrapOptions {
            ensure_vpc_ingress: true,
            ..Default::default()
        };

        let report = orchestrator(&gateway, options)
            .bootstrap(complete_request().subnet_id("subnet-123"))
            .await
            .unwrap();

        assert_eq!(report.rules_opened, 1);
    }

    #[tokio::test]
    async fn test_simulated_run_skips_poll_and_setup() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.set_readiness(Readiness::Never);
        let options = BootstrapOptions {
            skip_remote_side_effects: true,
            ..Default::default()
        };

        let report = orchestrator(&gateway, options)
            .bootstrap(complete_request())
            .await
            .unwrap();

        assert_eq!(report.phases.last(), Some(&BootstrapPhase::Configured));
        assert_eq!(gateway.count_calls("get_server"), 0);
        assert_eq!(gateway.count_calls("run_setup"), 0);
        assert_eq!(gateway.count_calls("save_server"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_stops_polling() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.set_readiness(Readiness::Never);
        let options = BootstrapOptions {
            poll_interval: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(10),
            ..Default::default()
        };

        let err = orchestrator(&gateway, options)
            .bootstrap(complete_request())
            .await
            .unwrap_err();

        match err {
            CloudError::BootstrapTimeout { waited, .. } => {
                assert_eq!(waited, Duration::from_secs(10))
            }
            other => panic!("expected BootstrapTimeout, got {:?}", other),
        }
        let polls = gateway.count_calls("get_server");
        assert_eq!(polls, 3);
        assert_eq!(gateway.count_calls("run_setup"), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(gateway.count_calls("get_server"), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_running() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.set_readiness(Readiness::AfterPolls(3));

        let report = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request())
            .await
            .unwrap();

        assert!(report.server.is_ready());
        assert_eq!(gateway.count_calls("get_server"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_listed_late_is_still_bootstrapped() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.set_visibility_lag(2);

        let report = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request())
            .await
            .unwrap();

        assert_eq!(report.phases.last(), Some(&BootstrapPhase::Configured));
        assert_eq!(gateway.count_calls("save_server"), 3);
        assert_eq!(gateway.count_calls("run_setup"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_never_listed_times_out() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.set_visibility_lag(u32::MAX);
        let options = BootstrapOptions {
            poll_interval: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(10),
            ..Default::default()
        };

        let err = orchestrator(&gateway, options)
            .bootstrap(complete_request())
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::BootstrapTimeout { .. }));
        assert_eq!(gateway.count_calls("save_server"), 3);
        assert_eq!(gateway.count_calls("get_server"), 0);
    }

    #[tokio::test]
    async fn test_server_vanishing_while_waiting_is_gateway_error() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let server = gateway
            .create_server(&ServerAttributes {
                image_id: "ami-1".to_string(),
                key_name: "key".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        gateway.delete_server(&server.id).await.unwrap();

        let err = orchestrator(&gateway, BootstrapOptions::default())
            .wait_until_ready(&server)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Gateway(ref m) if m.contains("disappeared")));
        assert_eq!(gateway.count_calls("get_server"), 1);
    }

    #[tokio::test]
    async fn test_creation_failure_propagates_gateway_error() {
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.fail_on("create_server");

        let err = orchestrator(&gateway, BootstrapOptions::default())
            .bootstrap(complete_request())
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Gateway(_)));
        assert_eq!(gateway.count_calls("authorize_port_range"), 0);
    }
}
