use crate::ports;
use colored::Colorize;
use outpost_cloud::{
    BootstrapOptions, BootstrapOrchestrator, BootstrapRequest, ComputeGateway, FlavorCatalog,
    RegionImageTable,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct BootstrapArgs {
    pub key_name: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub image_id: Option<String>,
    pub flavor: Option<String>,
    pub subnet_id: Option<String>,
    pub groups: Vec<String>,
    pub name: Option<String>,
    pub ports: Option<PathBuf>,
    pub timeout: u64,
    pub poll_interval: u64,
    pub ensure_vpc_ingress: bool,
    pub simulate: bool,
}

impl BootstrapArgs {
    fn request(&self) -> anyhow::Result<BootstrapRequest> {
        let mut request = BootstrapRequest::new();
        request.key_name = self.key_name.clone();
        request.private_key_path = self.private_key_path.clone();
        request.image_id = self.image_id.clone();
        request.subnet_id = self.subnet_id.clone();
        request.name = self.name.clone();
        request.groups = self.groups.clone();

        if let Some(flavor) = &self.flavor {
            FlavorCatalog::aws().ram_for_flavor(flavor)?;
            request.flavor_id = Some(flavor.clone());
        }
        if let Some(path) = &self.ports {
            request.ports = ports::load(path)?;
        }
        Ok(request)
    }

    fn options(&self) -> BootstrapOptions {
        BootstrapOptions {
            skip_remote_side_effects: self.simulate,
            poll_interval: Duration::from_secs(self.poll_interval),
            ready_timeout: Duration::from_secs(self.timeout),
            ensure_vpc_ingress: self.ensure_vpc_ingress,
        }
    }
}

pub async fn handle(gateway: Arc<dyn ComputeGateway>, args: BootstrapArgs) -> anyhow::Result<()> {
    let request = args.request()?;
    println!(
        "{}",
        format!("Bootstrapping a server in {}...", gateway.region()).yellow()
    );
    if args.simulate {
        println!("{}", "(simulated: readiness and setup are skipped)".dimmed());
    }

    let orchestrator =
        BootstrapOrchestrator::new(gateway, RegionImageTable::default(), args.options());
    let report = orchestrator.bootstrap(request).await?;

    let server = &report.server;
    println!();
    println!("{}", format!("✓ Server {} is up", server.id).green().bold());
    if let Some(host) = server.host() {
        println!("  {:<10} {}", "Address:", host.cyan());
    }
    println!("  {:<10} {}", "State:", server.state);
    println!("  {:<10} {}", "Groups:", server.groups.join(", "));
    println!("  {:<10} {}", "Rules:", report.rules_opened);
    if report.ports_skipped > 0 {
        println!(
            "  {}",
            format!(
                "{} requested port rule(s) not opened inside a VPC, \
                 pass --ensure-vpc-ingress to open them",
                report.ports_skipped
            )
            .yellow()
        );
    }
    let phases: Vec<String> = report.phases.iter().map(|p| p.to_string()).collect();
    println!("  {:<10} {}", "Phases:", phases.join(" -> "));
    let elapsed = report.finished_at - report.started_at;
    println!(
        "  {:<10} {}.{:03}s",
        "Elapsed:",
        elapsed.num_seconds(),
        elapsed.num_milliseconds() % 1000
    );
    Ok(())
}
