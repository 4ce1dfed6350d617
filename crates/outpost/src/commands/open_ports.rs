use crate::ports;
use colored::Colorize;
use outpost_cloud::{ComputeGateway, SecurityGroupReconciler};
use std::path::Path;
use std::sync::Arc;

pub async fn handle(
    gateway: Arc<dyn ComputeGateway>,
    group: &str,
    description: Option<&str>,
    ports_file: &Path,
) -> anyhow::Result<()> {
    let specs = ports::load(ports_file)?;
    println!(
        "{}",
        format!("Reconciling {} rule(s) on security group '{}'...", specs.len(), group).yellow()
    );

    let reconciler = SecurityGroupReconciler::new(gateway);
    let report = reconciler
        .reconcile(group, description.unwrap_or(group), &specs)
        .await?;

    if report.created {
        println!("{} {}", "Created".green(), report.group.name.cyan());
    } else {
        println!("{} {}", "Reusing".dimmed(), report.group.name.cyan());
    }

    if report.opened.is_empty() {
        println!("{}", "✓ All ports already open".green().bold());
        return Ok(());
    }

    for grant in &report.opened {
        println!(
            "  {} {} {} from {}",
            "+".green(),
            grant.protocol,
            grant.port_range,
            grant.cidr
        );
    }
    println!();
    println!(
        "{}",
        format!("✓ Opened {} rule(s) on {}", report.rules_opened(), report.group.name)
            .green()
            .bold()
    );
    Ok(())
}
