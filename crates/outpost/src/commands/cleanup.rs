use colored::Colorize;
use outpost_cloud::{ComputeGateway, ResourceCleanupSweeper};
use std::sync::Arc;

pub async fn handle_addresses(gateway: Arc<dyn ComputeGateway>) -> anyhow::Result<()> {
    println!("{}", "Releasing unattached addresses...".yellow());
    let deleted = ResourceCleanupSweeper::new(gateway)
        .sweep_unattached_addresses()
        .await?;
    println!(
        "{}",
        format!("✓ Released {} address(es)", deleted).green().bold()
    );
    Ok(())
}

pub async fn handle_destroy_group(
    gateway: Arc<dyn ComputeGateway>,
    name: &str,
) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("Destroying security group '{}' and its servers...", name).yellow()
    );
    let report = ResourceCleanupSweeper::new(gateway)
        .delete_security_group_and_servers(name)
        .await?;

    for id in &report.servers_deleted {
        println!("  {} {}", "-".red(), id);
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }

    if report.group_deleted {
        println!(
            "{}",
            format!(
                "✓ Deleted {} and {} server(s)",
                name,
                report.servers_deleted.len()
            )
            .green()
            .bold()
        );
    } else {
        println!(
            "{}",
            format!("ℹ Security group '{}' was not deleted", name).dimmed()
        );
    }
    Ok(())
}

pub async fn handle_delete_key_pair(
    gateway: Arc<dyn ComputeGateway>,
    name: &str,
) -> anyhow::Result<()> {
    if ResourceCleanupSweeper::new(gateway)
        .delete_key_pair(name)
        .await?
    {
        println!("{}", format!("✓ Deleted key pair {}", name).green().bold());
    } else {
        println!("{}", format!("ℹ Key pair '{}' does not exist", name).dimmed());
    }
    Ok(())
}
