mod commands;
mod ports;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "outpost")]
#[command(about = "Open firewall ports and bootstrap servers on a compute cloud")]
#[command(long_about = None)]
struct Cli {
    /// Provider configuration file (discovered when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Region, overriding the configuration file
    #[arg(short, long, global = true, env = "OUTPOST_REGION")]
    region: Option<String>,

    /// Run against an in-memory gateway; nothing is created remotely
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure a security group exists and has the given ports open
    OpenPorts {
        /// Security group name
        #[arg(short, long)]
        group: String,
        /// Description used when the group is created
        #[arg(short, long)]
        description: Option<String>,
        /// YAML file mapping rule names to port definitions
        #[arg(short, long)]
        ports: PathBuf,
    },
    /// Create a server, open ssh to it and run post-boot setup
    Bootstrap {
        /// Registered key pair name
        #[arg(long)]
        key_name: Option<String>,
        /// Private key matching the key pair
        #[arg(long)]
        private_key_path: Option<PathBuf>,
        /// Image to boot (defaults to the region's image)
        #[arg(long)]
        image_id: Option<String>,
        /// Instance flavor, see `outpost flavors`
        #[arg(long)]
        flavor: Option<String>,
        /// Launch into this VPC subnet
        #[arg(long)]
        subnet_id: Option<String>,
        /// Security group (repeatable)
        #[arg(long = "group")]
        groups: Vec<String>,
        /// Name tag for the server
        #[arg(long)]
        name: Option<String>,
        /// Extra ports to open on the server's group (YAML)
        #[arg(long)]
        ports: Option<PathBuf>,
        /// Seconds to wait for the server to become ready
        #[arg(long, default_value_t = 300)]
        timeout: u64,
        /// Seconds between readiness checks
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,
        /// Open ssh on the group even when launching into a subnet
        #[arg(long)]
        ensure_vpc_ingress: bool,
    },
    /// Release elastic addresses not bound to any server
    CleanupAddresses,
    /// Destroy every server in a security group, then the group
    DestroyGroup {
        /// Security group name
        name: String,
    },
    /// Delete a registered key pair
    DeleteKeyPair {
        /// Key pair name
        name: String,
    },
    /// List instance flavors
    Flavors,
    /// List the default image of each region
    Images,
    /// Show version information
    Version,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging();

    // Commands that never talk to a provider
    match cli.command {
        Commands::Version => {
            println!("outpost {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Flavors => {
            commands::catalog::handle_flavors();
            return Ok(());
        }
        Commands::Images => {
            commands::catalog::handle_images();
            return Ok(());
        }
        _ => {}
    }

    let target = commands::Target {
        config: cli.config,
        region: cli.region,
        mock: cli.mock,
    };
    let gateway = commands::connect(&target).await?;

    match cli.command {
        Commands::OpenPorts {
            group,
            description,
            ports,
        } => {
            commands::open_ports::handle(gateway, &group, description.as_deref(), &ports).await?;
        }
        Commands::Bootstrap {
            key_name,
            private_key_path,
            image_id,
            flavor,
            subnet_id,
            groups,
            name,
            ports,
            timeout,
            poll_interval,
            ensure_vpc_ingress,
        } => {
            let args = commands::bootstrap::BootstrapArgs {
                key_name,
                private_key_path,
                image_id,
                flavor,
                subnet_id,
                groups,
                name,
                ports,
                timeout,
                poll_interval,
                ensure_vpc_ingress,
                simulate: target.mock,
            };
            commands::bootstrap::handle(gateway, args).await?;
        }
        Commands::CleanupAddresses => {
            commands::cleanup::handle_addresses(gateway).await?;
        }
        Commands::DestroyGroup { name } => {
            commands::cleanup::handle_destroy_group(gateway, &name).await?;
        }
        Commands::DeleteKeyPair { name } => {
            commands::cleanup::handle_delete_key_pair(gateway, &name).await?;
        }
        Commands::Flavors | Commands::Images | Commands::Version => {
            unreachable!("handled before connecting");
        }
    }

    Ok(())
}
