use colored::Colorize;
use outpost_cloud::{FlavorCatalog, RegionImageTable};

pub fn handle_flavors() {
    println!(
        "{:<14} {:>6} {:>8} {:>10}  {}",
        "ID".bold(),
        "CORES".bold(),
        "RAM(MB)".bold(),
        "DISK(GB)".bold(),
        "NAME".bold()
    );
    for flavor in FlavorCatalog::aws().iter() {
        println!(
            "{:<14} {:>6} {:>8} {:>10}  {}",
            flavor.id.cyan(),
            flavor.cores,
            flavor.ram_mb,
            flavor.disk_gb,
            flavor.name
        );
    }
}

pub fn handle_images() {
    for (region, image) in RegionImageTable::default().iter() {
        println!("{:<16} {}", region.cyan(), image);
    }
}
