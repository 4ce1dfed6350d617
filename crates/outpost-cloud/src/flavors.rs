//! Instance flavor catalog

use crate::error::{CloudError, Result};
use serde::Serialize;

/// Hardware profile of an instance type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flavor {
    pub id: &'static str,
    pub name: &'static str,
    pub bits: u32,
    pub cores: f32,
    pub disk_gb: u32,
    pub ram_mb: u32,
}

macro_rules! flavor {
    ($id:literal, $name:literal, $bits:literal, $cores:literal, $disk:literal, $ram:literal) => {
        Flavor {
            id: $id,
            name: $name,
            bits: $bits,
            cores: $cores,
            disk_gb: $disk,
            ram_mb: $ram,
        }
    };
}

const AWS_FLAVORS: &[Flavor] = &[
    flavor!("t1.micro", "Micro Instance", 0, 2.0, 0, 613),
    flavor!("m1.small", "Small Instance", 32, 1.0, 160, 1740),
    flavor!("m1.medium", "Medium Instance", 32, 2.0, 400, 3750),
    flavor!("m1.large", "Large Instance", 64, 4.0, 850, 7680),
    flavor!("m1.xlarge", "Extra Large Instance", 64, 8.0, 1690, 15360),
    flavor!("c1.medium", "High-CPU Medium", 32, 5.0, 350, 1740),
    flavor!("c1.xlarge", "High-CPU Extra Large", 64, 20.0, 1690, 7168),
    flavor!("m2.xlarge", "High-Memory Extra Large", 64, 6.5, 420, 17510),
    flavor!("m2.2xlarge", "High Memory Double Extra Large", 64, 13.0, 850, 35020),
    flavor!("m2.4xlarge", "High Memory Quadruple Large", 64, 26.0, 1690, 70041),
    flavor!("m3.xlarge", "M3 Extra Large", 64, 13.0, 0, 15360),
    flavor!("m3.2xlarge", "M3 Double Extra Large", 64, 26.0, 0, 30720),
    flavor!("cc1.4xlarge", "Cluster Compute Quadruple Extra Large", 64, 33.5, 1690, 23552),
    flavor!("cc2.8xlarge", "Cluster Compute Eight Extra Large", 64, 88.0, 3370, 61952),
    flavor!("cg1.4xlarge", "Cluster GPU Quadruple Extra Large", 64, 33.5, 1690, 22528),
    flavor!("hi1.4xlarge", "High I/O Quadruple Extra Large", 64, 35.0, 2048, 61952),
];

/// Static listing of supported instance flavors
#[derive(Debug, Clone)]
pub struct FlavorCatalog {
    flavors: &'static [Flavor],
}

impl FlavorCatalog {
    pub fn aws() -> Self {
        Self {
            flavors: AWS_FLAVORS,
        }
    }

    pub fn find(&self, id: &str) -> Option<&Flavor> {
        self.flavors.iter().find(|f| f.id == id)
    }

    /// Megabytes of RAM for the requested flavor
    pub fn ram_for_flavor(&self, id: &str) -> Result<u32> {
        self.find(id)
            .map(|f| f.ram_mb)
            .ok_or_else(|| CloudError::UnknownFlavor(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.flavors.iter().map(|f| f.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flavor> {
        self.flavors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_for_known_flavor() {
        let catalog = FlavorCatalog::aws();
        assert_eq!(catalog.ram_for_flavor("t1.micro").unwrap(), 613);
        assert_eq!(catalog.find("m1.large").unwrap().cores, 4.0);
    }

    #[test]
    fn test_unknown_flavor() {
        let err = FlavorCatalog::aws().ram_for_flavor("x9.huge").unwrap_err();
        assert_eq!(err.to_string(), "Unknown flavor 'x9.huge'");
    }

    #[test]
    fn test_ids_are_unique() {
        let catalog = FlavorCatalog::aws();
        let mut ids: Vec<&str> = catalog.ids().collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
