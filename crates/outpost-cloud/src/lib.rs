//! Outpost cloud provisioning core
//!
//! This crate holds everything that decides *what* to do against a compute
//! provider; the provider itself sits behind the [`ComputeGateway`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   outpost CLI                    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 outpost-cloud                    │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ rules        │─▶│ SecurityGroupReconciler  │ │
//! │  └──────────────┘  └────────────▲─────────────┘ │
//! │  ┌──────────────┐  ┌────────────┴─────────────┐ │
//! │  │ images       │─▶│ BootstrapOrchestrator    │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait ComputeGateway { ... }            │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  Ec2Gateway   │ │InMemoryGateway│
//! │ (outpost-     │ │  (--mock,     │
//! │  cloud-aws)   │ │   tests)      │
//! └───────────────┘ └───────────────┘
//! ```

pub mod addresses;
pub mod bootstrap;
pub mod cleanup;
pub mod error;
pub mod flavors;
pub mod gateway;
pub mod images;
pub mod memory;
pub mod model;
pub mod reconcile;
pub mod rules;
pub mod volumes;

// Re-exports
pub use bootstrap::{
    BootstrapOptions, BootstrapOrchestrator, BootstrapPhase, BootstrapReport, BootstrapRequest,
};
pub use cleanup::{CleanupReport, ResourceCleanupSweeper};
pub use error::{CloudError, Result};
pub use flavors::{Flavor, FlavorCatalog};
pub use gateway::ComputeGateway;
pub use images::RegionImageTable;
pub use memory::InMemoryGateway;
pub use model::{
    ANY_IPV4, Address, AddressDomain, IngressGrant, KeyPair, LiveRule, PortRange, PortSpec,
    Protocol, SecurityGroup, Server, ServerAttributes, ServerState, Volume, VolumeRequest,
};
pub use reconcile::{ReconcileReport, SecurityGroupReconciler};
pub use rules::{PortDefinition, PortMap, normalize};
