//! Resource models shared by the gateway and the core operations

mod resource;
mod rule;
mod server;

pub use resource::{Address, AddressDomain, KeyPair, Volume, VolumeRequest};
pub use rule::{ANY_IPV4, IngressGrant, LiveRule, PortRange, PortSpec, Protocol, SecurityGroup};
pub use server::{Server, ServerAttributes, ServerState};
