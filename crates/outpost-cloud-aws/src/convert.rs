//! SDK type -> outpost model conversions

use aws_sdk_ec2::primitives::DateTime as AwsDateTime;
use aws_sdk_ec2::types::{
    Address as AwsAddress, DomainType, Instance, IpPermission, KeyPairInfo,
    SecurityGroup as AwsSecurityGroup, Tag, Volume as AwsVolume,
};
use chrono::{DateTime, Utc};
use outpost_cloud::{
    Address, AddressDomain, KeyPair, LiveRule, SecurityGroup, Server, ServerState, Volume,
};

/// EC2 reports "all ports" as a missing range
const ALL_PORTS: i32 = -1;

pub(crate) fn name_tag(tags: &[Tag]) -> Option<String> {
    tags.iter()
        .find(|t| t.key() == Some("Name"))
        .and_then(|t| t.value())
        .map(str::to_string)
}

pub(crate) fn timestamp(value: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

pub(crate) fn server(instance: &Instance) -> Option<Server> {
    let id = instance.instance_id()?.to_string();
    let state = instance
        .state()
        .and_then(|s| s.name())
        .map(|n| ServerState::parse(n.as_str()))
        .unwrap_or_default();

    let groups = instance.security_groups();

    Some(Server {
        id,
        name: name_tag(instance.tags()),
        state,
        groups: groups
            .iter()
            .filter_map(|g| g.group_name().map(str::to_string))
            .collect(),
        group_ids: groups
            .iter()
            .filter_map(|g| g.group_id().map(str::to_string))
            .collect(),
        public_ip: instance.public_ip_address().map(str::to_string),
        dns_name: instance
            .public_dns_name()
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        availability_zone: instance
            .placement()
            .and_then(|p| p.availability_zone())
            .map(str::to_string),
        image_id: instance.image_id().map(str::to_string),
        flavor_id: instance.instance_type().map(|t| t.as_str().to_string()),
        key_name: instance.key_name().map(str::to_string),
        subnet_id: instance.subnet_id().map(str::to_string),
        launched_at: instance.launch_time().and_then(timestamp),
    })
}

pub(crate) fn security_group(group: &AwsSecurityGroup) -> Option<SecurityGroup> {
    Some(SecurityGroup {
        name: group.group_name()?.to_string(),
        group_id: group.group_id()?.to_string(),
        description: group.description().unwrap_or_default().to_string(),
        vpc_id: group.vpc_id().map(str::to_string),
    })
}

pub(crate) fn live_rules(permissions: &[IpPermission]) -> Vec<LiveRule> {
    permissions
        .iter()
        .map(|p| LiveRule {
            protocol: p.ip_protocol().unwrap_or("-1").to_string(),
            from_port: p.from_port().unwrap_or(ALL_PORTS),
            to_port: p.to_port().unwrap_or(ALL_PORTS),
            ip_ranges: p
                .ip_ranges()
                .iter()
                .filter_map(|r| r.cidr_ip().map(str::to_string))
                .collect(),
        })
        .collect()
}

pub(crate) fn address_domain(domain: Option<&DomainType>) -> AddressDomain {
    match domain {
        Some(DomainType::Vpc) => AddressDomain::Vpc,
        _ => AddressDomain::Standard,
    }
}

pub(crate) fn domain_type(domain: AddressDomain) -> DomainType {
    match domain {
        AddressDomain::Standard => DomainType::Standard,
        AddressDomain::Vpc => DomainType::Vpc,
    }
}

pub(crate) fn address(address: &AwsAddress) -> Option<Address> {
    Some(Address {
        public_ip: address.public_ip()?.to_string(),
        allocation_id: address.allocation_id().map(str::to_string),
        domain: address_domain(address.domain()),
        server_id: address
            .instance_id()
            .filter(|id| !id.is_empty())
            .map(str::to_string),
    })
}

pub(crate) fn volume(volume: &AwsVolume) -> Option<Volume> {
    let attachment = volume.attachments().first();
    Some(Volume {
        id: volume.volume_id()?.to_string(),
        name: name_tag(volume.tags()),
        size_gb: volume.size().unwrap_or_default(),
        availability_zone: volume.availability_zone().unwrap_or_default().to_string(),
        device: attachment.and_then(|a| a.device()).map(str::to_string),
        server_id: attachment.and_then(|a| a.instance_id()).map(str::to_string),
    })
}

pub(crate) fn key_pair(info: &KeyPairInfo) -> Option<KeyPair> {
    Some(KeyPair {
        name: info.key_name()?.to_string(),
        fingerprint: info.key_fingerprint().map(str::to_string),
    })
}
