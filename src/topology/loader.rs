// Topology file loading - JSON or TOML payloads validated into domain types
//
// The raw structs mirror what a topology provider exports. Every address,
// mask, port and reference is checked here so the tracer never meets a
// malformed value mid-analysis.

use serde::Deserialize;
use std::path::Path;

use super::{Device, Interface, Link, TopologySnapshot};
use crate::address::{Cidr, NetworkZone, parse_ip};
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::policy::{
    AddressMatch, PolicyAction, PolicyRule, PortRange, Protocol, ServiceCatalog,
    ServiceDefinition, ServiceMatch, ServiceMember,
};
use crate::routes::{RouteEntry, RouteTarget};

#[derive(Debug, Deserialize)]
struct RawTopology {
    #[serde(default)]
    devices: Vec<RawDevice>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    id: String,
    #[serde(default)]
    zones: Vec<RawZone>,
    #[serde(default)]
    interfaces: Vec<RawInterface>,
    #[serde(default)]
    routes: Vec<RawRoute>,
    #[serde(default)]
    services: Vec<RawService>,
    #[serde(default)]
    policies: Vec<RawPolicy>,
}

#[derive(Debug, Deserialize)]
struct RawZone {
    name: String,
    #[serde(default)]
    networks: Vec<String>,
    gateway: Option<String>,
    #[serde(default)]
    external: bool,
}

#[derive(Debug, Deserialize)]
struct RawInterface {
    name: String,
    zone: String,
    /// `192.168.1.1/24` or `192.168.1.1 255.255.255.0`
    #[serde(alias = "ip")]
    address: String,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    #[serde(alias = "dst")]
    destination: String,
    interface: Option<String>,
    device: Option<String>,
    #[serde(default)]
    distance: u32,
}

/// Ports may be written as a number or as `"8000-8080"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPorts {
    Single(u16),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawServiceMember {
    protocol: String,
    ports: Option<RawPorts>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    name: String,
    protocol: Option<String>,
    ports: Option<RawPorts>,
    #[serde(default)]
    members: Vec<RawServiceMember>,
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    #[serde(alias = "policyid")]
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(alias = "srcaddr")]
    sources: Vec<String>,
    #[serde(alias = "dstaddr")]
    destinations: Vec<String>,
    #[serde(alias = "service")]
    services: Vec<String>,
    action: PolicyAction,
    #[serde(default)]
    nat: bool,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Load a topology file; `.json` files are decoded as JSON, anything else as TOML.
pub fn load_topology(path: &Path) -> AnalyzerResult<TopologySnapshot> {
    tracing::info!("Loading topology from: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let snapshot = if is_json {
        from_json_str(&content)?
    } else {
        from_toml_str(&content)?
    };
    tracing::info!("Loaded {} device(s)", snapshot.len());
    Ok(snapshot)
}

pub fn from_json_str(content: &str) -> AnalyzerResult<TopologySnapshot> {
    let raw: RawTopology = serde_json::from_str(content)?;
    build_snapshot(raw)
}

pub fn from_toml_str(content: &str) -> AnalyzerResult<TopologySnapshot> {
    let raw: RawTopology = toml::from_str(content)?;
    build_snapshot(raw)
}

fn build_snapshot(raw: RawTopology) -> AnalyzerResult<TopologySnapshot> {
    let devices = raw
        .devices
        .into_iter()
        .map(build_device)
        .collect::<AnalyzerResult<Vec<_>>>()?;
    TopologySnapshot::new(devices, raw.links)
}

fn build_device(raw: RawDevice) -> AnalyzerResult<Device> {
    let id = raw.id;

    let zones = raw
        .zones
        .into_iter()
        .map(build_zone)
        .collect::<AnalyzerResult<Vec<_>>>()?;

    let interfaces = raw
        .interfaces
        .into_iter()
        .map(|iface| -> AnalyzerResult<Interface> {
            Ok(Interface {
                name: iface.name,
                device_id: id.clone(),
                zone: iface.zone,
                address: iface.address.parse()?,
            })
        })
        .collect::<AnalyzerResult<Vec<_>>>()?;

    let routes = raw
        .routes
        .into_iter()
        .map(|route| build_route(&id, route))
        .collect::<AnalyzerResult<Vec<_>>>()?;

    let custom = raw
        .services
        .into_iter()
        .map(build_service)
        .collect::<AnalyzerResult<Vec<_>>>()?;
    let catalog = ServiceCatalog::new(custom);

    let policies = raw
        .policies
        .into_iter()
        .map(|policy| build_policy(&id, &catalog, policy))
        .collect::<AnalyzerResult<Vec<_>>>()?;

    tracing::debug!(
        "Device {}: {} zone(s), {} interface(s), {} route(s), {} policy rule(s)",
        id,
        zones.len(),
        interfaces.len(),
        routes.len(),
        policies.len()
    );

    Device::new(&id, zones, interfaces, routes, policies)
}

fn build_zone(raw: RawZone) -> AnalyzerResult<NetworkZone> {
    let networks = raw
        .networks
        .iter()
        .map(|n| n.parse::<Cidr>())
        .collect::<AnalyzerResult<Vec<_>>>()?;
    let gateway = raw.gateway.as_deref().map(parse_ip).transpose()?;

    Ok(NetworkZone {
        name: raw.name,
        networks,
        gateway,
        external: raw.external,
    })
}

fn build_route(device_id: &str, raw: RawRoute) -> AnalyzerResult<RouteEntry> {
    let destination = raw.destination.parse::<Cidr>()?.normalized();
    let target = match (raw.device, raw.interface) {
        (Some(target), via) => RouteTarget::Device { target, via },
        (None, Some(name)) => RouteTarget::Interface { name },
        (None, None) => {
            return Err(AnalyzerError::InvalidRoute {
                device_id: device_id.to_string(),
                reason: format!("route to {} names neither interface nor device", destination),
            });
        }
    };

    Ok(RouteEntry {
        destination,
        target,
        distance: raw.distance,
    })
}

fn parse_ports(raw: Option<RawPorts>) -> AnalyzerResult<Option<PortRange>> {
    match raw {
        None => Ok(None),
        Some(RawPorts::Single(port)) => PortRange::single(port).map(Some),
        Some(RawPorts::Text(text)) => text.parse().map(Some),
    }
}

fn build_service(raw: RawService) -> AnalyzerResult<ServiceDefinition> {
    let mut members = Vec::new();

    if let Some(protocol) = raw.protocol {
        members.push(ServiceMember {
            protocol: protocol.parse::<Protocol>()?,
            ports: parse_ports(raw.ports)?,
        });
    }
    for member in raw.members {
        members.push(ServiceMember {
            protocol: member.protocol.parse()?,
            ports: parse_ports(member.ports)?,
        });
    }

    if members.is_empty() {
        return Err(AnalyzerError::InvalidProtocol(format!(
            "service {} has no protocol",
            raw.name
        )));
    }

    Ok(ServiceDefinition {
        name: raw.name,
        members,
    })
}

fn build_policy(
    device_id: &str,
    catalog: &ServiceCatalog,
    raw: RawPolicy,
) -> AnalyzerResult<PolicyRule> {
    let services = raw
        .services
        .iter()
        .map(|name| -> AnalyzerResult<ServiceMatch> {
            if name.eq_ignore_ascii_case("any") {
                return Ok(ServiceMatch::Any);
            }
            catalog
                .get(name)
                .cloned()
                .map(ServiceMatch::Service)
                .ok_or_else(|| AnalyzerError::UnknownService {
                    device_id: device_id.to_string(),
                    service: name.clone(),
                })
        })
        .collect::<AnalyzerResult<Vec<_>>>()?;

    Ok(PolicyRule {
        id: raw.id,
        name: raw.name,
        device_id: device_id.to_string(),
        position: 0,
        sources: raw.sources.iter().map(|s| AddressMatch::parse(s)).collect(),
        destinations: raw.destinations.iter().map(|d| AddressMatch::parse(d)).collect(),
        services,
        action: raw.action,
        nat: raw.nat,
        enabled: raw.enabled,
    })
}
