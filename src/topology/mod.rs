// Topology module - devices, the caller-owned snapshot and provider seams

pub mod loader;

#[cfg(test)]
pub(crate) mod fixtures;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::address::{Cidr, NetworkZone, ZoneMap, ZoneName, parse_ip};
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::flow::Flow;
use crate::policy::{AddressMatch, PolicyMatcher, PolicyRule};
use crate::result::AnalysisResult;
use crate::routes::{NoRouteError, RouteEngine, RouteEntry, RouteMatch};
use crate::trace::{self, AnalyzeOptions};

pub use loader::{from_json_str, from_toml_str, load_topology};

/// Supplies normalized device data for an analysis.
pub trait TopologyProvider {
    fn load_device(&self, device_id: &str) -> AnalyzerResult<&Device>;
}

/// Maps a route's device-local target to the adjacent device it reaches.
pub trait DeviceInventory {
    fn resolve_next_device(&self, device_id: &str, route_target: &str) -> AnalyzerResult<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub device_id: String,
    pub zone: String,
    /// Interface address with its mask, e.g. `192.168.1.1/24`
    pub address: Cidr,
}

/// One firewall: zones, interfaces, routes and policies.
#[derive(Debug, Clone)]
pub struct Device {
    id: String,
    zones: ZoneMap,
    interfaces: Vec<Interface>,
    routes: RouteEngine,
    policies: PolicyMatcher,
}

impl Device {
    /// Checks that interfaces, routes and policies only reference zones and
    /// interfaces the device declares.
    pub fn new(
        id: &str,
        zones: Vec<NetworkZone>,
        mut interfaces: Vec<Interface>,
        routes: Vec<RouteEntry>,
        policies: Vec<PolicyRule>,
    ) -> AnalyzerResult<Self> {
        let zones = ZoneMap::new(zones);

        for (a, b) in zones.overlaps() {
            tracing::warn!(
                "Zones {} and {} overlap on device {}; {} wins for shared addresses",
                a,
                b,
                id,
                a
            );
        }

        for iface in &mut interfaces {
            if zones.get(&iface.zone).is_none() {
                return Err(AnalyzerError::UnknownZone {
                    device_id: id.to_string(),
                    zone: iface.zone.clone(),
                });
            }
            iface.device_id = id.to_string();
        }

        for route in &routes {
            if let Some(name) = route.target.egress_interface()
                && !interfaces.iter().any(|i| i.name == name)
            {
                return Err(AnalyzerError::UnknownInterface {
                    device_id: id.to_string(),
                    interface: name.to_string(),
                });
            }
        }

        for rule in &policies {
            for entry in rule.sources.iter().chain(rule.destinations.iter()) {
                if let AddressMatch::Zone(name) = entry {
                    let sentinel = ZoneName::external().matches(name) || ZoneName::local().matches(name);
                    if !sentinel && zones.get(name).is_none() {
                        return Err(AnalyzerError::UnknownZone {
                            device_id: id.to_string(),
                            zone: name.clone(),
                        });
                    }
                }
            }
        }

        Ok(Device {
            id: id.to_string(),
            zones,
            interfaces,
            routes: RouteEngine::new(routes),
            policies: PolicyMatcher::new(id, policies)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn zones(&self) -> &ZoneMap {
        &self.zones
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn routes(&self) -> &RouteEngine {
        &self.routes
    }

    pub fn policies(&self) -> &PolicyMatcher {
        &self.policies
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// First interface bound to the zone, used to name the ingress port.
    pub fn interface_for_zone(&self, zone: &ZoneName) -> Option<&Interface> {
        self.interfaces.iter().find(|i| zone.matches(&i.zone))
    }

    pub fn classify_zone(&self, ip: IpAddr) -> ZoneName {
        self.zones.classify(ip)
    }

    pub fn resolve_route(&self, destination: IpAddr) -> Result<RouteMatch<'_>, NoRouteError> {
        self.routes.lookup(destination).ok_or_else(|| NoRouteError {
            device_id: self.id.clone(),
            destination,
        })
    }

    pub fn match_policy(
        &self,
        flow: &Flow,
        src_zone: &ZoneName,
        dst_zone: &ZoneName,
    ) -> Option<&PolicyRule> {
        self.policies.match_policy(flow, src_zone, dst_zone)
    }

    /// Whether a flow leaving through `iface` can reach `dst_zone` directly.
    pub fn reaches(&self, iface: &Interface, dst_zone: &ZoneName) -> bool {
        if dst_zone.matches(&iface.zone) {
            return true;
        }
        self.zones
            .get(&iface.zone)
            .is_some_and(|z| z.external || z.gateway.is_some())
    }
}

/// Inventory entry: on device `from`, route target `target` leads to `device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: String,
    pub target: String,
    pub device: String,
}

/// Immutable view of the whole modeled network for a batch of analyses.
///
/// Devices are keyed by id so that iteration, and with it any output built
/// from the snapshot, is deterministic.
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    devices: BTreeMap<String, Device>,
    links: Vec<Link>,
}

impl TopologySnapshot {
    pub fn new(devices: Vec<Device>, links: Vec<Link>) -> AnalyzerResult<Self> {
        let mut map = BTreeMap::new();
        for device in devices {
            let id = device.id.clone();
            if map.insert(id.clone(), device).is_some() {
                return Err(AnalyzerError::DuplicateDevice(id));
            }
        }

        for link in &links {
            for id in [&link.from, &link.device] {
                if !map.contains_key(id) {
                    return Err(AnalyzerError::UnknownDevice(id.clone()));
                }
            }
        }

        Ok(TopologySnapshot {
            devices: map,
            links,
        })
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Zone of `ip` as seen by `device_id`.
    pub fn classify_zone(&self, device_id: &str, ip: &str) -> AnalyzerResult<ZoneName> {
        let ip = parse_ip(ip)?;
        Ok(self.load_device(device_id)?.classify_zone(ip))
    }

    /// First device, in id order, with a configured zone containing `ip`.
    pub fn locate_device(&self, ip: IpAddr) -> Option<&Device> {
        self.devices
            .values()
            .find(|d| d.zones.zones().iter().any(|z| z.contains(ip)))
    }

    /// Trace `flow` starting at `start_device`.
    pub fn analyze_path(
        &self,
        start_device: &str,
        flow: &Flow,
        options: &AnalyzeOptions,
    ) -> AnalyzerResult<AnalysisResult> {
        trace::analyze_path(self, self, start_device, flow, options)
    }
}

impl TopologyProvider for TopologySnapshot {
    fn load_device(&self, device_id: &str) -> AnalyzerResult<&Device> {
        self.devices
            .get(device_id)
            .ok_or_else(|| AnalyzerError::UnknownDevice(device_id.to_string()))
    }
}

impl DeviceInventory for TopologySnapshot {
    fn resolve_next_device(&self, device_id: &str, route_target: &str) -> AnalyzerResult<String> {
        if let Some(link) = self
            .links
            .iter()
            .find(|l| l.from == device_id && l.target == route_target)
        {
            return Ok(link.device.clone());
        }
        if self.devices.contains_key(route_target) {
            return Ok(route_target.to_string());
        }
        Err(AnalyzerError::UnknownDevice(route_target.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::RouteTarget;

    #[test]
    fn test_classify_zone_by_device() {
        let snapshot = fixtures::edge_snapshot();
        assert_eq!(
            snapshot.classify_zone("fw-edge", "172.16.10.50").unwrap().as_str(),
            "DMZ"
        );
        assert!(snapshot.classify_zone("fw-edge", "8.8.8.8").unwrap().is_external());
        assert!(matches!(
            snapshot.classify_zone("fw-edge", "172.16.10"),
            Err(AnalyzerError::InvalidAddress(_))
        ));
        assert!(matches!(
            snapshot.classify_zone("fw-missing", "10.0.0.1"),
            Err(AnalyzerError::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_resolve_route_no_route() {
        let snapshot = fixtures::chain_snapshot();
        let device = snapshot.device("fw-b").unwrap();
        let err = device.resolve_route("198.51.100.7".parse().unwrap()).unwrap_err();
        assert_eq!(err.device_id, "fw-b");
        assert_eq!(err.to_string(), "No route to 198.51.100.7 on device fw-b");
    }

    #[test]
    fn test_inventory_links_and_direct_ids() {
        let snapshot = fixtures::chain_snapshot();
        assert_eq!(
            snapshot.resolve_next_device("fw-a", "core-uplink").unwrap(),
            "fw-b"
        );
        assert_eq!(snapshot.resolve_next_device("fw-b", "fw-a").unwrap(), "fw-a");
        assert!(snapshot.resolve_next_device("fw-a", "nowhere").is_err());
    }

    #[test]
    fn test_locate_device() {
        let snapshot = fixtures::chain_snapshot();
        let device = snapshot.locate_device("192.168.1.10".parse().unwrap()).unwrap();
        assert_eq!(device.id(), "fw-a");
        assert!(snapshot.locate_device("8.8.8.8".parse().unwrap()).is_none());
    }

    #[test]
    fn test_device_rejects_dangling_references() {
        let zones = vec![NetworkZone {
            name: "LAN".to_string(),
            networks: vec!["192.168.1.0/24".parse().unwrap()],
            gateway: None,
            external: false,
        }];
        let iface = Interface {
            name: "port1".to_string(),
            device_id: String::new(),
            zone: "DMZ".to_string(),
            address: "172.16.10.1/24".parse().unwrap(),
        };
        let err = Device::new("fw1", zones.clone(), vec![iface], vec![], vec![]).unwrap_err();
        assert!(matches!(err, AnalyzerError::UnknownZone { .. }));

        let route = RouteEntry {
            destination: "0.0.0.0/0".parse().unwrap(),
            target: RouteTarget::Interface {
                name: "wan9".to_string(),
            },
            distance: 0,
        };
        let err = Device::new("fw1", zones, vec![], vec![route], vec![]).unwrap_err();
        assert!(matches!(err, AnalyzerError::UnknownInterface { .. }));
    }

    #[test]
    fn test_snapshot_rejects_duplicates() {
        let a = Device::new("fw1", vec![], vec![], vec![], vec![]).unwrap();
        let b = Device::new("fw1", vec![], vec![], vec![], vec![]).unwrap();
        assert!(matches!(
            TopologySnapshot::new(vec![a, b], vec![]),
            Err(AnalyzerError::DuplicateDevice(_))
        ));
    }
}
