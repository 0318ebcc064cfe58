// Zone classification for a single device

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use super::Cidr;

/// Sentinel zone for any address outside the configured zones.
pub const EXTERNAL_ZONE: &str = "external";
/// Sentinel zone for loopback addresses not claimed by a configured zone.
pub const LOCAL_ZONE: &str = "local";

/// Name of the zone an address classified into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneName(String);

impl ZoneName {
    pub fn new(name: impl Into<String>) -> Self {
        ZoneName(name.into())
    }

    pub fn external() -> Self {
        ZoneName(EXTERNAL_ZONE.to_string())
    }

    pub fn local() -> Self {
        ZoneName(LOCAL_ZONE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_external(&self) -> bool {
        self.0 == EXTERNAL_ZONE
    }

    /// Case-insensitive comparison, as zone names in policies are written by hand.
    pub fn matches(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for ZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkZone {
    pub name: String,
    pub networks: Vec<Cidr>,
    /// Next hop beyond this zone, if it leads somewhere else
    pub gateway: Option<IpAddr>,
    /// WAN-facing zone: traffic leaving through it may be source-NATed
    pub external: bool,
}

impl NetworkZone {
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(ip))
    }
}

/// A device's zones in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ZoneMap {
    zones: Vec<NetworkZone>,
}

impl ZoneMap {
    pub fn new(zones: Vec<NetworkZone>) -> Self {
        ZoneMap { zones }
    }

    /// First declared zone containing `ip` wins. Overlapping zones are
    /// tolerated and resolved by that order.
    pub fn classify(&self, ip: IpAddr) -> ZoneName {
        if let Some(zone) = self.zones.iter().find(|z| z.contains(ip)) {
            return ZoneName::new(zone.name.clone());
        }
        if ip.is_loopback() {
            ZoneName::local()
        } else {
            ZoneName::external()
        }
    }

    pub fn get(&self, name: &str) -> Option<&NetworkZone> {
        self.zones.iter().find(|z| z.name.eq_ignore_ascii_case(name))
    }

    pub fn zones(&self) -> &[NetworkZone] {
        &self.zones
    }

    /// Whether traffic leaving into the named zone crosses to untrusted space.
    pub fn is_external_facing(&self, name: &ZoneName) -> bool {
        name.is_external() || self.get(name.as_str()).is_some_and(|z| z.external)
    }

    /// Pairs of zone names whose address space intersects.
    pub fn overlaps(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (i, a) in self.zones.iter().enumerate() {
            for b in &self.zones[i + 1..] {
                let clash = a
                    .networks
                    .iter()
                    .any(|na| b.networks.iter().any(|nb| na.overlaps(nb)));
                if clash {
                    pairs.push((a.name.clone(), b.name.clone()));
                }
            }
        }
        pairs
    }
}
