// Policy module - firewall rules and first-match evaluation

pub mod matcher;
pub mod service;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::address::{Cidr, ZoneName};

pub use matcher::PolicyMatcher;
pub use service::{PortRange, Protocol, ServiceCatalog, ServiceDefinition, ServiceMember};

/// Conventional id reported when no rule matched and the implicit deny applied.
pub const IMPLICIT_DENY_ID: u32 = 0;

/// One entry of a rule's source or destination set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressMatch {
    Any,
    Network(Cidr),
    Zone(String),
}

impl AddressMatch {
    /// `any`/`all` are wildcards, anything that parses as an address block is a
    /// network, everything else names a zone.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("any") || trimmed.eq_ignore_ascii_case("all") {
            return AddressMatch::Any;
        }
        match trimmed.parse::<Cidr>() {
            Ok(cidr) if !trimmed.eq_ignore_ascii_case("default") => AddressMatch::Network(cidr),
            _ => AddressMatch::Zone(trimmed.to_string()),
        }
    }

    pub fn matches(&self, ip: IpAddr, zone: &ZoneName) -> bool {
        match self {
            AddressMatch::Any => true,
            AddressMatch::Network(cidr) => cidr.contains(ip),
            AddressMatch::Zone(name) => zone.matches(name),
        }
    }
}

impl fmt::Display for AddressMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressMatch::Any => f.write_str("any"),
            AddressMatch::Network(cidr) => write!(f, "{}", cidr),
            AddressMatch::Zone(name) => f.write_str(name),
        }
    }
}

/// One entry of a rule's service set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMatch {
    Any,
    Service(ServiceDefinition),
}

impl ServiceMatch {
    pub fn matches(&self, protocol: Protocol, port: u16) -> bool {
        match self {
            ServiceMatch::Any => true,
            ServiceMatch::Service(def) => def.matches(protocol, port),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ServiceMatch::Any => "any",
            ServiceMatch::Service(def) => &def.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    #[serde(alias = "allow", alias = "permit")]
    Accept,
    #[serde(alias = "drop", alias = "block", alias = "reject")]
    Deny,
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyAction::Accept => f.write_str("accept"),
            PolicyAction::Deny => f.write_str("deny"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub id: u32,
    pub name: String,
    pub device_id: String,
    /// Position in the device's policy list
    pub position: usize,
    pub sources: Vec<AddressMatch>,
    pub destinations: Vec<AddressMatch>,
    pub services: Vec<ServiceMatch>,
    pub action: PolicyAction,
    pub nat: bool,
    pub enabled: bool,
}

impl PolicyRule {
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("#{}", self.id)
        } else {
            format!("#{} {}", self.id, self.name)
        }
    }

    fn join<T: fmt::Display>(items: &[T]) -> String {
        items
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// One-line description for trace output.
    pub fn summary(&self) -> String {
        let services: Vec<&str> = self.services.iter().map(|s| s.name()).collect();
        format!(
            "{} [{} -> {}, service {}]",
            self.label(),
            Self::join(&self.sources),
            Self::join(&self.destinations),
            services.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_match_parse() {
        assert_eq!(AddressMatch::parse("ANY"), AddressMatch::Any);
        assert_eq!(AddressMatch::parse("all"), AddressMatch::Any);
        assert_eq!(
            AddressMatch::parse("10.0.0.0/8"),
            AddressMatch::Network("10.0.0.0/8".parse().unwrap())
        );
        assert_eq!(
            AddressMatch::parse("10.0.0.5"),
            AddressMatch::Network("10.0.0.5/32".parse().unwrap())
        );
        assert_eq!(AddressMatch::parse("DMZ"), AddressMatch::Zone("DMZ".to_string()));
        // a zone may legitimately be called "default"
        assert_eq!(
            AddressMatch::parse("default"),
            AddressMatch::Zone("default".to_string())
        );
    }

    #[test]
    fn test_address_match_semantics() {
        let zone = ZoneName::new("LAN");
        let ip: IpAddr = "192.168.1.10".parse().unwrap();

        assert!(AddressMatch::Any.matches(ip, &zone));
        assert!(AddressMatch::parse("lan").matches(ip, &zone));
        assert!(!AddressMatch::parse("DMZ").matches(ip, &zone));
        assert!(AddressMatch::parse("192.168.0.0/16").matches(ip, &zone));
        assert!(!AddressMatch::parse("192.168.2.0/24").matches(ip, &zone));
    }
}
