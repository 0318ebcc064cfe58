// Service definitions: protocol plus port range, matched against a flow

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{AnalyzerError, AnalyzerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Wildcard, only meaningful inside a service definition
    Any,
}

impl Protocol {
    pub fn uses_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::Any => "any",
        };
        f.write_str(name)
    }
}

impl FromStr for Protocol {
    type Err = AnalyzerError;

    /// Names or IANA protocol numbers.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "tcp" | "6" => Ok(Protocol::Tcp),
            "udp" | "17" => Ok(Protocol::Udp),
            "icmp" | "1" => Ok(Protocol::Icmp),
            "any" | "all" | "ip" | "0" => Ok(Protocol::Any),
            _ => Err(AnalyzerError::InvalidProtocol(input.to_string())),
        }
    }
}

/// Inclusive destination port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> AnalyzerResult<Self> {
        let range = PortRange { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn single(port: u16) -> AnalyzerResult<Self> {
        PortRange::new(port, port)
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    pub fn validate(&self) -> AnalyzerResult<()> {
        if self.start == 0 || self.start > self.end {
            return Err(AnalyzerError::InvalidPortRange(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for PortRange {
    type Err = AnalyzerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || AnalyzerError::InvalidPortRange(input.to_string());
        let (start, end) = match input.trim().split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (input.trim(), input.trim()),
        };
        let start: u16 = start.parse().map_err(|_| invalid())?;
        let end: u16 = end.parse().map_err(|_| invalid())?;
        PortRange::new(start, end).map_err(|_| invalid())
    }
}

impl Serialize for PortRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One protocol/port pair of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMember {
    pub protocol: Protocol,
    /// `None` covers every port of the protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<PortRange>,
}

impl ServiceMember {
    pub fn matches(&self, protocol: Protocol, port: u16) -> bool {
        if self.protocol != Protocol::Any && self.protocol != protocol {
            return false;
        }
        if !protocol.uses_ports() {
            return true;
        }
        self.ports.is_none_or(|range| range.contains(port))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub members: Vec<ServiceMember>,
}

impl ServiceDefinition {
    pub fn new(name: &str, members: Vec<ServiceMember>) -> Self {
        ServiceDefinition {
            name: name.to_string(),
            members,
        }
    }

    pub fn matches(&self, protocol: Protocol, port: u16) -> bool {
        self.members.iter().any(|m| m.matches(protocol, port))
    }
}

fn member(protocol: Protocol, start: u16, end: u16) -> ServiceMember {
    ServiceMember {
        protocol,
        ports: Some(PortRange { start, end }),
    }
}

fn all_ports(protocol: Protocol) -> ServiceMember {
    ServiceMember {
        protocol,
        ports: None,
    }
}

/// Named services visible to a device: its own definitions shadow the
/// predefined catalogue.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    custom: Vec<ServiceDefinition>,
    builtin: Vec<ServiceDefinition>,
}

impl ServiceCatalog {
    pub fn new(custom: Vec<ServiceDefinition>) -> Self {
        ServiceCatalog {
            custom,
            builtin: builtin_services(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.custom
            .iter()
            .chain(self.builtin.iter())
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        ServiceCatalog::new(Vec::new())
    }
}

fn builtin_services() -> Vec<ServiceDefinition> {
    use Protocol::*;
    vec![
        ServiceDefinition::new("ALL", vec![all_ports(Any)]),
        ServiceDefinition::new("ALL_TCP", vec![all_ports(Tcp)]),
        ServiceDefinition::new("ALL_UDP", vec![all_ports(Udp)]),
        ServiceDefinition::new("ALL_ICMP", vec![all_ports(Icmp)]),
        ServiceDefinition::new("PING", vec![all_ports(Icmp)]),
        ServiceDefinition::new("FTP", vec![member(Tcp, 21, 21)]),
        ServiceDefinition::new("SSH", vec![member(Tcp, 22, 22)]),
        ServiceDefinition::new("TELNET", vec![member(Tcp, 23, 23)]),
        ServiceDefinition::new("SMTP", vec![member(Tcp, 25, 25)]),
        ServiceDefinition::new("DNS", vec![member(Tcp, 53, 53), member(Udp, 53, 53)]),
        ServiceDefinition::new("HTTP", vec![member(Tcp, 80, 80)]),
        ServiceDefinition::new("NTP", vec![member(Udp, 123, 123)]),
        ServiceDefinition::new("SNMP", vec![member(Udp, 161, 162)]),
        ServiceDefinition::new("HTTPS", vec![member(Tcp, 443, 443)]),
        ServiceDefinition::new("SMB", vec![member(Tcp, 445, 445)]),
        ServiceDefinition::new("SYSLOG", vec![member(Udp, 514, 514)]),
        ServiceDefinition::new("MYSQL", vec![member(Tcp, 3306, 3306)]),
        ServiceDefinition::new("RDP", vec![member(Tcp, 3389, 3389)]),
    ]
}
