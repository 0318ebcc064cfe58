// Flow - the traffic tuple being analyzed

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::address::{AddressClass, parse_ip};
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::policy::Protocol;

/// Source, destination, protocol and destination port of one query.
///
/// Built once per analysis and never mutated; a hop that applies NAT derives
/// a new flow with [`Flow::with_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Flow {
    src_ip: IpAddr,
    dst_ip: IpAddr,
    protocol: Protocol,
    port: u16,
}

impl Flow {
    pub fn new(src_ip: IpAddr, dst_ip: IpAddr, protocol: Protocol, port: u16) -> AnalyzerResult<Self> {
        if !AddressClass::of(src_ip).is_valid_source() {
            return Err(AnalyzerError::InvalidAddress(format!(
                "{} cannot originate a flow",
                src_ip
            )));
        }
        if !AddressClass::of(dst_ip).is_valid_destination() {
            return Err(AnalyzerError::InvalidAddress(format!(
                "{} is a wildcard, not a destination",
                dst_ip
            )));
        }
        if src_ip.is_ipv4() != dst_ip.is_ipv4() {
            return Err(AnalyzerError::InvalidAddress(format!(
                "{} and {} are different address families",
                src_ip, dst_ip
            )));
        }
        if protocol == Protocol::Any {
            return Err(AnalyzerError::InvalidProtocol(
                "a flow needs a concrete protocol".to_string(),
            ));
        }

        let port = if protocol.uses_ports() {
            if port == 0 {
                return Err(AnalyzerError::InvalidPortRange("0".to_string()));
            }
            port
        } else {
            0
        };

        Ok(Flow {
            src_ip,
            dst_ip,
            protocol,
            port,
        })
    }

    /// Build a flow from textual input, as it arrives from a CLI or flow file.
    pub fn parse(src: &str, dst: &str, protocol: &str, port: u16) -> AnalyzerResult<Self> {
        Flow::new(parse_ip(src)?, parse_ip(dst)?, protocol.parse()?, port)
    }

    pub fn src_ip(&self) -> IpAddr {
        self.src_ip
    }

    pub fn dst_ip(&self) -> IpAddr {
        self.dst_ip
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same flow as seen after source translation.
    pub fn with_source(&self, src_ip: IpAddr) -> Flow {
        Flow { src_ip, ..*self }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.protocol.uses_ports() {
            write!(f, "{} -> {}:{}/{}", self.src_ip, self.dst_ip, self.port, self.protocol)
        } else {
            write!(f, "{} -> {}/{}", self.src_ip, self.dst_ip, self.protocol)
        }
    }
}
