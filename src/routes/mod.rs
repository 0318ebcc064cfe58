// Routes module - per-device route entries and longest-prefix lookup

pub mod lookup;

use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

use crate::address::Cidr;

pub use lookup::{RouteEngine, RouteMatch};

/// Where a matched route sends the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Leaves this device through a local interface.
    Interface { name: String },
    /// Continues inside the modeled network on an adjacent device. `target`
    /// is the device-local label handed to the inventory; `via` optionally
    /// names the local interface of the link.
    Device { target: String, via: Option<String> },
}

impl RouteTarget {
    /// Local interface the flow leaves through, when known.
    pub fn egress_interface(&self) -> Option<&str> {
        match self {
            RouteTarget::Interface { name } => Some(name.as_str()),
            RouteTarget::Device { via, .. } => via.as_deref(),
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Interface { name } => write!(f, "interface {}", name),
            RouteTarget::Device { target, via: Some(via) } => {
                write!(f, "device {} via {}", target, via)
            }
            RouteTarget::Device { target, via: None } => write!(f, "device {}", target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: Cidr,
    pub target: RouteTarget,
    /// Administrative distance; only consulted between equal-length prefixes
    pub distance: u32,
}

/// No entry of the device's table covers the destination. The tracer turns
/// this into an "unroutable" block rather than propagating it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No route to {destination} on device {device_id}")]
pub struct NoRouteError {
    pub device_id: String,
    pub destination: IpAddr,
}
