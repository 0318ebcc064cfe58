// Address model - CIDR blocks, special address classes and zone classification

pub mod zone;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{AnalyzerError, AnalyzerResult};

pub use zone::{NetworkZone, ZoneMap, ZoneName};

/// Parse a textual IP address, rejecting anything that is not plain IPv4/IPv6.
pub fn parse_ip(input: &str) -> AnalyzerResult<IpAddr> {
    input
        .trim()
        .parse()
        .map_err(|_| AnalyzerError::InvalidAddress(input.to_string()))
}

/// An address block in CIDR notation.
///
/// The configured address is kept as written so an interface's own address
/// survives (`192.168.1.1/24`); containment always compares the masked
/// network bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    addr: IpAddr,
    prefix_len: u8,
}

impl Cidr {
    pub fn new(addr: IpAddr, prefix_len: u8) -> AnalyzerResult<Self> {
        if prefix_len > max_prefix(addr) {
            return Err(AnalyzerError::InvalidCidr(format!("{}/{}", addr, prefix_len)));
        }
        Ok(Cidr { addr, prefix_len })
    }

    /// A single-host block (/32 or /128).
    pub fn host(addr: IpAddr) -> Self {
        Cidr {
            addr,
            prefix_len: max_prefix(addr),
        }
    }

    /// `0.0.0.0/0`
    pub fn any_v4() -> Self {
        Cidr {
            addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefix_len: 0,
        }
    }

    /// `::/0`
    pub fn any_v6() -> Self {
        Cidr {
            addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            prefix_len: 0,
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    /// The block's network address (host bits cleared).
    pub fn network(&self) -> IpAddr {
        match self.addr {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & v4_mask(self.prefix_len))),
            IpAddr::V6(v6) => {
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & v6_mask(self.prefix_len)))
            }
        }
    }

    /// Same block with host bits cleared.
    pub fn normalized(&self) -> Self {
        Cidr {
            addr: self.network(),
            prefix_len: self.prefix_len,
        }
    }

    /// Check whether `ip` falls inside this block. Address families never mix.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = v4_mask(self.prefix_len);
                (u32::from(net) & mask) == (u32::from(addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = v6_mask(self.prefix_len);
                (u128::from(net) & mask) == (u128::from(addr) & mask)
            }
            _ => false,
        }
    }

    /// Check whether two blocks share any address.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other.network()) || other.contains(self.network())
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Cidr {
    type Err = AnalyzerError;

    /// Accepts `a.b.c.d/len`, `a.b.c.d/255.255.255.0`, `a.b.c.d 255.255.255.0`,
    /// a bare address (host block) and `default` for the IPv4 default route.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let invalid = || AnalyzerError::InvalidCidr(input.to_string());

        if trimmed.eq_ignore_ascii_case("default") {
            return Ok(Cidr::any_v4());
        }

        let (addr_part, len_part) = match trimmed.split_once('/') {
            Some((addr, len)) => (addr.trim(), Some(len.trim())),
            None => match trimmed.split_once(char::is_whitespace) {
                Some((addr, mask)) => (addr.trim(), Some(mask.trim())),
                None => (trimmed, None),
            },
        };

        let addr: IpAddr = addr_part.parse().map_err(|_| invalid())?;
        let prefix_len = match len_part {
            None => max_prefix(addr),
            Some(len) if len.contains('.') => {
                let mask: Ipv4Addr = len.parse().map_err(|_| invalid())?;
                if addr.is_ipv6() {
                    return Err(invalid());
                }
                mask_to_prefix(mask).ok_or_else(invalid)?
            }
            Some(len) => len.parse().map_err(|_| invalid())?,
        };

        Cidr::new(addr, prefix_len).map_err(|_| invalid())
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn max_prefix(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn v4_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len.min(32)))
    }
}

fn v6_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix_len.min(128)))
    }
}

/// Dotted netmask to prefix length; `None` for non-contiguous masks.
fn mask_to_prefix(mask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(mask);
    let len = bits.leading_ones() as u8;
    (v4_mask(len) == bits).then_some(len)
}

/// Coarse classification of an address, independent of any topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressClass {
    /// `0.0.0.0` / `::`, the "any" wildcard. Never a real endpoint.
    Unspecified,
    Loopback,
    Broadcast,
    Multicast,
    /// RFC1918 and IPv6 unique-local space.
    Private,
    LinkLocal,
    Public,
}

impl AddressClass {
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_unspecified() {
                    AddressClass::Unspecified
                } else if v4.is_loopback() {
                    AddressClass::Loopback
                } else if v4.is_broadcast() {
                    AddressClass::Broadcast
                } else if v4.is_multicast() {
                    AddressClass::Multicast
                } else if v4.is_private() {
                    AddressClass::Private
                } else if v4.is_link_local() {
                    AddressClass::LinkLocal
                } else {
                    AddressClass::Public
                }
            }
            IpAddr::V6(v6) => {
                let first = v6.segments()[0];
                if v6.is_unspecified() {
                    AddressClass::Unspecified
                } else if v6.is_loopback() {
                    AddressClass::Loopback
                } else if v6.is_multicast() {
                    AddressClass::Multicast
                } else if first & 0xfe00 == 0xfc00 {
                    AddressClass::Private
                } else if first & 0xffc0 == 0xfe80 {
                    AddressClass::LinkLocal
                } else {
                    AddressClass::Public
                }
            }
        }
    }

    /// Whether an address of this class may appear as a flow destination.
    pub fn is_valid_destination(&self) -> bool {
        !matches!(self, AddressClass::Unspecified)
    }

    /// Whether an address of this class may originate a flow.
    pub fn is_valid_source(&self) -> bool {
        !matches!(
            self,
            AddressClass::Unspecified | AddressClass::Broadcast | AddressClass::Multicast
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_cidr_contains() {
        let cidr: Cidr = "192.168.1.0/24".parse().unwrap();
        assert!(cidr.contains(ip("192.168.1.100")));
        assert!(!cidr.contains(ip("192.168.2.100")));
        assert!(!cidr.contains(ip("::1")));

        let any = Cidr::any_v4();
        assert!(any.contains(ip("8.8.8.8")));
        assert!(!any.contains(ip("2001:db8::1")));
    }

    #[test]
    fn test_cidr_parse_forms() {
        let slash: Cidr = "10.0.0.1/8".parse().unwrap();
        assert_eq!(slash.prefix_len(), 8);
        assert_eq!(slash.addr(), ip("10.0.0.1"));
        assert_eq!(slash.network(), ip("10.0.0.0"));

        let dotted: Cidr = "192.168.1.1 255.255.255.0".parse().unwrap();
        assert_eq!(dotted.prefix_len(), 24);

        let dotted_slash: Cidr = "172.16.0.0/255.240.0.0".parse().unwrap();
        assert_eq!(dotted_slash.prefix_len(), 12);

        let host: Cidr = "8.8.8.8".parse().unwrap();
        assert_eq!(host.prefix_len(), 32);

        let default: Cidr = "default".parse().unwrap();
        assert_eq!(default, Cidr::any_v4());

        let v6: Cidr = "2001:db8::/32".parse().unwrap();
        assert!(v6.contains(ip("2001:db8:1::5")));
    }

    #[test]
    fn test_cidr_rejects_malformed() {
        assert!("192.168.1.0/33".parse::<Cidr>().is_err());
        assert!("300.1.1.1/24".parse::<Cidr>().is_err());
        assert!("10.0.0.0 255.0.255.0".parse::<Cidr>().is_err());
        assert!("2001:db8::/129".parse::<Cidr>().is_err());
        assert!("lan".parse::<Cidr>().is_err());
    }

    #[test]
    fn test_cidr_overlaps() {
        let wide: Cidr = "10.0.0.0/8".parse().unwrap();
        let narrow: Cidr = "10.1.0.0/16".parse().unwrap();
        let other: Cidr = "192.168.0.0/16".parse().unwrap();
        assert!(wide.overlaps(&narrow));
        assert!(narrow.overlaps(&wide));
        assert!(!wide.overlaps(&other));
    }

    #[test]
    fn test_address_class() {
        assert_eq!(AddressClass::of(ip("0.0.0.0")), AddressClass::Unspecified);
        assert_eq!(AddressClass::of(ip("127.0.0.1")), AddressClass::Loopback);
        assert_eq!(AddressClass::of(ip("255.255.255.255")), AddressClass::Broadcast);
        assert_eq!(AddressClass::of(ip("224.0.0.5")), AddressClass::Multicast);
        assert_eq!(AddressClass::of(ip("172.20.1.1")), AddressClass::Private);
        assert_eq!(AddressClass::of(ip("169.254.10.1")), AddressClass::LinkLocal);
        assert_eq!(AddressClass::of(ip("8.8.8.8")), AddressClass::Public);
        assert_eq!(AddressClass::of(ip("fd00::1")), AddressClass::Private);
        assert_eq!(AddressClass::of(ip("fe80::1")), AddressClass::LinkLocal);
        assert_eq!(AddressClass::of(ip("::1")), AddressClass::Loopback);

        assert!(!AddressClass::Broadcast.is_valid_source());
        assert!(AddressClass::Broadcast.is_valid_destination());
        assert!(!AddressClass::Unspecified.is_valid_destination());
    }

    #[test]
    fn test_parse_ip() {
        assert!(parse_ip(" 10.1.1.1 ").is_ok());
        assert!(matches!(
            parse_ip("10.1.1"),
            Err(AnalyzerError::InvalidAddress(_))
        ));
    }
}
