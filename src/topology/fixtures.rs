// Shared test topologies

use super::{TopologySnapshot, from_toml_str};

/// Single edge firewall with LAN, DMZ, GUEST and an external-facing WAN zone.
pub(crate) const EDGE_TOML: &str = r#"
[[devices]]
id = "fw-edge"

[[devices.zones]]
name = "LAN"
networks = ["192.168.1.0/24"]

[[devices.zones]]
name = "DMZ"
networks = ["172.16.10.0/24"]

[[devices.zones]]
name = "GUEST"
networks = ["10.10.1.0/24"]

[[devices.zones]]
name = "WAN"
networks = ["203.0.113.0/29"]
gateway = "203.0.113.1"
external = true

[[devices.interfaces]]
name = "port1"
zone = "LAN"
address = "192.168.1.1/24"

[[devices.interfaces]]
name = "port2"
zone = "DMZ"
address = "172.16.10.1/24"

[[devices.interfaces]]
name = "port3"
zone = "GUEST"
address = "10.10.1.1 255.255.255.0"

[[devices.interfaces]]
name = "wan1"
zone = "WAN"
address = "203.0.113.2/29"

[[devices.routes]]
destination = "192.168.1.0/24"
interface = "port1"

[[devices.routes]]
destination = "172.16.10.0/24"
interface = "port2"

[[devices.routes]]
destination = "10.10.1.0/24"
interface = "port3"

[[devices.routes]]
destination = "default"
interface = "wan1"

[[devices.policies]]
id = 1
name = "LAN-to-DMZ"
sources = ["LAN"]
destinations = ["DMZ"]
services = ["HTTP", "HTTPS", "SSH"]
action = "accept"

[[devices.policies]]
id = 2
name = "LAN-to-WAN"
sources = ["LAN"]
destinations = ["external"]
services = ["ALL"]
action = "accept"
nat = true

[[devices.policies]]
id = 3
name = "Guest-to-WAN"
sources = ["GUEST"]
destinations = ["external"]
services = ["HTTP", "HTTPS", "DNS"]
action = "accept"
nat = true

[[devices.policies]]
id = 99
name = "Deny-All"
sources = ["any"]
destinations = ["any"]
services = ["any"]
action = "deny"
"#;

/// Branch firewall `fw-a` forwarding server traffic to core firewall `fw-b`.
/// `fw-a` allows HTTPS and SSH towards the servers, `fw-b` only HTTPS.
pub(crate) const CHAIN_TOML: &str = r#"
[[links]]
from = "fw-a"
target = "core-uplink"
device = "fw-b"

[[devices]]
id = "fw-a"

[[devices.zones]]
name = "LAN"
networks = ["192.168.1.0/24"]

[[devices.zones]]
name = "TRANSIT"
networks = ["10.255.0.0/30"]

[[devices.interfaces]]
name = "port1"
zone = "LAN"
address = "192.168.1.1/24"

[[devices.interfaces]]
name = "transit"
zone = "TRANSIT"
address = "10.255.0.1/30"

[[devices.routes]]
destination = "192.168.1.0/24"
interface = "port1"

[[devices.routes]]
destination = "172.16.20.0/24"
device = "core-uplink"
interface = "transit"

[[devices.routes]]
destination = "10.99.0.0/16"
device = "fw-b"

[[devices.policies]]
id = 10
name = "LAN-to-Servers"
sources = ["LAN"]
destinations = ["172.16.20.0/24"]
services = ["HTTPS", "SSH"]
action = "accept"

[[devices.policies]]
id = 11
name = "Lab-Loop"
sources = ["any"]
destinations = ["10.99.0.0/16"]
services = ["any"]
action = "accept"

[[devices.policies]]
id = 19
name = "Deny-All"
sources = ["any"]
destinations = ["any"]
services = ["any"]
action = "deny"

[[devices]]
id = "fw-b"

[[devices.zones]]
name = "TRANSIT"
networks = ["10.255.0.0/30"]

[[devices.zones]]
name = "BRANCH"
networks = ["192.168.1.0/24"]

[[devices.zones]]
name = "SERVERS"
networks = ["172.16.20.0/24"]

[[devices.interfaces]]
name = "transit"
zone = "TRANSIT"
address = "10.255.0.2/30"

[[devices.interfaces]]
name = "srv"
zone = "SERVERS"
address = "172.16.20.1/24"

[[devices.routes]]
destination = "172.16.20.0/24"
interface = "srv"

[[devices.routes]]
destination = "10.99.0.0/16"
device = "fw-a"

[[devices.policies]]
id = 20
name = "Branch-to-Servers"
sources = ["BRANCH"]
destinations = ["SERVERS"]
services = ["HTTPS"]
action = "accept"

[[devices.policies]]
id = 21
name = "Lab-Loop"
sources = ["any"]
destinations = ["10.99.0.0/16"]
services = ["any"]
action = "accept"

[[devices.policies]]
id = 29
name = "Deny-All"
sources = ["any"]
destinations = ["any"]
services = ["any"]
action = "deny"
"#;

pub(crate) fn edge_snapshot() -> TopologySnapshot {
    from_toml_str(EDGE_TOML).expect("edge fixture loads")
}

pub(crate) fn chain_snapshot() -> TopologySnapshot {
    from_toml_str(CHAIN_TOML).expect("chain fixture loads")
}
