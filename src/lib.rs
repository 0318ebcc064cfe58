// Firewall path analyzer - traces a flow through modeled firewalls and
// reports the verdict with the ingress, route, policy, NAT and egress steps

pub mod address;
pub mod batch;
pub mod error;
pub mod flow;
pub mod policy;
pub mod result;
pub mod routes;
pub mod topology;
pub mod trace;

pub use address::{AddressClass, Cidr, NetworkZone, ZoneMap, ZoneName};
pub use batch::{FlowRequest, VerdictChange, analyze_batch, compare, load_flows};
pub use error::{AnalyzerError, AnalyzerResult};
pub use flow::Flow;
pub use policy::{
    AddressMatch, PolicyAction, PolicyMatcher, PolicyRule, PortRange, Protocol, ServiceCatalog,
    ServiceDefinition, ServiceMatch,
};
pub use result::{AnalysisResult, BlockReason, BlockedBy, Verdict, assemble};
pub use routes::{RouteEngine, RouteEntry, RouteMatch, RouteTarget};
pub use topology::{
    Device, DeviceInventory, Interface, Link, TopologyProvider, TopologySnapshot, load_topology,
};
pub use trace::{
    AnalyzeOptions, CancelHandle, Deadline, PathStep, PathTracer, StepKind, StepStatus,
    analyze_path,
};
