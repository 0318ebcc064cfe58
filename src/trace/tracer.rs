// Path tracer - walks a flow through ingress, route, policy, NAT and egress
// on each device until it is delivered or blocked

use super::{AnalyzeOptions, PathStep, StepKind};
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::flow::Flow;
use crate::policy::PolicyAction;
use crate::result::{AnalysisResult, BlockReason, BlockedBy, Outcome, assemble};
use crate::routes::RouteTarget;
use crate::topology::{Device, DeviceInventory, TopologyProvider};

/// What happened to the flow on one device.
enum HopOutcome {
    Delivered,
    Blocked(BlockedBy),
    /// Continue on `device` with the flow as it leaves this hop
    Forward { device: String, flow: Flow },
}

pub struct PathTracer<'a, P: ?Sized, I: ?Sized> {
    provider: &'a P,
    inventory: &'a I,
    options: &'a AnalyzeOptions,
}

impl<'a, P, I> PathTracer<'a, P, I>
where
    P: TopologyProvider + ?Sized,
    I: DeviceInventory + ?Sized,
{
    pub fn new(provider: &'a P, inventory: &'a I, options: &'a AnalyzeOptions) -> Self {
        PathTracer {
            provider,
            inventory,
            options,
        }
    }

    /// Trace `flow` from `start_device` until it is delivered or blocked.
    ///
    /// The time budget in the options starts counting here; deadline and
    /// cancellation are checked before every device pass. When the hop limit
    /// is reached the trace ends with a blocked `ingress` step on the device
    /// that would have been entered next, with reason `loop-detected`.
    pub fn analyze(&self, start_device: &str, flow: &Flow) -> AnalyzerResult<AnalysisResult> {
        if self.options.max_hops == 0 {
            return Err(AnalyzerError::InvalidArgument(
                "max_hops must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Tracing {} from device {}", flow, start_device);

        let mut path: Vec<PathStep> = Vec::new();
        let mut device_id = start_device.to_string();
        let mut current = *flow;
        let mut hops = 0;
        let deadline = self.options.start_deadline();

        let outcome = loop {
            deadline.check(hops)?;

            if hops == self.options.max_hops {
                tracing::debug!(
                    "Hop limit {} reached before re-entering {}",
                    self.options.max_hops,
                    device_id
                );
                path.push(PathStep::blocked(
                    StepKind::Ingress,
                    &device_id,
                    "Loop detected".to_string(),
                    format!(
                        "hop limit of {} device(s) exceeded before entering {}",
                        self.options.max_hops, device_id
                    ),
                ));
                break Outcome::Blocked(BlockedBy::without_policy(
                    &device_id,
                    BlockReason::LoopDetected,
                ));
            }
            hops += 1;

            let device = self.provider.load_device(&device_id)?;
            match self.traverse(device, &current, &mut path)? {
                HopOutcome::Delivered => break Outcome::Delivered,
                HopOutcome::Blocked(by) => break Outcome::Blocked(by),
                HopOutcome::Forward { device, flow } => {
                    device_id = device;
                    current = flow;
                }
            }
        };

        let result = assemble(flow, path, outcome)?;
        tracing::debug!(
            "{} => {} after {} device(s)",
            flow,
            result.verdict,
            result.devices.len()
        );
        Ok(result)
    }

    /// One device pass. Steps are appended to `path` as they happen.
    fn traverse(
        &self,
        device: &Device,
        flow: &Flow,
        path: &mut Vec<PathStep>,
    ) -> AnalyzerResult<HopOutcome> {
        let id = device.id();

        // Ingress
        let src_zone = device.classify_zone(flow.src_ip());
        let arrival = match device.interface_for_zone(&src_zone) {
            Some(iface) => format!(" on {}", iface.name),
            None => String::new(),
        };
        record(
            path,
            PathStep::success(
                StepKind::Ingress,
                id,
                format!("Ingress on {}", id),
                format!("source {} in zone {}{}", flow.src_ip(), src_zone, arrival),
            ),
        );

        // Route
        let route = match device.resolve_route(flow.dst_ip()) {
            Ok(route) => route,
            Err(no_route) => {
                record(
                    path,
                    PathStep::blocked(
                        StepKind::Route,
                        id,
                        "No route to destination".to_string(),
                        format!("{}: unroutable", no_route),
                    ),
                );
                return Ok(HopOutcome::Blocked(BlockedBy::without_policy(
                    id,
                    BlockReason::Unroutable,
                )));
            }
        };
        let target = &route.entry.target;
        record(
            path,
            PathStep::success(
                StepKind::Route,
                id,
                "Route lookup".to_string(),
                format!("{} matched {} -> {}", flow.dst_ip(), route.matched_cidr(), target),
            ),
        );

        // Policy
        let dst_zone = device.classify_zone(flow.dst_ip());
        let rule = match device.match_policy(flow, &src_zone, &dst_zone) {
            Some(rule) => rule,
            None => {
                record(
                    path,
                    PathStep::blocked(
                        StepKind::Policy,
                        id,
                        "Implicit deny".to_string(),
                        format!("no policy matches {} -> {}", src_zone, dst_zone),
                    ),
                );
                return Ok(HopOutcome::Blocked(BlockedBy::implicit_deny(id)));
            }
        };
        if rule.action == PolicyAction::Deny {
            record(
                path,
                PathStep::blocked(
                    StepKind::Policy,
                    id,
                    format!("Denied by policy {}", rule.label()),
                    rule.summary(),
                ),
            );
            return Ok(HopOutcome::Blocked(BlockedBy::policy(rule)));
        }
        record(
            path,
            PathStep::success(
                StepKind::Policy,
                id,
                format!("Allowed by policy {}", rule.label()),
                rule.summary(),
            ),
        );

        // NAT
        let egress = match target.egress_interface() {
            Some(name) => Some(device.interface(name).ok_or_else(|| {
                AnalyzerError::UnknownInterface {
                    device_id: id.to_string(),
                    interface: name.to_string(),
                }
            })?),
            None => None,
        };
        let mut leaving = *flow;
        if rule.nat {
            let zones = device.zones();
            let external_facing = zones.is_external_facing(&dst_zone)
                || egress.is_some_and(|iface| zones.get(&iface.zone).is_some_and(|z| z.external));
            match egress {
                Some(iface) if external_facing => {
                    let translated = iface.address.addr();
                    record(
                        path,
                        PathStep::success(
                            StepKind::Nat,
                            id,
                            "Source NAT".to_string(),
                            format!("{} -> {} ({})", flow.src_ip(), translated, iface.name),
                        ),
                    );
                    leaving = flow.with_source(translated);
                }
                None if external_facing => {
                    tracing::warn!(
                        "Policy {} on {} requests NAT but the route names no egress interface",
                        rule.label(),
                        id
                    );
                }
                _ => {}
            }
        }

        // Egress
        match target {
            RouteTarget::Interface { .. } => {
                let Some(iface) = egress else {
                    return Err(AnalyzerError::InternalInvariant(format!(
                        "interface route on {} without egress interface",
                        id
                    )));
                };
                if device.reaches(iface, &dst_zone) {
                    record(
                        path,
                        PathStep::success(
                            StepKind::Egress,
                            id,
                            format!("Egress via {}", iface.name),
                            format!("delivered to {} in zone {}", flow.dst_ip(), dst_zone),
                        ),
                    );
                    Ok(HopOutcome::Delivered)
                } else {
                    record(
                        path,
                        PathStep::blocked(
                            StepKind::Egress,
                            id,
                            format!("Destination unreachable via {}", iface.name),
                            format!(
                                "{} is in zone {}, interface {} faces zone {}",
                                flow.dst_ip(),
                                dst_zone,
                                iface.name,
                                iface.zone
                            ),
                        ),
                    );
                    Ok(HopOutcome::Blocked(BlockedBy::without_policy(
                        id,
                        BlockReason::Unreachable,
                    )))
                }
            }
            RouteTarget::Device { target: label, .. } => {
                let next = self.inventory.resolve_next_device(id, label)?;
                let via = match egress {
                    Some(iface) => format!(" via {}", iface.name),
                    None => String::new(),
                };
                record(
                    path,
                    PathStep::success(
                        StepKind::Egress,
                        id,
                        format!("Forward to {}", next),
                        format!("next hop device {}{}", next, via),
                    ),
                );
                Ok(HopOutcome::Forward {
                    device: next,
                    flow: leaving,
                })
            }
        }
    }
}

fn record(path: &mut Vec<PathStep>, step: PathStep) {
    tracing::debug!(
        "[{}] {} {:?}: {} ({})",
        step.device_id,
        step.step,
        step.status,
        step.action,
        step.detail
    );
    path.push(step);
}
