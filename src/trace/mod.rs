// Trace module - path steps and the per-hop state machine

pub mod deadline;
pub mod tracer;

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::AnalyzerResult;
use crate::flow::Flow;
use crate::result::AnalysisResult;
use crate::topology::{DeviceInventory, TopologyProvider};

pub use deadline::{CancelHandle, Deadline};
pub use tracer::PathTracer;

/// Hop ceiling applied when the caller does not choose one.
pub const DEFAULT_MAX_HOPS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Ingress,
    Route,
    Policy,
    Nat,
    Egress,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Ingress => "ingress",
            StepKind::Route => "route",
            StepKind::Policy => "policy",
            StepKind::Nat => "nat",
            StepKind::Egress => "egress",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Blocked,
}

/// One entry of the trace handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStep {
    pub step: StepKind,
    pub device_id: String,
    pub action: String,
    pub detail: String,
    pub status: StepStatus,
}

impl PathStep {
    pub fn success(step: StepKind, device_id: &str, action: String, detail: String) -> Self {
        PathStep {
            step,
            device_id: device_id.to_string(),
            action,
            detail,
            status: StepStatus::Success,
        }
    }

    pub fn blocked(step: StepKind, device_id: &str, action: String, detail: String) -> Self {
        PathStep {
            step,
            device_id: device_id.to_string(),
            action,
            detail,
            status: StepStatus::Blocked,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == StepStatus::Blocked
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub max_hops: usize,
    /// Absolute deadline and cancel handle, shared by every analysis run
    /// with these options
    pub deadline: Deadline,
    /// Time budget of a single analysis, counted from the moment it starts
    pub timeout: Option<Duration>,
}

impl AnalyzeOptions {
    /// Deadline for an analysis starting now.
    pub fn start_deadline(&self) -> Deadline {
        match self.timeout {
            Some(budget) => self.deadline.limited_to(budget),
            None => self.deadline.clone(),
        }
    }
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions {
            max_hops: DEFAULT_MAX_HOPS,
            deadline: Deadline::none(),
            timeout: None,
        }
    }
}

/// Trace `flow` from `start_device` through the modeled network.
///
/// Denied, unroutable and looping flows come back as `blocked` results; only
/// bad input, broken topology references or a tripped deadline are errors.
pub fn analyze_path<P, I>(
    provider: &P,
    inventory: &I,
    start_device: &str,
    flow: &Flow,
    options: &AnalyzeOptions,
) -> AnalyzerResult<AnalysisResult>
where
    P: TopologyProvider + ?Sized,
    I: DeviceInventory + ?Sized,
{
    PathTracer::new(provider, inventory, options).analyze(start_device, flow)
}
