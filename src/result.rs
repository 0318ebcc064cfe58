// Result assembly - turns a finished trace into the stable output shape

use serde::Serialize;
use std::fmt;

use crate::error::{AnalyzerError, AnalyzerResult};
use crate::flow::Flow;
use crate::policy::{IMPLICIT_DENY_ID, PolicyRule};
use crate::trace::{PathStep, StepKind, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allowed,
    Blocked,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allowed => f.write_str("allowed"),
            Verdict::Blocked => f.write_str("blocked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    /// An explicit deny rule matched
    PolicyDeny,
    /// No rule matched
    ImplicitDeny,
    Unroutable,
    LoopDetected,
    /// The egress interface cannot reach the destination
    Unreachable,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            BlockReason::PolicyDeny => "policy-deny",
            BlockReason::ImplicitDeny => "implicit-deny",
            BlockReason::Unroutable => "unroutable",
            BlockReason::LoopDetected => "loop-detected",
            BlockReason::Unreachable => "unreachable",
        };
        f.write_str(reason)
    }
}

/// Where and why a flow stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedBy {
    pub device_id: String,
    /// Rule id for policy blocks, `0` for the implicit deny, absent otherwise
    pub policy_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    pub reason: BlockReason,
}

impl BlockedBy {
    pub fn policy(rule: &PolicyRule) -> Self {
        BlockedBy {
            device_id: rule.device_id.clone(),
            policy_id: Some(rule.id),
            policy_name: Some(rule.name.clone()).filter(|n| !n.is_empty()),
            reason: BlockReason::PolicyDeny,
        }
    }

    pub fn implicit_deny(device_id: &str) -> Self {
        BlockedBy {
            device_id: device_id.to_string(),
            policy_id: Some(IMPLICIT_DENY_ID),
            policy_name: Some("implicit-deny".to_string()),
            reason: BlockReason::ImplicitDeny,
        }
    }

    pub fn without_policy(device_id: &str, reason: BlockReason) -> Self {
        BlockedBy {
            device_id: device_id.to_string(),
            policy_id: None,
            policy_name: None,
            reason,
        }
    }
}

/// Terminal state of the tracer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Blocked(BlockedBy),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub flow: Flow,
    pub verdict: Verdict,
    pub path: Vec<PathStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<BlockedBy>,
    /// Interface crossings: successful ingress and egress steps
    pub hops: usize,
    /// Devices entered, in order
    pub devices: Vec<String>,
    pub nat_applied: bool,
}

impl AnalysisResult {
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allowed
    }

    pub fn steps(&self, kind: StepKind) -> impl Iterator<Item = &PathStep> {
        self.path.iter().filter(move |s| s.step == kind)
    }

    pub fn to_json(&self, pretty: bool) -> AnalyzerResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

/// Build the result for a finished trace.
///
/// An empty trace, a blocked outcome whose last step is not blocked, or a
/// delivered outcome containing a blocked step mean the tracer is broken.
pub fn assemble(flow: &Flow, path: Vec<PathStep>, outcome: Outcome) -> AnalyzerResult<AnalysisResult> {
    let Some(last) = path.last() else {
        return Err(AnalyzerError::InternalInvariant(format!(
            "empty trace for flow {}",
            flow
        )));
    };

    let (verdict, blocked_by) = match outcome {
        Outcome::Delivered => {
            if path.iter().any(PathStep::is_blocked) {
                return Err(AnalyzerError::InternalInvariant(format!(
                    "delivered flow {} has a blocked step",
                    flow
                )));
            }
            (Verdict::Allowed, None)
        }
        Outcome::Blocked(by) => {
            if !last.is_blocked() {
                return Err(AnalyzerError::InternalInvariant(format!(
                    "blocked flow {} does not end in a blocked step",
                    flow
                )));
            }
            (Verdict::Blocked, Some(by))
        }
    };

    let crossings = |s: &&PathStep| {
        s.status == StepStatus::Success && matches!(s.step, StepKind::Ingress | StepKind::Egress)
    };
    let hops = path.iter().filter(crossings).count();

    let mut devices: Vec<String> = Vec::new();
    for step in path
        .iter()
        .filter(|s| s.step == StepKind::Ingress && s.status == StepStatus::Success)
    {
        devices.push(step.device_id.clone());
    }

    let nat_applied = path.iter().any(|s| s.step == StepKind::Nat);

    Ok(AnalysisResult {
        flow: *flow,
        verdict,
        path,
        blocked_by,
        hops,
        devices,
        nat_applied,
    })
}
