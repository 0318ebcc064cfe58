// Batch analysis and what-if comparison over shared snapshots

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task;

use crate::address::parse_ip;
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::flow::Flow;
use crate::result::{AnalysisResult, BlockedBy, Verdict};
use crate::topology::TopologySnapshot;
use crate::trace::AnalyzeOptions;

/// Upper bound on analyses running on the blocking pool at once.
const MAX_CONCURRENT_ANALYSES: usize = 64;

/// One flow as written in a flows file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRequest {
    /// Start device; located from the source address when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub src: String,
    pub dst: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub port: u16,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl FlowRequest {
    pub fn new(src: &str, dst: &str, protocol: &str, port: u16) -> Self {
        FlowRequest {
            device: None,
            src: src.to_string(),
            dst: dst.to_string(),
            protocol: protocol.to_string(),
            port,
        }
    }

    pub fn on_device(mut self, device: &str) -> Self {
        self.device = Some(device.to_string());
        self
    }

    /// Validate the flow and pick its start device.
    pub fn resolve(&self, snapshot: &TopologySnapshot) -> AnalyzerResult<(String, Flow)> {
        let flow = Flow::parse(&self.src, &self.dst, &self.protocol, self.port)?;
        let device = match &self.device {
            Some(id) => id.clone(),
            None => snapshot
                .locate_device(parse_ip(&self.src)?)
                .map(|d| d.id().to_string())
                .ok_or_else(|| {
                    AnalyzerError::InvalidArgument(format!(
                        "no device has a zone containing {}; name a start device",
                        self.src
                    ))
                })?,
        };
        Ok((device, flow))
    }
}

#[derive(Debug, Deserialize)]
struct FlowFile {
    #[serde(default)]
    flows: Vec<FlowRequest>,
}

/// Read `flows = [...]` from a TOML file, or JSON when the extension is `.json`.
pub fn load_flows(path: &Path) -> AnalyzerResult<Vec<FlowRequest>> {
    tracing::info!("Loading flows from: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let file: FlowFile = if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };
    Ok(file.flows)
}

/// Analyze every request against one snapshot in parallel.
///
/// Results come back in request order. A request that fails keeps its error
/// in its own slot without affecting the others.
pub async fn analyze_batch(
    snapshot: Arc<TopologySnapshot>,
    requests: Vec<FlowRequest>,
    options: AnalyzeOptions,
) -> Vec<AnalyzerResult<AnalysisResult>> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_ANALYSES));
    let total = requests.len();

    let tasks = requests.into_iter().map(|request| {
        let snapshot = snapshot.clone();
        let options = options.clone();
        let semaphore = semaphore.clone();
        async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return Err(AnalyzerError::InternalInvariant(format!(
                        "batch semaphore closed: {}",
                        e
                    )));
                }
            };
            // the per-analysis timeout starts inside the task, after the permit
            let joined = task::spawn_blocking(move || -> AnalyzerResult<AnalysisResult> {
                let (device, flow) = request.resolve(&snapshot)?;
                snapshot.analyze_path(&device, &flow, &options)
            })
            .await;
            match joined {
                Ok(result) => result,
                Err(e) => Err(AnalyzerError::InternalInvariant(format!(
                    "analysis task failed: {}",
                    e
                ))),
            }
        }
    });

    let results = join_all(tasks).await;
    let blocked = results
        .iter()
        .filter(|r| matches!(r, Ok(res) if !res.is_allowed()))
        .count();
    let failed = results.iter().filter(|r| r.is_err()).count();
    tracing::info!(
        "Batch complete: {} flow(s), {} blocked, {} failed",
        total,
        blocked,
        failed
    );
    results
}

/// A flow whose outcome differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictChange {
    pub device: String,
    pub flow: Flow,
    pub before: Verdict,
    pub after: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_blocked_by: Option<BlockedBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_blocked_by: Option<BlockedBy>,
}

/// Run `requests` against `baseline` and `candidate` and report every flow
/// whose verdict or blocking rule changed.
///
/// Any per-flow error aborts the comparison, since a partial diff would hide
/// the flows that failed.
pub async fn compare(
    baseline: Arc<TopologySnapshot>,
    candidate: Arc<TopologySnapshot>,
    requests: Vec<FlowRequest>,
    options: AnalyzeOptions,
) -> AnalyzerResult<Vec<VerdictChange>> {
    let devices = requests
        .iter()
        .map(|r| r.resolve(&baseline).map(|(device, _)| device))
        .collect::<AnalyzerResult<Vec<_>>>()?;
    // pin the start device so both sides trace from the same place
    let pinned: Vec<FlowRequest> = requests
        .into_iter()
        .zip(&devices)
        .map(|(r, device)| r.on_device(device))
        .collect();

    let (before, after) = tokio::join!(
        analyze_batch(baseline, pinned.clone(), options.clone()),
        analyze_batch(candidate, pinned, options),
    );

    let mut changes = Vec::new();
    for ((device, before), after) in devices.into_iter().zip(before).zip(after) {
        let before = before?;
        let after = after?;
        if before.verdict != after.verdict || before.blocked_by != after.blocked_by {
            changes.push(VerdictChange {
                device,
                flow: before.flow,
                before: before.verdict,
                after: after.verdict,
                before_blocked_by: before.blocked_by,
                after_blocked_by: after.blocked_by,
            });
        }
    }

    tracing::info!("What-if: {} verdict change(s)", changes.len());
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{fixtures, from_toml_str};
    use crate::trace::{CancelHandle, Deadline};
    use std::time::Duration;

    fn edge() -> Arc<TopologySnapshot> {
        Arc::new(fixtures::edge_snapshot())
    }

    #[test]
    fn test_resolve_locates_start_device() {
        let snapshot = fixtures::chain_snapshot();
        let (device, flow) = FlowRequest::new("192.168.1.10", "172.16.20.5", "tcp", 443)
            .resolve(&snapshot)
            .unwrap();
        assert_eq!(device, "fw-a");
        assert_eq!(flow.port(), 443);

        let pinned = FlowRequest::new("192.168.1.10", "172.16.20.5", "tcp", 443).on_device("fw-b");
        assert_eq!(pinned.resolve(&snapshot).unwrap().0, "fw-b");

        let nowhere = FlowRequest::new("8.8.8.8", "172.16.20.5", "tcp", 443);
        assert!(matches!(
            nowhere.resolve(&snapshot),
            Err(AnalyzerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_load_flows_file() {
        let path = std::env::temp_dir().join(format!("fpa-flows-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
            [[flows]]
            src = "192.168.1.100"
            dst = "172.16.10.50"
            port = 80

            [[flows]]
            device = "fw-edge"
            src = "10.10.1.50"
            dst = "8.8.8.8"
            protocol = "icmp"
            "#,
        )
        .unwrap();
        let flows = load_flows(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].protocol, "tcp");
        assert_eq!(flows[1].device.as_deref(), Some("fw-edge"));
        assert_eq!(flows[1].port, 0);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_errors() {
        let requests = vec![
            FlowRequest::new("192.168.1.100", "172.16.10.50", "tcp", 80),
            FlowRequest::new("10.10.1.50", "192.168.1.10", "tcp", 22),
            FlowRequest::new("192.168.1.100", "not-an-ip", "tcp", 80),
            FlowRequest::new("192.168.1.200", "8.8.8.8", "tcp", 443),
        ];
        let results = analyze_batch(edge(), requests, AnalyzeOptions::default()).await;

        assert_eq!(results.len(), 4);
        assert!(results[0].as_ref().unwrap().is_allowed());
        assert_eq!(
            results[1].as_ref().unwrap().blocked_by.as_ref().unwrap().policy_id,
            Some(99)
        );
        assert!(matches!(results[2], Err(AnalyzerError::InvalidAddress(_))));
        assert!(results[3].as_ref().unwrap().nat_applied);
    }

    #[tokio::test]
    async fn test_batch_matches_single_analysis() {
        let snapshot = edge();
        let request = FlowRequest::new("192.168.1.100", "172.16.10.50", "tcp", 443);
        let (device, flow) = request.resolve(&snapshot).unwrap();
        let single = snapshot
            .analyze_path(&device, &flow, &AnalyzeOptions::default())
            .unwrap();

        let batch = analyze_batch(snapshot, vec![request; 8], AnalyzeOptions::default()).await;
        for result in batch {
            assert_eq!(result.unwrap(), single);
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_from_each_analysis() {
        let options = AnalyzeOptions {
            timeout: Some(Duration::from_millis(200)),
            ..AnalyzeOptions::default()
        };
        // options built long before the batch runs, as the CLI does while
        // loading topology and flow files
        tokio::time::sleep(Duration::from_millis(300)).await;

        let requests = vec![FlowRequest::new("192.168.1.100", "172.16.10.50", "tcp", 443); 200];
        let results = analyze_batch(edge(), requests, options).await;

        assert_eq!(results.len(), 200);
        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|res| res.is_allowed())));
    }

    #[tokio::test]
    async fn test_shared_cancel_stops_whole_batch() {
        let handle = CancelHandle::new();
        handle.cancel();
        let options = AnalyzeOptions {
            deadline: Deadline::none().with_cancel(handle),
            timeout: Some(Duration::from_secs(60)),
            ..AnalyzeOptions::default()
        };

        let requests = vec![FlowRequest::new("192.168.1.100", "172.16.10.50", "tcp", 443); 3];
        let results = analyze_batch(edge(), requests, options).await;
        assert!(
            results
                .iter()
                .all(|r| matches!(r, Err(AnalyzerError::Cancelled { hops: 0 })))
        );
    }

    #[tokio::test]
    async fn test_what_if_reports_changes() {
        // candidate drops SSH from LAN-to-DMZ
        let candidate = fixtures::EDGE_TOML.replace(
            r#"services = ["HTTP", "HTTPS", "SSH"]"#,
            r#"services = ["HTTP", "HTTPS"]"#,
        );
        let candidate = Arc::new(from_toml_str(&candidate).unwrap());

        let requests = vec![
            FlowRequest::new("192.168.1.100", "172.16.10.50", "tcp", 22),
            FlowRequest::new("192.168.1.100", "172.16.10.50", "tcp", 443),
        ];
        let changes = compare(edge(), candidate, requests, AnalyzeOptions::default())
            .await
            .unwrap();

        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.device, "fw-edge");
        assert_eq!(change.flow.port(), 22);
        assert_eq!(change.before, Verdict::Allowed);
        assert_eq!(change.after, Verdict::Blocked);
        assert!(change.before_blocked_by.is_none());
        assert_eq!(change.after_blocked_by.as_ref().unwrap().policy_id, Some(99));
    }

    #[tokio::test]
    async fn test_what_if_identical_snapshots() {
        let requests = vec![FlowRequest::new("10.10.1.50", "8.8.8.8", "udp", 53)];
        let changes = compare(edge(), edge(), requests, AnalyzeOptions::default())
            .await
            .unwrap();
        assert!(changes.is_empty());
    }
}
