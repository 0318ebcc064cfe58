// Error types for the firewall path analyzer

use thiserror::Error;

/// Main error type for the analyzer.
///
/// Only malformed input and topology-integrity problems are errors. A flow
/// that is denied, unroutable or caught in a forwarding loop is a normal
/// `blocked` verdict and never surfaces here.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("Invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("Unknown service '{service}' on device {device_id}")]
    UnknownService { device_id: String, service: String },

    #[error("Invalid rule on device {device_id}: {reason}")]
    InvalidRule { device_id: String, reason: String },

    #[error("Invalid route on device {device_id}: {reason}")]
    InvalidRoute { device_id: String, reason: String },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown interface '{interface}' on device {device_id}")]
    UnknownInterface { device_id: String, interface: String },

    #[error("Unknown zone '{zone}' on device {device_id}")]
    UnknownZone { device_id: String, zone: String },

    #[error("Duplicate device: {0}")]
    DuplicateDevice(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Deadline exceeded after {hops} hop(s)")]
    DeadlineExceeded { hops: usize },

    #[error("Analysis cancelled after {hops} hop(s)")]
    Cancelled { hops: usize },

    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias using AnalyzerError
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

impl AnalyzerError {
    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AnalyzerError::InvalidAddress(addr) => {
                format!("Not a usable flow endpoint: {}", addr)
            }
            AnalyzerError::InvalidCidr(_) | AnalyzerError::InvalidPortRange(_) => {
                "Topology contains a malformed network or port definition.".to_string()
            }
            AnalyzerError::InvalidProtocol(proto) => {
                format!("Unsupported protocol '{}'. Use tcp, udp or icmp.", proto)
            }
            AnalyzerError::UnknownService { service, .. } => {
                format!("Policy references undefined service '{}'.", service)
            }
            AnalyzerError::InvalidRule { .. } => {
                "Topology contains an invalid firewall policy.".to_string()
            }
            AnalyzerError::InvalidRoute { .. } => {
                "Topology contains a route without a usable target.".to_string()
            }
            AnalyzerError::UnknownDevice(id) => {
                format!("Device '{}' is not in the topology. Refresh the topology and retry.", id)
            }
            AnalyzerError::UnknownInterface { .. } | AnalyzerError::UnknownZone { .. } => {
                "Topology references an interface or zone that does not exist.".to_string()
            }
            AnalyzerError::DuplicateDevice(id) => {
                format!("Device '{}' is defined more than once.", id)
            }
            AnalyzerError::InvalidArgument(msg) => format!("Invalid argument: {}", msg),
            AnalyzerError::DeadlineExceeded { .. } => {
                "Analysis did not finish before its deadline.".to_string()
            }
            AnalyzerError::Cancelled { .. } => "Analysis was cancelled.".to_string(),
            AnalyzerError::InternalInvariant(_) => {
                "Internal error in the path tracer. This is a bug, please report it.".to_string()
            }
            AnalyzerError::Io(_) => {
                "File system error. Check the topology path and permissions.".to_string()
            }
            AnalyzerError::Json(_) | AnalyzerError::Toml(_) => {
                "Topology or flow file could not be decoded.".to_string()
            }
        }
    }

    /// Check if error is retryable.
    ///
    /// A missing device usually means the caller's snapshot is stale; reloading
    /// it from the topology provider may fix the analysis.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalyzerError::UnknownDevice(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(AnalyzerError::UnknownDevice("fw-b".to_string()).is_retryable());
        assert!(!AnalyzerError::InvalidAddress("bogus".to_string()).is_retryable());
        assert!(!AnalyzerError::DeadlineExceeded { hops: 3 }.is_retryable());
    }

    #[test]
    fn test_user_message_names_input() {
        let err = AnalyzerError::InvalidProtocol("sctp".to_string());
        assert!(err.user_message().contains("sctp"));

        let err = AnalyzerError::UnknownService {
            device_id: "fw-a".to_string(),
            service: "GOPHER".to_string(),
        };
        assert!(err.user_message().contains("GOPHER"));
        assert_eq!(err.to_string(), "Unknown service 'GOPHER' on device fw-a");
    }
}
