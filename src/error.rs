// Error types for metric reads and sampler startup.

use thiserror::Error;

/// Failure of a single point-in-time read. None of these abort a tick.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Metric cannot be read this tick (missing file, permission denied, sentinel value).
    #[error("{metric} unavailable: {reason}")]
    Unavailable { metric: &'static str, reason: String },

    /// Entity disappeared between enumeration and detail read.
    #[error("process {pid} vanished")]
    Vanished { pid: u32 },

    /// Source present but content could not be parsed.
    #[error("malformed {metric}: {detail}")]
    Malformed { metric: &'static str, detail: String },
}

impl SourceError {
    pub fn unavailable(metric: &'static str, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            metric,
            reason: reason.into(),
        }
    }

    pub fn malformed(metric: &'static str, detail: impl Into<String>) -> Self {
        SourceError::Malformed {
            metric,
            detail: detail.into(),
        }
    }

    /// Wrap an I/O error for `metric`. Not-found maps to `Unavailable` as well;
    /// per-process callers use `from_process_io` to distinguish a raced exit.
    pub fn from_io(metric: &'static str, e: std::io::Error) -> Self {
        SourceError::unavailable(metric, e.to_string())
    }

    pub fn from_process_io(metric: &'static str, pid: u32, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            SourceError::Vanished { pid }
        } else {
            SourceError::unavailable(metric, e.to_string())
        }
    }

    pub fn is_vanished(&self) -> bool {
        matches!(self, SourceError::Vanished { .. })
    }
}

/// Conditions that stop the sampler from starting.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("metric source unreachable at startup: {0}")]
    FatalInit(#[source] SourceError),
    #[error("invalid sampler config: {0}")]
    InvalidConfig(String),
}
