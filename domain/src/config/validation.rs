//! Configuration issue types.
//!
//! Configuration loaders check value ranges and cross-field consistency and
//! report structured issues with a severity, so callers can refuse to start on
//! errors and merely print warnings.

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: the configuration works but may not behave as expected.
    Warning,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// A threshold, floor or weight lies outside `[0, 1]`.
    ValueOutOfRange,
    /// Consensus weights sum to zero, so agreement is undefined.
    ZeroConsensusWeights,
    /// The worker pool cannot run anything.
    ZeroWorkerPool,
    /// A deadline or timeout is zero or longer than the engine allows.
    DurationOutOfRange,
    /// A single consensus model never disagrees with itself.
    SingleConsensusModel,
    /// A tool section has an empty command template.
    ToolWithoutCommand,
    /// No tools are configured; every proposal will be rejected.
    NoToolsConfigured,
    /// The activation floor is below the review floor, so patterns can flap.
    ActivationBelowReviewFloor,
}

/// A detected issue in the configuration.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_severity() {
        let e = ConfigIssue::error(ConfigIssueCode::ZeroWorkerPool, "pool is 0");
        assert!(e.severity.is_error());
        assert_eq!(e.to_string(), "error: pool is 0");
        let w = ConfigIssue::warning(ConfigIssueCode::SingleConsensusModel, "one model");
        assert!(!w.severity.is_error());
    }
}
