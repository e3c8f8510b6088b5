use thiserror::Error;

/// Result type alias using [`FlowError`].
pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors raised while building or applying distribution factors.
///
/// Every variant is local to one sub-network or one outage. Batch
/// operations record them per item and carry on with the rest.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// The network description cannot be turned into a valid topology
    /// (zero reactance, unknown bus, self loop, ...).
    #[error("invalid topology: {element}: {reason}")]
    InvalidTopology { element: String, reason: String },

    /// The susceptance matrix of the requested network is singular,
    /// usually because the network is not connected.
    #[error("singular network: {reason}")]
    SingularNetwork { reason: String },

    /// Removing the branch splits its sub-network into islands.
    #[error("outage of branch '{branch}' disconnects the network (BPTDF = {bptdf})")]
    DisconnectingOutage { branch: String, bptdf: f64 },

    /// Condition number exceeded the configured limit in strict mode.
    #[error("ill-conditioned susceptance matrix: condition number {condition:e} exceeds {limit:e}")]
    IllConditioned { condition: f64, limit: f64 },

    #[error("unknown bus '{0}'")]
    UnknownBus(String),

    #[error("unknown branch '{0}'")]
    UnknownBranch(String),

    /// Input vector or matrix has the wrong shape.
    #[error("dimension mismatch: {what}: expected {expected}, got {actual}")]
    Dimension {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid slack: {0}")]
    InvalidSlack(String),

    #[error("linear solver: {0}")]
    Solver(String),
}

impl FlowError {
    pub(crate) fn invalid_topology(element: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::InvalidTopology {
            element: element.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn dimension(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        FlowError::Dimension {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// True for errors the caller should handle by re-splitting the
    /// network and solving each island separately.
    pub fn requires_split(&self) -> bool {
        matches!(
            self,
            FlowError::SingularNetwork { .. } | FlowError::DisconnectingOutage { .. }
        )
    }
}

/// Non-fatal numerical diagnostic attached to a PTDF.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericalWarning {
    /// Index of the sub-network the warning refers to.
    pub sub_network: usize,
    /// Exact 1-norm condition number of the reduced susceptance matrix.
    pub condition: f64,
    /// Configured limit that was exceeded.
    pub limit: f64,
}

impl std::fmt::Display for NumericalWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sub-network {}: condition number {:e} exceeds {:e}",
            self.sub_network, self.condition, self.limit
        )
    }
}
