use thiserror::Error as ThisError;

/// Convenience wrapper to represent success or meaningful failure.
pub type HlsResult<T> = Result<T, Error>;

/// Errors produced while scheduling, allocating and building a design.
#[derive(ThisError, Debug)]
pub enum Error {
    /// No assignment of c-steps satisfies the dependency bounds inside the
    /// scheduling window.
    #[error("no feasible schedule: {0}")]
    SchedulingInfeasible(String),

    #[error("priority queue key collision without a resolver")]
    NoResolver,

    #[error("priority queue is empty")]
    EmptyQueue,

    #[error("interval [{lo}, {hi}] overlaps an existing interval")]
    IntervalOverlap { lo: i64, hi: i64 },

    /// The statement list cannot be expressed as concurrent flows.
    #[error("not extractable as concurrent flow: {0}")]
    NotExtractable(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("failed to map instruction: {0}")]
    MappingFailed(String),

    #[error("malformed input: {0}")]
    Malformed(String),

    /// Two different flows drive the same target in one c-step.
    #[error("conflicting drivers for `{target}' in c-step {cstep}")]
    DriverConflict { target: String, cstep: usize },

    #[error("cyclic dataflow through signal `{0}'")]
    CyclicDataflow(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Misc(String),
}

impl Error {
    pub fn infeasible<S: ToString>(msg: S) -> Self {
        Self::SchedulingInfeasible(msg.to_string())
    }

    pub fn malformed<S: ToString>(msg: S) -> Self {
        Self::Malformed(msg.to_string())
    }

    pub fn mapping<S: ToString>(msg: S) -> Self {
        Self::MappingFailed(msg.to_string())
    }

    pub fn not_extractable<S: ToString>(msg: S) -> Self {
        Self::NotExtractable(msg.to_string())
    }

    pub fn unsupported<S: ToString>(msg: S) -> Self {
        Self::Unsupported(msg.to_string())
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::Misc(msg.to_string())
    }

    /// Errors that signal a scheduling window which was simply too small.
    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::SchedulingInfeasible(_))
    }
}
