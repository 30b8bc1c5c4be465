pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("metrics error: {0}")]
    Metrics(#[from] stampede_metrics::Error),

    #[error("no profile named `{requested}` and no `basic` fallback profile is defined")]
    MissingDefaultProfile { requested: String },

    #[error("profile `{0}` defines no load shape")]
    EmptyProfile(String),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error(
        "invalid `executor` (expected `constant-vus`, `ramping-vus`, or `ramping-arrival-rate`)"
    )]
    InvalidExecutor,

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("`time_unit` must be a positive duration")]
    InvalidTimeUnit,

    #[error("`pre_allocated_vus` must be a positive integer")]
    InvalidPreAllocatedVus,

    #[error("`max_vus` must be >= `pre_allocated_vus`")]
    InvalidMaxVus,

    #[error("duplicate scenario name `{0}`")]
    DuplicateScenario(String),

    #[error("invalid threshold on `{metric}`: {reason}")]
    InvalidThreshold { metric: String, reason: String },

    #[error("session `{0}` has no steps")]
    EmptySession(String),

    #[error("invalid think time: min {min}s is greater than max {max}s")]
    InvalidThinkTime { min: u64, max: u64 },

    #[error("invalid base url `{0}`")]
    InvalidBaseUrl(String),

    #[error("batch step `{0}` has no requests")]
    EmptyBatch(String),
}
