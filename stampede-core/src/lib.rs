mod aggregator;
mod checks;
mod config;
mod endpoint;
mod error;
mod executor;
mod profile;
mod run;
mod session;
mod summary;
mod thresholds;
mod transport;

pub mod runner;

pub use aggregator::{
    ActiveVuGuard, Aggregator, FailureKind, ScenarioTotals, StatusClass, StepResult, names,
};
pub use checks::{
    Check, CheckOutcome, CheckPredicate, CheckReport, CustomPredicate, evaluate_checks,
};
pub use config::{
    DEFAULT_GRACEFUL_STOP, LoadProfile, LoadShape, RunConfig, ScenarioConfig, ScenarioExecutor,
    ScenarioExecutorKind, ScenarioOptions, Stage,
};
pub use endpoint::{decode_endpoint_key, endpoint_key, endpoint_path};
pub use error::{Error, Result};
pub use executor::{IterationOutcome, SessionExecutor};
pub use profile::{DEFAULT_PROFILE, ProfileRegistry, select};
pub use run::{RunContext, RunOptions, RunReport, run_profile};
pub use runner::{run_scenarios, scenarios_from_profile};
pub use session::{RequestSpec, Session, Step, ThinkTime};
pub use summary::{CheckSummary, EndpointSummary, RunSummary, ScenarioSummary};
pub use thresholds::{
    ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdResult, ThresholdSet, evaluate_thresholds,
    parse_threshold_expr, thresholds_passed, validate_thresholds,
};
pub use transport::{Transport, TransportError};

pub use stampede_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind, Method};
pub use stampede_metrics::{
    Error as MetricsError, MetricKind, MetricSeriesSummary, MetricValue, Registry, TrendSummary,
};
