mod gate;
mod pacer;
mod progress;
mod run;
mod schedule;
mod signal;
mod vu;

pub use gate::IterationGate;
pub use pacer::ArrivalPacer;
pub use progress::{
    LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress,
};
pub use run::{DEFAULT_SCENARIO, run_scenarios, scenarios_from_profile};
pub use schedule::{RampSchedule, StageSnapshot};
pub use signal::{StartSignal, StopSignal};
pub use vu::{VuContext, VuWork};
