use std::path::Path;
use std::sync::Arc;

use stampede_core::runner::StopSignal;
use stampede_core::{HttpClient, ProfileRegistry, RunConfig, RunOptions, Session};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::profile_yaml::load_profiles_from_yaml;
use crate::report::{write_html_report, write_json_report};
use crate::run_error::RunError;
use crate::session_yaml::load_session_from_yaml;

/// Base URL used when neither the session file nor `--base-url` names one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let registry = load_registry(args.profiles.as_deref())
        .await
        .map_err(RunError::InvalidInput)?;
    let profile = stampede_core::select(&args.profile, &registry)
        .map_err(|e| RunError::from_core(e, "failed to select profile"))?;

    let session = load_session(&args).await.map_err(RunError::InvalidInput)?;
    session
        .validate()
        .map_err(|e| RunError::from_core(e, "invalid session"))?;

    let mut config = RunConfig::default();
    if let Some(graceful_stop) = args.graceful_stop {
        config.graceful_stop = graceful_stop;
    }

    let stop = Arc::new(StopSignal::new());
    let ctrl_c = tokio::spawn(stop_on_ctrl_c(stop.clone()));

    out.print_header(&profile, &session);

    let result = stampede_core::run_profile(
        &profile,
        session,
        Arc::new(HttpClient::default()),
        RunOptions {
            config,
            stop: Some(stop),
            progress: out.progress(),
        },
    )
    .await;
    ctrl_c.abort();

    let report = result.map_err(|e| RunError::from_core(e, "run failed"))?;

    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.report_json {
        write_json_report(path, &report)
            .await
            .map_err(RunError::RuntimeError)?;
    }
    if let Some(path) = &args.report_html {
        write_html_report(path, &report)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    Ok(ExitCode::from_thresholds(report.passed))
}

/// Built-in profiles, overridden by any with the same key in `path`.
pub(crate) async fn load_registry(path: Option<&Path>) -> anyhow::Result<ProfileRegistry> {
    let mut registry = ProfileRegistry::builtin();
    if let Some(path) = path {
        registry.merge(load_profiles_from_yaml(path).await?);
    }
    Ok(registry)
}

async fn load_session(args: &RunArgs) -> anyhow::Result<Session> {
    let mut session = match &args.session {
        Some(path) => load_session_from_yaml(path).await?,
        None => Session::destination_search(DEFAULT_BASE_URL),
    };

    if let Some(base_url) = &args.base_url {
        session.base_url = base_url.clone();
    } else if session.base_url.is_empty() {
        session.base_url = DEFAULT_BASE_URL.to_string();
    }

    match &args.token {
        Some(token) if !token.is_empty() => Ok(session.with_bearer_token(token)),
        _ => {
            tracing::warn!("no TOKEN set; requests are sent without an Authorization header");
            Ok(session)
        }
    }
}

async fn stop_on_ctrl_c(stop: Arc<StopSignal>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("interrupted, stopping scenarios (waiting for in-flight iterations)");
        stop.stop();
    }
}
