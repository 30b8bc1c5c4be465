use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stampede_core::runner::{ProgressUpdate, ScenarioProgress};
use stampede_core::{
    Check, HttpClient, LoadProfile, LoadShape, RequestSpec, RunOptions, ScenarioOptions, Session,
    Stage, Step, ThinkTime, names, run_profile,
};
use stampede_testserver::{TestServer, TestServerOptions};

#[tokio::test]
async fn destination_search_against_test_server() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        fail_every: Some(20),
        require_token: true,
    })
    .await?;

    let profile = LoadProfile::new(
        "smoke",
        LoadShape::Constant {
            vus: 2,
            duration: Duration::from_secs(1),
        },
    )
    .with_threshold(names::HTTP_REQS, ["count>0"])
    .with_threshold(names::CHECKS, ["rate>0.5"]);

    let session = Session::destination_search(server.base_url())
        .with_think_time(ThinkTime::NONE)
        .with_bearer_token("t0ken");

    let report = run_profile(
        &profile,
        session,
        Arc::new(HttpClient::default()),
        RunOptions::default(),
    )
    .await?;

    let summary = &report.summary;
    let requests = summary.counter(names::HTTP_REQS);
    anyhow::ensure!(requests > 0);
    anyhow::ensure!(requests == server.stats().search_total());
    anyhow::ensure!(server.stats().saw_bearer_token() == requests);
    anyhow::ensure!(summary.counter(names::SERVER_ERRORS) == server.stats().search_failed());
    anyhow::ensure!(summary.counter(names::CONNECTION_ERRORS) == 0);
    anyhow::ensure!(summary.counter(names::DATA_RECEIVED) > 0);
    anyhow::ensure!(summary.counter(names::DATA_SENT) > 0);

    let endpoint = summary
        .endpoint("/v1/search/destinations")
        .ok_or_else(|| anyhow::anyhow!("endpoint summary missing"))?;
    anyhow::ensure!(endpoint.requests == requests);
    anyhow::ensure!(endpoint.key == "_2Fv1_2Fsearch_2Fdestinations");

    let status_check = summary
        .checks
        .iter()
        .find(|c| c.name == "status is 200")
        .ok_or_else(|| anyhow::anyhow!("check summary missing"))?;
    anyhow::ensure!(status_check.passes + status_check.fails == requests);
    anyhow::ensure!(status_check.fails == server.stats().search_failed());
    anyhow::ensure!(report.passed, "thresholds: {:?}", report.thresholds);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn connection_refused_is_recorded_as_status_zero() -> anyhow::Result<()> {
    // Bind and drop to get a port nobody listens on.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?
    };

    let profile = LoadProfile::new(
        "once",
        LoadShape::Scenarios(vec![ScenarioOptions {
            name: "once".to_string(),
            vus: Some(1),
            iterations: Some(2),
            ..ScenarioOptions::default()
        }]),
    )
    .with_threshold(names::SUCCESS_RATE, ["rate>0.95"]);

    let session = Session::new("down", format!("http://{addr}"))
        .with_step(Step::Request(
            RequestSpec::get("/health").with_check(Check::status("status is 200", 200)),
        ));

    let report = run_profile(
        &profile,
        session,
        Arc::new(HttpClient::default()),
        RunOptions::default(),
    )
    .await?;

    let summary = &report.summary;
    anyhow::ensure!(summary.counter(names::HTTP_REQS) == 2);
    anyhow::ensure!(summary.counter(names::CONNECTION_ERRORS) == 2);
    anyhow::ensure!(summary.counter(names::CLIENT_ERRORS) == 0);
    anyhow::ensure!(summary.counter(names::SERVER_ERRORS) == 0);
    anyhow::ensure!(summary.counter(names::ITERATIONS) == 2);
    anyhow::ensure!(summary.rate(names::SUCCESS_RATE) == Some(0.0));
    anyhow::ensure!(
        summary
            .series(
                names::CONNECTION_ERRORS,
                &[(names::TAG_TRANSPORT_ERROR_KIND, "connect")]
            )
            .is_some()
    );
    anyhow::ensure!(!report.passed);
    Ok(())
}

#[tokio::test]
async fn ramping_run_reports_progress_per_scenario() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        fail_every: None,
        require_token: false,
    })
    .await?;

    let profile = LoadProfile::new(
        "ramp",
        LoadShape::Staged {
            stages: vec![Stage::new(Duration::from_millis(1500), 3)],
        },
    );
    let session = Session::new("products", server.base_url())
        .with_step(Step::Request(RequestSpec::get("/v1/products")));

    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();

    let report = run_profile(
        &profile,
        session,
        Arc::new(HttpClient::default()),
        RunOptions {
            progress: Some(Arc::new(move |u: ProgressUpdate| sink.lock().push(u))),
            ..RunOptions::default()
        },
    )
    .await?;

    anyhow::ensure!(report.summary.counter(names::HTTP_REQS) > 0);

    let updates = updates.lock();
    anyhow::ensure!(!updates.is_empty(), "no progress updates");
    let first = &updates[0];
    anyhow::ensure!(first.tick == 1);
    anyhow::ensure!(first.scenario == "default");
    anyhow::ensure!(matches!(
        first.progress,
        ScenarioProgress::RampingVus { stage: Some(_), .. }
    ));
    anyhow::ensure!(first.metrics.requests_total > 0);

    server.shutdown().await;
    Ok(())
}
