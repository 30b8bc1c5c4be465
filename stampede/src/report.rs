use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use askama::Template;
use serde::Serialize;
use stampede_core::{MetricSeriesSummary, MetricValue, RunReport, TrendSummary};

/// Serializable view of a finished run. Shared by the JSON report file and the NDJSON
/// summary line.
#[derive(Debug, Serialize)]
pub(crate) struct ReportJson {
    pub profile: String,
    pub passed: bool,
    pub elapsed_secs: f64,
    pub metrics: Vec<MetricJson>,
    pub endpoints: Vec<EndpointJson>,
    pub checks: Vec<CheckJson>,
    pub scenarios: Vec<ScenarioJson>,
    pub thresholds: Vec<ThresholdJson>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MetricJson {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub values: MetricValuesJson,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct MetricValuesJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub med: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p90: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p99: Option<f64>,
}

impl MetricValuesJson {
    fn from_trend(t: &TrendSummary) -> Self {
        Self {
            count: Some(t.count),
            min: t.min,
            max: t.max,
            avg: t.avg,
            med: t.med,
            p90: t.percentile(90),
            p95: t.percentile(95),
            p99: t.percentile(99),
            ..Self::default()
        }
    }
}

impl From<&MetricSeriesSummary> for MetricJson {
    fn from(m: &MetricSeriesSummary) -> Self {
        let values = match &m.values {
            MetricValue::Counter(v) => MetricValuesJson {
                count: Some(*v),
                ..MetricValuesJson::default()
            },
            MetricValue::Gauge { value, peak } => MetricValuesJson {
                value: Some(*value),
                peak: Some(*peak),
                ..MetricValuesJson::default()
            },
            MetricValue::Rate { total, hits, rate } => MetricValuesJson {
                count: Some(*total),
                hits: Some(*hits),
                rate: *rate,
                ..MetricValuesJson::default()
            },
            MetricValue::Trend(t) => MetricValuesJson::from_trend(t),
        };

        Self {
            name: m.name.clone(),
            kind: m.kind.to_string(),
            tags: m.tags.iter().cloned().collect(),
            values,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EndpointJson {
    pub endpoint: String,
    pub key: String,
    pub requests: u64,
    pub errors: u64,
    pub duration: MetricValuesJson,
}

#[derive(Debug, Serialize)]
pub(crate) struct CheckJson {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScenarioJson {
    pub name: String,
    pub requests: u64,
    pub failed_requests: u64,
    pub iterations: u64,
    pub iterations_interrupted: u64,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ThresholdJson {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

impl ReportJson {
    pub(crate) fn from_report(report: &RunReport) -> Self {
        let s = &report.summary;
        Self {
            profile: report.profile.clone(),
            passed: report.passed,
            elapsed_secs: s.elapsed.as_secs_f64(),
            metrics: s.metrics.iter().map(MetricJson::from).collect(),
            endpoints: s
                .endpoints
                .iter()
                .map(|e| EndpointJson {
                    endpoint: e.endpoint.clone(),
                    key: e.key.clone(),
                    requests: e.requests,
                    errors: e.errors,
                    duration: MetricValuesJson::from_trend(&e.duration),
                })
                .collect(),
            checks: s
                .checks
                .iter()
                .map(|c| CheckJson {
                    name: c.name.clone(),
                    passes: c.passes,
                    fails: c.fails,
                })
                .collect(),
            scenarios: s
                .scenarios
                .iter()
                .map(|sc| ScenarioJson {
                    name: sc.name.clone(),
                    requests: sc.requests,
                    failed_requests: sc.failed_requests,
                    iterations: sc.iterations,
                    iterations_interrupted: sc.iterations_interrupted,
                    success_rate: sc.success_rate,
                })
                .collect(),
            thresholds: report
                .thresholds
                .iter()
                .map(|t| ThresholdJson {
                    metric: t.metric.clone(),
                    expression: t.expression.clone(),
                    observed: t.observed,
                    passed: t.passed,
                })
                .collect(),
        }
    }
}

pub(crate) async fn write_json_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(&ReportJson::from_report(report))
        .context("serialize JSON report")?;
    write_file(path, &body).await
}

pub(crate) async fn write_html_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let html = render_html(report)?;
    write_file(path, html.as_bytes()).await
}

async fn write_file(path: &Path, body: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create report directory: {}", parent.display()))?;
    }
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write report: {}", path.display()))
}

#[derive(askama::Template)]
#[template(path = "report.html")]
struct HtmlReportTemplate<'a> {
    profile: &'a str,
    passed: bool,
    elapsed: String,
    metrics: Vec<MetricRow>,
    endpoints: Vec<EndpointRow>,
    checks: Vec<CheckRow>,
    scenarios: Vec<ScenarioRow>,
    thresholds: Vec<ThresholdRow>,
}

struct MetricRow {
    name: String,
    kind: String,
    values: String,
}

struct EndpointRow {
    endpoint: String,
    requests: u64,
    errors: u64,
    avg: String,
    p95: String,
    max: String,
}

struct CheckRow {
    name: String,
    passes: u64,
    fails: u64,
    rate: String,
}

struct ScenarioRow {
    name: String,
    requests: u64,
    failed_requests: u64,
    iterations: u64,
    interrupted: u64,
    success_rate: String,
}

struct ThresholdRow {
    metric: String,
    expression: String,
    observed: String,
    passed: bool,
}

pub(crate) fn render_html(report: &RunReport) -> anyhow::Result<String> {
    let s = &report.summary;
    let tpl = HtmlReportTemplate {
        profile: &report.profile,
        passed: report.passed,
        elapsed: format!("{:.1}s", s.elapsed.as_secs_f64()),
        metrics: s
            .metrics
            .iter()
            .map(|m| MetricRow {
                name: series_label(m),
                kind: m.kind.to_string(),
                values: metric_values_inline(&m.values),
            })
            .collect(),
        endpoints: s
            .endpoints
            .iter()
            .map(|e| EndpointRow {
                endpoint: e.endpoint.clone(),
                requests: e.requests,
                errors: e.errors,
                avg: fmt_opt(e.duration.avg),
                p95: fmt_opt(e.duration.percentile(95)),
                max: fmt_opt(e.duration.max),
            })
            .collect(),
        checks: s
            .checks
            .iter()
            .map(|c| CheckRow {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
                rate: ratio(c.passes, c.passes.saturating_add(c.fails)),
            })
            .collect(),
        scenarios: s
            .scenarios
            .iter()
            .map(|sc| ScenarioRow {
                name: sc.name.clone(),
                requests: sc.requests,
                failed_requests: sc.failed_requests,
                iterations: sc.iterations,
                interrupted: sc.iterations_interrupted,
                success_rate: sc
                    .success_rate
                    .map(|r| format!("{:.2}%", r * 100.0))
                    .unwrap_or_else(|| "n/a".to_string()),
            })
            .collect(),
        thresholds: report
            .thresholds
            .iter()
            .map(|t| ThresholdRow {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                observed: t
                    .observed
                    .map(|v| format!("{v:.4}"))
                    .unwrap_or_else(|| "missing".to_string()),
                passed: t.passed,
            })
            .collect(),
    };
    tpl.render().context("render HTML report")
}

pub(crate) fn series_label(m: &MetricSeriesSummary) -> String {
    if m.tags.is_empty() {
        return m.name.clone();
    }
    let tags = m
        .tags
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{{{tags}}}", m.name)
}

pub(crate) fn metric_values_inline(v: &MetricValue) -> String {
    match v {
        MetricValue::Counter(c) => format!("count={c}"),
        MetricValue::Gauge { value, peak } => format!("value={value} max={peak}"),
        MetricValue::Rate { total, hits, rate } => match rate {
            Some(r) => format!("rate={:.2}% ({hits}/{total})", r * 100.0),
            None => "rate=n/a (0 samples)".to_string(),
        },
        MetricValue::Trend(t) => format!(
            "avg={} min={} med={} max={} p(90)={} p(95)={} count={}",
            fmt_opt(t.avg),
            fmt_opt(t.min),
            fmt_opt(t.med),
            fmt_opt(t.max),
            fmt_opt(t.percentile(90)),
            fmt_opt(t.percentile(95)),
            t.count
        ),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn ratio(hits: u64, total: u64) -> String {
    if total == 0 {
        return "n/a".to_string();
    }
    format!("{:.2}%", (hits as f64) * 100.0 / (total as f64))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use stampede_core::{
        CheckSummary, EndpointSummary, MetricKind, RunSummary, ScenarioSummary, ThresholdResult,
    };

    use super::*;

    pub(crate) fn sample_report() -> RunReport {
        let trend = TrendSummary::from_samples(&[100.0, 200.0, 300.0, 400.0, 500.0]);
        RunReport {
            profile: "basic".to_string(),
            summary: RunSummary {
                elapsed: Duration::from_secs(30),
                metrics: vec![
                    MetricSeriesSummary {
                        name: "http_reqs".to_string(),
                        kind: MetricKind::Counter,
                        tags: Vec::new(),
                        values: MetricValue::Counter(5),
                    },
                    MetricSeriesSummary {
                        name: "response_time".to_string(),
                        kind: MetricKind::Trend,
                        tags: Vec::new(),
                        values: MetricValue::Trend(trend.clone()),
                    },
                    MetricSeriesSummary {
                        name: "success_rate".to_string(),
                        kind: MetricKind::Rate,
                        tags: vec![("scenario".to_string(), "default".to_string())],
                        values: MetricValue::Rate {
                            total: 5,
                            hits: 4,
                            rate: Some(0.8),
                        },
                    },
                ],
                endpoints: vec![EndpointSummary {
                    endpoint: "/v1/search/destinations".to_string(),
                    key: "_2Fv1_2Fsearch_2Fdestinations".to_string(),
                    requests: 5,
                    errors: 1,
                    duration: trend,
                }],
                checks: vec![CheckSummary {
                    name: "status is 200".to_string(),
                    passes: 4,
                    fails: 1,
                }],
                scenarios: vec![ScenarioSummary {
                    name: "default".to_string(),
                    requests: 5,
                    failed_requests: 1,
                    iterations: 5,
                    iterations_interrupted: 0,
                    success_rate: Some(0.8),
                }],
            },
            thresholds: vec![
                ThresholdResult {
                    metric: "success_rate".to_string(),
                    expression: "rate>0.95".to_string(),
                    observed: Some(0.8),
                    passed: false,
                },
                ThresholdResult {
                    metric: "response_time".to_string(),
                    expression: "p(95)<800".to_string(),
                    observed: Some(500.0),
                    passed: true,
                },
            ],
            passed: false,
        }
    }

    #[test]
    fn json_report_carries_metrics_and_thresholds() {
        let v = serde_json::to_value(ReportJson::from_report(&sample_report()))
            .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(v.get("profile").and_then(Value::as_str), Some("basic"));
        assert_eq!(v.get("passed").and_then(Value::as_bool), Some(false));
        assert_eq!(v.pointer("/metrics/0/count").and_then(Value::as_u64), Some(5));
        assert_eq!(
            v.pointer("/metrics/1/p95").and_then(Value::as_f64),
            Some(500.0)
        );
        assert_eq!(
            v.pointer("/metrics/2/tags/scenario").and_then(Value::as_str),
            Some("default")
        );
        assert_eq!(
            v.pointer("/endpoints/0/key").and_then(Value::as_str),
            Some("_2Fv1_2Fsearch_2Fdestinations")
        );
        assert_eq!(
            v.pointer("/thresholds/0/observed").and_then(Value::as_f64),
            Some(0.8)
        );
        assert_eq!(
            v.pointer("/thresholds/1/passed").and_then(Value::as_bool),
            Some(true)
        );
    }

    #[test]
    fn html_report_lists_tables_and_escapes_names() {
        let mut report = sample_report();
        report.summary.checks[0].name = "<b>bold</b>".to_string();

        let html = render_html(&report).unwrap_or_else(|e| panic!("{e}"));
        assert!(html.contains("<title>stampede report: basic</title>"));
        assert!(html.contains("/v1/search/destinations"));
        assert!(html.contains("success_rate"));
        assert!(html.contains("0.8000"));
        assert!(html.contains("FAILED"));
        assert!(!html.contains("<b>bold</b>"));
    }

    #[test]
    fn inline_values_per_kind() {
        assert_eq!(metric_values_inline(&MetricValue::Counter(3)), "count=3");
        assert_eq!(
            metric_values_inline(&MetricValue::Rate {
                total: 0,
                hits: 0,
                rate: None
            }),
            "rate=n/a (0 samples)"
        );
        assert_eq!(
            metric_values_inline(&MetricValue::Gauge { value: 0, peak: 7 }),
            "value=0 max=7"
        );
    }

    #[tokio::test]
    async fn reports_are_written_into_missing_directories() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("nested").join("report.json");

        write_json_report(&path, &sample_report())
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        let raw = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{e}"));
        let v: Value = serde_json::from_str(&raw).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(v.get("elapsed_secs").and_then(Value::as_f64), Some(30.0));
    }
}
