use std::fmt::Write as _;

use stampede_core::{MetricValue, RunReport, names};

use super::format::*;

pub(crate) fn render(report: &RunReport) -> String {
    let s = &report.summary;
    let mut out = String::new();

    writeln!(
        &mut out,
        "profile: {} (elapsed {})",
        report.profile,
        format_duration(s.elapsed)
    )
    .ok();

    if !s.scenarios.is_empty() {
        out.push_str("\nscenarios\n");
    }
    for sc in &s.scenarios {
        writeln!(
            &mut out,
            "  {}: requests={} failed={} iterations={} interrupted={} success={}",
            sc.name,
            sc.requests,
            sc.failed_requests,
            sc.iterations,
            sc.iterations_interrupted,
            sc.success_rate
                .map(format_percent)
                .unwrap_or_else(|| "n/a".to_string())
        )
        .ok();
    }

    if !s.endpoints.is_empty() {
        out.push_str("\nendpoints\n");
    }
    for e in &s.endpoints {
        writeln!(
            &mut out,
            "  {}: requests={} errors={} avg={} p(95)={} max={}",
            e.endpoint,
            e.requests,
            e.errors,
            format_ms_opt(e.duration.avg),
            format_ms_opt(e.duration.percentile(95)),
            format_ms_opt(e.duration.max)
        )
        .ok();
    }

    if !s.checks.is_empty() {
        out.push_str("\nchecks\n");
    }
    for c in &s.checks {
        let mark = if c.fails == 0 { "ok  " } else { "FAIL" };
        writeln!(
            &mut out,
            "  {mark} {}: passes={} fails={}",
            c.name, c.passes, c.fails
        )
        .ok();
    }

    out.push_str("\nmetrics\n");
    let width = s
        .metrics
        .iter()
        .map(|m| m.name.len())
        .max()
        .unwrap_or_default();
    for m in &s.metrics {
        let tags = format_tags_inline(&m.tags, &[]);
        let label = if tags.is_empty() {
            m.name.clone()
        } else {
            format!("{}{tags}", m.name)
        };
        writeln!(
            &mut out,
            "  {label:<width$}  {}",
            format_values(&m.name, &m.values)
        )
        .ok();
    }

    if !report.thresholds.is_empty() {
        out.push_str("\nthresholds\n");
    }
    for t in &report.thresholds {
        let verdict = if t.passed { "ok  " } else { "FAIL" };
        let observed = t
            .observed
            .map(|v| format!("observed {v}"))
            .unwrap_or_else(|| "missing series".to_string());
        writeln!(
            &mut out,
            "  {verdict} {}: {} ({observed})",
            t.metric, t.expression
        )
        .ok();
    }

    out
}

fn format_values(name: &str, values: &MetricValue) -> String {
    match values {
        MetricValue::Counter(v) if name == names::DATA_RECEIVED || name == names::DATA_SENT => {
            format_bytes(*v)
        }
        MetricValue::Counter(v) => v.to_string(),
        MetricValue::Gauge { value, peak } => format!("value={value} max={peak}"),
        MetricValue::Rate { total, hits, rate } => match rate {
            Some(r) => format!("{} ({hits}/{total})", format_percent(*r)),
            None => "n/a (0 samples)".to_string(),
        },
        MetricValue::Trend(t) => format!(
            "avg={} min={} med={} max={} p(90)={} p(95)={}",
            format_ms_opt(t.avg),
            format_ms_opt(t.min),
            format_ms_opt(t.med),
            format_ms_opt(t.max),
            format_ms_opt(t.percentile(90)),
            format_ms_opt(t.percentile(95))
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    #[test]
    fn renders_every_section() {
        let out = render(&sample_report());

        assert!(out.starts_with("profile: basic (elapsed 30s)\n"));
        assert!(out.contains("  default: requests=5 failed=1 iterations=5 interrupted=0 success=80.00%"));
        assert!(out.contains("  /v1/search/destinations: requests=5 errors=1 avg=300.00ms p(95)=500.00ms"));
        assert!(out.contains("  FAIL status is 200: passes=4 fails=1"));
        assert!(out.contains("success_rate{scenario=default}"));
        assert!(out.contains("80.00% (4/5)"));
        assert!(out.contains("  FAIL success_rate: rate>0.95 (observed 0.8)"));
        assert!(out.contains("  ok   response_time: p(95)<800 (observed 500)"));
    }

    #[test]
    fn byte_counters_are_humanized() {
        assert_eq!(
            format_values(names::DATA_RECEIVED, &MetricValue::Counter(4096)),
            "4.00KiB"
        );
        assert_eq!(format_values(names::HTTP_REQS, &MetricValue::Counter(4096)), "4096");
    }
}
