use stampede_metrics::{MetricSeriesSummary, MetricValue};

use crate::error::{Error, Result};
use crate::summary::RunSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ThresholdOp {
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Lte,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Gte,
    #[strum(to_string = "==")]
    Eq,
    #[strum(to_string = "!=")]
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    P(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// Outcome of one predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    /// `None` when the metric is missing or the aggregation does not apply to its kind.
    pub observed: Option<f64>,
    pub passed: bool,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("missing operator in `{raw}`"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("malformed threshold `{raw}`"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}` in `{raw}`"))?;
            let p: u8 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}` in `{raw}`"))?;
            if !(1..=100).contains(&p) {
                return Err(format!("percentile out of range (1..=100) in `{raw}`"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value `{right}` in `{raw}`"))?;
    if !value.is_finite() {
        return Err(format!("non-finite value in `{raw}`"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

/// Parses every predicate up front so bad thresholds fail before any load is generated.
pub fn validate_thresholds(thresholds: &[ThresholdSet]) -> Result<()> {
    for set in thresholds {
        for raw in &set.expressions {
            parse_threshold_expr(raw).map_err(|reason| Error::InvalidThreshold {
                metric: set.metric.clone(),
                reason,
            })?;
        }
    }
    Ok(())
}

/// Evaluates every predicate against the untagged series of its metric and returns all
/// results, passing and failing, in declaration order.
pub fn evaluate_thresholds(
    thresholds: &[ThresholdSet],
    summary: &RunSummary,
) -> Result<Vec<ThresholdResult>> {
    let mut out = Vec::new();
    let elapsed_secs = summary.elapsed.as_secs_f64();

    for set in thresholds {
        let series = summary.metric(&set.metric);

        for raw in &set.expressions {
            let expr = parse_threshold_expr(raw).map_err(|reason| Error::InvalidThreshold {
                metric: set.metric.clone(),
                reason,
            })?;
            let observed = series.and_then(|s| observed_value(s, expr.agg, elapsed_secs));
            let passed = observed.is_some_and(|v| compare(v, expr.op, expr.value));
            out.push(ThresholdResult {
                metric: set.metric.clone(),
                expression: raw.clone(),
                observed,
                passed,
            });
        }
    }

    Ok(out)
}

pub fn thresholds_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}

fn compare(left: f64, op: ThresholdOp, right: f64) -> bool {
    match op {
        ThresholdOp::Lt => left < right,
        ThresholdOp::Lte => left <= right,
        ThresholdOp::Gt => left > right,
        ThresholdOp::Gte => left >= right,
        ThresholdOp::Eq => left == right,
        ThresholdOp::Ne => left != right,
    }
}

fn observed_value(series: &MetricSeriesSummary, agg: ThresholdAgg, elapsed_secs: f64) -> Option<f64> {
    match (&series.values, agg) {
        (MetricValue::Trend(t), ThresholdAgg::Avg) => t.avg,
        (MetricValue::Trend(t), ThresholdAgg::Min) => t.min,
        (MetricValue::Trend(t), ThresholdAgg::Max) => t.max,
        (MetricValue::Trend(t), ThresholdAgg::Med) => t.med,
        (MetricValue::Trend(t), ThresholdAgg::Count) => Some(t.count as f64),
        (MetricValue::Trend(t), ThresholdAgg::P(p)) => t.percentile(p),

        (MetricValue::Rate { rate, .. }, ThresholdAgg::Rate | ThresholdAgg::Value) => *rate,
        (MetricValue::Rate { total, .. }, ThresholdAgg::Count) => Some(*total as f64),

        (MetricValue::Counter(v), ThresholdAgg::Count | ThresholdAgg::Value) => Some(*v as f64),
        // Counter rate is per second of run time.
        (MetricValue::Counter(v), ThresholdAgg::Rate) => {
            (elapsed_secs > 0.0).then(|| *v as f64 / elapsed_secs)
        }

        (MetricValue::Gauge { value, .. }, ThresholdAgg::Value) => Some(*value as f64),
        (MetricValue::Gauge { peak, .. }, ThresholdAgg::Max) => Some(*peak as f64),

        _ => None,
    }
}
