use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

/// Duration accepted as a humantime string (`10s`, `1m30s`), integer seconds or float
/// seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// A threshold entry: one expression or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Many(Vec<String>),
}

impl ThresholdExprYaml {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

/// Threshold map in file order (metric name -> expressions).
pub(crate) fn parse_thresholds_map(
    raw: serde_yaml::Mapping,
) -> anyhow::Result<Vec<stampede_core::ThresholdSet>> {
    let mut out = Vec::with_capacity(raw.len());
    for (k, v) in raw {
        let metric = match k {
            serde_yaml::Value::String(s) => s,
            other => anyhow::bail!("threshold metric names must be strings, got {other:?}"),
        };
        let expr: ThresholdExprYaml = serde_yaml::from_value(v)
            .with_context(|| format!("invalid thresholds for `{metric}`"))?;
        out.push(stampede_core::ThresholdSet {
            metric,
            expressions: expr.into_vec(),
        });
    }
    Ok(out)
}

pub(crate) async fn read_yaml<T>(path: &Path, what: &str) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {what} YAML: {}", path.display()))?;

    serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse {what} YAML: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_strings_and_numbers() {
        let parse = |raw: &str| -> Duration {
            serde_yaml::from_str::<YamlDuration>(raw)
                .unwrap_or_else(|e| panic!("{raw}: {e}"))
                .into_inner()
        };

        assert_eq!(parse("10s"), Duration::from_secs(10));
        assert_eq!(parse("1m 30s"), Duration::from_secs(90));
        assert_eq!(parse("250ms"), Duration::from_millis(250));
        assert_eq!(parse("5"), Duration::from_secs(5));
        assert_eq!(parse("0.5"), Duration::from_millis(500));

        assert!(serde_yaml::from_str::<YamlDuration>("-1").is_err());
        assert!(serde_yaml::from_str::<YamlDuration>("ten seconds").is_err());
    }

    #[test]
    fn thresholds_keep_file_order() {
        let raw: serde_yaml::Mapping = serde_yaml::from_str(
            "success_rate: rate>0.95\nresponse_time: [p(95)<800, avg<300]\nchecks: rate>0.99\n",
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let sets = parse_thresholds_map(raw).unwrap_or_else(|e| panic!("{e}"));
        let names: Vec<&str> = sets.iter().map(|s| s.metric.as_str()).collect();
        assert_eq!(names, ["success_rate", "response_time", "checks"]);
        assert_eq!(sets[1].expressions, ["p(95)<800", "avg<300"]);
    }

    #[test]
    fn threshold_values_must_be_strings() {
        let raw: serde_yaml::Mapping =
            serde_yaml::from_str("success_rate: { rate: 0.9 }\n").unwrap_or_else(|e| panic!("{e}"));
        assert!(parse_thresholds_map(raw).is_err());
    }
}
