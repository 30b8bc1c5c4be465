use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;
use stampede_core::{LoadProfile, LoadShape, ProfileRegistry, ScenarioOptions, Stage};

use crate::yaml::{YamlDuration, parse_thresholds_map, read_yaml};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfilesDocYaml {
    profiles: BTreeMap<String, ProfileYaml>,
}

/// One profile: exactly one of `vus` + `duration`, `stages` or `scenarios`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ProfileYaml {
    vus: Option<u64>,
    duration: Option<YamlDuration>,

    #[serde(default)]
    stages: Vec<StageYaml>,

    /// A list of scenarios with optional `name`s, or a mapping from name to scenario.
    #[serde(default)]
    scenarios: serde_yaml::Value,

    #[serde(default)]
    thresholds: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScenarioYaml {
    name: Option<String>,

    /// constant-vus | ramping-vus | ramping-arrival-rate
    executor: Option<String>,

    vus: Option<u64>,
    iterations: Option<u64>,
    duration: Option<YamlDuration>,

    #[serde(rename = "startVUs")]
    start_vus: Option<u64>,

    #[serde(default)]
    stages: Vec<StageYaml>,

    start_rate: Option<u64>,
    time_unit: Option<YamlDuration>,

    #[serde(rename = "preAllocatedVUs")]
    pre_allocated_vus: Option<u64>,

    #[serde(rename = "maxVUs")]
    max_vus: Option<u64>,

    graceful_stop: Option<YamlDuration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageYaml {
    target: u64,
    duration: YamlDuration,
}

impl From<StageYaml> for Stage {
    fn from(s: StageYaml) -> Self {
        Stage::new(s.duration.into_inner(), s.target)
    }
}

pub async fn load_profiles_from_yaml(path: &Path) -> anyhow::Result<ProfileRegistry> {
    let doc: ProfilesDocYaml = read_yaml(path, "profiles").await?;
    registry_from_doc(doc).with_context(|| format!("invalid profiles: {}", path.display()))
}

fn registry_from_doc(doc: ProfilesDocYaml) -> anyhow::Result<ProfileRegistry> {
    let mut registry = ProfileRegistry::new();
    for (key, profile) in doc.profiles {
        let profile = profile_from_yaml(&key, profile)?;

        // Shape and threshold syntax are checked here so a broken file fails before any
        // run starts.
        stampede_core::scenarios_from_profile(&profile, &stampede_core::RunConfig::default())
            .with_context(|| format!("invalid profile `{key}`"))?;

        registry.insert(profile);
    }
    Ok(registry)
}

fn profile_from_yaml(key: &str, p: ProfileYaml) -> anyhow::Result<LoadProfile> {
    let ProfileYaml {
        vus,
        duration,
        stages,
        scenarios,
        thresholds,
    } = p;

    let scenarios = scenarios_from_value(scenarios)
        .with_context(|| format!("invalid scenarios in profile `{key}`"))?;

    let constant = vus.is_some() || duration.is_some();
    let shapes = [constant, !stages.is_empty(), !scenarios.is_empty()]
        .into_iter()
        .filter(|set| *set)
        .count();
    if shapes != 1 {
        anyhow::bail!(
            "profile `{key}` must define exactly one of `vus` + `duration`, `stages` or `scenarios`"
        );
    }

    let shape = if constant {
        match (vus, duration) {
            (Some(vus), Some(duration)) => LoadShape::Constant {
                vus,
                duration: duration.into_inner(),
            },
            _ => anyhow::bail!("profile `{key}`: `vus` and `duration` must be set together"),
        }
    } else if !stages.is_empty() {
        LoadShape::Staged {
            stages: stages.into_iter().map(Stage::from).collect(),
        }
    } else {
        let total = scenarios.len();
        LoadShape::Scenarios(
            scenarios
                .into_iter()
                .enumerate()
                .map(|(idx, (name, s))| {
                    let name = name.unwrap_or_else(|| {
                        if total == 1 {
                            stampede_core::runner::DEFAULT_SCENARIO.to_string()
                        } else {
                            format!("scenario_{}", idx + 1)
                        }
                    });
                    scenario_yaml_into_options(s, name)
                })
                .collect(),
        )
    };

    let thresholds = parse_thresholds_map(thresholds)
        .with_context(|| format!("invalid thresholds in profile `{key}`"))?;

    Ok(LoadProfile {
        key: key.to_string(),
        shape,
        thresholds,
    })
}

/// Scenarios in file order, each with its name if the file gave one.
fn scenarios_from_value(
    value: serde_yaml::Value,
) -> anyhow::Result<Vec<(Option<String>, ScenarioYaml)>> {
    match value {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                let s: ScenarioYaml = serde_yaml::from_value(item)
                    .with_context(|| format!("scenario #{}", idx + 1))?;
                Ok((s.name.clone(), s))
            })
            .collect(),
        serde_yaml::Value::Mapping(map) => map
            .into_iter()
            .map(|(k, v)| {
                let serde_yaml::Value::String(name) = k else {
                    anyhow::bail!("scenario names must be strings, got {k:?}");
                };
                let s: ScenarioYaml = serde_yaml::from_value(v)
                    .with_context(|| format!("scenario `{name}`"))?;
                if let Some(inner) = &s.name
                    && inner != &name
                {
                    anyhow::bail!("scenario `{name}` also sets `name: {inner}`");
                }
                Ok((Some(name), s))
            })
            .collect(),
        other => anyhow::bail!("`scenarios` must be a list or a mapping, got {other:?}"),
    }
}

fn scenario_yaml_into_options(s: ScenarioYaml, name: String) -> ScenarioOptions {
    let ScenarioYaml {
        name: _,
        executor,
        vus,
        iterations,
        duration,
        start_vus,
        stages,
        start_rate,
        time_unit,
        pre_allocated_vus,
        max_vus,
        graceful_stop,
    } = s;

    ScenarioOptions {
        name,
        executor,
        vus,
        iterations,
        duration: duration.map(YamlDuration::into_inner),
        start_vus,
        stages: stages.into_iter().map(Stage::from).collect(),
        start_rate,
        time_unit: time_unit.map(YamlDuration::into_inner),
        pre_allocated_vus,
        max_vus,
        graceful_stop: graceful_stop.map(YamlDuration::into_inner),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parse(raw: &str) -> anyhow::Result<ProfileRegistry> {
        let doc: ProfilesDocYaml = serde_yaml::from_str(raw)?;
        registry_from_doc(doc)
    }

    #[test]
    fn parses_every_profile_shape() {
        let registry = parse(
            r#"
profiles:
  smoke:
    vus: 2
    duration: 5s
    thresholds:
      success_rate: rate>0.99
      response_time: [p(95)<300, avg<200]
  soak:
    stages:
      - { duration: 1m, target: 20 }
      - { duration: 10m, target: 20 }
  mixed:
    scenarios:
      - name: browse
        executor: constant-vus
        vus: 3
        duration: 30s
        gracefulStop: 2s
      - executor: ramping-arrival-rate
        startRate: 1
        timeUnit: 1s
        preAllocatedVUs: 2
        maxVUs: 10
        stages:
          - { duration: 10s, target: 20 }
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(registry.len(), 3);

        let smoke = registry.get("smoke").unwrap_or_else(|| panic!("smoke missing"));
        assert_eq!(
            smoke.shape,
            LoadShape::Constant {
                vus: 2,
                duration: Duration::from_secs(5)
            }
        );
        assert_eq!(smoke.thresholds.len(), 2);
        assert_eq!(smoke.thresholds[0].metric, "success_rate");
        assert_eq!(smoke.thresholds[1].expressions, ["p(95)<300", "avg<200"]);

        let soak = registry.get("soak").unwrap_or_else(|| panic!("soak missing"));
        assert_eq!(
            soak.shape,
            LoadShape::Staged {
                stages: vec![
                    Stage::new(Duration::from_secs(60), 20),
                    Stage::new(Duration::from_secs(600), 20),
                ]
            }
        );

        let mixed = registry.get("mixed").unwrap_or_else(|| panic!("mixed missing"));
        let LoadShape::Scenarios(list) = &mixed.shape else {
            panic!("expected scenarios, got {:?}", mixed.shape);
        };
        assert_eq!(list[0].name, "browse");
        assert_eq!(list[0].graceful_stop, Some(Duration::from_secs(2)));
        assert_eq!(list[1].name, "scenario_2");
        assert_eq!(list[1].max_vus, Some(10));
        assert_eq!(list[1].time_unit, Some(Duration::from_secs(1)));
    }

    #[test]
    fn scenarios_accept_a_mapping_keyed_by_name() {
        let registry = parse(
            r#"
profiles:
  peak:
    scenarios:
      steady:
        executor: constant-vus
        vus: 4
        duration: 1m
      burst:
        executor: ramping-vus
        startVUs: 1
        stages:
          - { duration: 30s, target: 50 }
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let peak = registry.get("peak").unwrap_or_else(|| panic!("peak missing"));
        let LoadShape::Scenarios(list) = &peak.shape else {
            panic!("expected scenarios, got {:?}", peak.shape);
        };
        let names: Vec<&str> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["steady", "burst"]);
        assert_eq!(list[0].vus, Some(4));
        assert_eq!(list[1].start_vus, Some(1));
        assert_eq!(list[1].executor.as_deref(), Some("ramping-vus"));
    }

    #[test]
    fn mapping_scenarios_reject_conflicting_names_and_bad_shapes() {
        let conflict = parse(
            "profiles:\n  x:\n    scenarios:\n      a: { name: b, vus: 1, duration: 1s }\n",
        );
        assert!(conflict.is_err());

        let scalar = parse("profiles:\n  x:\n    scenarios: 3\n");
        assert!(scalar.is_err());

        let unknown = parse("profiles:\n  x:\n    scenarios:\n      a: { vus: 1, rps: 2 }\n");
        let err = unknown.err().unwrap_or_else(|| panic!("expected an error"));
        assert!(format!("{err:#}").contains("scenario `a`"));
    }

    #[test]
    fn rejects_ambiguous_or_missing_shapes() {
        let both = parse(
            "profiles:\n  x:\n    vus: 1\n    duration: 1s\n    stages: [{ duration: 1s, target: 1 }]\n",
        );
        assert!(both.is_err());

        let none = parse("profiles:\n  x:\n    thresholds: { success_rate: rate>0.9 }\n");
        assert!(none.is_err());

        let half = parse("profiles:\n  x:\n    vus: 3\n");
        assert!(half.is_err());
    }

    #[test]
    fn rejects_invalid_values_before_running() {
        let zero_vus = parse("profiles:\n  x:\n    vus: 0\n    duration: 10s\n");
        assert!(zero_vus.is_err());

        let bad_threshold = parse(
            "profiles:\n  x:\n    vus: 1\n    duration: 10s\n    thresholds:\n      response_time: p(95)<<800\n",
        );
        let err = bad_threshold.err().unwrap_or_else(|| panic!("expected an error"));
        assert!(format!("{err:#}").contains("p(95)<<800"));

        let bad_executor = parse(
            "profiles:\n  x:\n    scenarios:\n      - executor: shared-iterations\n        vus: 1\n",
        );
        assert!(bad_executor.is_err());

        let unknown_field = parse("profiles:\n  x:\n    vus: 1\n    duration: 1s\n    rps: 5\n");
        assert!(unknown_field.is_err());
    }

    #[tokio::test]
    async fn demo_profiles_load() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/profiles.yaml");
        let registry = load_profiles_from_yaml(&path)
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys, ["mixed", "smoke", "soak"]);
    }
}
