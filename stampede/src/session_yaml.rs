use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;
use stampede_core::{Check, CheckPredicate, Method, RequestSpec, Session, Step, ThinkTime};

use crate::yaml::{YamlDuration, read_yaml};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SessionYaml {
    name: Option<String>,
    base_url: Option<String>,
    think_time: Option<ThinkTimeYaml>,
    timeout: Option<YamlDuration>,

    #[serde(default)]
    headers: BTreeMap<String, String>,

    steps: Vec<StepYaml>,
}

/// Whole seconds: a fixed value or an inclusive `{ min, max }` range.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ThinkTimeYaml {
    Fixed(u64),
    Range { min: u64, max: u64 },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepYaml {
    Batch { batch: BatchYaml },
    Request(RequestYaml),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchYaml {
    name: String,
    requests: Vec<RequestYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RequestYaml {
    name: Option<String>,

    #[serde(default = "default_method")]
    method: String,

    path: String,

    #[serde(default)]
    headers: BTreeMap<String, String>,

    json: Option<serde_json::Value>,

    #[serde(default)]
    checks: Vec<CheckYaml>,

    timeout: Option<YamlDuration>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// A named check with exactly one predicate.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CheckYaml {
    name: String,
    status: Option<u16>,
    header_contains: Option<HeaderContainsYaml>,
    body_contains: Option<String>,
    #[serde(default)]
    is_json: bool,
    json: Option<JsonFieldYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderContainsYaml {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonFieldYaml {
    pointer: String,
    equals: serde_json::Value,
}

/// Reads a session file. A missing `baseUrl` is left empty for the caller to fill in.
pub async fn load_session_from_yaml(path: &Path) -> anyhow::Result<Session> {
    let doc: SessionYaml = read_yaml(path, "session").await?;
    let fallback_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("session")
        .to_string();
    session_from_yaml(doc, fallback_name)
        .with_context(|| format!("invalid session: {}", path.display()))
}

fn session_from_yaml(doc: SessionYaml, fallback_name: String) -> anyhow::Result<Session> {
    let SessionYaml {
        name,
        base_url,
        think_time,
        timeout,
        headers,
        steps,
    } = doc;

    let mut session = Session::new(name.unwrap_or(fallback_name), base_url.unwrap_or_default());
    session.think_time = match think_time {
        None => ThinkTime::NONE,
        Some(ThinkTimeYaml::Fixed(secs)) => ThinkTime::fixed(secs),
        Some(ThinkTimeYaml::Range { min, max }) => ThinkTime::between(min, max),
    };
    if let Some(timeout) = timeout {
        session.timeout = Some(timeout.into_inner());
    }
    for (k, v) in headers {
        session = session.with_header(k, v);
    }

    for (idx, step) in steps.into_iter().enumerate() {
        let step = match step {
            StepYaml::Request(req) => Step::Request(request_from_yaml(req)?),
            StepYaml::Batch { batch } => Step::Batch {
                name: batch.name,
                requests: batch
                    .requests
                    .into_iter()
                    .map(request_from_yaml)
                    .collect::<anyhow::Result<_>>()?,
            },
        };
        tracing::debug!(step = idx + 1, label = %step.label(), "loaded session step");
        session = session.with_step(step);
    }

    Ok(session)
}

fn request_from_yaml(req: RequestYaml) -> anyhow::Result<RequestSpec> {
    let RequestYaml {
        name,
        method,
        path,
        headers,
        json,
        checks,
        timeout,
    } = req;

    let mut spec = RequestSpec::new(parse_method(&method)?, path);
    spec.name = name;
    spec.timeout = timeout.map(YamlDuration::into_inner);
    for (k, v) in headers {
        spec = spec.with_header(k, v);
    }
    if let Some(body) = json {
        spec = spec.with_json(body);
    }
    for check in checks {
        spec = spec.with_check(check_from_yaml(check)?);
    }
    Ok(spec)
}

fn parse_method(raw: &str) -> anyhow::Result<Method> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        _ => anyhow::bail!("unsupported method `{raw}` (expected GET, POST, PUT, PATCH or DELETE)"),
    }
}

fn check_from_yaml(c: CheckYaml) -> anyhow::Result<Check> {
    let CheckYaml {
        name,
        status,
        header_contains,
        body_contains,
        is_json,
        json,
    } = c;

    let mut predicates = Vec::with_capacity(1);
    if let Some(s) = status {
        predicates.push(CheckPredicate::Status(s));
    }
    if let Some(h) = header_contains {
        predicates.push(CheckPredicate::HeaderContains {
            name: h.name,
            needle: h.value,
        });
    }
    if let Some(b) = body_contains {
        predicates.push(CheckPredicate::BodyContains(b));
    }
    if is_json {
        predicates.push(CheckPredicate::IsJson);
    }
    if let Some(j) = json {
        predicates.push(CheckPredicate::JsonField {
            pointer: j.pointer,
            equals: j.equals,
        });
    }

    match (predicates.pop(), predicates.is_empty()) {
        (Some(predicate), true) => Ok(Check::new(name, predicate)),
        _ => anyhow::bail!(
            "check `{name}` must define exactly one of `status`, `headerContains`, `bodyContains`, `isJson` or `json`"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parse(raw: &str) -> anyhow::Result<Session> {
        let doc: SessionYaml = serde_yaml::from_str(raw)?;
        session_from_yaml(doc, "fallback".to_string())
    }

    #[test]
    fn parses_requests_batches_and_checks() {
        let session = parse(
            r#"
name: booking-flow
baseUrl: http://localhost:8080
thinkTime: { min: 1, max: 3 }
timeout: 5s
headers:
  X-Client: stampede
steps:
  - name: search destinations
    path: /v1/search/destinations?location=Cancun
    checks:
      - { name: status is 200, status: 200 }
      - { name: response is JSON, isJson: true }
      - name: first destination
        json: { pointer: /destinations/0/name, equals: Cancun }
  - batch:
      name: details
      requests:
        - { method: get, path: /v1/hotels/1 }
        - method: POST
          path: /v1/quotes
          json: { hotel: 1, nights: 3 }
          checks:
            - name: quote created
              headerContains: { name: content-type, value: json }
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(session.name, "booking-flow");
        assert_eq!(session.base_url, "http://localhost:8080");
        assert_eq!(session.think_time, ThinkTime::between(1, 3));
        assert_eq!(session.timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            session.headers,
            vec![("X-Client".to_string(), "stampede".to_string())]
        );
        assert_eq!(session.steps.len(), 2);

        let Step::Request(search) = &session.steps[0] else {
            panic!("expected a request step");
        };
        assert_eq!(search.method, Method::GET);
        assert_eq!(search.checks.len(), 3);
        assert!(matches!(search.checks[0].predicate, CheckPredicate::Status(200)));
        assert!(matches!(search.checks[1].predicate, CheckPredicate::IsJson));
        assert!(matches!(
            &search.checks[2].predicate,
            CheckPredicate::JsonField { pointer, equals }
                if pointer == "/destinations/0/name" && equals == "Cancun"
        ));

        let Step::Batch { name, requests } = &session.steps[1] else {
            panic!("expected a batch step");
        };
        assert_eq!(name, "details");
        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(
            requests[1].json,
            Some(serde_json::json!({ "hotel": 1, "nights": 3 }))
        );
        session.validate().unwrap_or_else(|e| panic!("{e}"));
    }

    #[test]
    fn fixed_think_time_and_missing_base_url() {
        let session = parse("thinkTime: 10\nsteps:\n  - path: /health\n")
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(session.name, "fallback");
        assert_eq!(session.think_time, ThinkTime::fixed(10));
        assert!(session.base_url.is_empty());
        assert!(session.validate().is_err());
    }

    #[test]
    fn rejects_ambiguous_checks_and_unknown_methods() {
        let two = parse(
            "steps:\n  - path: /\n    checks:\n      - { name: both, status: 200, isJson: true }\n",
        );
        assert!(two.is_err());

        let none = parse("steps:\n  - path: /\n    checks:\n      - { name: nothing }\n");
        assert!(none.is_err());

        let method = parse("steps:\n  - { method: TRACE, path: / }\n");
        assert!(method.is_err());
    }

    #[tokio::test]
    async fn demo_session_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/session.yaml");
        let session = load_session_from_yaml(&path)
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(session.name, "destination-search");
        assert_eq!(session.think_time, ThinkTime::fixed(10));
        session.validate().unwrap_or_else(|e| panic!("{e}"));
    }
}
