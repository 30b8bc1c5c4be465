use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

use stampede_http::HttpResponse;

pub type CustomPredicate = Arc<dyn Fn(&HttpResponse) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum CheckPredicate {
    Status(u16),
    /// Header value contains `needle` (header name is case-insensitive).
    HeaderContains { name: String, needle: String },
    BodyContains(String),
    /// `content-type` mentions `application/json`.
    IsJson,
    /// JSON body value at an RFC 6901 pointer equals `equals`.
    JsonField {
        pointer: String,
        equals: serde_json::Value,
    },
    Custom(CustomPredicate),
}

impl fmt::Debug for CheckPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(s) => f.debug_tuple("Status").field(s).finish(),
            Self::HeaderContains { name, needle } => f
                .debug_struct("HeaderContains")
                .field("name", name)
                .field("needle", needle)
                .finish(),
            Self::BodyContains(s) => f.debug_tuple("BodyContains").field(s).finish(),
            Self::IsJson => f.write_str("IsJson"),
            Self::JsonField { pointer, equals } => f
                .debug_struct("JsonField")
                .field("pointer", pointer)
                .field("equals", equals)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named predicate over a response.
#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub predicate: CheckPredicate,
}

impl Check {
    pub fn new(name: impl Into<String>, predicate: CheckPredicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    pub fn status(name: impl Into<String>, status: u16) -> Self {
        Self::new(name, CheckPredicate::Status(status))
    }

    pub fn is_json(name: impl Into<String>) -> Self {
        Self::new(name, CheckPredicate::IsJson)
    }

    pub fn json_field(
        name: impl Into<String>,
        pointer: impl Into<String>,
        equals: serde_json::Value,
    ) -> Self {
        Self::new(
            name,
            CheckPredicate::JsonField {
                pointer: pointer.into(),
                equals,
            },
        )
    }

    pub fn custom(
        name: impl Into<String>,
        f: impl Fn(&HttpResponse) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, CheckPredicate::Custom(Arc::new(f)))
    }

    fn eval(&self, res: &HttpResponse, json: &LazyJson<'_>) -> bool {
        match &self.predicate {
            CheckPredicate::Status(s) => res.status == *s,
            CheckPredicate::HeaderContains { name, needle } => res
                .header(name)
                .is_some_and(|v| v.contains(needle.as_str())),
            CheckPredicate::BodyContains(needle) => res
                .body_utf8()
                .is_some_and(|b| b.contains(needle.as_str())),
            CheckPredicate::IsJson => res.is_json(),
            CheckPredicate::JsonField { pointer, equals } => json
                .get()
                .and_then(|v| v.pointer(pointer))
                .is_some_and(|v| v == equals),
            CheckPredicate::Custom(f) => f(res),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub outcomes: Vec<CheckOutcome>,
    /// Set when a check needed the JSON body and it failed to decode.
    pub json_error: Option<String>,
}

impl CheckReport {
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    /// Every check failed without being evaluated (no response to look at).
    pub fn all_failed(checks: &[Check]) -> Self {
        Self {
            outcomes: checks
                .iter()
                .map(|c| CheckOutcome {
                    name: c.name.clone(),
                    passed: false,
                })
                .collect(),
            json_error: None,
        }
    }
}

/// Decodes the body at most once, and only if a check asks for it.
struct LazyJson<'a> {
    res: &'a HttpResponse,
    cell: OnceCell<Result<serde_json::Value, String>>,
}

impl<'a> LazyJson<'a> {
    fn new(res: &'a HttpResponse) -> Self {
        Self {
            res,
            cell: OnceCell::new(),
        }
    }

    fn get(&self) -> Option<&serde_json::Value> {
        self.cell
            .get_or_init(|| self.res.json().map_err(|e| e.to_string()))
            .as_ref()
            .ok()
    }

    fn error(self) -> Option<String> {
        self.cell.into_inner().and_then(Result::err)
    }
}

/// Runs every check against `res`. A failing check never short-circuits the others.
pub fn evaluate_checks(checks: &[Check], res: &HttpResponse) -> CheckReport {
    let json = LazyJson::new(res);
    let outcomes = checks
        .iter()
        .map(|c| CheckOutcome {
            name: c.name.clone(),
            passed: c.eval(res, &json),
        })
        .collect();

    CheckReport {
        outcomes,
        json_error: json.error(),
    }
}
