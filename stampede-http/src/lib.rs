#![forbid(unsafe_code)]

mod client;
mod connect;
mod error;
mod estimate;
mod types;

pub use client::HttpClient;
pub use error::{Error, HttpTransportErrorKind, Result};
pub use estimate::estimate_http_request_bytes;
pub use http::Method;
pub use types::{HttpRequest, HttpResponse, HttpTimings};
