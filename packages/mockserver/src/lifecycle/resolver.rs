// packages/mockserver/src/lifecycle/resolver.rs
//! Response directive resolver
//!
//! Turns the `response_*` directives of the live directive set into a typed
//! [`ResponseDirectives`] and, from it, an immutable [`HttpResponse`].

use crate::state::value::{Data, Value};
use crate::utils::errors::{MockServerError, Result};
use bytes::Bytes;
use std::time::Duration;

/// Directive and capture keys
pub mod keys {
    pub const RESPONSE_PREFIX: &str = "response_";
    pub const RESPONSE_STATUS: &str = "response_status";
    pub const RESPONSE_HEADERS: &str = "response_headers";
    pub const RESPONSE_CONTENT: &str = "response_content";
    pub const RESPONSE_TIMEOUT: &str = "response_timeout";
    pub const RESPONSE_CLEAR: &str = "response_clear";
    pub const RESPONSE_RESET: &str = "response_reset";

    pub const COMMAND: &str = "command";
    pub const PATH: &str = "path";
    pub const REQUEST_VERSION: &str = "request_version";
    pub const REQUESTLINE: &str = "requestline";
    pub const HEADERS: &str = "headers";
    pub const CLIENT_ADDRESS: &str = "client_address";
    pub const SERVER_ADDRESS: &str = "server_address";
    pub const SCHEME: &str = "scheme";
    pub const BODY: &str = "body";

    pub const PEER: &str = "peer";
    pub const MAILFROM: &str = "mailfrom";
    pub const RECIPIENTS: &str = "recipients";
    pub const MESSAGE_DATA: &str = "message_data";
    pub const MESSAGE: &str = "message";
}

pub const DEFAULT_STATUS: u16 = 200;

/// Response handed to hooks and written to the client
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    content: Option<Bytes>,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, content: Option<Bytes>) -> Self {
        Self {
            status,
            headers,
            content,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Header pairs in send order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }
}

/// Typed view of the `response_*` directives
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDirectives {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content: Option<Bytes>,
    pub timeout: Option<Duration>,
    pub clear: bool,
    pub reset: bool,
}

impl Default for ResponseDirectives {
    fn default() -> Self {
        Self {
            status: DEFAULT_STATUS,
            headers: Vec::new(),
            content: None,
            timeout: None,
            clear: false,
            reset: false,
        }
    }
}

impl ResponseDirectives {
    /// Read the literal `response_*` values of `data`
    ///
    /// Deferred entries are skipped: they were set after this request's
    /// snapshot and belong to the next one.
    pub fn from_data(data: &Data) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            status: read(data, keys::RESPONSE_STATUS, status)?.unwrap_or(defaults.status),
            headers: read(data, keys::RESPONSE_HEADERS, headers)?.unwrap_or_default(),
            content: read(data, keys::RESPONSE_CONTENT, content)?,
            timeout: read(data, keys::RESPONSE_TIMEOUT, timeout)?,
            clear: read(data, keys::RESPONSE_CLEAR, flag)?.unwrap_or(false),
            reset: read(data, keys::RESPONSE_RESET, flag)?.unwrap_or(false),
        })
    }

    pub fn build_response(&self) -> HttpResponse {
        HttpResponse::new(self.status, self.headers.clone(), self.content.clone())
    }
}

fn read<T>(
    data: &Data,
    key: &str,
    convert: fn(&Value) -> std::result::Result<T, &'static str>,
) -> Result<Option<T>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => convert(value)
            .map(Some)
            .map_err(|expected| MockServerError::InvalidDirective {
                key: key.to_string(),
                expected,
            }),
    }
}

fn status(value: &Value) -> std::result::Result<u16, &'static str> {
    const EXPECTED: &str = "an integer status code between 100 and 999";
    value
        .as_i64()
        .filter(|code| (100..=999).contains(code))
        .map(|code| code as u16)
        .ok_or(EXPECTED)
}

fn headers(value: &Value) -> std::result::Result<Vec<(String, String)>, &'static str> {
    value
        .as_headers()
        .map(<[_]>::to_vec)
        .ok_or("header pairs or a header map")
}

fn content(value: &Value) -> std::result::Result<Bytes, &'static str> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Str(text) => Ok(Bytes::from(text.clone())),
        _ => Err("bytes or a string"),
    }
}

fn timeout(value: &Value) -> std::result::Result<Duration, &'static str> {
    value
        .as_f64()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or("a non-negative number of seconds")
}

fn flag(value: &Value) -> std::result::Result<bool, &'static str> {
    value.as_bool().ok_or("a boolean")
}
