// packages/mockserver/src/lifecycle/hooks.rs
//! Hook pipeline
//!
//! Test code can attach one callable to each lifecycle stage of an HTTP
//! request. Hooks run synchronously on the task handling the request and
//! their return value is discarded.
//!
//! ```text
//! snapshot → body → history → [before_request] → [before_response(snapshot)]
//!   → build response → [after_response(snapshot, response)] → send
//!   → [after_request(snapshot, response)] → cleanup
//! ```

use crate::lifecycle::resolver::HttpResponse;
use crate::state::value::Snapshot;
use crate::utils::errors::{MockServerError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Lifecycle stage a hook can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookStage {
    /// Called with no arguments once the request is recorded
    BeforeRequest,

    /// Called with the finalized snapshot, before a response exists
    BeforeResponse,

    /// Called with snapshot and response, before any byte is sent
    AfterResponse,

    /// Called with snapshot and response once the response is sent
    AfterRequest,
}

impl HookStage {
    pub const ALL: [HookStage; 4] = [
        HookStage::BeforeRequest,
        HookStage::BeforeResponse,
        HookStage::AfterResponse,
        HookStage::AfterRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::BeforeRequest => "before_request",
            HookStage::BeforeResponse => "before_response",
            HookStage::AfterResponse => "after_response",
            HookStage::AfterRequest => "after_request",
        }
    }

    fn expected_hook(&self) -> &'static str {
        match self {
            HookStage::BeforeRequest => "a hook taking no arguments",
            HookStage::BeforeResponse => "a hook taking (snapshot)",
            HookStage::AfterResponse | HookStage::AfterRequest => {
                "a hook taking (snapshot, response)"
            }
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookStage {
    type Err = MockServerError;

    fn from_str(name: &str) -> Result<Self> {
        HookStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == name)
            .ok_or_else(|| MockServerError::UnknownHook(name.to_string()))
    }
}

/// A callable attached to a stage, tagged by the arguments it takes
#[derive(Clone)]
pub enum Hook {
    NoArgs(Arc<dyn Fn() + Send + Sync>),
    Request(Arc<dyn Fn(&Snapshot) + Send + Sync>),
    Exchange(Arc<dyn Fn(&Snapshot, &HttpResponse) + Send + Sync>),
}

impl Hook {
    pub fn no_args(f: impl Fn() + Send + Sync + 'static) -> Self {
        Hook::NoArgs(Arc::new(f))
    }

    pub fn request(f: impl Fn(&Snapshot) + Send + Sync + 'static) -> Self {
        Hook::Request(Arc::new(f))
    }

    pub fn exchange(f: impl Fn(&Snapshot, &HttpResponse) + Send + Sync + 'static) -> Self {
        Hook::Exchange(Arc::new(f))
    }

    fn fits(&self, stage: HookStage) -> bool {
        matches!(
            (stage, self),
            (HookStage::BeforeRequest, Hook::NoArgs(_))
                | (HookStage::BeforeResponse, Hook::Request(_))
                | (HookStage::AfterResponse, Hook::Exchange(_))
                | (HookStage::AfterRequest, Hook::Exchange(_))
        )
    }

    /// Run the hook with whatever arguments its arity takes
    pub fn call(&self, snapshot: &Snapshot, response: Option<&HttpResponse>) {
        match (self, response) {
            (Hook::NoArgs(f), _) => f(),
            (Hook::Request(f), _) => f(snapshot),
            (Hook::Exchange(f), Some(response)) => f(snapshot, response),
            (Hook::Exchange(_), None) => {}
        }
    }

    /// True when both handles point at the same callable
    pub fn ptr_eq(&self, other: &Hook) -> bool {
        match (self, other) {
            (Hook::NoArgs(a), Hook::NoArgs(b)) => Arc::ptr_eq(a, b),
            (Hook::Request(a), Hook::Request(b)) => Arc::ptr_eq(a, b),
            (Hook::Exchange(a), Hook::Exchange(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::NoArgs(_) => f.write_str("Hook::NoArgs(..)"),
            Hook::Request(_) => f.write_str("Hook::Request(..)"),
            Hook::Exchange(_) => f.write_str("Hook::Exchange(..)"),
        }
    }
}

/// At most one hook per stage
#[derive(Debug, Clone, Default)]
pub struct HookTable {
    hooks: BTreeMap<HookStage, Hook>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `hook` to `stage`, replacing any previous one
    pub fn register(&mut self, stage: HookStage, hook: Hook) -> Result<()> {
        if !hook.fits(stage) {
            return Err(MockServerError::HookSignature {
                stage,
                expected: stage.expected_hook(),
            });
        }

        self.hooks.insert(stage, hook);
        Ok(())
    }

    pub fn get(&self, stage: HookStage) -> Option<&Hook> {
        self.hooks.get(&stage)
    }

    pub fn as_map(&self) -> &BTreeMap<HookStage, Hook> {
        &self.hooks
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
