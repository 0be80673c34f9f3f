// packages/mockserver/src/state/store.rs
//! Thread-safe state store
//!
//! Owns the live directive set, the ordered history and the hook table of
//! one server. Every accessor takes the same re-entrant lock, and every read
//! hands back an owned copy, so the asserting thread and the connection
//! handlers never observe a torn view.

use crate::lifecycle::hooks::{Hook, HookStage, HookTable};
use crate::lifecycle::resolver::keys;
use crate::observability::RESETS_TOTAL;
use crate::state::value::{Data, Directive, Snapshot, Value};
use crate::utils::errors::Result;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct State {
    data: Data,
    history: Vec<Snapshot>,
    hooks: HookTable,
}

/// Shared handle to a server's state
///
/// Cloning is cheap and every clone sees the same state, so hooks and
/// deferred producers can capture a handle. The lock is re-entrant: a
/// producer called while the history is being saved may itself use the
/// store.
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Arc<ReentrantMutex<RefCell<State>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the live directive set
    pub fn get_data(&self) -> Data {
        let guard = self.inner.lock();
        let data = guard.borrow().data.clone();
        data
    }

    /// Merge `partial` into the live directive set
    pub fn update_data<I, K>(&self, partial: I)
    where
        I: IntoIterator<Item = (K, Directive)>,
        K: Into<String>,
    {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        for (key, directive) in partial {
            state.data.insert(key.into(), directive);
        }
    }

    pub fn set(&self, key: impl Into<String>, directive: impl Into<Directive>) {
        let guard = self.inner.lock();
        guard.borrow_mut().data.insert(key.into(), directive.into());
    }

    pub fn remove(&self, key: &str) -> Option<Directive> {
        let guard = self.inner.lock();
        let removed = guard.borrow_mut().data.remove(key);
        removed
    }

    /// Merge a request's fields, resolve deferred directives and record the result
    ///
    /// The whole step runs under one lock acquisition, so a concurrent
    /// request cannot interleave its own fields into this entry. `stale`
    /// capture keys are dropped unless `fields` supplies them again. Producers
    /// are called exactly once, with the lock held but no borrow active. The
    /// returned snapshot is the entry appended to the history.
    pub fn save_history(&self, fields: Snapshot, stale: &[&str]) -> Snapshot {
        let guard = self.inner.lock();

        let pending: Vec<(String, Directive)> = guard
            .borrow()
            .data
            .iter()
            .filter(|(key, _)| !fields.contains_key(key) && !stale.contains(key))
            .map(|(key, directive)| (key.to_string(), directive.clone()))
            .collect();

        let mut snapshot: Snapshot = pending
            .into_iter()
            .map(|(key, directive)| (key, directive.resolve()))
            .collect();
        snapshot.extend(fields);

        let mut state = guard.borrow_mut();
        for key in stale {
            state.data.remove(key);
        }
        for (key, value) in snapshot.iter() {
            state
                .data
                .insert(key.to_string(), Directive::Literal(value.clone()));
        }
        state.history.push(snapshot.clone());
        debug!("History entry {} saved", state.history.len());

        snapshot
    }

    pub fn append_history(&self, snapshot: Snapshot) {
        let guard = self.inner.lock();
        guard.borrow_mut().history.push(snapshot);
    }

    /// Copy of every recorded snapshot, oldest first
    pub fn get_history(&self) -> Vec<Snapshot> {
        let guard = self.inner.lock();
        let history = guard.borrow().history.clone();
        history
    }

    pub fn history_len(&self) -> usize {
        let guard = self.inner.lock();
        let len = guard.borrow().history.len();
        len
    }

    /// Drop every `response_*` directive, keeping captures, history and hooks
    pub fn clear_response_directives(&self) {
        let guard = self.inner.lock();
        guard
            .borrow_mut()
            .data
            .retain(|key| !key.starts_with(keys::RESPONSE_PREFIX));
    }

    /// Literal `response_*` directives currently set
    pub fn response_data(&self) -> BTreeMap<String, Value> {
        let guard = self.inner.lock();
        let state = guard.borrow();
        state
            .data
            .iter()
            .filter(|(key, _)| key.starts_with(keys::RESPONSE_PREFIX))
            .filter_map(|(key, directive)| {
                directive
                    .as_literal()
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect()
    }

    /// Clear directives, history and hooks in one step
    pub fn reset(&self) {
        let guard = self.inner.lock();
        *guard.borrow_mut() = State::default();
        metrics::counter!(RESETS_TOTAL).increment(1);
        debug!("State reset");
    }

    pub fn register_hook(&self, stage: HookStage, hook: Hook) -> Result<()> {
        let guard = self.inner.lock();
        let result = guard.borrow_mut().hooks.register(stage, hook);
        result
    }

    pub fn hook(&self, stage: HookStage) -> Option<Hook> {
        let guard = self.inner.lock();
        let hook = guard.borrow().hooks.get(stage).cloned();
        hook
    }

    pub fn hooks(&self) -> BTreeMap<HookStage, Hook> {
        let guard = self.inner.lock();
        let hooks = guard.borrow().hooks.as_map().clone();
        hooks
    }
}
