// packages/mockserver/src/state/mod.rs
//! Shared server state: live data, request history and hooks

pub mod store;
pub mod value;

pub use store::StateStore;
pub use value::{Data, Directive, Producer, Snapshot, Value};
