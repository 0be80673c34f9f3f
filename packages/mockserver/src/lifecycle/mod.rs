// packages/mockserver/src/lifecycle/mod.rs
//! Capture lifecycle
//!
//! Turns what a transport received into state updates, history entries,
//! hook invocations and, for HTTP, the response to send back.

pub mod controller;
pub mod hooks;
pub mod mail;
pub mod resolver;

pub use controller::{BodySource, Exchange, HttpLifecycle, RequestHead};
pub use hooks::{Hook, HookStage, HookTable};
pub use mail::{Envelope, MailMessage, MailRecorder};
pub use resolver::{keys, HttpResponse, ResponseDirectives};
