//! Typed REST wrappers and the shared HTTP transport they sit on.
//!
//! Every client in this module is a thin adapter over [`HttpTransport`]: it
//! knows a resource's path shape and response envelope, not how to retry or
//! authenticate. That's the transport's job, the same separation a process
//! runner draws between sequencing commands and actually executing them.

mod automation;
mod bucket;
mod classic_api;
mod document;
mod environment;
mod generic;
mod settings;
mod transport;

pub use automation::AutomationClient;
pub use bucket::BucketClient;
pub use classic_api::ClassicApiClient;
pub use document::{DocumentClient, DocumentListEntry};
pub use environment::EnvironmentClients;
pub use generic::GenericUpsertClient;
pub use settings::SettingsClient;
pub use transport::{HttpTransport, RetryPolicy, StaticTokenProvider, TokenProvider};
