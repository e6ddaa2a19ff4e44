//! Building blocks for infrastructure provider plugins.
//!
//! A provider declares [schemas](schema) for its configuration, managed resources and data
//! sources. The [driver](resource) takes care of validation, defaults and three-way planning
//! over [values](value), and hands the provider's callbacks [object views](object) instead of
//! raw values. The [server] exposes everything as request and response types an orchestrator
//! can drive over any transport.

pub mod context;
pub mod diagnostics;
pub mod encoding;
pub mod object;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod server;
pub mod value;

pub use context::Context;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use provider::Provider;
pub use server::ProviderServer;
