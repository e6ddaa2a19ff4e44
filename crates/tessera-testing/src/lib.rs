//! The `testing` provider.
//!
//! It manages nothing: its `testing_assertions` data source turns failed assertions in
//! its configuration into error diagnostics, so that configurations can test themselves.

use async_trait::async_trait;
use tessera_sdk::{
    Context, Diagnostics, Provider,
    object::ObjectReader,
    provider::{self, Configure},
    schema::BlockType,
};

pub mod assertions;
pub mod format;
pub mod harness;

pub use format::format_value;

/// The testing provider needs no connection to anything.
#[derive(Debug, Default)]
pub struct Client;

struct ConfigureTesting;

#[async_trait]
impl Configure<Client> for ConfigureTesting {
    async fn configure(
        &self,
        _ctx: &Context,
        _config: ObjectReader<'_>,
    ) -> (Option<Client>, Diagnostics) {
        (Some(Client), Diagnostics::new())
    }
}

pub fn provider() -> Result<Provider<Client>, provider::Error> {
    Provider::new(BlockType::new(), ConfigureTesting)?
        .with_data_source("testing_assertions", assertions::Assertions::new())
}
