//! The provider: its configuration schema and the resource types it offers.

use std::collections::{BTreeMap, btree_map::Entry};

use async_trait::async_trait;
use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;

use crate::{
    context::{Canceled, Context},
    diagnostics::{Diagnostic, Diagnostics},
    object::ObjectReader,
    resource::{
        DataResourceType, DataSource, ManagedResource, ManagedResourceType, canceled,
        conform_input,
    },
    schema::{BlockType, SchemaError},
    value::Value,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid provider configuration schema"))]
    InvalidConfigSchema { source: SchemaError },

    #[snafu(display("invalid schema for resource type {type_name:?}"))]
    InvalidResourceSchema {
        type_name: String,
        source: SchemaError,
    },

    #[snafu(display("invalid schema for data source type {type_name:?}"))]
    InvalidDataSourceSchema {
        type_name: String,
        source: SchemaError,
    },

    #[snafu(display("resource type {type_name:?} is registered more than once"))]
    DuplicateResourceType { type_name: String },

    #[snafu(display("data source type {type_name:?} is registered more than once"))]
    DuplicateDataSourceType { type_name: String },
}

/// Turns the provider configuration into the client every resource call receives.
#[async_trait]
pub trait Configure<C>: Send + Sync {
    /// Returns the client, or `None` together with error diagnostics.
    async fn configure(&self, ctx: &Context, config: ObjectReader<'_>) -> (Option<C>, Diagnostics);
}

/// A provider and the resource types it offers.
///
/// ```ignore
/// let provider = Provider::new(config_schema, MyConfigure)?
///     .with_managed_resource("example_thing", ThingResource)?
///     .with_data_source("example_lookup", LookupSource)?;
/// ```
pub struct Provider<C> {
    config_schema: BlockType,
    configure: Box<dyn Configure<C>>,
    managed_resource_types: BTreeMap<String, ManagedResourceType<C>>,
    data_resource_types: BTreeMap<String, DataResourceType<C>>,
}

impl<C> Provider<C>
where
    C: Send + Sync,
{
    pub fn new<F>(config_schema: BlockType, configure: F) -> Result<Self, Error>
    where
        F: Configure<C> + 'static,
    {
        config_schema
            .internal_validate()
            .context(InvalidConfigSchemaSnafu)?;

        Ok(Self {
            config_schema,
            configure: Box::new(configure),
            managed_resource_types: BTreeMap::new(),
            data_resource_types: BTreeMap::new(),
        })
    }

    pub fn with_managed_resource<R>(
        mut self,
        type_name: impl Into<String>,
        resource: R,
    ) -> Result<Self, Error>
    where
        R: ManagedResource<C> + 'static,
    {
        let type_name = type_name.into();
        let Entry::Vacant(entry) = self.managed_resource_types.entry(type_name.clone()) else {
            return DuplicateResourceTypeSnafu { type_name }.fail();
        };

        entry.insert(
            ManagedResourceType::new(type_name.clone(), resource)
                .context(InvalidResourceSchemaSnafu { type_name })?,
        );
        Ok(self)
    }

    pub fn with_data_source<S>(mut self, type_name: impl Into<String>, source: S) -> Result<Self, Error>
    where
        S: DataSource<C> + 'static,
    {
        let type_name = type_name.into();
        ensure!(
            !self.data_resource_types.contains_key(&type_name),
            DuplicateDataSourceTypeSnafu { type_name }
        );

        let data_resource_type = DataResourceType::new(type_name.clone(), source)
            .context(InvalidDataSourceSchemaSnafu {
                type_name: type_name.clone(),
            })?;
        self.data_resource_types.insert(type_name, data_resource_type);
        Ok(self)
    }

    pub fn config_schema(&self) -> &BlockType {
        &self.config_schema
    }

    pub fn managed_resource_type(&self, type_name: &str) -> Option<&ManagedResourceType<C>> {
        self.managed_resource_types.get(type_name)
    }

    pub fn data_resource_type(&self, type_name: &str) -> Option<&DataResourceType<C>> {
        self.data_resource_types.get(type_name)
    }

    /// Iterates the managed resource types in name order.
    pub fn managed_resource_types(&self) -> impl Iterator<Item = &ManagedResourceType<C>> {
        self.managed_resource_types.values()
    }

    /// Iterates the data source types in name order.
    pub fn data_resource_types(&self) -> impl Iterator<Item = &DataResourceType<C>> {
        self.data_resource_types.values()
    }

    /// Applies defaults to the provider configuration and validates it.
    pub fn prepare_config(&self, config: &Value) -> (Value, Diagnostics) {
        let prepared = self.config_schema.apply_defaults(config);
        let diags = self.config_schema.validate(&prepared);
        (prepared, diags)
    }

    /// Runs the configure callback.
    ///
    /// Unknown configuration values reach the callback as null.
    #[tracing::instrument(skip_all)]
    pub async fn configure(&self, ctx: &Context, config: &Value) -> (Option<C>, Diagnostics) {
        let config = match conform_input("the provider", &self.config_schema, "config", config) {
            Ok(config) => config.unknown_as_null(),
            Err(diags) => return (None, diags),
        };
        let Some(reader) = ObjectReader::optional(&self.config_schema, &config) else {
            return (
                None,
                Diagnostic::error(
                    "Invalid provider configuration",
                    "The provider configuration object is null.",
                )
                .into(),
            );
        };

        let (client, mut diags) = match ctx.run(self.configure.configure(ctx, reader)).await {
            Ok(result) => result,
            Err(Canceled) => return (None, canceled()),
        };

        if client.is_none() && !diags.has_errors() {
            diags.push(Diagnostic::implementation_bug(
                "Provider configuration failed",
                "The configure function produced no client and reported no errors.",
            ));
        }
        debug!(configured = client.is_some(), "configured provider");

        (client, diags)
    }
}
