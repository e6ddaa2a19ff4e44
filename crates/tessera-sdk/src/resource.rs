//! Managed resource and data source types, and the driver running their lifecycle.
//!
//! Providers implement [`ManagedResource`] or [`DataSource`]. The driver types
//! [`ManagedResourceType`] and [`DataResourceType`] validate, plan and apply changes, call
//! the provider only with reader and plan views, and normalize and check whatever the
//! provider returns.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    context::{Canceled, Context},
    diagnostics::{Diagnostic, Diagnostics},
    object::{Action, ObjectBuilder, ObjectRead, ObjectReader, PlanBuilder, PlanReader},
    schema::{BlockType, SchemaError},
    value::{Path, PathError, Value},
};

/// A resource whose remote object is created, updated and deleted by the provider.
///
/// `C` is the client produced when the provider was configured.
#[async_trait]
pub trait ManagedResource<C>: Send + Sync
where
    C: Send + Sync,
{
    fn schema(&self) -> &BlockType;

    /// Creates the remote object described by `planned`.
    async fn create(
        &self,
        ctx: &Context,
        client: &C,
        planned: ObjectReader<'_>,
    ) -> (Value, Diagnostics);

    /// Refreshes `current` from the remote object. Returning a null value signals that
    /// the remote object no longer exists.
    ///
    /// The default implementation returns `current` unchanged.
    async fn read(
        &self,
        _ctx: &Context,
        _client: &C,
        current: ObjectReader<'_>,
    ) -> (Value, Diagnostics) {
        (current.object_val().unknown_as_null(), Diagnostics::new())
    }

    /// Updates the remote object from `prior` to the planned object of `plan`.
    ///
    /// If the update fails part-way, return the object as far as it was updated along with
    /// the error diagnostics. Returning null with errors keeps the prior object.
    async fn update(
        &self,
        ctx: &Context,
        client: &C,
        prior: ObjectReader<'_>,
        plan: PlanReader<'_>,
    ) -> (Value, Diagnostics);

    /// Deletes the remote object. Returning error diagnostics keeps the prior object.
    async fn delete(&self, ctx: &Context, client: &C, prior: ObjectReader<'_>) -> Diagnostics;

    /// Refines the planned object, for example by marking attributes the change will
    /// recompute as unknown.
    ///
    /// The default implementation accepts the plan as proposed.
    async fn plan(
        &self,
        _ctx: &Context,
        _client: &C,
        plan: &mut PlanBuilder<'_, '_>,
    ) -> (Value, Diagnostics) {
        (plan.object_val(), Diagnostics::new())
    }
}

/// A resource that only reads data.
#[async_trait]
pub trait DataSource<C>: Send + Sync
where
    C: Send + Sync,
{
    fn schema(&self) -> &BlockType;

    /// Reads the data selected by `config`. Attributes the configuration leaves unset are
    /// null.
    ///
    /// The default implementation returns the configuration unchanged.
    async fn read(
        &self,
        _ctx: &Context,
        _client: &C,
        config: ObjectReader<'_>,
    ) -> (Value, Diagnostics) {
        (config.object_val(), Diagnostics::new())
    }
}

/// Drives the lifecycle of one managed resource type.
pub struct ManagedResourceType<C> {
    type_name: String,
    resource: Box<dyn ManagedResource<C>>,
}

impl<C> ManagedResourceType<C>
where
    C: Send + Sync,
{
    /// Registers a resource, rejecting an inconsistent schema.
    pub fn new<R>(type_name: impl Into<String>, resource: R) -> Result<Self, SchemaError>
    where
        R: ManagedResource<C> + 'static,
    {
        resource.schema().internal_validate()?;

        Ok(Self {
            type_name: type_name.into(),
            resource: Box::new(resource),
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn schema(&self) -> &BlockType {
        self.resource.schema()
    }

    pub fn validate(&self, config: &Value) -> Diagnostics {
        self.schema().validate(config)
    }

    /// Refreshes the current object. A null object stays null without calling the
    /// provider.
    #[tracing::instrument(skip_all, fields(type_name = %self.type_name))]
    pub async fn read(&self, ctx: &Context, client: &C, current: &Value) -> (Value, Diagnostics) {
        let schema = self.schema();
        let current = match conform_input(&self.type_name, schema, "current", current) {
            Ok(current) => current,
            Err(diags) => return (current.clone(), diags),
        };
        let Some(reader) = ObjectReader::optional(schema, &current) else {
            return (schema.null(), Diagnostics::new());
        };

        match ctx.run(self.resource.read(ctx, client, reader)).await {
            Ok((value, diags)) => self.check_result(value, diags),
            Err(Canceled) => (current.clone(), canceled()),
        }
    }

    /// Computes the planned object for a change from `prior` to `config`, starting from the
    /// `proposed` merge of both.
    ///
    /// The provider's plan callback only runs if the proposed object, with defaults applied,
    /// differs from the prior object.
    #[tracing::instrument(skip_all, fields(type_name = %self.type_name))]
    pub async fn plan(
        &self,
        ctx: &Context,
        client: &C,
        prior: &Value,
        config: &Value,
        proposed: &Value,
    ) -> (Value, Diagnostics) {
        let schema = self.schema();
        let inputs = conform_input(&self.type_name, schema, "prior", prior).and_then(|prior| {
            Ok((
                prior,
                conform_input(&self.type_name, schema, "config", config)?,
                conform_input(&self.type_name, schema, "proposed", proposed)?,
            ))
        });
        let (prior, config, proposed) = match inputs {
            Ok(inputs) => inputs,
            Err(diags) => return (proposed.clone(), diags),
        };
        let planned = schema.apply_defaults(&proposed);

        if !planned.is_known() {
            debug!("proposed object is unknown, leaving it to be determined");
            return (planned, Diagnostics::new());
        }

        if planned == prior {
            debug!("proposed object equals prior object, plan is unchanged");
            return (planned, Diagnostics::new());
        }

        let mut builder = (!planned.is_null()).then(|| ObjectBuilder::from_value(schema, &planned));
        let mut plan = PlanBuilder::new(
            schema,
            ObjectReader::optional(schema, &prior),
            ObjectReader::optional(schema, &config),
            builder.as_mut(),
        );
        debug!(action = %plan.action(), "planning change");

        match ctx.run(self.resource.plan(ctx, client, &mut plan)).await {
            Ok((value, diags)) => self.check_result(value, diags),
            Err(Canceled) => (planned, canceled()),
        }
    }

    /// Applies a planned change and returns the new object.
    ///
    /// Unknown values remaining in `planned` are passed to the provider as null: callbacks
    /// cannot distinguish an attribute that is absent from one the plan left to be
    /// determined.
    #[tracing::instrument(skip_all, fields(type_name = %self.type_name))]
    pub async fn apply(
        &self,
        ctx: &Context,
        client: &C,
        prior: &Value,
        planned: &Value,
    ) -> (Value, Diagnostics) {
        let schema = self.schema();
        let inputs = conform_input(&self.type_name, schema, "prior", prior).and_then(|prior| {
            let planned = conform_input(&self.type_name, schema, "planned", planned)?;
            if planned.is_known() {
                Ok((prior, planned.unknown_as_null()))
            } else {
                Err(invalid_input(&self.type_name, "planned", &PathError::new(
                    Path::root(),
                    "the object itself must be known",
                )))
            }
        });
        let (prior, planned) = match inputs {
            Ok(inputs) => inputs,
            Err(diags) => return (prior.clone(), diags),
        };
        let prior_reader = ObjectReader::optional(schema, &prior);
        let planned_reader = ObjectReader::optional(schema, &planned);
        debug!(
            action = %Action::classify(prior_reader.is_some(), planned_reader.is_some()),
            "applying change"
        );

        let result = match (prior_reader, planned_reader) {
            (None, None) => return (schema.null(), Diagnostics::new()),
            (None, Some(planned)) => ctx.run(self.resource.create(ctx, client, planned)).await,
            (Some(prior), None) => ctx
                .run(self.resource.delete(ctx, client, prior))
                .await
                .map(|diags| {
                    if diags.has_errors() {
                        (prior.object_val(), diags)
                    } else {
                        (schema.null(), diags)
                    }
                }),
            (Some(prior), Some(planned)) => {
                let plan = PlanReader::new(schema, Some(prior), Some(planned));
                ctx.run(self.resource.update(ctx, client, prior, plan))
                    .await
                    .map(|(value, diags)| {
                        if diags.has_errors() && value.is_null() {
                            (prior.object_val(), diags)
                        } else {
                            (value, diags)
                        }
                    })
            }
        };

        match result {
            Ok((value, diags)) => self.check_result(value, diags),
            Err(Canceled) => (prior.clone(), canceled()),
        }
    }

    fn check_result(&self, value: Value, diags: Diagnostics) -> (Value, Diagnostics) {
        check_result(&self.type_name, self.schema(), value, diags)
    }
}

/// Drives reads of one data source type.
pub struct DataResourceType<C> {
    type_name: String,
    source: Box<dyn DataSource<C>>,
}

impl<C> DataResourceType<C>
where
    C: Send + Sync,
{
    /// Registers a data source, rejecting an inconsistent schema.
    pub fn new<S>(type_name: impl Into<String>, source: S) -> Result<Self, SchemaError>
    where
        S: DataSource<C> + 'static,
    {
        source.schema().internal_validate()?;

        Ok(Self {
            type_name: type_name.into(),
            source: Box::new(source),
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn schema(&self) -> &BlockType {
        self.source.schema()
    }

    pub fn validate(&self, config: &Value) -> Diagnostics {
        self.schema().validate(config)
    }

    /// Reads the data source. Defaults are applied to the configuration first, and
    /// computed attributes reach the provider as null.
    #[tracing::instrument(skip_all, fields(type_name = %self.type_name))]
    pub async fn read(&self, ctx: &Context, client: &C, config: &Value) -> (Value, Diagnostics) {
        let schema = self.schema();
        let config = match conform_input(&self.type_name, schema, "config", config) {
            Ok(config) => schema.apply_defaults(&config).unknown_as_null(),
            Err(diags) => return (schema.null(), diags),
        };
        let Some(reader) = ObjectReader::optional(schema, &config) else {
            return (schema.null(), Diagnostics::new());
        };

        match ctx.run(self.source.read(ctx, client, reader)).await {
            Ok((value, diags)) => check_result(&self.type_name, schema, value, diags),
            Err(Canceled) => (schema.null(), canceled()),
        }
    }
}

/// Converts an object received from the orchestrator to the shape readers navigate, or
/// reports why it does not fit the schema.
pub(crate) fn conform_input(
    type_name: &str,
    schema: &BlockType,
    role: &str,
    value: &Value,
) -> Result<Value, Diagnostics> {
    schema
        .conform(value)
        .map_err(|error| invalid_input(type_name, role, &error))
}

fn invalid_input(type_name: &str, role: &str, error: &PathError) -> Diagnostics {
    warn!(type_name, role, %error, "received an invalid object");
    Diagnostic::error(
        "Invalid object from the orchestrator",
        format!(
            "The {role} object for {type_name} does not fit its schema: {}.",
            error.message
        ),
    )
    .with_path(error.path.clone())
    .into()
}

/// Gives null and unknown results the schema's type and reports results that do not
/// conform to the schema as a provider bug.
///
/// Every element of every collection is checked, and blocks whose content has dynamic
/// attributes are checked against the nested schema.
fn check_result(
    type_name: &str,
    schema: &BlockType,
    value: Value,
    mut diags: Diagnostics,
) -> (Value, Diagnostics) {
    let want = schema.implied_type();
    let value = match value {
        Value::Null(_) => Value::Null(want.clone()),
        Value::Unknown(_) => Value::Unknown(want.clone()),
        value => value,
    };

    let mut errors = value.test_conformance(&want);
    if errors.is_empty() {
        errors.extend(schema.conform(&value).err());
    }

    for error in errors {
        warn!(type_name, %error, "provider produced an invalid object");
        diags.push(Diagnostic::implementation_bug(
            "Invalid result from provider",
            format!("Provider produced an invalid new object for {type_name}: {error}."),
        ));
    }

    (value, diags)
}

pub(crate) fn canceled() -> Diagnostics {
    Diagnostic::error(
        "Operation canceled",
        "The request was canceled before the provider finished processing it.",
    )
    .into()
}
