//! The operation surface the orchestrator talks to.
//!
//! [`ProviderServer`] decodes the values of each request against the relevant schema, hands
//! them to the driver and encodes the results. Requests and responses are plain serde types
//! so that any transport able to carry JSON or YAML documents can drive a provider.

use std::{collections::BTreeMap, sync::OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    context::{CancelHandle, Cancellation, Context},
    diagnostics::{Diagnostic, Diagnostics},
    encoding::DynamicValue,
    provider::Provider,
    resource::{DataResourceType, ManagedResourceType},
    schema::{BlockType, NestingMode},
    value::{Type, Value},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub version: i64,
    pub block: BlockDescription,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescription {
    pub attributes: Vec<AttributeDescription>,
    pub block_types: Vec<NestedBlockDescription>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescription {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: Type,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub required: bool,
    pub optional: bool,

    /// Also set for attributes with a default, since the provider supplies their value when
    /// the configuration leaves them unset.
    pub computed: bool,

    pub sensitive: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedBlockDescription {
    pub type_name: String,
    pub block: BlockDescription,
    pub nesting: NestingMode,
    pub min_items: usize,
    pub max_items: usize,
}

impl From<&BlockType> for BlockDescription {
    fn from(block: &BlockType) -> Self {
        Self {
            attributes: block
                .attributes
                .iter()
                .map(|(name, attribute)| AttributeDescription {
                    name: name.clone(),
                    ty: attribute.ty.clone(),
                    description: attribute.description.clone(),
                    required: attribute.required,
                    optional: attribute.optional,
                    computed: attribute.computed || attribute.default.is_some(),
                    sensitive: attribute.sensitive,
                })
                .collect(),
            block_types: block
                .nested_block_types
                .iter()
                .map(|(type_name, nested)| NestedBlockDescription {
                    type_name: type_name.clone(),
                    block: Self::from(&nested.content),
                    nesting: nested.nesting,
                    min_items: nested.min_items,
                    max_items: nested.max_items,
                })
                .collect(),
        }
    }
}

impl From<&BlockType> for SchemaDescription {
    fn from(block: &BlockType) -> Self {
        Self {
            version: 0,
            block: block.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSchemaResponse {
    pub provider: SchemaDescription,
    pub resource_schemas: BTreeMap<String, SchemaDescription>,
    pub data_source_schemas: BTreeMap<String, SchemaDescription>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub config: DynamicValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareProviderConfigResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared_config: Option<DynamicValue>,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsResponse {
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    pub type_name: String,
    pub current_state: DynamicValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResourceChangeRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub config: DynamicValue,
    pub proposed_new_state: DynamicValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResourceChangeRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub planned_state: DynamicValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

/// The object produced by a read, plan or apply, if any, with its diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DynamicValue>,
    pub diagnostics: Diagnostics,
}

/// One call from the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Request {
    GetSchema,
    PrepareProviderConfig(ConfigRequest),
    Configure(ConfigRequest),
    ValidateResourceTypeConfig(ValidateConfigRequest),
    ValidateDataSourceConfig(ValidateConfigRequest),
    ReadResource(ReadResourceRequest),
    PlanResourceChange(PlanResourceChangeRequest),
    ApplyResourceChange(ApplyResourceChangeRequest),
    ReadDataSource(ReadDataSourceRequest),
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Response {
    GetSchema(GetSchemaResponse),
    PrepareProviderConfig(PrepareProviderConfigResponse),
    Configure(DiagnosticsResponse),
    ValidateResourceTypeConfig(DiagnosticsResponse),
    ValidateDataSourceConfig(DiagnosticsResponse),
    ReadResource(StateResponse),
    PlanResourceChange(StateResponse),
    ApplyResourceChange(StateResponse),
    ReadDataSource(StateResponse),
    Stop,
}

/// Serves a [`Provider`] to the orchestrator.
///
/// The client produced by [`configure`](Self::configure) is kept by the server and passed
/// explicitly to every resource call. [`stop`](Self::stop) cancels all in-flight and future
/// operations.
pub struct ProviderServer<C> {
    provider: Provider<C>,
    client: OnceLock<C>,
    stop: CancelHandle,
}

impl<C> ProviderServer<C>
where
    C: Send + Sync,
{
    pub fn new(provider: Provider<C>) -> Self {
        Self {
            provider,
            client: OnceLock::new(),
            stop: CancelHandle::new(),
        }
    }

    pub fn provider(&self) -> &Provider<C> {
        &self.provider
    }

    pub fn is_configured(&self) -> bool {
        self.client.get().is_some()
    }

    /// Dispatches a request. `cancellation` is the request's own cancellation signal.
    pub async fn handle(&self, cancellation: Cancellation, request: Request) -> Response {
        match request {
            Request::GetSchema => Response::GetSchema(self.get_schema()),
            Request::PrepareProviderConfig(request) => {
                Response::PrepareProviderConfig(self.prepare_provider_config(&request))
            }
            Request::Configure(request) => {
                Response::Configure(self.configure(cancellation, &request).await)
            }
            Request::ValidateResourceTypeConfig(request) => {
                Response::ValidateResourceTypeConfig(self.validate_resource_type_config(&request))
            }
            Request::ValidateDataSourceConfig(request) => {
                Response::ValidateDataSourceConfig(self.validate_data_source_config(&request))
            }
            Request::ReadResource(request) => {
                Response::ReadResource(self.read_resource(cancellation, &request).await)
            }
            Request::PlanResourceChange(request) => {
                Response::PlanResourceChange(self.plan_resource_change(cancellation, &request).await)
            }
            Request::ApplyResourceChange(request) => Response::ApplyResourceChange(
                self.apply_resource_change(cancellation, &request).await,
            ),
            Request::ReadDataSource(request) => {
                Response::ReadDataSource(self.read_data_source(cancellation, &request).await)
            }
            Request::Stop => {
                self.stop();
                Response::Stop
            }
        }
    }

    pub fn get_schema(&self) -> GetSchemaResponse {
        GetSchemaResponse {
            provider: self.provider.config_schema().into(),
            resource_schemas: self
                .provider
                .managed_resource_types()
                .map(|rt| (rt.type_name().to_owned(), rt.schema().into()))
                .collect(),
            data_source_schemas: self
                .provider
                .data_resource_types()
                .map(|dt| (dt.type_name().to_owned(), dt.schema().into()))
                .collect(),
        }
    }

    pub fn prepare_provider_config(&self, request: &ConfigRequest) -> PrepareProviderConfigResponse {
        let mut diagnostics = Diagnostics::new();
        let schema = self.provider.config_schema();
        let prepared_config = decode_value(schema, &request.config, &mut diagnostics)
            .and_then(|config| {
                let (prepared, diags) = self.provider.prepare_config(&config);
                diagnostics.extend(diags);
                encode_value(schema, &prepared, &mut diagnostics)
            });

        PrepareProviderConfigResponse {
            prepared_config,
            diagnostics,
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn configure(
        &self,
        cancellation: Cancellation,
        request: &ConfigRequest,
    ) -> DiagnosticsResponse {
        let mut diagnostics = Diagnostics::new();
        if self.is_configured() {
            diagnostics.push(Diagnostic::error(
                "Provider already configured",
                "The provider can only be configured once.",
            ));
            return DiagnosticsResponse { diagnostics };
        }

        let Some(config) = decode_value(self.provider.config_schema(), &request.config, &mut diagnostics)
        else {
            return DiagnosticsResponse { diagnostics };
        };

        let ctx = self.context(cancellation);
        let (client, diags) = self.provider.configure(&ctx, &config).await;
        diagnostics.extend(diags);

        if let Some(client) = client {
            if self.client.set(client).is_err() {
                warn!("provider was configured concurrently, keeping the first client");
            } else {
                info!("provider configured");
            }
        }

        DiagnosticsResponse { diagnostics }
    }

    pub fn validate_resource_type_config(&self, request: &ValidateConfigRequest) -> DiagnosticsResponse {
        let mut diagnostics = Diagnostics::new();
        if let Some(rt) = self.managed_resource_type(&request.type_name, &mut diagnostics) {
            if let Some(config) = decode_value(rt.schema(), &request.config, &mut diagnostics) {
                diagnostics.extend(rt.validate(&config));
            }
        }
        DiagnosticsResponse { diagnostics }
    }

    pub fn validate_data_source_config(&self, request: &ValidateConfigRequest) -> DiagnosticsResponse {
        let mut diagnostics = Diagnostics::new();
        if let Some(dt) = self.data_resource_type(&request.type_name, &mut diagnostics) {
            if let Some(config) = decode_value(dt.schema(), &request.config, &mut diagnostics) {
                diagnostics.extend(dt.validate(&config));
            }
        }
        DiagnosticsResponse { diagnostics }
    }

    #[tracing::instrument(skip_all, fields(type_name = %request.type_name))]
    pub async fn read_resource(
        &self,
        cancellation: Cancellation,
        request: &ReadResourceRequest,
    ) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(rt) = self.managed_resource_type(&request.type_name, &mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };
        let Some(client) = self.client(&mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };
        let Some(current) = decode_value(rt.schema(), &request.current_state, &mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };

        let ctx = self.context(cancellation);
        let (new_state, diags) = rt.read(&ctx, client, &current).await;
        diagnostics.extend(diags);
        StateResponse::new(rt.schema(), &new_state, diagnostics)
    }

    #[tracing::instrument(skip_all, fields(type_name = %request.type_name))]
    pub async fn plan_resource_change(
        &self,
        cancellation: Cancellation,
        request: &PlanResourceChangeRequest,
    ) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(rt) = self.managed_resource_type(&request.type_name, &mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };
        let Some(client) = self.client(&mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };

        let schema = rt.schema();
        let prior = decode_value(schema, &request.prior_state, &mut diagnostics);
        let config = decode_value(schema, &request.config, &mut diagnostics);
        let proposed = decode_value(schema, &request.proposed_new_state, &mut diagnostics);
        let (Some(prior), Some(config), Some(proposed)) = (prior, config, proposed) else {
            return StateResponse::failed(diagnostics);
        };

        let ctx = self.context(cancellation);
        let (planned, diags) = rt.plan(&ctx, client, &prior, &config, &proposed).await;
        diagnostics.extend(diags);
        StateResponse::new(schema, &planned, diagnostics)
    }

    #[tracing::instrument(skip_all, fields(type_name = %request.type_name))]
    pub async fn apply_resource_change(
        &self,
        cancellation: Cancellation,
        request: &ApplyResourceChangeRequest,
    ) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(rt) = self.managed_resource_type(&request.type_name, &mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };
        let Some(client) = self.client(&mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };

        let schema = rt.schema();
        let prior = decode_value(schema, &request.prior_state, &mut diagnostics);
        let planned = decode_value(schema, &request.planned_state, &mut diagnostics);
        let (Some(prior), Some(planned)) = (prior, planned) else {
            return StateResponse::failed(diagnostics);
        };

        let ctx = self.context(cancellation);
        let (new_state, diags) = rt.apply(&ctx, client, &prior, &planned).await;
        diagnostics.extend(diags);
        StateResponse::new(schema, &new_state, diagnostics)
    }

    #[tracing::instrument(skip_all, fields(type_name = %request.type_name))]
    pub async fn read_data_source(
        &self,
        cancellation: Cancellation,
        request: &ReadDataSourceRequest,
    ) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(dt) = self.data_resource_type(&request.type_name, &mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };
        let Some(client) = self.client(&mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };
        let Some(config) = decode_value(dt.schema(), &request.config, &mut diagnostics) else {
            return StateResponse::failed(diagnostics);
        };

        let ctx = self.context(cancellation);
        let (state, diags) = dt.read(&ctx, client, &config).await;
        diagnostics.extend(diags);
        StateResponse::new(dt.schema(), &state, diagnostics)
    }

    /// Cancels every in-flight operation. Operations started afterwards are canceled
    /// immediately.
    pub fn stop(&self) {
        debug!("stop requested");
        self.stop.cancel();
    }

    fn context(&self, cancellation: Cancellation) -> Context {
        Context::new(cancellation, self.stop.cancellation())
    }

    fn client(&self, diagnostics: &mut Diagnostics) -> Option<&C> {
        let client = self.client.get();
        if client.is_none() {
            diagnostics.push(Diagnostic::error(
                "Provider not configured",
                "The provider must be configured before it can manage resources.",
            ));
        }
        client
    }

    fn managed_resource_type(
        &self,
        type_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<&ManagedResourceType<C>> {
        let rt = self.provider.managed_resource_type(type_name);
        if rt.is_none() {
            diagnostics.push(Diagnostic::error(
                "Unsupported resource type",
                format!("This provider does not support resource type {type_name:?}."),
            ));
        }
        rt
    }

    fn data_resource_type(
        &self,
        type_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<&DataResourceType<C>> {
        let dt = self.provider.data_resource_type(type_name);
        if dt.is_none() {
            diagnostics.push(Diagnostic::error(
                "Unsupported data source type",
                format!("This provider does not support data source type {type_name:?}."),
            ));
        }
        dt
    }
}

impl StateResponse {
    fn new(schema: &BlockType, value: &Value, mut diagnostics: Diagnostics) -> Self {
        let state = encode_value(schema, value, &mut diagnostics);
        Self { state, diagnostics }
    }

    fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }
}

fn decode_value(schema: &BlockType, value: &DynamicValue, diagnostics: &mut Diagnostics) -> Option<Value> {
    match value.decode(&schema.implied_type()) {
        Ok(value) => Some(value),
        Err(error) => {
            diagnostics.push(Diagnostic::error(
                "Invalid object from the orchestrator",
                format!("The orchestrator sent an object that does not match the schema: {error}."),
            ));
            None
        }
    }
}

fn encode_value(
    schema: &BlockType,
    value: &Value,
    diagnostics: &mut Diagnostics,
) -> Option<DynamicValue> {
    match DynamicValue::encode_json(value, &schema.implied_type()) {
        Ok(encoded) => Some(encoded),
        Err(error) => {
            diagnostics.push(Diagnostic::implementation_bug(
                "Failed to encode result",
                format!("The provider produced an object that cannot be encoded: {error}."),
            ));
            None
        }
    }
}
