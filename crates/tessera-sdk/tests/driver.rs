use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use rstest::{fixture, rstest};
use tessera_sdk::{
    Context, Diagnostic, Diagnostics,
    context::{CancelHandle, Cancellation},
    object::{Action, ObjectBuilderFull, ObjectRead, ObjectReader, PlanBuilder, PlanReader},
    resource::{ManagedResource, ManagedResourceType},
    schema::{Attribute, BlockType, NestedBlockType, NestingMode},
    value::{Type, Value},
};

#[derive(Default)]
struct Store {
    things: Mutex<BTreeMap<String, String>>,
    next_id: AtomicUsize,
}

impl Store {
    fn names(&self) -> BTreeMap<String, String> {
        self.things.lock().expect("store lock").clone()
    }
}

struct Thing {
    schema: BlockType,
    plan_calls: Arc<AtomicUsize>,
}

impl Thing {
    fn new() -> Self {
        Self {
            schema: BlockType::new()
                .with_attribute("name", Attribute::required(Type::String))
                .with_attribute("id", Attribute::computed(Type::String))
                .with_attribute(
                    "color",
                    Attribute::optional(Type::String).with_default("blue"),
                ),
            plan_calls: Arc::default(),
        }
    }
}

#[async_trait]
impl ManagedResource<Store> for Thing {
    fn schema(&self) -> &BlockType {
        &self.schema
    }

    async fn create(
        &self,
        _ctx: &Context,
        client: &Store,
        planned: ObjectReader<'_>,
    ) -> (Value, Diagnostics) {
        let id = format!("thing-{}", client.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let name = planned.attr("name").as_str().unwrap_or_default().to_owned();
        client.things.lock().expect("store lock").insert(id.clone(), name);

        let mut builder = ObjectBuilderFull::derive(planned);
        builder.set_attr("id", id);
        (builder.object_val(), Diagnostics::new())
    }

    async fn read(
        &self,
        _ctx: &Context,
        client: &Store,
        current: ObjectReader<'_>,
    ) -> (Value, Diagnostics) {
        let id = current.attr("id");
        let things = client.names();
        let Some(name) = id.as_str().and_then(|id| things.get(id)) else {
            return (self.schema.null(), Diagnostics::new());
        };

        let mut builder = ObjectBuilderFull::derive(current);
        builder.set_attr("name", name.as_str());
        (builder.object_val(), Diagnostics::new())
    }

    async fn update(
        &self,
        _ctx: &Context,
        client: &Store,
        prior: ObjectReader<'_>,
        plan: PlanReader<'_>,
    ) -> (Value, Diagnostics) {
        let id = prior.attr("id").as_str().unwrap_or_default().to_owned();
        let name = plan.attr("name").as_str().unwrap_or_default().to_owned();
        if name == "forbidden" {
            return (
                Value::null(self.schema.implied_type()),
                Diagnostic::error("Update rejected", "The name is forbidden.").into(),
            );
        }
        client.things.lock().expect("store lock").insert(id, name);
        (plan.object_val(), Diagnostics::new())
    }

    async fn delete(&self, _ctx: &Context, client: &Store, prior: ObjectReader<'_>) -> Diagnostics {
        let id = prior.attr("id").as_str().unwrap_or_default().to_owned();
        if id == "stuck" {
            return Diagnostic::error("Delete failed", "The thing is stuck.").into();
        }
        client.things.lock().expect("store lock").remove(&id);
        Diagnostics::new()
    }

    async fn plan(
        &self,
        _ctx: &Context,
        _client: &Store,
        plan: &mut PlanBuilder<'_, '_>,
    ) -> (Value, Diagnostics) {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        match plan.attr("name").as_str() {
            Some("vanishing") => return (Value::null(Type::Dynamic), Diagnostics::new()),
            Some("undecided") => return (Value::unknown(Type::Dynamic), Diagnostics::new()),
            _ => {}
        }
        if plan.action() == Action::Create {
            plan.set_attr_unknown("id");
        }
        (plan.object_val(), Diagnostics::new())
    }
}

struct Broken {
    schema: BlockType,
    result: Value,
}

#[async_trait]
impl ManagedResource<Store> for Broken {
    fn schema(&self) -> &BlockType {
        &self.schema
    }

    async fn create(
        &self,
        _ctx: &Context,
        _client: &Store,
        _planned: ObjectReader<'_>,
    ) -> (Value, Diagnostics) {
        (self.result.clone(), Diagnostics::new())
    }

    async fn update(
        &self,
        _ctx: &Context,
        _client: &Store,
        _prior: ObjectReader<'_>,
        plan: PlanReader<'_>,
    ) -> (Value, Diagnostics) {
        (plan.object_val(), Diagnostics::new())
    }

    async fn delete(&self, _ctx: &Context, _client: &Store, _prior: ObjectReader<'_>) -> Diagnostics {
        Diagnostics::new()
    }
}

#[fixture]
fn thing_type() -> ManagedResourceType<Store> {
    ManagedResourceType::new("test_thing", Thing::new()).expect("valid schema")
}

fn thing(name: &str, id: Value, color: &str) -> Value {
    Value::object([
        ("name", Value::string(name)),
        ("id", id),
        ("color", Value::string(color)),
    ])
}

fn config(name: &str) -> Value {
    Value::object([
        ("name", Value::string(name)),
        ("id", Value::null(Type::String)),
        ("color", Value::null(Type::String)),
    ])
}

fn null_thing(thing_type: &ManagedResourceType<Store>) -> Value {
    thing_type.schema().null()
}

fn canceled_context() -> Context {
    let stop = CancelHandle::new();
    stop.cancel();
    Context::new(Cancellation::never(), stop.cancellation())
}

fn first_error(diags: &Diagnostics) -> Option<&str> {
    diags.errors().next().map(|d| d.summary.as_str())
}

#[rstest]
#[tokio::test]
async fn plan_create_marks_computed_attributes_unknown(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    let prior = null_thing(&thing_type);

    let (planned, diags) = thing_type
        .plan(&Context::background(), &store, &prior, &config("a"), &config("a"))
        .await;

    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(planned, thing("a", Value::unknown(Type::String), "blue"));
}

#[rstest]
#[tokio::test]
async fn plan_without_changes_after_defaults_skips_the_callback() {
    let store = Store::default();
    let resource = Thing::new();
    let plan_calls = Arc::clone(&resource.plan_calls);
    let thing_type = ManagedResourceType::new("test_thing", resource).expect("valid schema");
    let prior = thing("a", Value::string("thing-1"), "blue");
    let proposed = Value::object([
        ("name", Value::string("a")),
        ("id", Value::string("thing-1")),
        ("color", Value::null(Type::String)),
    ]);

    let (planned, diags) = thing_type
        .plan(&Context::background(), &store, &prior, &config("a"), &proposed)
        .await;

    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(planned, prior);
    assert_eq!(plan_calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn unknown_proposed_object_stays_unknown() {
    let store = Store::default();
    let resource = Thing::new();
    let plan_calls = Arc::clone(&resource.plan_calls);
    let thing_type = ManagedResourceType::new("test_thing", resource).expect("valid schema");
    let prior = thing("a", Value::string("thing-1"), "blue");

    let (planned, diags) = thing_type
        .plan(
            &Context::background(),
            &store,
            &prior,
            &config("a"),
            &Value::unknown(Type::Dynamic),
        )
        .await;

    assert!(diags.is_empty(), "{diags:?}");
    assert!(!planned.is_known());
    assert!(!planned.is_null());
    assert_eq!(planned.ty(), thing_type.schema().implied_type());
    assert_eq!(plan_calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[case::null("vanishing", true)]
#[case::unknown("undecided", false)]
#[tokio::test]
async fn plan_results_take_the_schema_type(
    thing_type: ManagedResourceType<Store>,
    #[case] name: &str,
    #[case] null: bool,
) {
    let store = Store::default();
    let prior = thing("a", Value::string("thing-1"), "blue");

    let (planned, diags) = thing_type
        .plan(&Context::background(), &store, &prior, &config(name), &config(name))
        .await;

    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(planned.is_null(), null);
    assert_eq!(planned.is_known(), null);
    assert_eq!(planned.ty(), thing_type.schema().implied_type());
}

#[rstest]
#[tokio::test]
async fn unknown_planned_object_is_rejected(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    let prior = thing("a", Value::string("thing-1"), "blue");

    let (new_state, diags) = thing_type
        .apply(&Context::background(), &store, &prior, &Value::unknown(Type::Dynamic))
        .await;

    assert_eq!(first_error(&diags), Some("Invalid object from the orchestrator"));
    assert_eq!(new_state, prior);
}

#[rstest]
#[tokio::test]
async fn apply_create_fills_in_computed_attributes(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    let prior = null_thing(&thing_type);
    let planned = thing("a", Value::unknown(Type::String), "blue");

    let (new_state, diags) = thing_type
        .apply(&Context::background(), &store, &prior, &planned)
        .await;

    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(new_state, thing("a", Value::string("thing-1"), "blue"));
    assert_eq!(
        store.names(),
        BTreeMap::from([("thing-1".to_owned(), "a".to_owned())])
    );
}

#[rstest]
#[tokio::test]
async fn apply_with_nothing_to_do_is_a_no_op(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    let null = null_thing(&thing_type);

    let (new_state, diags) = thing_type
        .apply(&Context::background(), &store, &null, &null)
        .await;

    assert!(diags.is_empty(), "{diags:?}");
    assert!(new_state.is_null());
    assert!(store.names().is_empty());
}

#[rstest]
#[case::deleted("thing-1", true)]
#[case::stuck("stuck", false)]
#[tokio::test]
async fn apply_delete(
    thing_type: ManagedResourceType<Store>,
    #[case] id: &str,
    #[case] deleted: bool,
) {
    let store = Store::default();
    store
        .things
        .lock()
        .expect("store lock")
        .insert(id.to_owned(), "a".to_owned());
    let prior = thing("a", Value::string(id), "blue");
    let planned = null_thing(&thing_type);

    let (new_state, diags) = thing_type
        .apply(&Context::background(), &store, &prior, &planned)
        .await;

    assert_eq!(new_state.is_null(), deleted);
    assert_eq!(diags.has_errors(), !deleted);
    if !deleted {
        assert_eq!(new_state, prior);
    }
}

#[rstest]
#[tokio::test]
async fn failed_update_without_result_keeps_prior(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    let prior = thing("a", Value::string("thing-1"), "blue");
    let planned = thing("forbidden", Value::string("thing-1"), "blue");

    let (new_state, diags) = thing_type
        .apply(&Context::background(), &store, &prior, &planned)
        .await;

    assert_eq!(first_error(&diags), Some("Update rejected"));
    assert_eq!(new_state, prior);
}

#[rstest]
#[tokio::test]
async fn read_reports_vanished_objects_as_null(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    let current = thing("a", Value::string("thing-7"), "blue");

    let (new_state, diags) = thing_type.read(&Context::background(), &store, &current).await;

    assert!(diags.is_empty(), "{diags:?}");
    assert!(new_state.is_null());
    assert_eq!(new_state.ty(), thing_type.schema().implied_type());
}

#[rstest]
#[tokio::test]
async fn read_refreshes_drifted_attributes(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    store
        .things
        .lock()
        .expect("store lock")
        .insert("thing-1".to_owned(), "renamed".to_owned());
    let current = thing("a", Value::string("thing-1"), "blue");

    let (new_state, _) = thing_type.read(&Context::background(), &store, &current).await;

    assert_eq!(new_state, thing("renamed", Value::string("thing-1"), "blue"));
}

#[tokio::test]
async fn nonconforming_result_is_reported_as_a_provider_bug() {
    let store = Store::default();
    let schema = BlockType::new().with_attribute("name", Attribute::required(Type::String));
    let prior = schema.null();
    let planned = Value::object([("name", Value::string("a"))]);
    let broken = ManagedResourceType::new("test_broken", Broken {
        schema,
        result: Value::string("not an object"),
    })
    .expect("valid schema");

    let (_, diags) = broken
        .apply(&Context::background(), &store, &prior, &planned)
        .await;

    let diagnostic = diags.errors().next().expect("an error");
    assert_eq!(diagnostic.summary, "Invalid result from provider");
    assert!(
        diagnostic.detail.contains("for test_broken"),
        "{}",
        diagnostic.detail
    );
}

#[tokio::test]
async fn every_element_of_a_result_is_checked() {
    let store = Store::default();
    let rule = BlockType::new().with_attribute("port", Attribute::required(Type::Number));
    let schema = BlockType::new()
        .with_attribute("name", Attribute::required(Type::String))
        .with_block("rule", NestedBlockType::new(NestingMode::List, rule));
    let prior = schema.null();
    let planned = Value::object([
        ("name", Value::string("a")),
        (
            "rule",
            Value::list(vec![Value::object([("port", Value::number(80))])]),
        ),
    ]);
    let result = Value::object([
        ("name", Value::string("a")),
        (
            "rule",
            Value::list(vec![
                Value::object([("port", Value::number(80))]),
                Value::object([("port", Value::string("not a number"))]),
            ]),
        ),
    ]);
    let broken = ManagedResourceType::new("test_broken", Broken { schema, result })
        .expect("valid schema");

    let (_, diags) = broken
        .apply(&Context::background(), &store, &prior, &planned)
        .await;

    let details: Vec<_> = diags
        .errors()
        .map(|d| (d.summary.as_str(), d.detail.as_str()))
        .collect();
    assert_eq!(details, [(
        "Invalid result from provider",
        "Provider produced an invalid new object for test_broken: .rule[1].port: number \
         required."
    )]);
}

#[rstest]
#[tokio::test]
async fn canceled_apply_keeps_prior(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    let prior = null_thing(&thing_type);
    let planned = thing("a", Value::unknown(Type::String), "blue");

    let (new_state, diags) = thing_type
        .apply(&canceled_context(), &store, &prior, &planned)
        .await;

    assert!(new_state.is_null());
    assert_eq!(first_error(&diags), Some("Operation canceled"));
    assert!(store.names().is_empty());
}

#[rstest]
#[tokio::test]
async fn canceled_plan_returns_proposed_with_defaults() {
    let store = Store::default();
    let resource = Thing::new();
    let plan_calls = Arc::clone(&resource.plan_calls);
    let thing_type = ManagedResourceType::new("test_thing", resource).expect("valid schema");
    let prior = null_thing(&thing_type);

    let (planned, diags) = thing_type
        .plan(&canceled_context(), &store, &prior, &config("a"), &config("a"))
        .await;

    assert_eq!(first_error(&diags), Some("Operation canceled"));
    assert_eq!(planned, thing("a", Value::unknown(Type::String), "blue"));
    assert_eq!(plan_calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn canceled_read_keeps_current(thing_type: ManagedResourceType<Store>) {
    let store = Store::default();
    store
        .things
        .lock()
        .expect("store lock")
        .insert("thing-1".to_owned(), "renamed".to_owned());
    let current = thing("a", Value::string("thing-1"), "blue");

    let (new_state, diags) = thing_type.read(&canceled_context(), &store, &current).await;

    assert_eq!(first_error(&diags), Some("Operation canceled"));
    assert_eq!(new_state, current);
}

#[rstest]
fn validation_reports_missing_required_attributes(thing_type: ManagedResourceType<Store>) {
    let config = Value::object([
        ("name", Value::null(Type::String)),
        ("id", Value::null(Type::String)),
        ("color", Value::null(Type::String)),
    ]);

    let diags = thing_type.validate(&config);

    let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
    assert_eq!(summaries, ["Missing required argument"]);
}
