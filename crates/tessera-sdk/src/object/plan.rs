use std::collections::{BTreeMap, BTreeSet};

use crate::{
    object::{ALL_MODES, ObjectBuilder, ObjectRead, ObjectReader, attribute_schema, block_schema},
    schema::{BlockType, NestingMode},
    value::Value,
};

/// The change a plan will make to an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,

    /// The object exists neither before nor after the change, as for a nested block that
    /// only the configuration mentions.
    NoOp,
}

impl Action {
    /// Classifies a change by which of its objects are present.
    pub fn classify(prior_present: bool, planned_present: bool) -> Self {
        match (prior_present, planned_present) {
            (false, true) => Self::Create,
            (false, false) => Self::NoOp,
            (true, false) => Self::Delete,
            (true, true) => Self::Update,
        }
    }
}

/// The planning view of a change: reads the prior and configured objects and refines the
/// planned object.
///
/// A plan that deletes its object, or that has no object on either side, has no planned
/// object; only the prior and configured objects can be read and every attempt to access or
/// alter the planned object panics.
#[derive(Debug)]
pub struct PlanBuilder<'p, 's> {
    action: Action,
    schema: &'s BlockType,
    prior: Option<ObjectReader<'s>>,
    config: Option<ObjectReader<'s>>,
    planned: Option<&'p mut ObjectBuilder<'s>>,
}

impl<'p, 's> PlanBuilder<'p, 's> {
    pub fn new(
        schema: &'s BlockType,
        prior: Option<ObjectReader<'s>>,
        config: Option<ObjectReader<'s>>,
        planned: Option<&'p mut ObjectBuilder<'s>>,
    ) -> Self {
        Self {
            action: Action::classify(prior.is_some(), planned.is_some()),
            schema,
            prior,
            config,
            planned,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// The object as it was before this change, or [`None`] when creating.
    pub fn prior_reader(&self) -> Option<ObjectReader<'s>> {
        self.prior
    }

    /// The configuration as written by the user, or [`None`] when deleting. Attributes the
    /// user did not set are null.
    pub fn config_reader(&self) -> Option<ObjectReader<'s>> {
        self.config
    }

    pub fn planned(&self) -> &ObjectBuilder<'s> {
        match &self.planned {
            Some(planned) => &**planned,
            None => no_planned_object(self.action),
        }
    }

    /// Gives access to the nested block builders of the planned object.
    pub fn planned_mut(&mut self) -> &mut ObjectBuilder<'s> {
        let action = self.action;
        match &mut self.planned {
            Some(planned) => &mut **planned,
            None => no_planned_object(action),
        }
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<Value>) {
        self.planned_mut().set_attr(name, value);
    }

    /// Marks an attribute as known only after the change is applied.
    pub fn set_attr_unknown(&mut self, name: &str) {
        let unknown = attribute_schema(self.schema, name).unknown();
        self.planned_mut().set_attr(name, unknown);
    }

    pub fn set_attr_null(&mut self, name: &str) {
        let null = attribute_schema(self.schema, name).null();
        self.planned_mut().set_attr(name, null);
    }

    /// Returns the prior and planned values of an attribute. A missing object contributes a
    /// null of the attribute's type.
    pub fn attr_change(&self, name: &str) -> (Value, Value) {
        attr_change(
            self.schema,
            name,
            self.prior.as_ref().map(|prior| prior as &dyn ObjectRead),
            self.planned
                .as_deref()
                .map(|planned| planned as &dyn ObjectRead),
        )
    }

    /// Returns `true` unless the attribute is known to keep its value.
    pub fn attr_has_change(&self, name: &str) -> bool {
        let (prior, planned) = self.attr_change(name);
        has_change(&prior, &planned)
    }

    /// Returns `true` if the provider may choose a value for the attribute, because it is
    /// computed and the configuration leaves it unset.
    pub fn can_provide_attr_default(&self, name: &str) -> bool {
        let attribute = attribute_schema(self.schema, name);
        attribute.computed
            && self
                .config
                .is_some_and(|config| config.attr(name).is_null())
    }

    /// Returns the plan for the block of a single-nesting block type.
    pub fn block_plan_single(&mut self, block_type: &str) -> PlanBuilder<'_, 's> {
        let block = block_schema(self.schema, block_type, &[NestingMode::Single]);
        let prior = self.prior.and_then(|prior| prior.block_single(block_type));
        let config = self.config.and_then(|config| config.block_single(block_type));
        let planned = self
            .planned
            .as_deref_mut()
            .and_then(|planned| planned.block_builder_single(block_type));

        PlanBuilder::new(&block.content, prior, config, planned)
    }

    /// Returns plans for the blocks of a list-nesting block type, correlated by position.
    /// The result is as long as the longest of the prior, configured and planned lists.
    pub fn block_plan_list(&mut self, block_type: &str) -> Vec<PlanBuilder<'_, 's>> {
        let block = block_schema(self.schema, block_type, &[NestingMode::List]);
        let priors = self
            .prior
            .map(|prior| prior.block_list(block_type))
            .unwrap_or_default();
        let configs = self
            .config
            .map(|config| config.block_list(block_type))
            .unwrap_or_default();
        let planned: Vec<&mut ObjectBuilder<'s>> = match self.planned.as_deref_mut() {
            Some(planned) => planned.block_builder_list(block_type).iter_mut().collect(),
            None => Vec::new(),
        };

        let count = priors.len().max(configs.len()).max(planned.len());
        let mut planned = planned.into_iter();

        (0..count)
            .map(|index| {
                PlanBuilder::new(
                    &block.content,
                    priors.get(index).copied(),
                    configs.get(index).copied(),
                    planned.next(),
                )
            })
            .collect()
    }

    pub fn block_plan_from_list(&mut self, block_type: &str, index: usize) -> PlanBuilder<'_, 's> {
        let block = block_schema(self.schema, block_type, &[NestingMode::List]);
        let prior = self
            .prior
            .and_then(|prior| prior.block_list(block_type).get(index).copied());
        let config = self
            .config
            .and_then(|config| config.block_list(block_type).get(index).copied());
        let planned = self
            .planned
            .as_deref_mut()
            .and_then(|planned| planned.block_builder_list(block_type).get_mut(index));

        PlanBuilder::new(&block.content, prior, config, planned)
    }

    /// Returns plans for the blocks of a map-nesting block type, for every key present in
    /// any of the prior, configured and planned maps.
    pub fn block_plan_map(&mut self, block_type: &str) -> BTreeMap<String, PlanBuilder<'_, 's>> {
        let block = block_schema(self.schema, block_type, &[NestingMode::Map]);
        let priors = self
            .prior
            .map(|prior| prior.block_map(block_type))
            .unwrap_or_default();
        let configs = self
            .config
            .map(|config| config.block_map(block_type))
            .unwrap_or_default();
        let mut planned: BTreeMap<String, &mut ObjectBuilder<'s>> =
            match self.planned.as_deref_mut() {
                Some(planned) => planned
                    .block_builder_map(block_type)
                    .map(|(key, builder)| (key.clone(), builder))
                    .collect(),
                None => BTreeMap::new(),
            };

        let keys: BTreeSet<String> = priors
            .keys()
            .chain(configs.keys())
            .map(|key| (*key).to_owned())
            .chain(planned.keys().cloned())
            .collect();

        keys.into_iter()
            .map(|key| {
                let plan = PlanBuilder::new(
                    &block.content,
                    priors.get(key.as_str()).copied(),
                    configs.get(key.as_str()).copied(),
                    planned.remove(&key),
                );
                (key, plan)
            })
            .collect()
    }

    pub fn block_plan_from_map(&mut self, block_type: &str, key: &str) -> PlanBuilder<'_, 's> {
        let block = block_schema(self.schema, block_type, &[NestingMode::Map]);
        let prior = self
            .prior
            .and_then(|prior| prior.block_from_map(block_type, key));
        let config = self
            .config
            .and_then(|config| config.block_from_map(block_type, key));
        let planned = self
            .planned
            .as_deref_mut()
            .and_then(|planned| planned.block_builder_from_map(block_type, key));

        PlanBuilder::new(&block.content, prior, config, planned)
    }
}

impl ObjectRead for PlanBuilder<'_, '_> {
    fn schema(&self) -> &BlockType {
        self.schema
    }

    /// The planned object, or a null object when deleting.
    fn object_val(&self) -> Value {
        match &self.planned {
            Some(planned) => planned.object_val(),
            None => self.schema.null(),
        }
    }

    fn attr(&self, name: &str) -> Value {
        self.planned().attr(name)
    }

    fn block_count(&self, block_type: &str) -> usize {
        self.planned().block_count(block_type)
    }
}

/// The read-only view of a planned change, used while applying it.
///
/// Unlike [`PlanBuilder`], the configuration is no longer available.
#[derive(Clone, Copy, Debug)]
pub struct PlanReader<'a> {
    action: Action,
    schema: &'a BlockType,
    prior: Option<ObjectReader<'a>>,
    planned: Option<ObjectReader<'a>>,
}

impl<'a> PlanReader<'a> {
    pub fn new(
        schema: &'a BlockType,
        prior: Option<ObjectReader<'a>>,
        planned: Option<ObjectReader<'a>>,
    ) -> Self {
        Self {
            action: Action::classify(prior.is_some(), planned.is_some()),
            schema,
            prior,
            planned,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn prior_reader(&self) -> Option<ObjectReader<'a>> {
        self.prior
    }

    pub fn planned_reader(&self) -> Option<ObjectReader<'a>> {
        self.planned
    }

    pub fn attr_change(&self, name: &str) -> (Value, Value) {
        attr_change(
            self.schema,
            name,
            self.prior.as_ref().map(|prior| prior as &dyn ObjectRead),
            self.planned.as_ref().map(|planned| planned as &dyn ObjectRead),
        )
    }

    pub fn attr_has_change(&self, name: &str) -> bool {
        let (prior, planned) = self.attr_change(name);
        has_change(&prior, &planned)
    }

    pub fn block_plan_single(&self, block_type: &str) -> Self {
        let block = block_schema(self.schema, block_type, &[NestingMode::Single]);

        Self::new(
            &block.content,
            self.prior.and_then(|prior| prior.block_single(block_type)),
            self.planned.and_then(|planned| planned.block_single(block_type)),
        )
    }

    pub fn block_plan_list(&self, block_type: &str) -> Vec<Self> {
        let block = block_schema(self.schema, block_type, &[NestingMode::List]);
        let priors = self
            .prior
            .map(|prior| prior.block_list(block_type))
            .unwrap_or_default();
        let planned = self
            .planned
            .map(|planned| planned.block_list(block_type))
            .unwrap_or_default();

        (0..priors.len().max(planned.len()))
            .map(|index| {
                Self::new(
                    &block.content,
                    priors.get(index).copied(),
                    planned.get(index).copied(),
                )
            })
            .collect()
    }

    pub fn block_plan_from_list(&self, block_type: &str, index: usize) -> Self {
        let block = block_schema(self.schema, block_type, &[NestingMode::List]);

        Self::new(
            &block.content,
            self.prior
                .and_then(|prior| prior.block_list(block_type).get(index).copied()),
            self.planned
                .and_then(|planned| planned.block_list(block_type).get(index).copied()),
        )
    }

    pub fn block_plan_map(&self, block_type: &str) -> BTreeMap<String, Self> {
        let block = block_schema(self.schema, block_type, &[NestingMode::Map]);
        let priors = self
            .prior
            .map(|prior| prior.block_map(block_type))
            .unwrap_or_default();
        let planned = self
            .planned
            .map(|planned| planned.block_map(block_type))
            .unwrap_or_default();

        priors
            .keys()
            .chain(planned.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|key| {
                let plan = Self::new(
                    &block.content,
                    priors.get(key).copied(),
                    planned.get(key).copied(),
                );
                ((*key).to_owned(), plan)
            })
            .collect()
    }

    pub fn block_plan_from_map(&self, block_type: &str, key: &str) -> Self {
        let block = block_schema(self.schema, block_type, &[NestingMode::Map]);

        Self::new(
            &block.content,
            self.prior
                .and_then(|prior| prior.block_from_map(block_type, key)),
            self.planned
                .and_then(|planned| planned.block_from_map(block_type, key)),
        )
    }
}

impl ObjectRead for PlanReader<'_> {
    fn schema(&self) -> &BlockType {
        self.schema
    }

    /// The planned object, or a null object when deleting.
    fn object_val(&self) -> Value {
        self.planned
            .map_or_else(|| self.schema.null(), |planned| planned.object_val())
    }

    /// The planned value of the attribute, which is null when deleting.
    fn attr(&self, name: &str) -> Value {
        match self.planned {
            Some(planned) => planned.attr(name),
            None => attribute_schema(self.schema, name).null(),
        }
    }

    fn block_count(&self, block_type: &str) -> usize {
        match self.planned {
            Some(planned) => planned.block_count(block_type),
            None => {
                block_schema(self.schema, block_type, ALL_MODES);
                0
            }
        }
    }
}

fn attr_change(
    schema: &BlockType,
    name: &str,
    prior: Option<&dyn ObjectRead>,
    planned: Option<&dyn ObjectRead>,
) -> (Value, Value) {
    let attribute = attribute_schema(schema, name);
    let side = |object: Option<&dyn ObjectRead>| {
        object.map_or_else(|| attribute.null(), |object| object.attr(name))
    };

    (side(prior), side(planned))
}

/// Unknown values cannot be proven equal to anything, so they always count as a change.
fn has_change(prior: &Value, planned: &Value) -> bool {
    !prior.is_wholly_known() || !planned.is_wholly_known() || prior != planned
}

fn no_planned_object(action: Action) -> ! {
    if action == Action::Delete {
        panic!("cannot alter plan for object that will be deleted")
    }
    panic!("cannot alter plan for object that is absent before and after the change")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        schema::{Attribute, NestedBlockType},
        value::Type,
    };

    fn schema() -> BlockType {
        BlockType::new()
            .with_attribute("name", Attribute::required(Type::String))
            .with_attribute("id", Attribute::computed(Type::String))
            .with_attribute("size", Attribute::optional_computed(Type::Number))
            .with_block(
                "rule",
                NestedBlockType::new(
                    NestingMode::List,
                    BlockType::new().with_attribute("port", Attribute::required(Type::Number)),
                ),
            )
            .with_block(
                "label",
                NestedBlockType::new(
                    NestingMode::Map,
                    BlockType::new().with_attribute("text", Attribute::optional(Type::String)),
                ),
            )
    }

    fn object(name: &str, size: Value, ports: &[i64], labels: &[&str]) -> Value {
        Value::object([
            ("name", Value::from(name)),
            ("id", Value::unknown(Type::String)),
            ("size", size),
            (
                "rule",
                Value::List(
                    Type::object([("port", Type::Number)]),
                    ports
                        .iter()
                        .map(|port| Value::object([("port", Value::from(*port))]))
                        .collect(),
                ),
            ),
            (
                "label",
                Value::Map(
                    Type::object([("text", Type::String)]),
                    labels
                        .iter()
                        .map(|key| ((*key).to_owned(), Value::object([("text", Value::from(*key))])))
                        .collect(),
                ),
            ),
        ])
    }

    #[rstest]
    #[case(false, false, Action::NoOp)]
    #[case(false, true, Action::Create)]
    #[case(true, false, Action::Delete)]
    #[case(true, true, Action::Update)]
    fn classification(#[case] prior: bool, #[case] planned: bool, #[case] expected: Action) {
        assert_eq!(Action::classify(prior, planned), expected);
    }

    #[test]
    fn create_reports_typed_null_prior() {
        let schema = schema();
        let planned = object("web", Value::null(Type::Number), &[], &[]);
        let mut builder = ObjectBuilder::from_value(&schema, &planned);
        let plan = PlanBuilder::new(&schema, None, None, Some(&mut builder));

        assert_eq!(plan.action(), Action::Create);
        assert_eq!(
            plan.attr_change("name"),
            (Value::null(Type::String), Value::from("web"))
        );
        assert!(plan.attr_has_change("name"));
    }

    #[test]
    fn unknown_always_counts_as_change() {
        let schema = schema();
        let prior = object("web", Value::unknown(Type::Number), &[], &[]);
        let planned = prior.clone();
        let mut builder = ObjectBuilder::from_value(&schema, &planned);
        let plan = PlanBuilder::new(
            &schema,
            Some(ObjectReader::new(&schema, &prior)),
            None,
            Some(&mut builder),
        );

        assert_eq!(plan.action(), Action::Update);
        assert!(plan.attr_has_change("id"));
        assert!(plan.attr_has_change("size"));
        assert!(!plan.attr_has_change("name"));
    }

    #[test]
    fn provider_defaults_depend_on_config() {
        let schema = schema();
        let config = object("web", Value::null(Type::Number), &[], &[]);
        let configured = object("web", Value::from(3_i64), &[], &[]);
        let mut builder = ObjectBuilder::from_value(&schema, &config);

        let plan = PlanBuilder::new(
            &schema,
            None,
            Some(ObjectReader::new(&schema, &config)),
            Some(&mut builder),
        );
        assert!(plan.can_provide_attr_default("size"));
        assert!(!plan.can_provide_attr_default("name"));

        let plan = PlanBuilder::new(
            &schema,
            None,
            Some(ObjectReader::new(&schema, &configured)),
            Some(&mut builder),
        );
        assert!(!plan.can_provide_attr_default("size"));
    }

    #[test]
    fn set_attr_refines_planned_value() {
        let schema = schema();
        let planned = object("web", Value::unknown(Type::Number), &[], &[]);
        let mut builder = ObjectBuilder::from_value(&schema, &planned);
        let mut plan = PlanBuilder::new(&schema, None, None, Some(&mut builder));

        plan.set_attr("size", 10_i64);
        plan.set_attr_unknown("name");
        plan.set_attr_null("id");

        let value = plan.object_val();
        assert_eq!(value.attr("size"), Some(Value::from(10_i64)));
        assert_eq!(value.attr("name"), Some(Value::unknown(Type::String)));
        assert_eq!(value.attr("id"), Some(Value::null(Type::String)));
    }

    #[test]
    fn delete_plan_reads_prior_only() {
        let schema = schema();
        let prior = object("web", Value::from(1_i64), &[80], &[]);
        let plan = PlanBuilder::new(&schema, Some(ObjectReader::new(&schema, &prior)), None, None);

        assert_eq!(plan.action(), Action::Delete);
        assert_eq!(plan.object_val(), schema.null());
        assert_eq!(
            plan.attr_change("size"),
            (Value::from(1_i64), Value::null(Type::Number))
        );
    }

    #[test]
    #[should_panic(expected = "cannot alter plan for object that will be deleted")]
    fn delete_plan_rejects_mutation() {
        let schema = schema();
        let prior = object("web", Value::from(1_i64), &[], &[]);
        let mut plan =
            PlanBuilder::new(&schema, Some(ObjectReader::new(&schema, &prior)), None, None);

        plan.set_attr("size", 2_i64);
    }

    #[test]
    fn block_only_in_config_is_a_no_op() {
        let schema = schema();
        let prior = object("web", Value::from(1_i64), &[], &[]);
        let config = object("web", Value::from(1_i64), &[], &["fresh"]);
        let planned = prior.clone();
        let mut builder = ObjectBuilder::from_value(&schema, &planned);
        let mut plan = PlanBuilder::new(
            &schema,
            Some(ObjectReader::new(&schema, &prior)),
            Some(ObjectReader::new(&schema, &config)),
            Some(&mut builder),
        );

        let label = plan.block_plan_from_map("label", "fresh");
        assert_eq!(label.action(), Action::NoOp);
        assert_eq!(label.object_val(), label.schema().null());
        assert_eq!(
            label.config_reader().map(|config| config.attr("text")),
            Some(Value::from("fresh"))
        );
    }

    #[test]
    #[should_panic(expected = "cannot alter plan for object that is absent before and after the change")]
    fn no_op_plan_rejects_mutation() {
        let schema = schema();
        let config = object("web", Value::from(1_i64), &[], &["fresh"]);
        let mut plan = PlanBuilder::new(&schema, None, Some(ObjectReader::new(&schema, &config)), None);

        plan.set_attr("size", 2_i64);
    }

    #[test]
    fn list_blocks_are_correlated_by_position() {
        let schema = schema();
        let prior = object("web", Value::from(1_i64), &[80, 443], &[]);
        let planned = object("web", Value::from(1_i64), &[80, 8443, 22], &[]);
        let mut builder = ObjectBuilder::from_value(&schema, &planned);
        let mut plan = PlanBuilder::new(
            &schema,
            Some(ObjectReader::new(&schema, &prior)),
            None,
            Some(&mut builder),
        );

        let mut rules = plan.block_plan_list("rule");
        let actions: Vec<Action> = rules.iter().map(PlanBuilder::action).collect();
        assert_eq!(actions, [Action::Update, Action::Update, Action::Create]);
        assert!(!rules[0].attr_has_change("port"));
        assert!(rules[1].attr_has_change("port"));

        rules[2].set_attr("port", 2222_i64);
        drop(rules);

        assert_eq!(
            plan.planned().block_from_list("rule", 2).attr("port"),
            Value::from(2222_i64)
        );
    }

    #[test]
    fn map_blocks_cover_every_key() {
        let schema = schema();
        let prior = object("web", Value::from(1_i64), &[], &["a", "b"]);
        let planned = object("web", Value::from(1_i64), &[], &["b", "c"]);
        let mut builder = ObjectBuilder::from_value(&schema, &planned);
        let mut plan = PlanBuilder::new(
            &schema,
            Some(ObjectReader::new(&schema, &prior)),
            None,
            Some(&mut builder),
        );

        let actions: Vec<(String, Action)> = plan
            .block_plan_map("label")
            .iter()
            .map(|(key, plan)| (key.clone(), plan.action()))
            .collect();

        assert_eq!(actions, [
            ("a".to_owned(), Action::Delete),
            ("b".to_owned(), Action::Update),
            ("c".to_owned(), Action::Create),
        ]);
        assert_eq!(plan.block_plan_from_map("label", "c").action(), Action::Create);
    }

    #[test]
    fn plan_reader_mirrors_builder_views() {
        let schema = schema();
        let prior = object("web", Value::from(1_i64), &[80], &["a"]);
        let planned = object("api", Value::from(1_i64), &[80, 81], &["a"]);
        let plan = PlanReader::new(
            &schema,
            Some(ObjectReader::new(&schema, &prior)),
            Some(ObjectReader::new(&schema, &planned)),
        );

        assert_eq!(plan.action(), Action::Update);
        assert!(plan.attr_has_change("name"));
        assert!(!plan.attr_has_change("size"));
        assert_eq!(plan.block_plan_list("rule").len(), 2);
        assert_eq!(plan.block_plan_from_list("rule", 1).action(), Action::Create);
        assert_eq!(plan.block_plan_map("label").len(), 1);
        assert_eq!(plan.attr("name"), Value::from("api"));
    }
}
