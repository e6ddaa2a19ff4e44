use std::{
    collections::{BTreeMap, btree_map},
    ops::{Deref, DerefMut},
};

use crate::{
    object::{ALL_MODES, ObjectRead, ObjectReader, attribute_schema, block_schema},
    schema::{BlockType, NestedBlockType, NestingMode},
    value::{Value, convert},
};

/// Incrementally constructs a new object value conforming to a schema.
///
/// Nested blocks are held as child builders, created eagerly from the initial value. A
/// builder can change attributes and the contents of existing blocks, but not which blocks
/// exist; see [`ObjectBuilderFull`] for that. [`ObjectRead::object_val`] freezes the current
/// state into an immutable value without affecting the builder.
#[derive(Clone, Debug)]
pub struct ObjectBuilder<'s> {
    schema: &'s BlockType,
    attributes: BTreeMap<String, Value>,
    blocks: BTreeMap<String, NestedBuilders<'s>>,
}

#[derive(Clone, Debug)]
enum NestedBuilders<'s> {
    Single(Option<Box<ObjectBuilder<'s>>>),

    /// Used for both list and set nesting.
    List(Vec<ObjectBuilder<'s>>),

    Map(BTreeMap<String, ObjectBuilder<'s>>),
}

impl<'s> ObjectBuilder<'s> {
    /// Creates a builder with all attributes null and no nested blocks.
    pub fn new(schema: &'s BlockType) -> Self {
        Self::from_value(schema, &schema.null())
    }

    /// Creates a builder initialized from an existing object value. A null or unknown value
    /// gives the same result as [`ObjectBuilder::new`].
    pub fn from_value(schema: &'s BlockType, initial: &Value) -> Self {
        let entries = match initial {
            Value::Object(entries) => Some(entries),
            Value::Null(_) | Value::Unknown(_) => None,
            _ => panic!("object builder requires an object value, found a {}", initial.ty()),
        };
        let entry = |name: &str| entries.and_then(|entries| entries.get(name));

        let attributes = schema
            .attributes
            .iter()
            .map(|(name, attribute)| {
                let value = entry(name).cloned().unwrap_or_else(|| attribute.null());
                (name.clone(), value)
            })
            .collect();

        let blocks = schema
            .nested_block_types
            .iter()
            .map(|(name, block)| (name.clone(), NestedBuilders::from_value(block, entry(name))))
            .collect();

        Self {
            schema,
            attributes,
            blocks,
        }
    }

    /// Sets an attribute, converting `value` to the attribute's type.
    ///
    /// Panics if the value cannot be converted, since that means the provider disagrees with
    /// its own schema.
    pub fn set_attr(&mut self, name: &str, value: impl Into<Value>) {
        let attribute = attribute_schema(self.schema, name);
        let value = convert(&value.into(), &attribute.ty)
            .unwrap_or_else(|err| panic!("cannot set attribute {name:?}: {err}"));

        self.attributes.insert(name.to_owned(), value);
    }

    pub fn block_single(&self, block_type: &str) -> Option<&Self> {
        block_schema(self.schema, block_type, &[NestingMode::Single]);
        match self.blocks.get(block_type) {
            Some(NestedBuilders::Single(builder)) => builder.as_deref(),
            _ => unreachable_nesting(block_type),
        }
    }

    /// Returns the builders of a list- or set-nesting block type.
    pub fn block_list(&self, block_type: &str) -> &[Self] {
        block_schema(self.schema, block_type, &[NestingMode::List, NestingMode::Set]);
        match self.blocks.get(block_type) {
            Some(NestedBuilders::List(builders)) => builders,
            _ => unreachable_nesting(block_type),
        }
    }

    pub fn block_from_list(&self, block_type: &str, index: usize) -> &Self {
        block_schema(self.schema, block_type, &[NestingMode::List]);
        let builders = self.block_list(block_type);

        builders
            .get(index)
            .unwrap_or_else(|| out_of_range(block_type, index, builders.len()))
    }

    pub fn block_map(&self, block_type: &str) -> &BTreeMap<String, Self> {
        block_schema(self.schema, block_type, &[NestingMode::Map]);
        match self.blocks.get(block_type) {
            Some(NestedBuilders::Map(builders)) => builders,
            _ => unreachable_nesting(block_type),
        }
    }

    pub fn block_from_map(&self, block_type: &str, key: &str) -> Option<&Self> {
        self.block_map(block_type).get(key)
    }

    pub fn block_builder_single(&mut self, block_type: &str) -> Option<&mut Self> {
        block_schema(self.schema, block_type, &[NestingMode::Single]);
        match self.blocks.get_mut(block_type) {
            Some(NestedBuilders::Single(builder)) => builder.as_deref_mut(),
            _ => unreachable_nesting(block_type),
        }
    }

    /// Returns the builders of a list- or set-nesting block type for modification.
    pub fn block_builder_list(&mut self, block_type: &str) -> &mut [Self] {
        block_schema(self.schema, block_type, &[NestingMode::List, NestingMode::Set]);
        match self.blocks.get_mut(block_type) {
            Some(NestedBuilders::List(builders)) => builders,
            _ => unreachable_nesting(block_type),
        }
    }

    pub fn block_builder_from_list(&mut self, block_type: &str, index: usize) -> &mut Self {
        block_schema(self.schema, block_type, &[NestingMode::List]);
        let builders = self.block_builder_list(block_type);
        let len = builders.len();

        match builders.get_mut(index) {
            Some(builder) => builder,
            None => out_of_range(block_type, index, len),
        }
    }

    /// Returns the builders of a map-nesting block type for modification. Entries can be
    /// changed, but not added or removed.
    pub fn block_builder_map(&mut self, block_type: &str) -> btree_map::IterMut<'_, String, Self> {
        block_schema(self.schema, block_type, &[NestingMode::Map]);
        match self.blocks.get_mut(block_type) {
            Some(NestedBuilders::Map(builders)) => builders.iter_mut(),
            _ => unreachable_nesting(block_type),
        }
    }

    pub fn block_builder_from_map(&mut self, block_type: &str, key: &str) -> Option<&mut Self> {
        block_schema(self.schema, block_type, &[NestingMode::Map]);
        match self.blocks.get_mut(block_type) {
            Some(NestedBuilders::Map(builders)) => builders.get_mut(key),
            _ => unreachable_nesting(block_type),
        }
    }
}

impl ObjectRead for ObjectBuilder<'_> {
    fn schema(&self) -> &BlockType {
        self.schema
    }

    fn object_val(&self) -> Value {
        let mut values = self.attributes.clone();

        for (name, block) in &self.schema.nested_block_types {
            let value = match self.blocks.get(name) {
                Some(builders) => builders.object_val(block),
                None => block.empty_value(),
            };
            values.insert(name.clone(), value);
        }

        Value::Object(values)
    }

    fn attr(&self, name: &str) -> Value {
        let attribute = attribute_schema(self.schema, name);
        self.attributes
            .get(name)
            .cloned()
            .unwrap_or_else(|| attribute.null())
    }

    fn block_count(&self, block_type: &str) -> usize {
        block_schema(self.schema, block_type, ALL_MODES);
        match self.blocks.get(block_type) {
            Some(NestedBuilders::Single(builder)) => usize::from(builder.is_some()),
            Some(NestedBuilders::List(builders)) => builders.len(),
            Some(NestedBuilders::Map(builders)) => builders.len(),
            None => 0,
        }
    }
}

impl<'s> NestedBuilders<'s> {
    fn from_value(block: &'s NestedBlockType, value: Option<&Value>) -> Self {
        let content = &block.content;

        match block.nesting {
            NestingMode::Single => Self::Single(
                value
                    .filter(|value| matches!(value, Value::Object(_)))
                    .map(|value| Box::new(ObjectBuilder::from_value(content, value))),
            ),
            NestingMode::List | NestingMode::Set => Self::List(
                value
                    .and_then(Value::elements)
                    .unwrap_or_default()
                    .iter()
                    .map(|element| ObjectBuilder::from_value(content, element))
                    .collect(),
            ),
            NestingMode::Map => Self::Map(
                value
                    .and_then(Value::entries)
                    .into_iter()
                    .flatten()
                    .map(|(key, element)| (key.clone(), ObjectBuilder::from_value(content, element)))
                    .collect(),
            ),
        }
    }

    fn object_val(&self, block: &NestedBlockType) -> Value {
        let content = block.content.implied_type();
        let dynamic = content.has_dynamic_types();

        match self {
            Self::Single(Some(builder)) => builder.object_val(),
            Self::List(builders) if !builders.is_empty() => {
                let elements = builders.iter().map(ObjectRead::object_val).collect();
                match block.nesting {
                    NestingMode::Set => Value::set_of(content, elements),
                    _ if dynamic => Value::Tuple(elements),
                    _ => Value::List(content, elements),
                }
            }
            Self::Map(builders) if !builders.is_empty() => {
                let entries = builders
                    .iter()
                    .map(|(key, builder)| (key.clone(), builder.object_val()))
                    .collect();
                if dynamic {
                    Value::Object(entries)
                } else {
                    Value::Map(content, entries)
                }
            }
            _ => block.empty_value(),
        }
    }
}

/// A builder that can also add, remove and replace nested blocks.
///
/// Only the refresh of a managed resource may change which nested blocks exist, to match
/// the remote object. Everything an [`ObjectBuilder`] can do is available through deref.
#[derive(Clone, Debug)]
pub struct ObjectBuilderFull<'s>(ObjectBuilder<'s>);

impl<'s> ObjectBuilderFull<'s> {
    pub fn new(schema: &'s BlockType) -> Self {
        Self(ObjectBuilder::new(schema))
    }

    pub fn from_value(schema: &'s BlockType, initial: &Value) -> Self {
        Self(ObjectBuilder::from_value(schema, initial))
    }

    /// Starts a new object from the current state of a reader.
    pub fn derive(reader: ObjectReader<'s>) -> Self {
        Self::from_value(reader.schema, reader.value)
    }

    /// Creates an empty builder for one block of the given block type, to be passed to one
    /// of the replace methods.
    pub fn new_block_builder(&self, block_type: &str) -> Self {
        let block = block_schema(self.0.schema, block_type, ALL_MODES);
        Self::new(&block.content)
    }

    pub fn replace_block_single(&mut self, block_type: &str, builder: Option<Self>) {
        let block = block_schema(self.0.schema, block_type, &[NestingMode::Single]);
        let builder = builder.map(|builder| Box::new(check_origin(block_type, block, builder)));

        self.0
            .blocks
            .insert(block_type.to_owned(), NestedBuilders::Single(builder));
    }

    /// Replaces all blocks of a list- or set-nesting block type.
    pub fn replace_blocks_list(&mut self, block_type: &str, builders: Vec<Self>) {
        let block = block_schema(self.0.schema, block_type, &[
            NestingMode::List,
            NestingMode::Set,
        ]);
        let builders = builders
            .into_iter()
            .map(|builder| check_origin(block_type, block, builder))
            .collect();

        self.0
            .blocks
            .insert(block_type.to_owned(), NestedBuilders::List(builders));
    }

    pub fn replace_blocks_map(&mut self, block_type: &str, builders: BTreeMap<String, Self>) {
        let block = block_schema(self.0.schema, block_type, &[NestingMode::Map]);
        let builders = builders
            .into_iter()
            .map(|(key, builder)| (key, check_origin(block_type, block, builder)))
            .collect();

        self.0
            .blocks
            .insert(block_type.to_owned(), NestedBuilders::Map(builders));
    }

    pub fn into_inner(self) -> ObjectBuilder<'s> {
        self.0
    }
}

impl<'s> Deref for ObjectBuilderFull<'s> {
    type Target = ObjectBuilder<'s>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ObjectBuilderFull<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl ObjectRead for ObjectBuilderFull<'_> {
    fn schema(&self) -> &BlockType {
        self.0.schema
    }

    fn object_val(&self) -> Value {
        self.0.object_val()
    }

    fn attr(&self, name: &str) -> Value {
        self.0.attr(name)
    }

    fn block_count(&self, block_type: &str) -> usize {
        self.0.block_count(block_type)
    }
}

/// Blocks must be built against the content schema of the block type they replace.
fn check_origin<'s>(
    block_type: &str,
    block: &NestedBlockType,
    builder: ObjectBuilderFull<'s>,
) -> ObjectBuilder<'s> {
    if !std::ptr::eq(builder.0.schema, &block.content) {
        panic!("builder was not created by new_block_builder for block type {block_type:?}");
    }
    builder.0
}

fn unreachable_nesting(block_type: &str) -> ! {
    panic!("builders for block type {block_type:?} do not match its nesting mode")
}

fn out_of_range(block_type: &str, index: usize, len: usize) -> ! {
    panic!("block type {block_type:?} has {len} blocks, index {index} is out of range")
}
