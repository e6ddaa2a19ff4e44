use std::collections::BTreeMap;

use crate::{
    object::{ALL_MODES, ObjectRead, attribute_schema, block_schema, object_entry},
    schema::{BlockType, NestingMode},
    value::Value,
};

/// A read-only view of a known, non-null object value.
#[derive(Clone, Copy, Debug)]
pub struct ObjectReader<'a> {
    pub(crate) schema: &'a BlockType,
    pub(crate) value: &'a Value,
}

impl<'a> ObjectReader<'a> {
    /// Creates a reader over `value`, which must be a known object conforming to `schema`.
    pub fn new(schema: &'a BlockType, value: &'a Value) -> Self {
        if !matches!(value, Value::Object(_)) {
            panic!(
                "object reader requires a known object value, found {}",
                describe(value)
            );
        }

        Self { schema, value }
    }

    /// Like [`ObjectReader::new`], but returns [`None`] for a null or unknown value.
    pub fn optional(schema: &'a BlockType, value: &'a Value) -> Option<Self> {
        match value {
            Value::Null(_) | Value::Unknown(_) => None,
            value => Some(Self::new(schema, value)),
        }
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Returns the block of a single-nesting block type, if present.
    pub fn block_single(&self, block_type: &str) -> Option<Self> {
        let block = block_schema(self.schema, block_type, &[NestingMode::Single]);

        match object_entry(self.value, block_type) {
            value @ Value::Object(_) => Some(Self::new(&block.content, value)),
            _ => None,
        }
    }

    /// Returns the blocks of a list- or set-nesting block type, in order.
    ///
    /// Set blocks have no meaningful order, but the order is stable for one value.
    pub fn block_list(&self, block_type: &str) -> Vec<Self> {
        let block = block_schema(self.schema, block_type, &[
            NestingMode::List,
            NestingMode::Set,
        ]);

        object_entry(self.value, block_type)
            .elements()
            .unwrap_or_default()
            .iter()
            .map(|element| Self::new(&block.content, element))
            .collect()
    }

    /// Returns the block at `index` of a list-nesting block type.
    pub fn block_from_list(&self, block_type: &str, index: usize) -> Self {
        let block = block_schema(self.schema, block_type, &[NestingMode::List]);
        let elements = object_entry(self.value, block_type)
            .elements()
            .unwrap_or_default();

        match elements.get(index) {
            Some(element) => Self::new(&block.content, element),
            None => panic!(
                "block type {block_type:?} has {} blocks, index {index} is out of range",
                elements.len()
            ),
        }
    }

    /// Returns the blocks of a map-nesting block type, keyed by label.
    pub fn block_map(&self, block_type: &str) -> BTreeMap<&'a str, Self> {
        let block = block_schema(self.schema, block_type, &[NestingMode::Map]);

        object_entry(self.value, block_type)
            .entries()
            .into_iter()
            .flatten()
            .map(|(key, element)| (key.as_str(), Self::new(&block.content, element)))
            .collect()
    }

    /// Returns the block with label `key` of a map-nesting block type, if present.
    pub fn block_from_map(&self, block_type: &str, key: &str) -> Option<Self> {
        let block = block_schema(self.schema, block_type, &[NestingMode::Map]);

        object_entry(self.value, block_type)
            .entries()
            .and_then(|entries| entries.get(key))
            .map(|element| Self::new(&block.content, element))
    }
}

impl ObjectRead for ObjectReader<'_> {
    fn schema(&self) -> &BlockType {
        self.schema
    }

    fn object_val(&self) -> Value {
        self.value.clone()
    }

    fn attr(&self, name: &str) -> Value {
        attribute_schema(self.schema, name);
        object_entry(self.value, name).clone()
    }

    fn block_count(&self, block_type: &str) -> usize {
        let block = block_schema(self.schema, block_type, ALL_MODES);
        block_value_count(block.nesting, object_entry(self.value, block_type))
    }
}

pub(crate) fn block_value_count(nesting: NestingMode, value: &Value) -> usize {
    match (nesting, value) {
        (_, Value::Null(_) | Value::Unknown(_)) => 0,
        (NestingMode::Single, _) => 1,
        (_, value) => value.length().unwrap_or_default(),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null(_) => "a null value".to_owned(),
        Value::Unknown(_) => "an unknown value".to_owned(),
        value => format!("a {}", value.ty()),
    }
}
