//! Schema-aware views over object values.
//!
//! Readers navigate an immutable value, builders assemble a new one, and plan builders
//! combine the prior, configured and planned objects of a change. All of them are keyed by
//! the names declared in the [`BlockType`] they were created with. Navigating with a name or
//! nesting mode the schema does not declare is a programming error in the provider and
//! panics.

// Misuse of the navigation methods cannot be recovered from at runtime.
#![allow(clippy::panic)]

use crate::{
    schema::{Attribute, BlockType, NestedBlockType, NestingMode},
    value::Value,
};

mod builder;
mod decode;
mod plan;
mod reader;

pub use builder::*;
pub use decode::*;
pub use plan::*;
pub use reader::*;

/// The read operations shared by readers, builders and plans.
pub trait ObjectRead {
    /// The schema of the object.
    fn schema(&self) -> &BlockType;

    /// Returns the whole object as an immutable value.
    fn object_val(&self) -> Value;

    /// Returns the value of the named attribute.
    fn attr(&self, name: &str) -> Value;

    /// Returns the number of blocks of the named block type, for any nesting mode.
    fn block_count(&self, block_type: &str) -> usize;
}

pub(crate) fn attribute_schema<'s>(schema: &'s BlockType, name: &str) -> &'s Attribute {
    schema
        .attributes
        .get(name)
        .unwrap_or_else(|| panic!("schema has no attribute named {name:?}"))
}

/// Looks up a nested block type, requiring it to use one of the given nesting modes.
pub(crate) fn block_schema<'s>(
    schema: &'s BlockType,
    name: &str,
    modes: &[NestingMode],
) -> &'s NestedBlockType {
    let block = schema
        .nested_block_types
        .get(name)
        .unwrap_or_else(|| panic!("schema has no block type named {name:?}"));

    if !modes.contains(&block.nesting) {
        panic!(
            "block type {name:?} uses {} nesting, which does not support this operation",
            block.nesting
        );
    }

    block
}

/// Returns the entry of a known object value that conforms to its schema.
pub(crate) fn object_entry<'v>(value: &'v Value, name: &str) -> &'v Value {
    match value {
        Value::Object(attributes) => attributes.get(name).unwrap_or_else(|| {
            panic!("object value has no attribute {name:?} and does not conform to its schema")
        }),
        _ => panic!("expected a known object value, found a {}", value.ty()),
    }
}

const ALL_MODES: &[NestingMode] = &[
    NestingMode::Single,
    NestingMode::List,
    NestingMode::Set,
    NestingMode::Map,
];
