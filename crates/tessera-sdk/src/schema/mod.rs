//! Schemas describing the shape of configuration objects.
//!
//! A [`BlockType`] declares named attributes and named nested block types. Its
//! [implied type](BlockType::implied_type) is the structural [`Type`] every non-null
//! object described by the schema must conform to.

use std::{collections::BTreeMap, sync::Arc};

use educe::Educe;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

use crate::{
    diagnostics::Diagnostics,
    value::{PathError, Type, Value, convert},
};

mod conform;
mod defaults;
mod validate;

/// A custom validation function for the known, non-null value of an attribute.
///
/// The value passed in has already been converted to the attribute's type. Returned
/// diagnostics are reported relative to the attribute's path.
pub type ValidateFn = Arc<dyn Fn(&Value) -> Diagnostics + Send + Sync>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum SchemaError {
    #[snafu(display("attribute {name:?} cannot be both required and optional"))]
    RequiredAndOptional { name: String },

    #[snafu(display("attribute {name:?} cannot be both required and computed"))]
    RequiredAndComputed { name: String },

    #[snafu(display("attribute {name:?} must be required, optional or computed"))]
    NoPresenceFlag { name: String },

    #[snafu(display("required attribute {name:?} cannot have a default value"))]
    DefaultOnRequired { name: String },

    #[snafu(display("default value of attribute {name:?} is not suitable"))]
    InvalidDefault { name: String, source: PathError },

    #[snafu(display(
        "block type {name:?} uses set nesting, which cannot contain attributes of dynamic type"
    ))]
    DynamicInSet { name: String },

    #[snafu(display("block type {name:?} has min_items {min} greater than max_items {max}"))]
    MinExceedsMax { name: String, min: usize, max: usize },

    #[snafu(display("block type {name:?} uses single nesting and can only set max_items to 1"))]
    InvalidSingleMaxItems { name: String },
}

/// The schema of an object: its attributes and nested block types, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct BlockType {
    pub attributes: BTreeMap<String, Attribute>,
    pub nested_block_types: BTreeMap<String, NestedBlockType>,
}

#[derive(Clone, Educe)]
#[educe(Debug)]
pub struct Attribute {
    /// The type values of this attribute are converted to. [`Type::Dynamic`] accepts any
    /// value.
    pub ty: Type,

    pub required: bool,
    pub optional: bool,

    /// The provider supplies the value. Combined with `optional`, the provider supplies
    /// the value only if the configuration leaves it unset.
    pub computed: bool,

    /// Only a display hint for the orchestrator.
    pub sensitive: bool,

    pub description: String,

    #[educe(Debug(ignore))]
    pub validate_fn: Option<ValidateFn>,

    /// Used when the configuration leaves a non-computed attribute unset.
    pub default: Option<Value>,
}

/// How occurrences of a nested block type compose within the parent object.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NestingMode {
    /// Zero or one block, represented as the nested object or null.
    Single,

    /// An ordered sequence of blocks.
    List,

    /// An unordered, deduplicated collection of blocks.
    Set,

    /// Blocks keyed by an arbitrary string label.
    Map,
}

#[derive(Clone, Debug)]
pub struct NestedBlockType {
    pub nesting: NestingMode,
    pub content: BlockType,

    pub min_items: usize,

    /// Zero means unbounded.
    pub max_items: usize,
}

impl BlockType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlockType) -> Self {
        self.nested_block_types.insert(name.into(), block);
        self
    }

    /// Derives the structural type of objects described by this schema.
    ///
    /// Multi-nesting blocks whose content contains dynamic types are typed as
    /// [`Type::Dynamic`], because each occurrence may have a different concrete type.
    pub fn implied_type(&self) -> Type {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, attribute)| (name.clone(), attribute.ty.clone()));
        let blocks = self
            .nested_block_types
            .iter()
            .map(|(name, block)| (name.clone(), block.implied_type()));

        Type::Object(attributes.chain(blocks).collect())
    }

    pub fn null(&self) -> Value {
        Value::null(self.implied_type())
    }

    pub fn unknown(&self) -> Value {
        Value::unknown(self.implied_type())
    }

    /// Checks the schema for inconsistencies that are programming errors in the provider.
    /// Called when resource types are registered.
    pub fn internal_validate(&self) -> Result<(), SchemaError> {
        for (name, attribute) in &self.attributes {
            attribute.internal_validate(name)?;
        }

        for (name, block) in &self.nested_block_types {
            block.internal_validate(name)?;
        }

        Ok(())
    }
}

impl Attribute {
    fn new(ty: Type) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            description: String::new(),
            validate_fn: None,
            default: None,
        }
    }

    pub fn required(ty: Type) -> Self {
        Self {
            required: true,
            ..Self::new(ty)
        }
    }

    pub fn optional(ty: Type) -> Self {
        Self {
            optional: true,
            ..Self::new(ty)
        }
    }

    pub fn computed(ty: Type) -> Self {
        Self {
            computed: true,
            ..Self::new(ty)
        }
    }

    pub fn optional_computed(ty: Type) -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::new(ty)
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_validator<F>(mut self, validate_fn: F) -> Self
    where
        F: Fn(&Value) -> Diagnostics + Send + Sync + 'static,
    {
        self.validate_fn = Some(Arc::new(validate_fn));
        self
    }

    pub fn null(&self) -> Value {
        Value::null(self.ty.clone())
    }

    pub fn unknown(&self) -> Value {
        Value::unknown(self.ty.clone())
    }

    /// Returns the declared default converted to the attribute type, or null if there is no
    /// default.
    #[allow(clippy::panic)]
    pub fn default_value(&self) -> Value {
        match &self.default {
            None => self.null(),
            Some(default) => convert(default, &self.ty).unwrap_or_else(|err| {
                panic!("invalid default value for attribute of type {}: {err}", self.ty)
            }),
        }
    }

    fn internal_validate(&self, name: &str) -> Result<(), SchemaError> {
        ensure!(!(self.required && self.optional), RequiredAndOptionalSnafu {
            name
        });
        ensure!(!(self.required && self.computed), RequiredAndComputedSnafu {
            name
        });
        ensure!(
            self.required || self.optional || self.computed,
            NoPresenceFlagSnafu { name }
        );

        if let Some(default) = &self.default {
            ensure!(!self.required, DefaultOnRequiredSnafu { name });
            convert(default, &self.ty).context(InvalidDefaultSnafu { name })?;
        }

        Ok(())
    }
}

impl NestedBlockType {
    pub fn new(nesting: NestingMode, content: BlockType) -> Self {
        Self {
            nesting,
            content,
            min_items: 0,
            max_items: 0,
        }
    }

    pub fn with_min_items(mut self, min_items: usize) -> Self {
        self.min_items = min_items;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn implied_type(&self) -> Type {
        let content = self.content.implied_type();
        if self.nesting != NestingMode::Single && content.has_dynamic_types() {
            return Type::Dynamic;
        }

        match self.nesting {
            NestingMode::Single => content,
            NestingMode::List => Type::list(content),
            NestingMode::Set => Type::set(content),
            NestingMode::Map => Type::map(content),
        }
    }

    /// The representation of zero blocks of this type.
    pub fn empty_value(&self) -> Value {
        let content = self.content.implied_type();
        let dynamic = content.has_dynamic_types();

        match self.nesting {
            NestingMode::Single => Value::null(content),
            NestingMode::List if dynamic => Value::empty_tuple(),
            NestingMode::List => Value::list_empty(content),
            NestingMode::Set => Value::set_empty(content),
            NestingMode::Map if dynamic => Value::empty_object(),
            NestingMode::Map => Value::map_empty(content),
        }
    }

    fn internal_validate(&self, name: &str) -> Result<(), SchemaError> {
        ensure!(
            self.max_items == 0 || self.min_items <= self.max_items,
            MinExceedsMaxSnafu {
                name,
                min: self.min_items,
                max: self.max_items,
            }
        );
        ensure!(
            self.nesting != NestingMode::Single || self.max_items <= 1,
            InvalidSingleMaxItemsSnafu { name }
        );
        ensure!(
            self.nesting != NestingMode::Set || !self.content.implied_type().has_dynamic_types(),
            DynamicInSetSnafu { name }
        );

        // Nested errors name the innermost attribute or block.
        self.content.internal_validate()
    }
}
