//! A structural value system for schema-typed configuration objects.
//!
//! Every [`Value`] is either null, unknown (to be determined later, but with a known
//! [`Type`]) or a known value. Values are immutable once constructed: every transformation
//! produces a new value.

use std::collections::BTreeMap;

mod convert;
mod path;
mod ty;

pub use convert::*;
pub use path::*;
pub use ty::*;

/// A structured value conforming to some [`Type`].
#[derive(Clone, Debug)]
pub enum Value {
    /// An absent value of the given type.
    Null(Type),

    /// A value that will only be known later, for example after a resource was created.
    Unknown(Type),

    Bool(bool),
    Number(f64),
    String(String),

    /// An ordered sequence with the given element type.
    List(Type, Vec<Value>),

    /// An unordered, deduplicated collection with the given element type.
    Set(Type, Vec<Value>),

    /// A string-keyed collection with the given element type.
    Map(Type, BTreeMap<String, Value>),

    Object(BTreeMap<String, Value>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn null(ty: Type) -> Self {
        Self::Null(ty)
    }

    pub fn unknown(ty: Type) -> Self {
        Self::Unknown(ty)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn number(value: impl Into<f64>) -> Self {
        Self::Number(value.into())
    }

    pub fn bool(value: bool) -> Self {
        Self::Bool(value)
    }

    /// Creates a list whose element type is taken from the first element.
    ///
    /// Use [`Value::list_empty`] to create a typed empty list.
    pub fn list(elements: Vec<Self>) -> Self {
        let element = elements.first().map_or(Type::Dynamic, Self::ty);
        Self::List(element, elements)
    }

    pub fn list_empty(element: Type) -> Self {
        Self::List(element, Vec::new())
    }

    /// Creates a set whose element type is taken from the first element. Duplicate
    /// elements are removed.
    pub fn set(elements: Vec<Self>) -> Self {
        let element = elements.first().map_or(Type::Dynamic, Self::ty);
        Self::set_of(element, elements)
    }

    /// Creates a set with an explicit element type. Duplicate elements are removed.
    pub fn set_of(element: Type, elements: Vec<Self>) -> Self {
        let mut unique: Vec<Self> = Vec::with_capacity(elements.len());
        for value in elements {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        Self::Set(element, unique)
    }

    pub fn set_empty(element: Type) -> Self {
        Self::Set(element, Vec::new())
    }

    /// Creates a map whose element type is taken from the first entry.
    pub fn map<K>(entries: impl IntoIterator<Item = (K, Self)>) -> Self
    where
        K: Into<String>,
    {
        let entries: BTreeMap<String, Self> = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        let element = entries.values().next().map_or(Type::Dynamic, Self::ty);
        Self::Map(element, entries)
    }

    pub fn map_empty(element: Type) -> Self {
        Self::Map(element, BTreeMap::new())
    }

    pub fn object<N>(attributes: impl IntoIterator<Item = (N, Self)>) -> Self
    where
        N: Into<String>,
    {
        Self::Object(
            attributes
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn empty_object() -> Self {
        Self::Object(BTreeMap::new())
    }

    pub fn tuple(elements: Vec<Self>) -> Self {
        Self::Tuple(elements)
    }

    pub fn empty_tuple() -> Self {
        Self::Tuple(Vec::new())
    }

    /// Returns the type of this value.
    pub fn ty(&self) -> Type {
        match self {
            Self::Null(ty) | Self::Unknown(ty) => ty.clone(),
            Self::Bool(_) => Type::Bool,
            Self::Number(_) => Type::Number,
            Self::String(_) => Type::String,
            Self::List(element, _) => Type::list(element.clone()),
            Self::Set(element, _) => Type::set(element.clone()),
            Self::Map(element, _) => Type::map(element.clone()),
            Self::Object(attributes) => Type::Object(
                attributes
                    .iter()
                    .map(|(name, value)| (name.clone(), value.ty()))
                    .collect(),
            ),
            Self::Tuple(elements) => Type::Tuple(elements.iter().map(Self::ty).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Returns `false` only if this value itself is unknown. Nested unknowns are not
    /// considered, see [`Value::is_wholly_known`].
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Returns `true` if neither this value nor any value nested inside it is unknown.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Self::Unknown(_) => false,
            Self::Null(_) | Self::Bool(_) | Self::Number(_) | Self::String(_) => true,
            Self::List(_, elements) | Self::Set(_, elements) | Self::Tuple(elements) => {
                elements.iter().all(Self::is_wholly_known)
            }
            Self::Map(_, entries) | Self::Object(entries) => {
                entries.values().all(Self::is_wholly_known)
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the elements of a known list, set or tuple.
    pub fn elements(&self) -> Option<&[Self]> {
        match self {
            Self::List(_, elements) | Self::Set(_, elements) | Self::Tuple(elements) => {
                Some(elements)
            }
            _ => None,
        }
    }

    /// Returns the entries of a known map or the attributes of a known object.
    pub fn entries(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(_, entries) | Self::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Returns the number of elements of a known collection, tuple or object.
    pub fn length(&self) -> Option<usize> {
        self.elements()
            .map(<[Self]>::len)
            .or_else(|| self.entries().map(BTreeMap::len))
    }

    /// Returns the named attribute of an object value.
    ///
    /// Null and unknown objects yield a null or unknown value of the attribute's type.
    /// Returns [`None`] if this is not an object or has no such attribute.
    pub fn attr(&self, name: &str) -> Option<Self> {
        match self {
            Self::Object(attributes) => attributes.get(name).cloned(),
            Self::Null(Type::Object(types)) => types.get(name).cloned().map(Self::Null),
            Self::Unknown(Type::Object(types)) => types.get(name).cloned().map(Self::Unknown),
            _ => None,
        }
    }

    /// Recursively replaces every unknown value with a null value of the same type.
    pub fn unknown_as_null(&self) -> Self {
        match self {
            Self::Unknown(ty) => Self::Null(ty.clone()),
            Self::Null(_) | Self::Bool(_) | Self::Number(_) | Self::String(_) => self.clone(),
            Self::List(element, elements) => Self::List(
                element.clone(),
                elements.iter().map(Self::unknown_as_null).collect(),
            ),
            // Distinct unknowns may collapse into equal nulls.
            Self::Set(element, elements) => Self::set_of(
                element.clone(),
                elements.iter().map(Self::unknown_as_null).collect(),
            ),
            Self::Map(element, entries) => Self::Map(
                element.clone(),
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.unknown_as_null()))
                    .collect(),
            ),
            Self::Object(attributes) => Self::Object(
                attributes
                    .iter()
                    .map(|(name, value)| (name.clone(), value.unknown_as_null()))
                    .collect(),
            ),
            Self::Tuple(elements) => {
                Self::Tuple(elements.iter().map(Self::unknown_as_null).collect())
            }
        }
    }
}

/// Raw structural equality.
///
/// Unknown values compare equal to other unknown values of the same type, so this must
/// not be used to decide whether two values are logically the same.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null(a), Self::Null(b)) | (Self::Unknown(a), Self::Unknown(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a_ty, a), Self::List(b_ty, b)) => a_ty == b_ty && a == b,
            (Self::Set(a_ty, a), Self::Set(b_ty, b)) => {
                a_ty == b_ty && a.len() == b.len() && a.iter().all(|value| b.contains(value))
            }
            (Self::Map(a_ty, a), Self::Map(b_ty, b)) => a_ty == b_ty && a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}
