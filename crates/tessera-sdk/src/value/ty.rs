use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::value::{Path, PathError, Value};

/// Errors returned when parsing a JSON type expression into a [`Type`].
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseTypeError {
    #[snafu(display("unsupported primitive type {name:?}"))]
    UnsupportedPrimitive { name: String },

    #[snafu(display("unsupported type kind {kind:?}"))]
    UnsupportedKind { kind: String },

    #[snafu(display("the {kind} type expects {expected} as its argument"))]
    InvalidArgument { kind: String, expected: &'static str },

    #[snafu(display("a type expression must be a string or a two-element array"))]
    InvalidExpression,
}

/// The structural type of a [`Value`](crate::value::Value).
///
/// [`Type::Dynamic`] is the "any type" marker: a position with this type accepts values of
/// every type and its concrete type is only known per value.
///
/// Types serialize to a compact JSON expression, such as `"string"`, `["list", "number"]` or
/// `["object", {"name": "string"}]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum Type {
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Object(BTreeMap<String, Type>),
    Tuple(Vec<Type>),
    Dynamic,
}

impl Type {
    pub fn list(element: Self) -> Self {
        Self::List(Box::new(element))
    }

    pub fn set(element: Self) -> Self {
        Self::Set(Box::new(element))
    }

    pub fn map(element: Self) -> Self {
        Self::Map(Box::new(element))
    }

    pub fn object<N>(attributes: impl IntoIterator<Item = (N, Self)>) -> Self
    where
        N: Into<String>,
    {
        Self::Object(
            attributes
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    pub fn empty_object() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Returns the element type of a list, set or map type.
    pub fn element_type(&self) -> Option<&Self> {
        match self {
            Self::List(element) | Self::Set(element) | Self::Map(element) => Some(element),
            _ => None,
        }
    }

    /// Returns `true` if [`Type::Dynamic`] appears anywhere inside this type.
    pub fn has_dynamic_types(&self) -> bool {
        match self {
            Self::Dynamic => true,
            Self::Bool | Self::Number | Self::String => false,
            Self::List(element) | Self::Set(element) | Self::Map(element) => {
                element.has_dynamic_types()
            }
            Self::Object(attributes) => attributes.values().any(Self::has_dynamic_types),
            Self::Tuple(elements) => elements.iter().any(Self::has_dynamic_types),
        }
    }

    /// Checks that `self` structurally matches `want`, where a dynamic position in `want`
    /// accepts any type. Returns every mismatch found, each located at its path.
    pub fn test_conformance(&self, want: &Self) -> Vec<PathError> {
        let mut errors = Vec::new();
        conformance_errors(self, want, &Path::root(), &mut errors);
        errors
    }
}

impl Value {
    /// Checks that this value conforms to `want`, looking at every element and attribute
    /// rather than only at the declared element types of collections. Null and unknown
    /// values are checked by their type. Returns every mismatch found, each located at its
    /// path. Elements of sets are reported at the set itself.
    pub fn test_conformance(&self, want: &Type) -> Vec<PathError> {
        let mut errors = Vec::new();
        value_conformance_errors(self, want, &Path::root(), &mut errors);
        errors
    }
}

fn value_conformance_errors(given: &Value, want: &Type, path: &Path, errors: &mut Vec<PathError>) {
    match (given, want) {
        (_, Type::Dynamic)
        | (Value::Bool(_), Type::Bool)
        | (Value::Number(_), Type::Number)
        | (Value::String(_), Type::String) => {}
        (Value::Null(ty) | Value::Unknown(ty), want) => conformance_errors(ty, want, path, errors),
        (Value::List(element, elements), Type::List(want)) => {
            if elements.is_empty() {
                conformance_errors(element, want, path, errors);
            }
            for (index, value) in elements.iter().enumerate() {
                value_conformance_errors(value, want, &path.index(index), errors);
            }
        }
        (Value::Set(element, elements), Type::Set(want)) => {
            if elements.is_empty() {
                conformance_errors(element, want, path, errors);
            }
            for value in elements {
                value_conformance_errors(value, want, path, errors);
            }
        }
        (Value::Map(element, entries), Type::Map(want)) => {
            if entries.is_empty() {
                conformance_errors(element, want, path, errors);
            }
            for (key, value) in entries {
                value_conformance_errors(value, want, &path.key(key), errors);
            }
        }
        (Value::Object(given), Type::Object(want)) => {
            for (name, want) in want {
                match given.get(name) {
                    Some(given) => value_conformance_errors(given, want, &path.attr(name), errors),
                    None => errors.push(PathError::new(
                        path.clone(),
                        format!("missing attribute {name:?}"),
                    )),
                }
            }
            for name in given.keys().filter(|name| !want.contains_key(*name)) {
                errors.push(PathError::new(
                    path.clone(),
                    format!("unsupported attribute {name:?}"),
                ));
            }
        }
        (Value::Tuple(given), Type::Tuple(want)) => {
            if given.len() == want.len() {
                for (index, (given, want)) in given.iter().zip(want).enumerate() {
                    value_conformance_errors(given, want, &path.index(index), errors);
                }
            } else {
                errors.push(PathError::new(
                    path.clone(),
                    format!("tuple must have {} elements", want.len()),
                ));
            }
        }
        _ => errors.push(PathError::new(path.clone(), format!("{want} required"))),
    }
}

fn conformance_errors(given: &Type, want: &Type, path: &Path, errors: &mut Vec<PathError>) {
    match (given, want) {
        (_, Type::Dynamic)
        | (Type::Bool, Type::Bool)
        | (Type::Number, Type::Number)
        | (Type::String, Type::String) => {}
        (Type::List(given), Type::List(want))
        | (Type::Set(given), Type::Set(want))
        | (Type::Map(given), Type::Map(want)) => conformance_errors(given, want, path, errors),
        (Type::Object(given), Type::Object(want)) => {
            for (name, want) in want {
                match given.get(name) {
                    Some(given) => conformance_errors(given, want, &path.attr(name), errors),
                    None => errors.push(PathError::new(
                        path.clone(),
                        format!("missing attribute {name:?}"),
                    )),
                }
            }
            for name in given.keys().filter(|name| !want.contains_key(*name)) {
                errors.push(PathError::new(
                    path.clone(),
                    format!("unsupported attribute {name:?}"),
                ));
            }
        }
        (Type::Tuple(given), Type::Tuple(want)) => {
            if given.len() == want.len() {
                for (index, (given, want)) in given.iter().zip(want).enumerate() {
                    conformance_errors(given, want, &path.index(index), errors);
                }
            } else {
                errors.push(PathError::new(
                    path.clone(),
                    format!("tuple must have {} elements", want.len()),
                ));
            }
        }
        _ => errors.push(PathError::new(path.clone(), format!("{want} required"))),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Number => f.write_str("number"),
            Self::String => f.write_str("string"),
            Self::Dynamic => f.write_str("dynamic"),
            Self::List(element) => write!(f, "list of {element}"),
            Self::Set(element) => write!(f, "set of {element}"),
            Self::Map(element) => write!(f, "map of {element}"),
            Self::Object(_) => f.write_str("object"),
            Self::Tuple(_) => f.write_str("tuple"),
        }
    }
}

impl From<Type> for serde_json::Value {
    fn from(ty: Type) -> Self {
        match ty {
            Type::Bool => Self::from("bool"),
            Type::Number => Self::from("number"),
            Type::String => Self::from("string"),
            Type::Dynamic => Self::from("dynamic"),
            Type::List(element) => Self::Array(vec!["list".into(), Self::from(*element)]),
            Type::Set(element) => Self::Array(vec!["set".into(), Self::from(*element)]),
            Type::Map(element) => Self::Array(vec!["map".into(), Self::from(*element)]),
            Type::Object(attributes) => {
                let attributes = attributes
                    .into_iter()
                    .map(|(name, ty)| (name, Self::from(ty)))
                    .collect();
                Self::Array(vec!["object".into(), Self::Object(attributes)])
            }
            Type::Tuple(elements) => {
                let elements = elements.into_iter().map(Self::from).collect();
                Self::Array(vec!["tuple".into(), Self::Array(elements)])
            }
        }
    }
}

impl TryFrom<serde_json::Value> for Type {
    type Error = ParseTypeError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(name) => match name.as_str() {
                "bool" => Ok(Self::Bool),
                "number" => Ok(Self::Number),
                "string" => Ok(Self::String),
                "dynamic" => Ok(Self::Dynamic),
                _ => UnsupportedPrimitiveSnafu { name }.fail(),
            },
            serde_json::Value::Array(parts) => {
                let [serde_json::Value::String(kind), argument]: [serde_json::Value; 2] =
                    parts.try_into().map_err(|_| ParseTypeError::InvalidExpression)?
                else {
                    return InvalidExpressionSnafu.fail();
                };

                match (kind.as_str(), argument) {
                    ("list", element) => Ok(Self::list(Self::try_from(element)?)),
                    ("set", element) => Ok(Self::set(Self::try_from(element)?)),
                    ("map", element) => Ok(Self::map(Self::try_from(element)?)),
                    ("object", serde_json::Value::Object(attributes)) => attributes
                        .into_iter()
                        .map(|(name, ty)| Ok((name, Self::try_from(ty)?)))
                        .collect::<Result<BTreeMap<_, _>, ParseTypeError>>()
                        .map(Self::Object),
                    ("tuple", serde_json::Value::Array(elements)) => elements
                        .into_iter()
                        .map(Self::try_from)
                        .collect::<Result<_, _>>()
                        .map(Self::Tuple),
                    ("object", _) => InvalidArgumentSnafu {
                        kind,
                        expected: "an object of attribute types",
                    }
                    .fail(),
                    ("tuple", _) => InvalidArgumentSnafu {
                        kind,
                        expected: "an array of element types",
                    }
                    .fail(),
                    _ => UnsupportedKindSnafu { kind }.fail(),
                }
            }
            _ => InvalidExpressionSnafu.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(Type::String, json!("string"))]
    #[case(Type::list(Type::Number), json!(["list", "number"]))]
    #[case(Type::map(Type::set(Type::Bool)), json!(["map", ["set", "bool"]]))]
    #[case(
        Type::object([("name", Type::String), ("any", Type::Dynamic)]),
        json!(["object", {"any": "dynamic", "name": "string"}])
    )]
    #[case(Type::Tuple(vec![Type::String, Type::Number]), json!(["tuple", ["string", "number"]]))]
    fn json_expression(#[case] ty: Type, #[case] expected: serde_json::Value) {
        assert_eq!(serde_json::to_value(&ty).expect("serializes"), expected);
        assert_eq!(
            serde_json::from_value::<Type>(expected).expect("deserializes"),
            ty
        );
    }

    #[rstest]
    #[case(json!("float"), ParseTypeError::UnsupportedPrimitive { name: "float".to_owned() })]
    #[case(json!(["vector", "number"]), ParseTypeError::UnsupportedKind { kind: "vector".to_owned() })]
    #[case(json!(["list"]), ParseTypeError::InvalidExpression)]
    #[case(json!(42), ParseTypeError::InvalidExpression)]
    fn invalid_json_expression(#[case] input: serde_json::Value, #[case] expected: ParseTypeError) {
        assert_eq!(Type::try_from(input).expect_err("must fail"), expected);
    }

    #[rstest]
    #[case(Type::String, false)]
    #[case(Type::Dynamic, true)]
    #[case(Type::list(Type::object([("a", Type::Dynamic)])), true)]
    #[case(Type::Tuple(vec![Type::Bool, Type::Number]), false)]
    fn has_dynamic_types(#[case] ty: Type, #[case] expected: bool) {
        assert_eq!(ty.has_dynamic_types(), expected);
    }

    #[test]
    fn conformance_accepts_anything_for_dynamic() {
        let given = Type::object([("a", Type::String), ("b", Type::list(Type::Number))]);
        let want = Type::object([("a", Type::Dynamic), ("b", Type::Dynamic)]);

        assert!(given.test_conformance(&want).is_empty());
    }

    #[test]
    fn conformance_reports_every_mismatch() {
        let given = Type::object([("a", Type::String), ("extra", Type::Bool)]);
        let want = Type::object([("a", Type::Number), ("b", Type::String)]);

        let messages: Vec<String> = given
            .test_conformance(&want)
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(messages, [
            ".a: number required",
            "missing attribute \"b\"",
            "unsupported attribute \"extra\"",
        ]);
    }

    #[test]
    fn value_conformance_checks_every_element() {
        let rule = Type::object([("port", Type::Number)]);
        let value = Value::object([(
            "rule",
            Value::list(vec![
                Value::object([("port", Value::from(80_i64))]),
                Value::object([("port", Value::from("not a number"))]),
            ]),
        )]);

        let messages: Vec<String> = value
            .test_conformance(&Type::object([("rule", Type::list(rule))]))
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(messages, [".rule[1].port: number required"]);
    }

    #[test]
    fn value_conformance_checks_typed_nulls_and_empty_collections() {
        let want = Type::object([("a", Type::String), ("b", Type::list(Type::String))]);
        let value = Value::object([
            ("a", Value::null(Type::Number)),
            ("b", Value::list_empty(Type::Bool)),
        ]);

        let messages: Vec<String> = value
            .test_conformance(&want)
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(messages, [".a: string required", ".b: string required"]);
    }
}
