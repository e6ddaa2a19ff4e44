//! Self-describing encodings of values exchanged with the orchestrator.
//!
//! Values are carried as JSON (or YAML, which maps onto the same data model) and decoded
//! with the help of the expected [`Type`]:
//!
//! - null is `null` and an unknown value is the marker object `{"$unknown": true}`,
//! - a value at a dynamically typed position carries its type: `{"value": .., "type": ..}`,
//! - object attributes missing from the document decode as null,
//! - a collection whose type leaves the element type dynamic records no element type, so
//!   it decodes with the common type of its elements (or stays dynamic if they differ).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use snafu::{ResultExt, Snafu};

use crate::value::{Path, PathError, Type, Value};

const UNKNOWN_MARKER: &str = "$unknown";
const DYNAMIC_VALUE: &str = "value";
const DYNAMIC_TYPE: &str = "type";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse YAML document"))]
    ParseYaml { source: serde_yaml::Error },

    #[snafu(display("failed to serialize YAML document"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("invalid value: {source}"))]
    InvalidValue { source: PathError },
}

/// An encoded value in one of the supported encodings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicValue {
    Json(Json),
    Yaml(String),
}

impl DynamicValue {
    pub fn decode(&self, ty: &Type) -> Result<Value, Error> {
        match self {
            Self::Json(json) => from_json(json, ty),
            Self::Yaml(text) => {
                let json: Json = serde_yaml::from_str(text).context(ParseYamlSnafu)?;
                from_json(&json, ty)
            }
        }
    }

    pub fn encode_json(value: &Value, ty: &Type) -> Result<Self, Error> {
        to_json(value, ty).map(Self::Json)
    }

    pub fn encode_yaml(value: &Value, ty: &Type) -> Result<Self, Error> {
        let json = to_json(value, ty)?;
        serde_yaml::to_string(&json)
            .context(SerializeYamlSnafu)
            .map(Self::Yaml)
    }
}

/// Decodes a JSON document into a value of type `ty`.
pub fn from_json(json: &Json, ty: &Type) -> Result<Value, Error> {
    decode_at(json, ty, &Path::root()).context(InvalidValueSnafu)
}

/// Encodes a value of type `ty` so that [`from_json`] with the same type reproduces it.
///
/// The one exception is a list, set or map declared with a dynamic element type: the
/// declared element type is not written, and decoding infers it from the elements.
pub fn to_json(value: &Value, ty: &Type) -> Result<Json, Error> {
    encode_at(value, ty, &Path::root()).context(InvalidValueSnafu)
}

/// Converts a value into plain JSON without type information. Unknown values become
/// `null` and whole numbers become JSON integers.
pub fn to_plain_json(value: &Value) -> Json {
    match value {
        Value::Null(_) | Value::Unknown(_) => Json::Null,
        Value::Bool(flag) => Json::Bool(*flag),
        Value::Number(number) => number_json(*number).unwrap_or(Json::Null),
        Value::String(text) => Json::String(text.clone()),
        Value::List(_, elements) | Value::Set(_, elements) | Value::Tuple(elements) => {
            Json::Array(elements.iter().map(to_plain_json).collect())
        }
        Value::Map(_, entries) | Value::Object(entries) => Json::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), to_plain_json(value)))
                .collect(),
        ),
    }
}

fn decode_at(json: &Json, ty: &Type, path: &Path) -> Result<Value, PathError> {
    if json.is_null() {
        return Ok(Value::Null(ty.clone()));
    }
    if is_unknown_marker(json) {
        return Ok(Value::Unknown(ty.clone()));
    }

    match (ty, json) {
        (Type::Dynamic, json) => decode_dynamic(json, path),
        (Type::Bool, Json::Bool(flag)) => Ok(Value::Bool(*flag)),
        (Type::Number, Json::Number(number)) => number
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| PathError::new(path.clone(), "number is out of range")),
        (Type::String, Json::String(text)) => Ok(Value::String(text.clone())),
        (Type::List(element) | Type::Set(element), Json::Array(items)) => {
            let elements = items
                .iter()
                .enumerate()
                .map(|(index, item)| decode_at(item, element, &path.index(index)))
                .collect::<Result<Vec<_>, _>>()?;
            let element = concrete_element_type(element, &elements);

            Ok(match ty {
                Type::Set(_) => Value::set_of(element, elements),
                _ => Value::List(element, elements),
            })
        }
        (Type::Map(element), Json::Object(entries)) => {
            let entries = entries
                .iter()
                .map(|(key, item)| Ok((key.clone(), decode_at(item, element, &path.key(key))?)))
                .collect::<Result<BTreeMap<_, _>, PathError>>()?;
            let element = concrete_element_type(element, entries.values());

            Ok(Value::Map(element, entries))
        }
        (Type::Object(attributes), Json::Object(entries)) => {
            if let Some(name) = entries.keys().find(|name| !attributes.contains_key(*name)) {
                return Err(PathError::new(
                    path.clone(),
                    format!("unsupported attribute {name:?}"),
                ));
            }

            attributes
                .iter()
                .map(|(name, ty)| {
                    let value = match entries.get(name) {
                        Some(item) => decode_at(item, ty, &path.attr(name))?,
                        None => Value::Null(ty.clone()),
                    };
                    Ok((name.clone(), value))
                })
                .collect::<Result<_, PathError>>()
                .map(Value::Object)
        }
        (Type::Tuple(types), Json::Array(items)) if types.len() == items.len() => types
            .iter()
            .zip(items)
            .enumerate()
            .map(|(index, (ty, item))| decode_at(item, ty, &path.index(index)))
            .collect::<Result<_, _>>()
            .map(Value::Tuple),
        _ => Err(PathError::new(path.clone(), format!("{ty} required"))),
    }
}

/// Decodes a value at a dynamically typed position, either from the typed wrapper object
/// or by inferring the type from the JSON itself.
fn decode_dynamic(json: &Json, path: &Path) -> Result<Value, PathError> {
    match json {
        Json::Object(entries) if is_typed_wrapper(entries) => {
            let ty = Type::try_from(entries[DYNAMIC_TYPE].clone()).map_err(|err| {
                PathError::new(path.clone(), format!("invalid type expression: {err}"))
            })?;
            decode_at(&entries[DYNAMIC_VALUE], &ty, path)
        }
        Json::Bool(flag) => Ok(Value::Bool(*flag)),
        Json::Number(_) => decode_at(json, &Type::Number, path),
        Json::String(text) => Ok(Value::String(text.clone())),
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| decode_at(item, &Type::Dynamic, &path.index(index)))
            .collect::<Result<_, _>>()
            .map(Value::Tuple),
        Json::Object(entries) => entries
            .iter()
            .map(|(name, item)| Ok((name.clone(), decode_at(item, &Type::Dynamic, &path.attr(name))?)))
            .collect::<Result<_, PathError>>()
            .map(Value::Object),
        Json::Null => Ok(Value::Null(Type::Dynamic)),
    }
}

fn encode_at(value: &Value, ty: &Type, path: &Path) -> Result<Json, PathError> {
    match (ty, value) {
        (Type::Dynamic, Value::Null(Type::Dynamic)) => Ok(Json::Null),
        (Type::Dynamic, Value::Unknown(Type::Dynamic)) => Ok(unknown_marker()),
        (Type::Dynamic, value) => {
            let actual = value.ty();
            let mut wrapper = Map::new();
            wrapper.insert(DYNAMIC_VALUE.to_owned(), encode_at(value, &actual, path)?);
            wrapper.insert(DYNAMIC_TYPE.to_owned(), Json::from(actual));
            Ok(Json::Object(wrapper))
        }
        (_, Value::Null(_)) => Ok(Json::Null),
        (_, Value::Unknown(_)) => Ok(unknown_marker()),
        (Type::Bool, Value::Bool(flag)) => Ok(Json::Bool(*flag)),
        (Type::Number, Value::Number(number)) => number_json(*number)
            .ok_or_else(|| PathError::new(path.clone(), "number must be finite")),
        (Type::String, Value::String(text)) => Ok(Json::String(text.clone())),
        (Type::List(element) | Type::Set(element), Value::List(_, items) | Value::Set(_, items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| encode_at(item, element, &path.index(index)))
            .collect::<Result<_, _>>()
            .map(Json::Array),
        (Type::Map(element), Value::Map(_, entries)) => entries
            .iter()
            .map(|(key, item)| Ok((key.clone(), encode_at(item, element, &path.key(key))?)))
            .collect::<Result<_, PathError>>()
            .map(Json::Object),
        (Type::Object(attributes), Value::Object(entries)) => {
            if let Some(name) = entries.keys().find(|name| !attributes.contains_key(*name)) {
                return Err(PathError::new(
                    path.clone(),
                    format!("unsupported attribute {name:?}"),
                ));
            }

            attributes
                .iter()
                .map(|(name, ty)| {
                    let item = match entries.get(name) {
                        Some(item) => encode_at(item, ty, &path.attr(name))?,
                        None => Json::Null,
                    };
                    Ok((name.clone(), item))
                })
                .collect::<Result<_, PathError>>()
                .map(Json::Object)
        }
        (Type::Tuple(types), Value::Tuple(items)) if types.len() == items.len() => types
            .iter()
            .zip(items)
            .enumerate()
            .map(|(index, (ty, item))| encode_at(item, ty, &path.index(index)))
            .collect::<Result<_, _>>()
            .map(Json::Array),
        _ => Err(PathError::new(path.clone(), format!("{ty} required"))),
    }
}

/// Whole numbers within the exactly representable range become JSON integers. Non-finite
/// numbers have no JSON representation.
fn number_json(number: f64) -> Option<Json> {
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        Some(Json::from(number as i64))
    } else {
        serde_json::Number::from_f64(number).map(Json::Number)
    }
}

/// A collection declared with a dynamic element type takes the common type of its
/// elements. Mixed or absent elements leave it dynamic.
fn concrete_element_type<'a>(want: &Type, elements: impl IntoIterator<Item = &'a Value>) -> Type {
    if *want != Type::Dynamic {
        return want.clone();
    }

    let mut types = elements.into_iter().map(Value::ty);
    match types.next() {
        Some(first) if types.all(|ty| ty == first) => first,
        _ => Type::Dynamic,
    }
}

fn is_unknown_marker(json: &Json) -> bool {
    matches!(json, Json::Object(entries) if entries.len() == 1 && entries.get(UNKNOWN_MARKER) == Some(&Json::Bool(true)))
}

fn is_typed_wrapper(entries: &Map<String, Json>) -> bool {
    entries.len() == 2 && entries.contains_key(DYNAMIC_VALUE) && entries.contains_key(DYNAMIC_TYPE)
}

fn unknown_marker() -> Json {
    let mut marker = Map::new();
    marker.insert(UNKNOWN_MARKER.to_owned(), Json::Bool(true));
    Json::Object(marker)
}
