use std::collections::BTreeMap;

use crate::value::{Path, PathError, Type, Value};

/// Converts `value` so that it conforms to `want`, applying the standard coercions.
///
/// Primitive values convert between strings and numbers or bools where the string has a
/// suitable form. Collections convert element-wise: lists, sets and tuples into lists or
/// sets, maps and objects into maps or objects, lists and tuples into tuples of the same
/// length. Null and unknown values become null or unknown values of `want`. A dynamic
/// `want` accepts the value unchanged.
///
/// The returned error is located at the innermost element that could not be converted.
pub fn convert(value: &Value, want: &Type) -> Result<Value, PathError> {
    convert_at(value, want, &Path::root())
}

fn convert_at(value: &Value, want: &Type, path: &Path) -> Result<Value, PathError> {
    if *want == Type::Dynamic {
        return Ok(value.clone());
    }

    match value {
        Value::Null(ty) | Value::Unknown(ty) if !conversion_exists(ty, want) => {
            return Err(PathError::new(path.clone(), format!("{want} required")));
        }
        Value::Null(_) => return Ok(Value::Null(want.clone())),
        Value::Unknown(_) => return Ok(Value::Unknown(want.clone())),
        _ => {}
    }

    match (want, value) {
        (Type::Bool, Value::Bool(_))
        | (Type::Number, Value::Number(_))
        | (Type::String, Value::String(_)) => Ok(value.clone()),
        (Type::String, Value::Number(number)) => Ok(Value::String(number.to_string())),
        (Type::String, Value::Bool(flag)) => Ok(Value::String(flag.to_string())),
        (Type::Number, Value::String(text)) => text
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(Value::Number)
            .ok_or_else(|| PathError::new(path.clone(), "a number is required")),
        (Type::Bool, Value::String(text)) => match text.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(PathError::new(path.clone(), "a bool is required")),
        },
        (
            Type::List(element) | Type::Set(element),
            Value::List(_, elements) | Value::Set(_, elements) | Value::Tuple(elements),
        ) => {
            let elements = elements
                .iter()
                .enumerate()
                .map(|(index, value)| convert_at(value, element, &path.index(index)))
                .collect::<Result<Vec<_>, _>>()?;
            let element = unify_element_type(element, elements.iter(), path)?;

            Ok(match want {
                Type::Set(_) => Value::set_of(element, elements),
                _ => Value::List(element, elements),
            })
        }
        (Type::Map(element), Value::Map(_, entries) | Value::Object(entries)) => {
            let entries = entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), convert_at(value, element, &path.key(key))?)))
                .collect::<Result<BTreeMap<_, _>, PathError>>()?;
            let element = unify_element_type(element, entries.values(), path)?;

            Ok(Value::Map(element, entries))
        }
        (Type::Object(attributes), Value::Object(entries) | Value::Map(_, entries)) => attributes
            .iter()
            .map(|(name, ty)| match entries.get(name) {
                Some(value) => Ok((name.clone(), convert_at(value, ty, &path.attr(name))?)),
                None => Err(PathError::new(
                    path.clone(),
                    format!("attribute {name:?} is required"),
                )),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Object),
        (Type::Tuple(types), Value::Tuple(elements) | Value::List(_, elements)) => {
            if types.len() != elements.len() {
                return Err(PathError::new(
                    path.clone(),
                    format!("tuple required with {} elements", types.len()),
                ));
            }

            types
                .iter()
                .zip(elements)
                .enumerate()
                .map(|(index, (ty, value))| convert_at(value, ty, &path.index(index)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Tuple)
        }
        _ => Err(PathError::new(path.clone(), format!("{want} required"))),
    }
}

/// Determines the element type of a converted collection. A dynamic element type is
/// replaced by the common type of all elements.
fn unify_element_type<'a>(
    want: &Type,
    mut elements: impl Iterator<Item = &'a Value>,
    path: &Path,
) -> Result<Type, PathError> {
    if *want != Type::Dynamic {
        return Ok(want.clone());
    }

    let Some(first) = elements.next() else {
        return Ok(Type::Dynamic);
    };

    let ty = first.ty();
    if elements.all(|value| value.ty() == ty) {
        Ok(ty)
    } else {
        Err(PathError::new(
            path.clone(),
            "all elements must have the same type",
        ))
    }
}

/// Returns `true` if values of type `from` can in principle be converted to `to`.
fn conversion_exists(from: &Type, to: &Type) -> bool {
    match (from, to) {
        (Type::Dynamic, _) | (_, Type::Dynamic) => true,
        (from, to) if from == to => true,
        (Type::String, Type::Number | Type::Bool) | (Type::Number | Type::Bool, Type::String) => {
            true
        }
        (Type::List(from) | Type::Set(from), Type::List(to) | Type::Set(to))
        | (Type::Map(from), Type::Map(to)) => conversion_exists(from, to),
        (Type::List(from), Type::Tuple(to)) => to.iter().all(|to| conversion_exists(from, to)),
        (Type::Tuple(from), Type::List(to) | Type::Set(to)) => {
            from.iter().all(|from| conversion_exists(from, to))
        }
        (Type::Tuple(from), Type::Tuple(to)) => {
            from.len() == to.len() && from.iter().zip(to).all(|(from, to)| conversion_exists(from, to))
        }
        (Type::Object(from), Type::Map(to)) => from.values().all(|from| conversion_exists(from, to)),
        (Type::Map(from), Type::Object(to)) => to.values().all(|to| conversion_exists(from, to)),
        (Type::Object(from), Type::Object(to)) => to.iter().all(|(name, to)| {
            from.get(name)
                .is_some_and(|from| conversion_exists(from, to))
        }),
        _ => false,
    }
}
