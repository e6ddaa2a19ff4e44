use std::collections::BTreeMap;

use crate::{
    schema::{BlockType, NestedBlockType, NestingMode},
    value::{Path, PathError, Type, Value, convert},
};

impl BlockType {
    /// Converts an object value received from outside the provider into the shape readers
    /// navigate.
    ///
    /// Attribute values are converted to their declared types and missing attributes
    /// become null. Blocks of a nested block type whose content has dynamic attributes
    /// carry no type information when decoded, so each of them is converted against the
    /// nested schema here. Every block must be a known object.
    ///
    /// Null and unknown objects become a null or unknown object of the schema's type.
    pub fn conform(&self, value: &Value) -> Result<Value, PathError> {
        self.conform_at(value, &Path::root())
    }

    fn conform_at(&self, value: &Value, path: &Path) -> Result<Value, PathError> {
        let entries = match value {
            Value::Null(_) => return Ok(self.null()),
            Value::Unknown(_) => return Ok(self.unknown()),
            Value::Object(entries) | Value::Map(_, entries) => entries,
            value => {
                return Err(PathError::new(
                    path.clone(),
                    format!("object required, found a {}", value.ty()),
                ));
            }
        };

        if let Some(name) = entries.keys().find(|name| {
            !self.attributes.contains_key(*name) && !self.nested_block_types.contains_key(*name)
        }) {
            return Err(PathError::new(
                path.clone(),
                format!("unsupported attribute {name:?}"),
            ));
        }

        let mut values = BTreeMap::new();

        for (name, attribute) in &self.attributes {
            let value = match entries.get(name) {
                Some(value) => convert(value, &attribute.ty).map_err(|err| {
                    PathError::new(path.attr(name).join(&err.path), err.message)
                })?,
                None => attribute.null(),
            };
            values.insert(name.clone(), value);
        }

        for (name, block) in &self.nested_block_types {
            let value = match entries.get(name) {
                Some(value) => block.conform(value, &path.attr(name))?,
                None => block.empty_value(),
            };
            values.insert(name.clone(), value);
        }

        Ok(Value::Object(values))
    }
}

impl NestedBlockType {
    fn conform(&self, value: &Value, path: &Path) -> Result<Value, PathError> {
        let content = &self.content;
        let dynamic = self.implied_type() == Type::Dynamic;

        match (self.nesting, value) {
            (NestingMode::Single, value) => content.conform_at(value, path),
            (_, Value::Unknown(_)) => Ok(Value::Unknown(self.implied_type())),
            (_, Value::Null(_)) => Ok(Value::Null(self.implied_type())),
            (NestingMode::List, Value::List(_, elements) | Value::Tuple(elements)) => {
                let elements = elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| self.conform_block(element, &path.index(index)))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(match (elements.is_empty(), dynamic) {
                    (true, _) => self.empty_value(),
                    (false, true) => Value::Tuple(elements),
                    (false, false) => Value::List(content.implied_type(), elements),
                })
            }
            // Set elements have no stable address, so problems are reported on the set.
            (
                NestingMode::Set,
                Value::Set(_, elements) | Value::List(_, elements) | Value::Tuple(elements),
            ) => {
                let elements = elements
                    .iter()
                    .map(|element| self.conform_block(element, path))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Value::set_of(content.implied_type(), elements))
            }
            (NestingMode::Map, Value::Map(_, entries) | Value::Object(entries)) => {
                let entries = entries
                    .iter()
                    .map(|(key, element)| {
                        Ok((key.clone(), self.conform_block(element, &path.key(key))?))
                    })
                    .collect::<Result<BTreeMap<_, _>, PathError>>()?;

                Ok(match (entries.is_empty(), dynamic) {
                    (true, _) => self.empty_value(),
                    (false, true) => Value::Object(entries),
                    (false, false) => Value::Map(content.implied_type(), entries),
                })
            }
            (nesting, value) => Err(PathError::new(
                path.clone(),
                format!("{nesting} blocks required, found a {}", value.ty()),
            )),
        }
    }

    fn conform_block(&self, value: &Value, path: &Path) -> Result<Value, PathError> {
        match value {
            Value::Null(_) => Err(PathError::new(path.clone(), "a block must not be null")),
            Value::Unknown(_) => Err(PathError::new(path.clone(), "a block must be known")),
            value => self.content.conform_at(value, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::schema::Attribute;

    fn equal_block() -> BlockType {
        BlockType::new()
            .with_attribute("statement", Attribute::optional(Type::String))
            .with_attribute("got", Attribute::required(Type::Dynamic))
    }

    fn schema() -> BlockType {
        BlockType::new()
            .with_attribute("count", Attribute::optional(Type::Number))
            .with_block("equal", NestedBlockType::new(NestingMode::Map, equal_block()))
            .with_block(
                "rule",
                NestedBlockType::new(
                    NestingMode::List,
                    BlockType::new().with_attribute("port", Attribute::required(Type::Number)),
                ),
            )
    }

    #[test]
    fn converts_dynamic_blocks_against_their_schema() {
        let value = Value::object([
            ("count", Value::from("3")),
            (
                "equal",
                Value::object([("a", Value::object([("got", Value::from(true))]))]),
            ),
        ]);

        let conformed = schema().conform(&value).expect("conforms");

        assert_eq!(conformed.attr("count"), Some(Value::from(3_i64)));
        assert_eq!(
            conformed.attr("equal"),
            Some(Value::object([(
                "a",
                Value::object([
                    ("got", Value::from(true)),
                    ("statement", Value::null(Type::String)),
                ]),
            )]))
        );
        assert_eq!(
            conformed.attr("rule"),
            Some(Value::list_empty(Type::object([("port", Type::Number)])))
        );
    }

    #[rstest]
    #[case::block_is_a_string(
        Value::object([("equal", Value::object([("x", Value::from("oops"))]))]),
        r#".equal["x"]: object required, found a string"#
    )]
    #[case::block_is_unknown(
        Value::object([(
            "rule",
            Value::tuple(vec![Value::unknown(Type::object([("port", Type::Number)]))]),
        )]),
        ".rule[0]: a block must be known"
    )]
    #[case::attribute_cannot_convert(
        Value::object([(
            "rule",
            Value::tuple(vec![Value::object([("port", Value::from("eighty"))])]),
        )]),
        ".rule[0].port: a number is required"
    )]
    #[case::undeclared_attribute(
        Value::object([("colour", Value::from("red"))]),
        r#"unsupported attribute "colour""#
    )]
    #[case::not_an_object(Value::from(1_i64), "object required, found a number")]
    fn rejects_nonconforming_objects(#[case] value: Value, #[case] expected: &str) {
        let error = schema().conform(&value).expect_err("must not conform");

        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn keeps_null_and_unknown_objects() {
        let schema = schema();

        assert_eq!(schema.conform(&Value::null(Type::Dynamic)), Ok(schema.null()));
        assert_eq!(schema.conform(&Value::unknown(Type::Dynamic)), Ok(schema.unknown()));
    }
}
