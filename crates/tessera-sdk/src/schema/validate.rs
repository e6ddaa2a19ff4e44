use crate::{
    diagnostics::{Diagnostic, Diagnostics},
    schema::{Attribute, BlockType, NestedBlockType, NestingMode},
    value::{Path, Value, convert},
};

impl BlockType {
    /// Checks an object value against the schema and returns every problem found.
    ///
    /// Attributes and nested blocks are checked independently, so one invalid attribute
    /// never hides problems in its siblings. Unknown values are only checked for their
    /// type; custom validators run once the value becomes known.
    pub fn validate(&self, value: &Value) -> Diagnostics {
        let mut diags = Diagnostics::new();

        if !value.is_known() || value.is_null() {
            return diags;
        }

        let Some(entries) = value.entries() else {
            diags.push(Diagnostic::error(
                "Invalid block object",
                format!("An object value is required, but found a {}.", value.ty()),
            ));
            return diags;
        };

        for (name, attribute) in &self.attributes {
            let value = entries
                .get(name)
                .cloned()
                .unwrap_or_else(|| attribute.null());
            let path = Path::root().attr(name);
            diags.extend(attribute.validate(&value).under_path(&path));
        }

        for (name, block) in &self.nested_block_types {
            let path = Path::root().attr(name);
            let value = entries
                .get(name)
                .cloned()
                .unwrap_or_else(|| block.empty_value());
            diags.extend(block.validate(name, &value, &path));
        }

        diags
    }
}

impl Attribute {
    /// Checks a single attribute value. Diagnostics are relative to the attribute.
    pub fn validate(&self, value: &Value) -> Diagnostics {
        let mut diags = Diagnostics::new();

        if self.required && value.is_null() {
            diags.push(Diagnostic::error(
                "Missing required argument",
                "This argument is required.",
            ));
        }

        let value = match convert(value, &self.ty) {
            Ok(value) => value,
            Err(err) => {
                diags.push(
                    Diagnostic::error(
                        "Invalid argument value",
                        format!("Incorrect value type: {}.", err.message),
                    )
                    .with_path(err.path),
                );
                return diags;
            }
        };

        if diags.has_errors() || value.is_null() || !value.is_known() {
            return diags;
        }

        if let Some(validate_fn) = &self.validate_fn {
            diags.extend(validate_fn(&value));
        }

        diags
    }
}

impl NestedBlockType {
    fn validate(&self, name: &str, value: &Value, path: &Path) -> Diagnostics {
        let mut diags = Diagnostics::new();

        if !value.is_known() {
            return diags;
        }

        match self.nesting {
            NestingMode::Single => {
                diags.extend(self.content.validate(value).under_path(path));
            }
            NestingMode::List => {
                for (index, element) in value.elements().unwrap_or_default().iter().enumerate() {
                    diags.extend(self.content.validate(element).under_path(&path.index(index)));
                }
            }
            // Set elements have no stable address, so problems are reported on the set.
            NestingMode::Set => {
                for element in value.elements().unwrap_or_default() {
                    diags.extend(self.content.validate(element).under_path(path));
                }
            }
            NestingMode::Map => {
                if let Some(entries) = value.entries() {
                    for (key, element) in entries {
                        diags.extend(self.content.validate(element).under_path(&path.key(key)));
                    }
                }
            }
        }

        if self.nesting != NestingMode::Single && !value.is_null() {
            let count = value.length().unwrap_or_default();
            if count < self.min_items {
                diags.push(
                    Diagnostic::error(
                        format!("Insufficient {name} blocks"),
                        format!("At least {} \"{name}\" blocks are required.", self.min_items),
                    )
                    .with_path(path.clone()),
                );
            }
            if self.max_items > 0 && count > self.max_items {
                diags.push(
                    Diagnostic::error(
                        format!("Too many {name} blocks"),
                        format!("No more than {} \"{name}\" blocks are allowed.", self.max_items),
                    )
                    .with_path(path.clone()),
                );
            }
        }

        diags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    fn check_schema() -> BlockType {
        BlockType::new()
            .with_attribute("statement", Attribute::optional(Type::String))
            .with_attribute("expect", Attribute::required(Type::Bool))
    }

    #[test]
    fn missing_required_argument() {
        let value = Value::object([
            ("statement", Value::from("it works")),
            ("expect", Value::null(Type::Bool)),
        ]);

        let diags = check_schema().validate(&value);

        assert_eq!(diags.len(), 1);
        let diagnostic = diags.iter().next().expect("one diagnostic");
        assert_eq!(diagnostic.summary, "Missing required argument");
        assert_eq!(diagnostic.path, Path::root().attr("expect"));
    }

    #[test]
    fn incorrect_type_is_reported_and_siblings_still_checked() {
        let schema = BlockType::new()
            .with_attribute("count", Attribute::required(Type::Number))
            .with_attribute("name", Attribute::required(Type::String));
        let value = Value::object([
            ("count", Value::from("lots")),
            ("name", Value::null(Type::String)),
        ]);

        let summaries: Vec<String> = schema
            .validate(&value)
            .iter()
            .map(|diagnostic| format!("{}{}", diagnostic.summary, diagnostic.path))
            .collect();

        assert_eq!(summaries, [
            "Invalid argument value.count",
            "Missing required argument.name",
        ]);
    }

    #[test]
    fn validator_runs_on_converted_known_values_only() {
        let schema = BlockType::new().with_attribute(
            "port",
            Attribute::optional(Type::Number).with_validator(|value| {
                let mut diags = Diagnostics::new();
                if value.as_number().is_some_and(|port| port > 65535.0) {
                    diags.push(Diagnostic::error("Invalid port", "Port is out of range."));
                }
                diags
            }),
        );

        let invalid = Value::object([("port", Value::from("70000"))]);
        let unknown = Value::object([("port", Value::unknown(Type::Number))]);
        let null = Value::object([("port", Value::null(Type::Number))]);

        let diags = schema.validate(&invalid);
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags.iter().next().map(|diagnostic| diagnostic.path.to_string()),
            Some(".port".to_owned())
        );
        assert!(schema.validate(&unknown).is_empty());
        assert!(schema.validate(&null).is_empty());
    }

    #[test]
    fn list_and_map_diagnostics_are_addressed_per_element() {
        let schema = BlockType::new()
            .with_block("list", NestedBlockType::new(NestingMode::List, check_schema()))
            .with_block("map", NestedBlockType::new(NestingMode::Map, check_schema()));
        let missing = Value::object([
            ("statement", Value::null(Type::String)),
            ("expect", Value::null(Type::Bool)),
        ]);
        let value = Value::object([
            ("list", Value::list(vec![missing.clone()])),
            ("map", Value::map([("k", missing)])),
        ]);

        let paths: Vec<String> = schema
            .validate(&value)
            .iter()
            .map(|diagnostic| diagnostic.path.to_string())
            .collect();

        assert_eq!(paths, [".list[0].expect", r#".map["k"].expect"#]);
    }

    #[test]
    fn set_diagnostics_are_addressed_at_the_set() {
        let schema =
            BlockType::new().with_block("item", NestedBlockType::new(NestingMode::Set, check_schema()));
        let value = Value::object([(
            "item",
            Value::set(vec![Value::object([
                ("statement", Value::from("a")),
                ("expect", Value::null(Type::Bool)),
            ])]),
        )]);

        let diags = schema.validate(&value);

        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags.iter().next().map(|diagnostic| diagnostic.path.clone()),
            Some(Path::root().attr("item").join(&Path::root().attr("expect")))
        );
    }

    #[test]
    fn item_count_limits() {
        let schema = BlockType::new().with_block(
            "rule",
            NestedBlockType::new(NestingMode::List, check_schema())
                .with_min_items(1)
                .with_max_items(1),
        );
        let rule = Value::object([
            ("statement", Value::null(Type::String)),
            ("expect", Value::from(true)),
        ]);

        let too_few = Value::object([(
            "rule",
            Value::list_empty(check_schema().implied_type()),
        )]);
        let too_many = Value::object([("rule", Value::list(vec![rule.clone(), rule]))]);

        assert_eq!(
            schema.validate(&too_few).iter().next().map(|d| d.summary.clone()),
            Some("Insufficient rule blocks".to_owned())
        );
        assert_eq!(
            schema.validate(&too_many).iter().next().map(|d| d.summary.clone()),
            Some("Too many rule blocks".to_owned())
        );
    }

    #[test]
    fn non_object_is_rejected() {
        let diags = check_schema().validate(&Value::from("nope"));

        assert_eq!(
            diags.iter().next().map(|diagnostic| diagnostic.summary.as_str()),
            Some("Invalid block object")
        );
    }
}
