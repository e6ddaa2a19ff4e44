use std::collections::BTreeMap;

use crate::{
    schema::{BlockType, NestedBlockType, NestingMode},
    value::{Type, Value},
};

impl BlockType {
    /// Fills in the null attributes of `given`, recursing into nested blocks.
    ///
    /// A null computed attribute becomes unknown, so the provider can decide its value
    /// later. Any other null attribute takes its default, or stays null if it has none.
    /// Null single blocks stay null. Applying defaults to its own result changes nothing.
    ///
    /// Null and unknown objects are returned unchanged.
    pub fn apply_defaults(&self, given: &Value) -> Value {
        let Some(entries) = given.entries() else {
            return given.clone();
        };

        let mut values = BTreeMap::new();

        for (name, attribute) in &self.attributes {
            let value = match entries.get(name) {
                Some(value) if !value.is_null() => value.clone(),
                _ if attribute.computed => attribute.unknown(),
                _ => attribute.default_value(),
            };
            values.insert(name.clone(), value);
        }

        for (name, block) in &self.nested_block_types {
            let value = entries
                .get(name)
                .cloned()
                .unwrap_or_else(|| block.empty_value());
            values.insert(name.clone(), block.apply_defaults(value));
        }

        Value::Object(values)
    }
}

impl NestedBlockType {
    fn apply_defaults(&self, value: Value) -> Value {
        if !value.is_known() {
            return value;
        }

        let content = &self.content;
        let element_ty = content.implied_type();
        let dynamic = self.implied_type() == Type::Dynamic;

        match self.nesting {
            NestingMode::Single if value.is_null() => value,
            NestingMode::Single => content.apply_defaults(&value),
            _ if value.is_null() => self.empty_value(),
            NestingMode::List => {
                let elements: Vec<Value> = value
                    .elements()
                    .unwrap_or_default()
                    .iter()
                    .map(|element| content.apply_defaults(element))
                    .collect();

                match (elements.is_empty(), dynamic) {
                    (true, _) => self.empty_value(),
                    (false, true) => Value::Tuple(elements),
                    (false, false) => Value::List(element_ty, elements),
                }
            }
            NestingMode::Set => {
                let elements: Vec<Value> = value
                    .elements()
                    .unwrap_or_default()
                    .iter()
                    .map(|element| content.apply_defaults(element))
                    .collect();

                Value::set_of(element_ty, elements)
            }
            NestingMode::Map => {
                let entries: BTreeMap<String, Value> = value
                    .entries()
                    .map(|entries| {
                        entries
                            .iter()
                            .map(|(key, element)| (key.clone(), content.apply_defaults(element)))
                            .collect()
                    })
                    .unwrap_or_default();

                match (entries.is_empty(), dynamic) {
                    (true, _) => self.empty_value(),
                    (false, true) => Value::Object(entries),
                    (false, false) => Value::Map(element_ty, entries),
                }
            }
        }
    }
}
