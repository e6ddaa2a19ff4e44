//! The `testing_assertions` data source.

use async_trait::async_trait;
use serde::Deserialize;
use tessera_sdk::{
    Context, Diagnostic, Diagnostics,
    object::{ObjectRead, ObjectReader, decode},
    resource::DataSource,
    schema::{Attribute, BlockType, NestedBlockType, NestingMode},
    value::{Path, Type, Value},
};
use tracing::debug;

use crate::{Client, format_value};

#[derive(Debug, Deserialize)]
struct Check {
    statement: Option<String>,
    expect: bool,
}

pub struct Assertions {
    schema: BlockType,
}

impl Assertions {
    pub fn new() -> Self {
        let statement = || Attribute::optional(Type::String);

        Self {
            schema: BlockType::new()
                .with_attribute("subject", Attribute::optional(Type::String))
                .with_block(
                    "check",
                    NestedBlockType::new(
                        NestingMode::Map,
                        BlockType::new()
                            .with_attribute("statement", statement())
                            .with_attribute("expect", Attribute::required(Type::Bool)),
                    ),
                )
                .with_block(
                    "equal",
                    NestedBlockType::new(
                        NestingMode::Map,
                        BlockType::new()
                            .with_attribute("statement", statement())
                            .with_attribute("want", Attribute::required(Type::Dynamic))
                            .with_attribute("got", Attribute::required(Type::Dynamic)),
                    ),
                ),
        }
    }
}

impl Default for Assertions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource<Client> for Assertions {
    fn schema(&self) -> &BlockType {
        &self.schema
    }

    async fn read(
        &self,
        _ctx: &Context,
        _client: &Client,
        config: ObjectReader<'_>,
    ) -> (Value, Diagnostics) {
        let mut diags = Diagnostics::new();
        let subject = config.attr("subject");
        let subject = subject.as_str().unwrap_or_default();

        for (key, check) in config.block_map("check") {
            let check: Check = match decode(&check) {
                Ok(check) => check,
                Err(error) => {
                    diags.push(Diagnostic::implementation_bug(
                        "Bug in 'testing' provider",
                        format!("The provider encountered a problem while decoding the check {key:?} block: {error}."),
                    ));
                    continue;
                }
            };
            if check.expect {
                continue;
            }

            let detail = match statement(subject, check.statement.as_deref()) {
                Some(statement) => format!("Assertion failed: {statement}."),
                None => "Assertion failed.".to_owned(),
            };
            diags.push(
                Diagnostic::error("Test failure", detail)
                    .with_path(Path::root().attr("check").key(key).attr("expect")),
            );
        }

        for (key, equal) in config.block_map("equal") {
            let want = equal.attr("want");
            let got = equal.attr("got");
            if got == want {
                continue;
            }

            let given = equal.attr("statement");
            let heading = match statement(subject, given.as_str()) {
                Some(statement) => format!("Assertion failed: {statement}."),
                None => "Assertion failed.".to_owned(),
            };
            diags.push(
                Diagnostic::error(
                    "Test failure",
                    format!(
                        "{heading}\n  Want: {}\n  Got:  {}",
                        format_value(&want, 2),
                        format_value(&got, 2),
                    ),
                )
                .with_path(Path::root().attr("equal").key(key).attr("got")),
            );
        }

        debug!(failures = diags.len(), "evaluated assertions");
        (config.object_val(), diags)
    }
}

/// Prefixes the statement of an assertion with the subject, if there is one.
fn statement(subject: &str, statement: Option<&str>) -> Option<String> {
    match (subject, statement) {
        (_, None) => None,
        ("", Some(statement)) => Some(statement.to_owned()),
        (subject, Some(statement)) => Some(format!("{subject} {statement}")),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", None, None)]
    #[case("", Some("is fine"), Some("is fine"))]
    #[case("the widget", Some("is fine"), Some("the widget is fine"))]
    #[case("the widget", None, None)]
    fn statement_with_subject(
        #[case] subject: &str,
        #[case] input: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(statement(subject, input).as_deref(), expected);
    }

    #[test]
    fn schema_is_consistent() {
        Assertions::new()
            .schema
            .internal_validate()
            .expect("valid schema");
    }
}
