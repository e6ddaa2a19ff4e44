//! Human readable rendering of values for assertion failures.
//!
//! The output resembles configuration language syntax and wraps collections whose type
//! would otherwise be ambiguous in conversion calls such as `tolist(..)`.

use std::fmt::Write as _;

use tessera_sdk::value::Value;

/// Formats `value` for display at the given indentation, in spaces. The first line is not
/// indented; nested lines are.
pub fn format_value(value: &Value, indent: usize) -> String {
    match value {
        Value::Null(_) => "null".to_owned(),
        // Unknown values should never reach an assertion, but are rendered rather than
        // rejected.
        Value::Unknown(_) => "(unknown)".to_owned(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote(text),
        Value::Object(attributes) => format_entries(attributes, indent),
        Value::Map(_, entries) => format!("tomap({})", format_entries(entries, indent)),
        Value::Tuple(elements) => format_elements(elements, indent),
        Value::List(_, elements) => format!("tolist({})", format_elements(elements, indent)),
        Value::Set(_, elements) => format!("toset({})", format_elements(elements, indent)),
    }
}

fn format_entries<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a Value)>,
    indent: usize,
) -> String {
    let mut out = String::from("{");
    let mut empty = true;
    for (key, value) in entries {
        empty = false;
        let _ = write!(
            out,
            "\n{:pad$}{} = {}",
            "",
            quote(key),
            format_value(value, indent + 2),
            pad = indent + 2
        );
    }
    if !empty {
        let _ = write!(out, "\n{:indent$}", "");
    }
    out.push('}');
    out
}

fn format_elements(elements: &[Value], indent: usize) -> String {
    if elements.is_empty() {
        return "[]".to_owned();
    }

    let mut out = String::from("[");
    for element in elements {
        let _ = write!(
            out,
            "\n{:pad$}{},",
            "",
            format_value(element, indent + 2),
            pad = indent + 2
        );
    }
    let _ = write!(out, "\n{:indent$}]", "");
    out
}

fn quote(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;
    use tessera_sdk::value::Type;

    use super::*;

    #[rstest]
    #[case::null(Value::null(Type::Dynamic), "null")]
    #[case::unknown(Value::unknown(Type::Dynamic), "(unknown)")]
    #[case::empty_string(Value::from(""), r#""""#)]
    #[case::string(Value::from("hello"), r#""hello""#)]
    #[case::newline(Value::from("hello\nworld"), r#""hello\nworld""#)]
    #[case::zero(Value::from(0_i64), "0")]
    #[case::integer(Value::from(5_i64), "5")]
    #[case::float(Value::from(5.2), "5.2")]
    #[case::no(Value::from(false), "false")]
    #[case::yes(Value::from(true), "true")]
    #[case::empty_object(Value::empty_object(), "{}")]
    #[case::empty_map(Value::map_empty(Type::String), "tomap({})")]
    #[case::empty_tuple(Value::empty_tuple(), "[]")]
    #[case::empty_list(Value::list_empty(Type::String), "tolist([])")]
    #[case::empty_set(Value::set_empty(Type::String), "toset([])")]
    fn scalars_and_empty_collections(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(format_value(&value, 0), expected);
    }

    #[rstest]
    #[case::object(
        Value::object([("a", Value::from("b")), ("c", Value::from("d"))]),
        indoc! {r#"
            {
              "a" = "b"
              "c" = "d"
            }"#}
    )]
    #[case::tuple(
        Value::tuple(vec![Value::from("b"), Value::from("d")]),
        indoc! {r#"
            [
              "b",
              "d",
            ]"#}
    )]
    #[case::list_of_maps(
        Value::list(vec![Value::map([("k", Value::from(1_i64))])]),
        indoc! {r#"
            tolist([
              tomap({
                "k" = 1
              }),
            ])"#}
    )]
    fn collections(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(format_value(&value, 0), expected);
    }

    #[test]
    fn nested_lines_are_indented() {
        let value = Value::object([("a", Value::from("b"))]);

        assert_eq!(format_value(&value, 2), "{\n    \"a\" = \"b\"\n  }");
    }
}
