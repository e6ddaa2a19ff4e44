use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};

use crate::{encoding::to_plain_json, object::ObjectRead};

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("failed to deserialize object value"))]
    Deserialize { source: serde_json::Error },
}

/// Deserializes the object behind a reader into a Rust type.
///
/// Unknown values are seen as null, so optional fields should be [`Option`]s.
pub fn decode<T, R>(reader: &R) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
    R: ObjectRead + ?Sized,
{
    serde_json::from_value(to_plain_json(&reader.object_val())).context(DeserializeSnafu)
}
