use federa_codec::{CodecConfig, Compressor, FloatWidth, ObjectId, Value, ValueMap};
use serde::Serialize;
use serde_json::Value as Json;

use crate::cmd::EncodeArgs;
use crate::exit::{codec_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, print_raw, print_table, to_hex, OutputFormat};

/// Key marking a JSON object as an object reference.
pub const OBJECT_KEY: &str = "$id";

#[derive(Serialize)]
struct EncodeOutput {
    hex: String,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    warm_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warm_size: Option<usize>,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let json: Json = serde_json::from_str(&args.json)
        .map_err(|err| CliError::new(USAGE, format!("input is not valid JSON: {err}")))?;
    let Value::Map(map) = from_json(&json)? else {
        return Err(CliError::new(USAGE, "input must be a JSON object"));
    };

    let float_width = if args.double {
        FloatWidth::Double
    } else {
        FloatWidth::Single
    };
    let mut compressor = Compressor::with_config(CodecConfig {
        float_width,
        ..CodecConfig::default()
    });
    let cold = compressor
        .encode(&map)
        .map_err(|err| codec_error("encode failed", err))?;
    let warm = if args.twice {
        Some(
            compressor
                .encode(&map)
                .map_err(|err| codec_error("encode failed", err))?,
        )
    } else {
        None
    };

    match format {
        OutputFormat::Json | OutputFormat::Pretty => {
            let out = EncodeOutput {
                hex: to_hex(&cold),
                size: cold.len(),
                warm_hex: warm.as_deref().map(to_hex),
                warm_size: warm.as_ref().map(|bytes| bytes.len()),
            };
            print_json(&out, matches!(format, OutputFormat::Pretty))?;
        }
        OutputFormat::Table => {
            let mut rows = vec![vec!["cold".to_string(), cold.len().to_string(), to_hex(&cold)]];
            if let Some(warm) = &warm {
                rows.push(vec!["warm".to_string(), warm.len().to_string(), to_hex(warm)]);
            }
            print_table(&["PASS", "SIZE", "HEX"], rows);
        }
        OutputFormat::Raw => {
            print_raw(&cold);
            if let Some(warm) = &warm {
                print_raw(warm);
            }
        }
    }
    Ok(SUCCESS)
}

/// Convert JSON input into a wire value.
///
/// Whole numbers become integers and everything else a float. A single-key
/// object `{"$id": "<hex>"}` becomes an object reference.
pub fn from_json(json: &Json) -> CliResult<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => match n.as_u64() {
                Some(u) => Value::Int(i64::try_from(u).map_err(|_| {
                    CliError::new(USAGE, format!("integer {u} is out of range"))
                })?),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(from_json).collect::<CliResult<_>>()?),
        Json::Object(fields) => {
            if let (1, Some(id)) = (fields.len(), fields.get(OBJECT_KEY)) {
                let hex = id
                    .as_str()
                    .ok_or_else(|| CliError::new(USAGE, format!("{OBJECT_KEY} must be a hex string")))?;
                let id: ObjectId = hex
                    .parse()
                    .map_err(|err| codec_error("invalid object reference", err))?;
                return Ok(Value::Object(id));
            }
            let map = fields
                .iter()
                .map(|(key, value)| Ok((key.clone(), from_json(value)?)))
                .collect::<CliResult<ValueMap>>()?;
            Value::Map(map)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Value {
        from_json(&serde_json::from_str(text).unwrap()).unwrap()
    }

    #[test]
    fn numbers_split_into_ints_and_floats() {
        assert_eq!(parse("5"), Value::Int(5));
        assert_eq!(parse("-5"), Value::Int(-5));
        assert_eq!(parse("1.5"), Value::Float(1.5));
    }

    #[test]
    fn id_objects_become_references() {
        let value = parse(r#"{"$id": "000102030405060708090a0b"}"#);
        assert_eq!(
            value,
            Value::Object(ObjectId::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]))
        );
        assert!(matches!(parse(r#"{"$id": "x", "other": 1}"#), Value::Map(_)));
    }

    #[test]
    fn bad_references_are_rejected() {
        let json = serde_json::from_str(r#"{"$id": "abc"}"#).unwrap();
        assert!(from_json(&json).is_err());
    }
}
