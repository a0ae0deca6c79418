use federa_codec::{Decompressor, Value};

use crate::cmd::DecodeArgs;
use crate::exit::{codec_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = crate::output::parse_hex(&args.hex)?;
    let map = Decompressor::new()
        .decode_slice(&bytes)
        .map_err(|err| codec_error("decode failed", err))?;

    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&Value::Map(map), false)?,
        OutputFormat::Pretty => print_json(&Value::Map(map), true)?,
        OutputFormat::Table => {
            let mut rows = Vec::with_capacity(map.len());
            for (name, value) in &map {
                let rendered = serde_json::to_string(value)
                    .map_err(|err| crate::exit::json_error("failed rendering JSON", err))?;
                rows.push(vec![name.clone(), rendered]);
            }
            print_table(&["PROPERTY", "VALUE"], rows);
        }
    }
    Ok(SUCCESS)
}
