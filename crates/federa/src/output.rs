use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::exit::{json_error, CliError, CliResult, DATA_INVALID};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json(value: &impl Serialize, pretty: bool) -> CliResult<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|err| json_error("failed rendering JSON", err))?;
    println!("{text}");
    Ok(())
}

pub fn print_table(header: &[&str], rows: impl IntoIterator<Item = Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Parse hex input, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.split_whitespace().collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        return Err(CliError::new(DATA_INVALID, "hex input has an odd number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::new(DATA_INVALID, format!("invalid hex at offset {i}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip_tolerates_spacing_and_prefix() {
        assert_eq!(parse_hex("0x0a ff\n10").unwrap(), vec![0x0a, 0xff, 0x10]);
        assert_eq!(to_hex(&[0x0a, 0xff, 0x10]), "0aff10");
    }

    #[test]
    fn rejects_bad_hex() {
        assert_eq!(parse_hex("abc").unwrap_err().code, DATA_INVALID);
        assert_eq!(parse_hex("zz").unwrap_err().code, DATA_INVALID);
        assert_eq!(parse_hex("é0").unwrap_err().code, DATA_INVALID);
    }
}
