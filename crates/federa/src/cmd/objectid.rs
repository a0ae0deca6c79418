use federa_codec::ObjectIdGenerator;

use crate::cmd::ObjectidArgs;
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, print_table, OutputFormat};

pub fn run(args: ObjectidArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }
    let generator = ObjectIdGenerator::new();
    let ids: Vec<String> = (0..args.count).map(|_| generator.generate().to_hex()).collect();

    match format {
        OutputFormat::Json => print_json(&ids, false)?,
        OutputFormat::Table => print_table(
            &["#", "OBJECT ID"],
            ids.iter()
                .enumerate()
                .map(|(i, id)| vec![(i + 1).to_string(), id.clone()]),
        ),
        OutputFormat::Pretty | OutputFormat::Raw => {
            for id in &ids {
                println!("{id}");
            }
        }
    }
    Ok(SUCCESS)
}
