use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Debug, Serialize)]
struct BuildInfo {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    git_hash: &'static str,
    runtime: bool,
    async_codec: bool,
    float_tags: [&'static str; 2],
}

impl BuildInfo {
    fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("FEDERA_BUILD_TARGET").unwrap_or("unknown"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
            runtime: cfg!(feature = "runtime"),
            async_codec: cfg!(feature = "async"),
            float_tags: ["0x06 f32", "0x07 f64"],
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.to_string()),
            ("version", self.version.to_string()),
            ("target", self.target.to_string()),
            ("git_hash", self.git_hash.to_string()),
            ("runtime", self.runtime.to_string()),
            ("async_codec", self.async_codec.to_string()),
            ("float_tags", self.float_tags.join(", ")),
        ]
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = BuildInfo::current();
    if !args.extended {
        println!("{} {}", info.name, info.version);
        return Ok(SUCCESS);
    }

    match format {
        OutputFormat::Json => print_json(&info, false)?,
        OutputFormat::Pretty => print_json(&info, true)?,
        OutputFormat::Table => print_table(
            &["field", "value"],
            info.rows()
                .into_iter()
                .map(|(name, value)| vec![name.to_string(), value]),
        ),
        OutputFormat::Raw => {
            for (name, value) in info.rows() {
                println!("{name}: {value}");
            }
        }
    }
    Ok(SUCCESS)
}
