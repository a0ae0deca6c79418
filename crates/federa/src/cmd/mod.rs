use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod inspect;
pub mod objectid;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress a JSON object and print the bytes as hex.
    Encode(EncodeArgs),
    /// Decompress hex bytes and print the value.
    Decode(DecodeArgs),
    /// Decode a compressed packet and print its messages.
    Inspect(InspectArgs),
    /// Print fresh object identifiers.
    Objectid(ObjectidArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Objectid(args) => objectid::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// JSON object to encode. `{"$id": "<24 hex digits>"}` is an object reference.
    pub json: String,
    /// Encode a second time with the dictionaries warmed by the first pass.
    #[arg(long)]
    pub twice: bool,
    /// Write floats as 8-byte doubles.
    #[arg(long)]
    pub double: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Compressed bytes as hex.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Compressed `{p: payload}` packet as hex.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct ObjectidArgs {
    /// Number of identifiers to print.
    #[arg(long, default_value = "1")]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
