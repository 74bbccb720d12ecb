use std::path::PathBuf;

use clap::Parser;

pub const BINARY_NAME: &str = "hookproxy";

#[derive(Debug, Parser)]
#[clap(name = BINARY_NAME, about = "Node-local HTTP interception proxy", long_about = None)]
pub struct Cli {
    /// Explicit config file. Falls back to `HOOKPROXY_CONFIG`, then
    /// `./hookproxy.toml`.
    #[clap(short = 'c', long = "config", value_parser, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Raise the default log level from `info` to `debug`. Overridden by
    /// `RUST_LOG` if that's set.
    #[clap(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    /// Print the configuration file's JSON schema to stdout and exit,
    /// without loading or validating any configuration.
    #[clap(long = "print-schema", action)]
    pub print_schema: bool,
}
