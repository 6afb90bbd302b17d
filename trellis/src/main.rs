use anyhow::Result;
use clap::Parser;
use trellis::cli::{normalize_args, Cli};
use trellis::commands::run;

fn main() -> Result<()> {
    let args = normalize_args(std::env::args());
    let cli = Cli::parse_from(args);
    run::execute(cli)
}
