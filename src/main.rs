use clap::Parser;
use rangescan::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
