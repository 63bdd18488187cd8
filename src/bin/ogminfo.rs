//! Lists the streams of OGM files.

use anyhow::Context;
use clap::Parser;
use ogmkit::config::Config;
use ogmkit::format::ogm::info::{InfoOptions, Inspector};
use ogmkit::format::ogm::stream::OgmReader;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ogminfo")]
#[command(version)]
#[command(about = "Prints the streams, comments and packets of OGM files")]
struct Args {
    /// Input files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Comments at -v, every packet at -vv, full stream headers at -vvv
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the size, bitrate and length of every stream
    #[arg(short, long)]
    summary: bool,

    /// Flag packets whose timestamps go backwards
    #[arg(short = 't', long)]
    check_timing: bool,

    /// Log level for diagnostics on stderr, as a count of -l
    #[arg(short = 'l', long = "log", action = clap::ArgAction::Count)]
    log: u8,
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = Config::load().context("reading the configuration")?;
    let options = InfoOptions {
        verbosity: args.verbose,
        summary: args.summary,
        check_timing: args.check_timing,
        timestamp_rule: config.timestamp_rule,
    };
    let stdout = io::stdout();
    for path in &args.inputs {
        let reader = OgmReader::open(path).with_context(|| format!("opening '{}'", path.display()))?;
        if args.inputs.len() > 1 {
            writeln!(stdout.lock(), "{}:", path.display())?;
        }
        let mut inspector = Inspector::new(stdout.lock(), options);
        inspector
            .run(reader)
            .with_context(|| format!("reading '{}'", path.display()))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    ogmkit::utils::init_logging(args.log);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ogminfo: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
