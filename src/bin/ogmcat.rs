//! Concatenates OGM files carrying the same streams.

use anyhow::{bail, Context};
use clap::Parser;
use ogmkit::config::Config;
use ogmkit::format::ogm::cat::{concatenate, CatOptions, CatSource, SyncMode};
use ogmkit::format::WriteSink;
use ogmkit::utils::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ogmcat")]
#[command(version)]
#[command(about = "Concatenates OGM files with matching streams")]
struct Args {
    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// Input files, in playing order
    #[arg(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,

    /// 0: last granule, 1: previous granule, 2-4: derived from the video
    /// stream's frame count (after end, end, last frame)
    #[arg(long, default_value_t = SyncMode::default())]
    sync_mode: SyncMode,

    /// Extra delay in ms for the streams of a file, `N:ms` with N >= 2
    #[arg(short = 's', long, value_name = "N:MS")]
    manual_sync: Vec<String>,

    /// Only warn about streams whose parameters differ between files
    #[arg(long)]
    no_safety_checks: bool,

    /// More log output; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn manual_syncs(args: &[String], files: usize) -> anyhow::Result<Vec<f64>> {
    let mut syncs = vec![0.0; files];
    for arg in args {
        let (n, ms) = arg
            .split_once(':')
            .with_context(|| format!("'{}' is not N:ms", arg))?;
        let n: usize = n.trim().parse().with_context(|| format!("bad file number in '{}'", arg))?;
        if n < 2 || n > files {
            bail!("'{}': manual sync applies to files 2 to {}", arg, files);
        }
        syncs[n - 1] = ms.trim().parse().with_context(|| format!("bad delay in '{}'", arg))?;
    }
    Ok(syncs)
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load().context("reading the configuration")?;
    let syncs = manual_syncs(&args.manual_sync, args.inputs.len())?;
    let sources = args
        .inputs
        .iter()
        .zip(syncs)
        .map(|(path, ms)| CatSource::open(path, ms).with_context(|| format!("opening '{}'", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let options = CatOptions {
        sync_mode: args.sync_mode,
        safety_checks: !args.no_safety_checks,
    };
    let sink = WriteSink::create(&args.output)?;
    let (_, summary) = concatenate(sources, sink, &options, &config)?;
    log::info!(
        "{} files, {} bytes written to '{}'",
        summary.sources,
        summary.bytes_written,
        args.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ogmcat: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_syncs() {
        assert_eq!(manual_syncs(&["2:500".into()], 3).unwrap(), vec![0.0, 500.0, 0.0]);
        assert!(manual_syncs(&["1:500".into()], 3).is_err());
        assert!(manual_syncs(&["4:500".into()], 3).is_err());
        assert!(manual_syncs(&["2".into()], 3).is_err());
    }
}
