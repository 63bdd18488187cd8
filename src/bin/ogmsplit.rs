//! Splits an OGM file by size, by time or at explicit cut points.

use anyhow::{bail, Context};
use clap::Parser;
use ogmkit::config::Config;
use ogmkit::format::ogm::format_ms;
use ogmkit::format::ogm::split::{
    find_splitpoints, output_base, output_name, parse_cuts, parse_size, parse_time, split,
    SplitMode, SplitOptions,
};
use ogmkit::format::ogm::stream::OgmReader;
use ogmkit::format::WriteSink;
use ogmkit::utils::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ogmsplit")]
#[command(version)]
#[command(about = "Splits an OGM file into several smaller files")]
struct Args {
    /// Input file
    input: PathBuf,

    /// Output base name; defaults to the input name without extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum size per file: N[MiB|MB|b], 700 MiB by default
    #[arg(short, long, conflicts_with_all = ["time", "cuts"])]
    size: Option<String>,

    /// Maximum length per file: HH:MM:SS.mmm or seconds
    #[arg(short, long, conflicts_with = "cuts")]
    time: Option<String>,

    /// Parts to keep: start-end, start+length or start-, comma separated
    #[arg(short, long)]
    cuts: Option<String>,

    /// Maximum number of files; the last one takes the rest
    #[arg(short = 'n', long)]
    num: Option<usize>,

    /// Only print the keyframes usable as split points
    #[arg(long)]
    print_splitpoints: bool,

    /// More log output; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn split_options(args: &Args) -> anyhow::Result<SplitOptions> {
    let mode = match (&args.size, &args.time, &args.cuts) {
        (_, Some(time), _) => SplitMode::Time(parse_time(time)? * 1000.0),
        (_, _, Some(cuts)) => SplitMode::Cuts(parse_cuts(cuts)?),
        (Some(size), _, _) => SplitMode::Size(parse_size(size)?),
        _ => SplitMode::default(),
    };
    let options = SplitOptions {
        mode,
        max_files: args.num,
    };
    options.validate()?;
    Ok(options)
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load().context("reading the configuration")?;
    let options = split_options(&args)?;
    let open = || OgmReader::open(&args.input);

    if args.print_splitpoints {
        let points = find_splitpoints(open()?, &config)?;
        for (i, point) in points.iter().enumerate() {
            println!(
                "split point {}: frame {}, {} bytes, {}",
                i,
                point.frameno,
                point.pos_bytes,
                format_ms(point.pos_time as i64, '.')
            );
        }
        return Ok(());
    }

    let (base, ext) = output_base(args.output.as_ref().unwrap_or(&args.input));
    let create = |n: usize| {
        let name = output_name(&base, &ext, n);
        log::info!("opening '{}'", name.display());
        WriteSink::create(name)
    };
    let (files, summary) = split(open, &options, &config, create)
        .with_context(|| format!("splitting '{}'", args.input.display()))?;
    if files.is_empty() {
        bail!("'{}' has no place to split at", args.input.display());
    }
    log::info!("{} files, {} bytes written", summary.files, summary.bytes_written);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ogmsplit: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_modes() {
        Args::command().debug_assert();
        let args = Args::parse_from(["ogmsplit", "in.ogm", "-t", "1:00"]);
        assert_eq!(split_options(&args).unwrap().mode, SplitMode::Time(60_000.0));
        let args = Args::parse_from(["ogmsplit", "in.ogm", "-s", "100"]);
        assert_eq!(split_options(&args).unwrap().mode, SplitMode::Size(100 * 1024 * 1024));
        let args = Args::parse_from(["ogmsplit", "in.ogm", "-c", "0-10", "-n", "2"]);
        assert!(split_options(&args).is_err());
        assert!(Args::try_parse_from(["ogmsplit", "in.ogm", "-s", "1", "-t", "5"]).is_err());
    }
}
