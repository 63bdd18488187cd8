//! Builds an OGM file from WAV, MP3, AC3, SRT and Ogg Vorbis inputs.

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use ogmkit::config::{Config, TimestampRule};
use ogmkit::format::ogm::chapters::read_chapter_file;
use ogmkit::format::ogm::merge::{open_input, InputOptions, MuxSession};
use ogmkit::format::ogm::split::parse_time;
use ogmkit::format::ogm::{AudioSync, Range};
use ogmkit::format::WriteSink;
use ogmkit::utils::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ogmmerge")]
#[command(version)]
#[command(about = "Multiplexes audio and subtitle files into one OGM file")]
#[command(after_help = "Per input options take the one-based input number first, \
    e.g. `--sync 2:-200` plays input 2 200 ms earlier.")]
struct Args {
    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// Input files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Audio displacement `N:ms[,linear]`
    #[arg(short, long, value_name = "N:MS[,LINEAR]")]
    sync: Vec<String>,

    /// Part of an input to keep, `N:start-end` in seconds or HH:MM:SS.mmm
    #[arg(short, long, value_name = "N:START-END")]
    range: Vec<String>,

    /// Comment for an input's stream, `N:TAG=value`
    #[arg(short, long, value_name = "N:TAG=VALUE")]
    comment: Vec<String>,

    /// Chapter file whose entries are added to the first stream's comments
    #[arg(long, value_name = "FILE")]
    chapters: Option<PathBuf>,

    /// Skip empty packets in the inputs
    #[arg(long)]
    omit_empty_packets: bool,

    /// Flush a page after every packet
    #[arg(long)]
    force_flushing: bool,

    /// previous, xiph or own
    #[arg(long)]
    timestamp_rule: Option<TimestampRule>,

    /// More log output; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Splits `N:rest` into a zero-based input index and the rest.
fn per_input(arg: &str, inputs: usize) -> anyhow::Result<(usize, &str)> {
    let (number, rest) = arg
        .split_once(':')
        .ok_or_else(|| anyhow!("'{}' lacks the input number", arg))?;
    let number: usize = number
        .trim()
        .parse()
        .with_context(|| format!("bad input number in '{}'", arg))?;
    if number == 0 || number > inputs {
        bail!("'{}' refers to input {} of {}", arg, number, inputs);
    }
    Ok((number - 1, rest))
}

fn parse_sync(s: &str) -> anyhow::Result<AudioSync> {
    let (ms, linear) = match s.split_once(',') {
        Some((ms, linear)) => (ms, Some(linear)),
        None => (s, None),
    };
    let displacement: i64 = ms.trim().parse().with_context(|| format!("bad sync '{}'", s))?;
    let linear = match linear {
        Some(l) => l.trim().parse().with_context(|| format!("bad sync factor '{}'", s))?,
        None => 1.0,
    };
    if linear <= 0.0 {
        bail!("sync factor must be positive in '{}'", s);
    }
    Ok(AudioSync::new(displacement, linear))
}

fn parse_range(s: &str) -> anyhow::Result<Range> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| anyhow!("range '{}' is not start-end", s))?;
    let start = if start.is_empty() { 0.0 } else { parse_time(start)? };
    let end = if end.is_empty() { 0.0 } else { parse_time(end)? };
    if end != 0.0 && end <= start {
        bail!("range '{}' ends before it starts", s);
    }
    Ok(Range::new(start, end))
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::load().context("reading the configuration")?;
    config.omit_empty_packets |= args.omit_empty_packets;
    config.force_flushing |= args.force_flushing;
    if let Some(rule) = args.timestamp_rule {
        config.timestamp_rule = rule;
    }

    let mut options = vec![InputOptions::default(); args.inputs.len()];
    for arg in &args.sync {
        let (i, rest) = per_input(arg, options.len())?;
        options[i].sync = parse_sync(rest)?;
    }
    for arg in &args.range {
        let (i, rest) = per_input(arg, options.len())?;
        options[i].range = parse_range(rest)?;
    }
    for arg in &args.comment {
        let (i, rest) = per_input(arg, options.len())?;
        options[i].comments.push(rest.to_string());
    }
    if let Some(path) = &args.chapters {
        let chapters = read_chapter_file(path, &config.vendor)?;
        options[0].comments.extend(chapters.iter().map(str::to_string));
    }

    let sink = WriteSink::create(&args.output)?;
    let mut session = MuxSession::new(sink);
    for (path, options) in args.inputs.iter().zip(&options) {
        let serial = session.next_serial();
        let input = open_input(path, serial, options, &config)
            .with_context(|| format!("opening '{}'", path.display()))?;
        session.add(input)?;
    }
    let (_, summary) = session.run()?;
    log::info!(
        "{}: {} streams, {} bytes",
        args.output.display(),
        summary.streams,
        summary.bytes_written
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ogmmerge: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_input_args() {
        assert_eq!(per_input("2:-200", 2).unwrap(), (1, "-200"));
        assert!(per_input("3:0", 2).is_err());
        assert!(per_input("0", 2).is_err());
        assert_eq!(parse_sync("-200,0.5").unwrap(), AudioSync::new(-200, 0.5));
        assert!(parse_sync("x").is_err());
        assert_eq!(parse_range("1-0:00:02.5").unwrap(), Range::new(1.0, 2.5));
        assert_eq!(parse_range("30-").unwrap(), Range::new(30.0, 0.0));
        assert!(parse_range("5-2").is_err());
    }
}
