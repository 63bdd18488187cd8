//! Extracts the streams of an OGM file into separate files.

use anyhow::Context;
use clap::Parser;
use ogmkit::format::ogm::demux::{default_base, demux_file, DemuxOptions, Selection};
use ogmkit::utils::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ogmdemux")]
#[command(version)]
#[command(about = "Extracts streams from OGM files")]
struct Args {
    /// Input file
    input: PathBuf,

    /// Base name for the output files; defaults to the input file name
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Audio streams to extract, by number (repeatable)
    #[arg(short, long = "astream", value_name = "N")]
    astream: Vec<usize>,

    /// Video streams to extract, by number (repeatable)
    #[arg(short = 'd', long = "vstream", value_name = "N")]
    vstream: Vec<usize>,

    /// Text streams to extract, by number (repeatable)
    #[arg(short, long = "tstream", value_name = "N")]
    tstream: Vec<usize>,

    /// Don't extract any audio stream
    #[arg(long = "noaudio", visible_alias = "no-audio")]
    no_audio: bool,

    /// Don't extract any video stream
    #[arg(long = "novideo", visible_alias = "no-video")]
    no_video: bool,

    /// Don't extract any text stream
    #[arg(long = "notext", visible_alias = "no-text")]
    no_text: bool,

    /// Write the bare packet payloads instead of WAV, SRT or Ogg files
    #[arg(short, long)]
    raw: bool,

    /// More log output; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn options(&self) -> DemuxOptions {
        DemuxOptions {
            raw: self.raw,
            audio: Selection {
                disabled: self.no_audio,
                numbers: self.astream.clone(),
            },
            video: Selection {
                disabled: self.no_video,
                numbers: self.vstream.clone(),
            },
            text: Selection {
                disabled: self.no_text,
                numbers: self.tstream.clone(),
            },
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let base = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_base(&args.input)));
    let summary = demux_file(&args.input, &base, &args.options())
        .with_context(|| format!("demultiplexing '{}'", args.input.display()))?;
    for stream in &summary.streams {
        println!("{}: {} bytes written to '{}'", stream.label, stream.bytes, stream.name);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ogmdemux: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_selection_flags() {
        Args::command().debug_assert();
        let args = Args::parse_from(["ogmdemux", "in.ogm", "-a", "2", "--novideo"]);
        let options = args.options();
        assert_eq!(options.audio.numbers, vec![2]);
        assert!(options.video.disabled);
        assert!(!options.text.disabled);
    }
}
