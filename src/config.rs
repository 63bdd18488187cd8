use crate::error::{OgmError, Result};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Vendor string written into every comment packet this crate creates.
pub const VERSION_INFO: &str = concat!("ogmkit v", env!("CARGO_PKG_VERSION"));

const CONFIG_PATHS: [&str; 2] = ["./ogmkit.toml", "./.ogmkit.toml"];

/// Which granule position a page's presentation timestamp is derived from.
///
/// Non-text streams mark the end of the covered interval with their granule,
/// so the classic rule stamps a page with the previous page's granule. Text
/// cues mark their start and use their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampRule {
    /// Previous granule for audio/video, own granule for text streams.
    #[default]
    PreviousExceptText,
    /// Previous granule for every stream, text included.
    AlwaysPrevious,
    /// Own granule for every stream.
    AlwaysOwn,
}

impl TimestampRule {
    /// Returns true if a stream of the given textual-ness stamps pages with
    /// the previous page's granule.
    pub fn uses_previous(self, text: bool) -> bool {
        match self {
            TimestampRule::PreviousExceptText => !text,
            TimestampRule::AlwaysPrevious => true,
            TimestampRule::AlwaysOwn => false,
        }
    }
}

impl FromStr for TimestampRule {
    type Err = OgmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "previous" | "default" => Ok(TimestampRule::PreviousExceptText),
            "xiph" | "always-previous" => Ok(TimestampRule::AlwaysPrevious),
            "own" | "always-own" => Ok(TimestampRule::AlwaysOwn),
            other => Err(OgmError::InvalidInput(format!(
                "unknown timestamp rule '{}'",
                other
            ))),
        }
    }
}

/// Settings shared by the muxing tools.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub vendor: String,
    pub timestamp_rule: TimestampRule,
    /// Upper bound for the compressed audio frame scanner buffer.
    pub max_frame_buffer: usize,
    /// Upper bound for pages buffered in a single packetizer queue.
    pub max_queued_bytes: usize,
    pub pcm_interleave: usize,
    pub omit_empty_packets: bool,
    pub force_flushing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            vendor: VERSION_INFO.to_string(),
            timestamp_rule: TimestampRule::default(),
            max_frame_buffer: 1024 * 1024,
            max_queued_bytes: 256 * 1024 * 1024,
            pcm_interleave: 16,
            omit_empty_packets: false,
            force_flushing: false,
        }
    }
}

impl Config {
    /// Builds the configuration from defaults, then `OGMKIT_*` environment
    /// variables, then the first config file found in the working directory.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| fs::read_to_string(path).map_err(|e| OgmError::file(path, e)))
            .transpose()?;

        Self::from_sources(|key| env::var(key).ok(), file.as_deref())
    }

    /// Same as [`Config::load`] with the environment and file contents
    /// supplied by the caller.
    pub fn from_sources<F>(lookup: F, file_contents: Option<&str>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        for key in Self::keys() {
            let var = format!("OGMKIT_{}", key.to_ascii_uppercase());
            if let Some(value) = lookup(&var) {
                config.apply(key, &value)?;
            }
        }

        if let Some(contents) = file_contents {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    config.apply(key.trim(), value)?;
                }
            }
        }

        Ok(config)
    }

    fn keys() -> [&'static str; 7] {
        [
            "vendor",
            "timestamp_rule",
            "max_frame_buffer",
            "max_queued_bytes",
            "pcm_interleave",
            "omit_empty_packets",
            "force_flushing",
        ]
    }

    /// Sets a single key. Unknown keys are ignored with a warning.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "vendor" => self.vendor = value.to_string(),
            "timestamp_rule" => self.timestamp_rule = value.parse()?,
            "max_frame_buffer" => self.max_frame_buffer = value.parse()?,
            "max_queued_bytes" => self.max_queued_bytes = value.parse()?,
            "pcm_interleave" => {
                let interleave: usize = value.parse()?;
                if interleave == 0 {
                    return Err(OgmError::InvalidInput(
                        "pcm_interleave must be positive".into(),
                    ));
                }
                self.pcm_interleave = interleave;
            }
            "omit_empty_packets" => self.omit_empty_packets = parse_bool(value)?,
            "force_flushing" => self.force_flushing = parse_bool(value)?,
            other => log::warn!("ignoring unknown configuration key '{}'", other),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(OgmError::InvalidInput(format!(
            "expected a boolean, got '{}'",
            other
        ))),
    }
}
