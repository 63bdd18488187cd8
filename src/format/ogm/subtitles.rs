use super::format_ms;
use super::packetizer::{PacketInput, Packetizer, ProcessStatus};
use crate::{OgmError, Result};
use log::warn;
use std::collections::VecDeque;

/// One subtitle entry, times in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub start: i64,
    pub end: i64,
    pub text: String,
}

impl Cue {
    /// The first 20 characters on one line, for diagnostics.
    fn excerpt(&self) -> String {
        self.text
            .chars()
            .take(20)
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect()
    }
}

/// Cues waiting to be handed to a subtitle packetizer, in file order.
#[derive(Debug, Clone, Default)]
pub struct Subtitles {
    cues: VecDeque<Cue>,
}

impl Subtitles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, start: i64, end: i64, text: impl Into<String>) {
        self.cues.push_back(Cue {
            start,
            end,
            text: text.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cue> {
        self.cues.iter()
    }

    /// Clips every cue that ends after the next one starts. Returns false
    /// if a cue still starts after it ends.
    pub fn check(&mut self) -> bool {
        for i in 1..self.cues.len() {
            let next_start = self.cues[i].start;
            let cue = &mut self.cues[i - 1];
            if cue.end > next_start {
                warn!(
                    "subtitle ends after the next one starts. This end: {}  next start: {}  (\"{}\"...)",
                    format_ms(cue.end, ','),
                    format_ms(next_start, ','),
                    cue.excerpt()
                );
                cue.end = next_start - 1;
            }
        }

        let mut ok = true;
        for cue in self.cues.iter().filter(|cue| cue.start > cue.end) {
            ok = false;
            warn!(
                "subtitle begins after it ends. This start: {}  this end: {}  (\"{}\"...)",
                format_ms(cue.start, ','),
                format_ms(cue.end, ','),
                cue.excerpt()
            );
        }
        ok
    }

    pub fn pop(&mut self) -> Option<Cue> {
        self.cues.pop_front()
    }

    /// Feeds every queued cue to the packetizer, the last one flagged as
    /// such.
    pub fn process(&mut self, packetizer: &mut Packetizer) -> Result<ProcessStatus> {
        let mut status = ProcessStatus::MoreData;
        while let Some(cue) = self.cues.pop_front() {
            status = packetizer.process(PacketInput::Cue {
                start: cue.start,
                end: cue.end,
                data: cue.text.as_bytes(),
                last: self.cues.is_empty(),
            })?;
        }
        Ok(status)
    }
}

/// Parses `HH:MM:SS,mmm` (a dot is accepted instead of the comma).
fn parse_srt_time(s: &str) -> Option<i64> {
    let (hms, ms) = s.trim().split_once([',', '.'])?;
    let mut parts = hms.split(':');
    let h: i64 = parts.next()?.trim().parse().ok()?;
    let m: i64 = parts.next()?.parse().ok()?;
    let sec: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || m >= 60 || sec >= 60 {
        return None;
    }
    let ms: i64 = ms.trim().parse().ok()?;
    Some(((h * 60 + m) * 60 + sec) * 1000 + ms)
}

fn parse_timing_line(line: &str) -> Option<(i64, i64)> {
    let (start, end) = line.split_once("-->")?;
    // Some files carry position hints after the end time.
    let end = end.split_whitespace().next()?;
    Some((parse_srt_time(start)?, parse_srt_time(end)?))
}

/// True if the text looks like SRT: a cue number followed by a timing line.
pub fn probe_srt(text: &str) -> bool {
    let mut lines = text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .skip_while(|line| line.is_empty());
    let numbered = lines
        .next()
        .is_some_and(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()));
    numbered && lines.next().and_then(parse_timing_line).is_some()
}

/// Reads SRT text into a cue list. Lines of a cue are joined with `\n`.
pub fn parse_srt(text: &str) -> Result<Subtitles> {
    enum State {
        Number,
        Timing,
        Text,
    }

    let mut subs = Subtitles::new();
    let mut state = State::Number;
    let mut current: Option<(i64, i64, String)> = None;

    for (lineno, raw) in text.trim_start_matches('\u{feff}').lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        match state {
            State::Number => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !line.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(OgmError::Parser(format!(
                        "line {}: expected a subtitle number, got \"{}\"",
                        lineno + 1,
                        line
                    )));
                }
                state = State::Timing;
            }
            State::Timing => {
                let (start, end) = parse_timing_line(line).ok_or_else(|| {
                    OgmError::Parser(format!(
                        "line {}: malformed timing \"{}\"",
                        lineno + 1,
                        line
                    ))
                })?;
                current = Some((start, end, String::new()));
                state = State::Text;
            }
            State::Text => {
                if line.trim().is_empty() {
                    if let Some((start, end, text)) = current.take() {
                        subs.add(start, end, text);
                    }
                    state = State::Number;
                } else if let Some((_, _, text)) = current.as_mut() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(line);
                }
            }
        }
    }

    if let Some((start, end, text)) = current {
        subs.add(start, end, text);
    }
    Ok(subs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::format::ogm::comments::CommentSet;
    use crate::format::ogm::packetizer::tests::{data_packets, lacing_of};
    use crate::format::ogm::packetizer::{AudioSync, Range, TextSubsPacketizer};
    use pretty_assertions::assert_eq;

    const SRT: &str = "1\r\n00:00:01,000 --> 00:00:02,500\r\nHello\r\nworld\r\n\r\n\
                       2\r\n00:00:03,000 --> 00:00:04,000 X1:10\r\nBye\r\n";

    #[test]
    fn test_parse_srt() {
        assert!(probe_srt(SRT));
        let subs = parse_srt(SRT).unwrap();
        let cues: Vec<_> = subs.iter().cloned().collect();
        assert_eq!(
            cues,
            vec![
                Cue { start: 1000, end: 2500, text: "Hello\nworld".into() },
                Cue { start: 3000, end: 4000, text: "Bye".into() },
            ]
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(!probe_srt("CHAPTER01=00:00:00.000\n"));
        assert!(parse_srt("1\nnot a time\n").is_err());
        assert_eq!(parse_srt_time("01:02:03.004"), Some(3_723_004));
        assert_eq!(parse_srt_time("00:61:00,000"), None);
    }

    #[test]
    fn test_check_clips_overlaps() {
        let mut subs = Subtitles::new();
        subs.add(0, 1500, "a");
        subs.add(1000, 2000, "b");
        assert!(subs.check());
        assert_eq!(subs.iter().next().map(|c| c.end), Some(999));

        let mut subs = Subtitles::new();
        subs.add(500, 100, "backwards");
        assert!(!subs.check());
    }

    #[test]
    fn test_process_marks_last_cue() {
        let config = Config::default();
        let mut p: Packetizer = TextSubsPacketizer::new(
            1,
            AudioSync::default(),
            Range::default(),
            CommentSet::new("t"),
            &config,
        )
        .unwrap()
        .into();
        let mut subs = parse_srt(SRT).unwrap();
        assert_eq!(subs.process(&mut p).unwrap(), ProcessStatus::Finished);
        assert!(subs.is_empty());
        assert!(p.ended());

        let packets = data_packets(&mut p);
        // Gap, cue, gap, cue.
        assert_eq!(packets.len(), 4);
        assert_eq!(lacing_of(&packets[0]), 1000);
        assert_eq!(lacing_of(&packets[1]), 1500);
        assert!(packets[3].last_in_stream());
    }
}
