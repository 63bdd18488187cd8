//! Chapter markers stored as comments.
//!
//! ```text
//! CHAPTER01=00:00:00.000
//! CHAPTER01NAME=Intro
//! ```
//!
//! The same line format is used for standalone chapter files.

use super::comments::CommentSet;
use super::format_ms;
use crate::{OgmError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const CHAPTER_ENTRY_LEN: usize = 22;
const CHAPTER_NAME_PREFIX_LEN: usize = 14;
const CHAPTER_FILE_MIN_SIZE: usize = 37;

fn two_digits(s: &[u8]) -> bool {
    s.len() >= 2 && s[0].is_ascii_digit() && s[1].is_ascii_digit()
}

/// `HH:MM:SS.mmm` at the start of `s`, in milliseconds.
fn parse_timestamp(s: &[u8]) -> Option<i64> {
    if s.len() < 12
        || !two_digits(&s[0..])
        || s[2] != b':'
        || !two_digits(&s[3..])
        || s[5] != b':'
        || !two_digits(&s[6..])
        || s[8] != b'.'
        || !s[9..12].iter().all(u8::is_ascii_digit)
    {
        return None;
    }
    let num = |range: std::ops::Range<usize>| {
        s[range]
            .iter()
            .fold(0i64, |acc, &b| acc * 10 + (b - b'0') as i64)
    };
    Some(num(0..2) * 3_600_000 + num(3..5) * 60_000 + num(6..8) * 1000 + num(9..12))
}

fn chapter_number(s: &[u8]) -> u32 {
    ((s[7] - b'0') * 10 + (s[8] - b'0')) as u32
}

/// Parses a `CHAPTERnn=HH:MM:SS.mmm` entry into its number and start time.
pub fn parse_chapter(entry: &str) -> Option<(u32, i64)> {
    let s = entry.as_bytes();
    if s.len() != CHAPTER_ENTRY_LEN || !s.starts_with(b"CHAPTER") || !two_digits(&s[7..]) || s[9] != b'=' {
        return None;
    }
    parse_timestamp(&s[10..]).map(|ms| (chapter_number(s), ms))
}

/// Parses a `CHAPTERnnNAME=title` entry into its number and title.
pub fn parse_chapter_name(entry: &str) -> Option<(u32, &str)> {
    let s = entry.as_bytes();
    if s.len() <= CHAPTER_NAME_PREFIX_LEN
        || !s.starts_with(b"CHAPTER")
        || !two_digits(&s[7..])
        || &s[9..14] != b"NAME="
    {
        return None;
    }
    Some((chapter_number(s), &entry[CHAPTER_NAME_PREFIX_LEN..]))
}

fn is_chapter_like(entry: &str) -> bool {
    let s = entry.as_bytes();
    s.len() >= CHAPTER_NAME_PREFIX_LEN
        && s.starts_with(b"CHAPTER")
        && two_digits(&s[7..])
        && (s[9] == b'=' || &s[9..14] == b"NAME=")
}

/// Removes every chapter entry, keeping all other comments.
pub fn strip_chapters(set: &CommentSet) -> CommentSet {
    CommentSet {
        vendor: set.vendor.clone(),
        comments: set
            .comments
            .iter()
            .filter(|entry| !is_chapter_like(entry))
            .cloned()
            .collect(),
    }
}

/// Restricts chapters to the window `[start_ms, end_ms)` and rebases them
/// so the window starts at zero.
///
/// Kept chapters are renumbered from 1 in the order they appear and names
/// follow their chapter's new number. When the window opens in the middle of
/// a chapter, the most recent name seen before the first kept chapter is
/// repeated as chapter 1 at time zero with ` (continued)` appended. Without
/// such a name no continuation chapter is added. Other comments pass through.
pub fn adjust_chapters(set: &CommentSet, start_ms: f64, end_ms: f64) -> CommentSet {
    let mut out = CommentSet::new(set.vendor.clone());
    let mut renumbered: HashMap<u32, u32> = HashMap::new();
    let mut next_number = 1u32;
    let mut candidate: Option<String> = None;
    let mut kept_any = false;

    for entry in &set.comments {
        if let Some((number, ms)) = parse_chapter(entry) {
            let t = ms as f64;
            if t < start_ms || t >= end_ms {
                continue;
            }
            if !kept_any {
                kept_any = true;
                if t > start_ms {
                    if let Some(name) = candidate.take() {
                        out.add("CHAPTER01=00:00:00.000");
                        out.add(format!("CHAPTER01NAME={} (continued)", name));
                        next_number = 2;
                    }
                }
            }
            let new_number = next_number;
            next_number += 1;
            renumbered.insert(number, new_number);
            out.add(format!(
                "CHAPTER{:02}={}",
                new_number,
                format_ms((t - start_ms) as i64, '.')
            ));
        } else if let Some((number, name)) = parse_chapter_name(entry) {
            if let Some(new_number) = renumbered.get(&number) {
                out.add(format!("CHAPTER{:02}NAME={}", new_number, name));
            } else if !kept_any {
                candidate = Some(name.to_string());
            }
        } else {
            out.add(entry.clone());
        }
    }

    out
}

/// Checks whether text looks like a chapter file: a chapter entry on the
/// first line and a chapter name on the second.
pub fn probe_chapter_text(text: &str) -> bool {
    if text.len() < CHAPTER_FILE_MIN_SIZE {
        return false;
    }
    let mut lines = text.split_inclusive('\n');
    let first = match lines.next() {
        Some(line) if line.ends_with('\n') => line.as_bytes(),
        _ => return false,
    };
    if first.len() < 22 || !first.starts_with(b"CHAPTER") || first[9] != b'=' || parse_timestamp(&first[10..]).is_none() {
        return false;
    }
    match lines.next() {
        Some(line) if line.ends_with('\n') => {
            let second = line.as_bytes();
            second.len() >= 14 && second.starts_with(b"CHAPTER") && &second[9..14] == b"NAME="
        }
        _ => false,
    }
}

/// Reads chapter text into a comment set, one entry per non-empty line.
pub fn parse_chapter_text(text: &str, vendor: &str) -> CommentSet {
    CommentSet::from_user(
        vendor,
        text.lines()
            .map(|line| line.trim_end_matches(&['\r', '\n'][..]))
            .filter(|line| !line.is_empty())
            .map(str::to_string),
    )
}

/// Reads a chapter file.
pub fn read_chapter_file(path: impl AsRef<Path>, vendor: &str) -> Result<CommentSet> {
    let path = path.as_ref();
    let raw = fs::read(path).map_err(|e| OgmError::file(path, e))?;
    let text = String::from_utf8_lossy(&raw);
    if !probe_chapter_text(&text) {
        return Err(OgmError::Parser(format!(
            "{} is not a chapter file",
            path.display()
        )));
    }
    log::info!("Using chapter information reader for {}", path.display());
    Ok(parse_chapter_text(&text, vendor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    fn set(entries: &[&str]) -> CommentSet {
        CommentSet::from_user("test", entries.iter().copied())
    }

    fn chapter_numbers(set: &CommentSet) -> Vec<u32> {
        set.iter().filter_map(parse_chapter).map(|(n, _)| n).collect()
    }

    #[test]
    fn test_parse_entries() {
        assert_eq!(parse_chapter("CHAPTER07=01:02:03.456"), Some((7, 3_723_456)));
        assert_eq!(parse_chapter("CHAPTER07=01:02:03.45"), None);
        assert_eq!(parse_chapter("CHAPTERx7=01:02:03.456"), None);
        assert_eq!(parse_chapter_name("CHAPTER07NAME=Main"), Some((7, "Main")));
        assert_eq!(parse_chapter_name("CHAPTER07NAME="), None);
    }

    #[test]
    fn test_window_opens_mid_chapter() {
        let input = set(&[
            "CHAPTER01=00:00:00.000",
            "CHAPTER01NAME=Intro",
            "CHAPTER02=00:05:00.000",
            "CHAPTER02NAME=Main",
        ]);
        let adjusted = adjust_chapters(&input, 120_000.0, 999_999_999.0);
        assert_eq!(
            adjusted.comments,
            vec![
                "CHAPTER01=00:00:00.000",
                "CHAPTER01NAME=Intro (continued)",
                "CHAPTER02=00:03:00.000",
                "CHAPTER02NAME=Main",
            ]
        );
    }

    #[test]
    fn test_window_closes_and_renumbers() {
        let input = set(&[
            "TITLE=Movie",
            "CHAPTER01=00:00:00.000",
            "CHAPTER01NAME=A",
            "CHAPTER03=00:01:00.000",
            "CHAPTER03NAME=B",
            "CHAPTER04=00:02:00.000",
            "CHAPTER04NAME=C",
        ]);
        let adjusted = adjust_chapters(&input, 60_000.0, 120_000.0);
        assert_eq!(
            adjusted.comments,
            vec!["TITLE=Movie", "CHAPTER01=00:00:00.000", "CHAPTER01NAME=B"]
        );
    }

    #[test]
    fn test_no_candidate_no_continuation() {
        let input = set(&["CHAPTER05=00:02:00.000", "CHAPTER05NAME=Late"]);
        let adjusted = adjust_chapters(&input, 60_000.0, 1e12);
        assert_eq!(
            adjusted.comments,
            vec!["CHAPTER01=00:01:00.000", "CHAPTER01NAME=Late"]
        );
    }

    #[test]
    fn test_latest_candidate_wins() {
        let input = set(&[
            "CHAPTER01=00:00:00.000",
            "CHAPTER01NAME=First",
            "CHAPTER02=00:00:10.000",
            "CHAPTER02NAME=Second",
            "CHAPTER03=00:01:00.000",
            "CHAPTER03NAME=Third",
        ]);
        let adjusted = adjust_chapters(&input, 30_000.0, 1e12);
        assert_eq!(
            adjusted.comments,
            vec![
                "CHAPTER01=00:00:00.000",
                "CHAPTER01NAME=Second (continued)",
                "CHAPTER02=00:00:30.000",
                "CHAPTER02NAME=Third",
            ]
        );
    }

    #[test]
    fn test_strip_chapters() {
        let input = set(&["CHAPTER01=00:00:00.000", "CHAPTER01NAME=x", "TITLE=y", "CHAPTERS=3"]);
        assert_eq!(strip_chapters(&input).comments, vec!["TITLE=y", "CHAPTERS=3"]);
    }

    #[test]
    fn test_chapter_text() {
        let text = "CHAPTER01=00:00:00.000\r\nCHAPTER01NAME=Opening\r\n\nCHAPTER02=00:10:00.000\nCHAPTER02NAME=End\n";
        assert!(probe_chapter_text(text));
        assert!(!probe_chapter_text("CHAPTER01=00:00:00.000\n"));
        assert!(!probe_chapter_text("1\n00:00:01,000 --> 00:00:02,000\nHello there\n\n"));
        let parsed = parse_chapter_text(text, "v");
        assert_eq!(
            parsed.comments,
            vec![
                "CHAPTER01=00:00:00.000",
                "CHAPTER01NAME=Opening",
                "CHAPTER02=00:10:00.000",
                "CHAPTER02NAME=End",
            ]
        );
    }

    #[quickcheck]
    fn prop_renumbering_is_contiguous(times: Vec<u32>, start: u32, len: u32) -> bool {
        let mut entries = Vec::new();
        for (i, t) in times.iter().take(60).enumerate() {
            let ms = (*t % 36_000_000) as i64;
            entries.push(format!("CHAPTER{:02}={}", i + 1, format_ms(ms, '.')));
            entries.push(format!("CHAPTER{:02}NAME=Chapter {}", i + 1, i + 1));
        }
        let input = CommentSet::from_user("v", entries);
        let start = (start % 36_000_000) as f64;
        let end = start + (len % 36_000_000) as f64;
        let adjusted = adjust_chapters(&input, start, end);
        let numbers = chapter_numbers(&adjusted);
        numbers == (1..=numbers.len() as u32).collect::<Vec<_>>()
    }

    #[quickcheck]
    fn prop_full_window_is_idempotent(times: Vec<u32>) -> bool {
        let mut entries = vec!["TITLE=x".to_string()];
        for (i, t) in times.iter().take(60).enumerate() {
            let ms = (*t % 36_000_000) as i64;
            entries.push(format!("CHAPTER{:02}={}", i + 1, format_ms(ms, '.')));
            entries.push(format!("CHAPTER{:02}NAME=n{}", i + 1, i));
        }
        let input = CommentSet::from_user("v", entries);
        let end = 36_000_000.0;
        let once = adjust_chapters(&input, 0.0, end);
        adjust_chapters(&once, 0.0, end) == once
    }
}
