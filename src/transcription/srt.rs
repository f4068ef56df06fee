use super::{CaptionEntry, TimingTable};
use anyhow::{anyhow, Result};
use std::time::Duration;

/// Parse SRT text into a timing table.
///
/// Blocks are separated by blank lines; the numeric counter line is optional.
pub fn parse_srt(content: &str) -> Result<TimingTable> {
    let normalized = content.replace("\r\n", "\n");
    let mut entries = Vec::new();

    for (block_index, block) in normalized.split("\n\n").enumerate() {
        let lines: Vec<&str> = block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            continue;
        }

        let Some(timing_pos) = lines.iter().position(|line| line.contains("-->")) else {
            return Err(anyhow!("SRT block {} has no timestamp line", block_index + 1));
        };

        let (from, to) = parse_timestamp_line(lines[timing_pos])?;
        let text = lines[timing_pos + 1..].join(" ");

        entries.push(CaptionEntry::new(from.as_secs_f64(), to.as_secs_f64(), text));
    }

    Ok(TimingTable::new(entries))
}

/// Parse `start --> end`
fn parse_timestamp_line(line: &str) -> Result<(Duration, Duration)> {
    let parts: Vec<&str> = line.split("-->").map(str::trim).collect();
    if parts.len() != 2 {
        return Err(anyhow!("Invalid timestamp line: {}", line));
    }

    Ok((parse_single_timestamp(parts[0])?, parse_single_timestamp(parts[1])?))
}

/// Parse a single timestamp (HH:MM:SS,mmm); a `.` separator is accepted too
fn parse_single_timestamp(timestamp: &str) -> Result<Duration> {
    let time_parts: Vec<&str> = timestamp.split([',', '.']).collect();
    if time_parts.len() != 2 {
        return Err(anyhow!("Invalid timestamp format: {}", timestamp));
    }

    let hms_parts: Vec<&str> = time_parts[0].split(':').collect();
    if hms_parts.len() != 3 {
        return Err(anyhow!("Invalid time format: {}", timestamp));
    }

    let hours: u64 = hms_parts[0].parse()?;
    let minutes: u64 = hms_parts[1].parse()?;
    let seconds: u64 = hms_parts[2].parse()?;
    let milliseconds: u64 = time_parts[1].parse()?;

    let total_seconds = hours * 3600 + minutes * 60 + seconds;
    Ok(Duration::from_millis(total_seconds * 1000 + milliseconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srt() {
        let content = "1\r\n00:00:01,000 --> 00:00:03,500\r\nHello there\r\n\r\n2\r\n00:00:04,000 --> 00:00:06,000\r\nThis video is sponsored\r\nby a shop\r\n";
        let table = parse_srt(content).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().from, 1.0);
        assert_eq!(table.get(0).unwrap().to, 3.5);
        assert_eq!(table.get(1).unwrap().content, "This video is sponsored by a shop");
    }

    #[test]
    fn test_parse_srt_without_counter_and_dot_millis() {
        let table = parse_srt("01:01:01.250 --> 01:01:40.000\nAd 2\n").unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().from, 3661.25);
        assert_eq!(table.get(0).unwrap().to, 3700.0);
        assert_eq!(table.get(0).unwrap().content, "Ad 2");
    }

    #[test]
    fn test_parse_srt_rejects_block_without_timing() {
        assert!(parse_srt("1\njust text\n").is_err());
        assert!(parse_srt("1\n00:00:01 --> 00:00:02\ntext\n").is_err());
    }
}
