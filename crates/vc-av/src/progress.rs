//! Encoder progress parsing.
//!
//! ffmpeg rewrites a single status line in place using `\r`, so the stream
//! is split with [`StatusLineCodec`] rather than a plain line reader. Each
//! status line is turned into a [`ProgressSample`] by [`parse_line`], and a
//! [`ProgressTracker`] converts samples into overall percentages.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use vc_core::LiveStats;

/// Default cap on a single buffered status line.
const DEFAULT_MAX_LINE: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Splits a byte stream on `\r` or `\n`, yielding trimmed non-empty lines.
///
/// A line longer than the configured maximum is flushed as-is instead of
/// buffering further. A trailing partial line is yielded at EOF.
#[derive(Debug, Clone)]
pub struct StatusLineCodec {
    max_length: usize,
}

impl StatusLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }
}

impl Default for StatusLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn take_line(buf: &mut BytesMut, len: usize, skip: usize) -> String {
    let chunk = buf.split_to(len + skip);
    String::from_utf8_lossy(&chunk[..len]).trim().to_string()
}

impl Decoder for StatusLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            match buf.iter().position(|b| *b == b'\r' || *b == b'\n') {
                Some(pos) => {
                    let line = take_line(buf, pos, 1);
                    if !line.is_empty() {
                        return Ok(Some(line));
                    }
                }
                None if buf.len() > self.max_length => {
                    let len = buf.len();
                    let line = take_line(buf, len, 0);
                    if !line.is_empty() {
                        return Ok(Some(line));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let len = buf.len();
        let line = take_line(buf, len, 0);
        Ok((!line.is_empty()).then_some(line))
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// One parsed encoder status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    /// Media time encoded so far, in seconds.
    pub elapsed_secs: Option<f64>,
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    /// Encoding speed as a multiple of realtime.
    pub speed: Option<f64>,
    pub bitrate_kbps: Option<f64>,
}

/// Parse an ffmpeg status line such as
/// `frame=  120 fps= 30 q=28.0 size=256kB time=00:00:04.00 bitrate= 524.3kbits/s speed=2.00x`.
///
/// Returns `None` for anything that carries neither a usable time nor a
/// frame count. Never fails.
pub fn parse_line(line: &str) -> Option<ProgressSample> {
    let sample = ProgressSample {
        elapsed_secs: field(line, "time").and_then(parse_clock),
        frame: field(line, "frame").and_then(|v| v.parse::<u64>().ok()),
        fps: field(line, "fps").and_then(parse_number),
        speed: field(line, "speed")
            .and_then(|v| parse_number(v.trim_end_matches('x'))),
        bitrate_kbps: field(line, "bitrate")
            .and_then(|v| parse_number(v.trim_end_matches("kbits/s"))),
    };

    if sample.elapsed_secs.is_none() && sample.frame.is_none() {
        return None;
    }
    Some(sample)
}

/// Value of `key=` in a status line. Tolerates padding after `=`.
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(found) = line[search..].find(key) {
        let start = search + found;
        let after_key = start + key.len();
        search = after_key;

        let at_boundary = line[..start]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        if !at_boundary || !line[after_key..].starts_with('=') {
            continue;
        }

        let value = line[after_key + 1..].trim_start();
        let end = value.find(char::is_whitespace).unwrap_or(value.len());
        let value = &value[..end];
        if value.is_empty() || value == "N/A" {
            return None;
        }
        return Some(value);
    }
    None
}

fn parse_number(v: &str) -> Option<f64> {
    v.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
}

/// Parse `HH:MM:SS.cc` (hours optional) into seconds. Negative times, which
/// ffmpeg prints before the first packet, count as zero.
fn parse_clock(v: &str) -> Option<f64> {
    let (negative, v) = match v.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, v),
    };
    let parts: Vec<&str> = v.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    let total = h * 3600.0 + m * 60.0 + s;
    if !total.is_finite() {
        return None;
    }
    Some(if negative { 0.0 } else { total })
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// A progress report ready to be applied to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Overall percentage in `[0, 100]`.
    pub percent: f64,
    pub live: Option<LiveStats>,
}

/// Turns samples for one encoder invocation into overall percentages.
///
/// The invocation covers the `[start, end]` slice of overall progress (the
/// whole range for single-pass, one half per pass for two-pass).
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    duration_secs: Option<f64>,
    expected_frames: Option<u64>,
    start: f64,
    end: f64,
    last_percent: f64,
}

impl ProgressTracker {
    pub fn new(duration_secs: Option<f64>, expected_frames: Option<u64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            expected_frames: expected_frames.filter(|f| *f > 0),
            start: 0.0,
            end: 100.0,
            last_percent: 0.0,
        }
    }

    /// Restrict this tracker to the `[start, end]` slice of overall progress.
    pub fn with_span(mut self, start: f64, end: f64) -> Self {
        self.start = start.clamp(0.0, 100.0);
        self.end = end.clamp(self.start, 100.0);
        self.last_percent = self.start;
        self
    }

    /// Fraction of this invocation's work done, if it can be known.
    fn fraction(&self, sample: &ProgressSample) -> Option<f64> {
        if let (Some(duration), Some(elapsed)) = (self.duration_secs, sample.elapsed_secs) {
            return Some((elapsed / duration).clamp(0.0, 1.0));
        }
        if let (Some(expected), Some(frame)) = (self.expected_frames, sample.frame) {
            return Some((frame as f64 / expected as f64).clamp(0.0, 1.0));
        }
        None
    }

    fn eta(&self, sample: &ProgressSample) -> Option<f64> {
        if let (Some(duration), Some(elapsed), Some(speed)) =
            (self.duration_secs, sample.elapsed_secs, sample.speed)
        {
            if speed > 0.0 {
                return Some((duration - elapsed).max(0.0) / speed);
            }
        }
        if let (Some(expected), Some(frame), Some(fps)) =
            (self.expected_frames, sample.frame, sample.fps)
        {
            if fps > 0.0 {
                return Some(expected.saturating_sub(frame) as f64 / fps);
            }
        }
        None
    }

    /// Convert a sample into an update. Without a duration or frame target
    /// the percentage holds at its last value.
    pub fn observe(&mut self, sample: &ProgressSample) -> ProgressUpdate {
        if let Some(fraction) = self.fraction(sample) {
            self.last_percent = self.start + fraction * (self.end - self.start);
        }
        ProgressUpdate {
            percent: self.last_percent,
            live: Some(LiveStats {
                elapsed_secs: sample.elapsed_secs.unwrap_or(0.0),
                fps: sample.fps,
                speed: sample.speed,
                eta_secs: self.eta(sample),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut StatusLineCodec, chunks: &[&[u8]]) -> Vec<String> {
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for chunk in chunks {
            buf.extend_from_slice(chunk);
            while let Some(line) = codec.decode(&mut buf).unwrap() {
                out.push(line);
            }
        }
        while let Some(line) = codec.decode_eof(&mut buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn codec_splits_on_carriage_return() {
        let mut codec = StatusLineCodec::new();
        let lines = decode_all(
            &mut codec,
            &[b"frame=1 time=00:00:01.00\rframe=2 time=00:00:02.00\r\nDone\n"],
        );
        assert_eq!(
            lines,
            vec!["frame=1 time=00:00:01.00", "frame=2 time=00:00:02.00", "Done"]
        );
    }

    #[test]
    fn codec_buffers_partial_lines_across_reads() {
        let mut codec = StatusLineCodec::new();
        let lines = decode_all(&mut codec, &[b"frame=1 ti", b"me=00:00", b":01.00\rtail"]);
        assert_eq!(lines, vec!["frame=1 time=00:00:01.00", "tail"]);
    }

    #[test]
    fn codec_flushes_overlong_lines() {
        let mut codec = StatusLineCodec::with_max_length(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("0123456789abcdef")
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn parse_typical_status_line() {
        let sample = parse_line(
            "frame=  120 fps= 30 q=28.0 size=     256kB time=00:00:04.00 bitrate= 524.3kbits/s speed=2.00x",
        )
        .unwrap();
        assert_eq!(sample.frame, Some(120));
        assert_eq!(sample.fps, Some(30.0));
        assert_eq!(sample.elapsed_secs, Some(4.0));
        assert_eq!(sample.bitrate_kbps, Some(524.3));
        assert_eq!(sample.speed, Some(2.0));
    }

    #[test]
    fn parse_tolerates_na_fields() {
        let sample =
            parse_line("frame=    0 fps=0.0 q=0.0 size=N/A time=N/A bitrate=N/A speed=N/A").unwrap();
        assert_eq!(sample.frame, Some(0));
        assert_eq!(sample.elapsed_secs, None);
        assert_eq!(sample.speed, None);
        assert_eq!(sample.bitrate_kbps, None);
    }

    #[test]
    fn parse_handles_long_clock_and_negative_time() {
        let sample = parse_line("time=01:02:03.50 speed=1.5x").unwrap();
        assert_eq!(sample.elapsed_secs, Some(3723.5));
        let sample = parse_line("size=0kB time=-00:00:00.04 bitrate=N/A").unwrap();
        assert_eq!(sample.elapsed_secs, Some(0.0));
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        assert_eq!(parse_line("Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':"), None);
        assert_eq!(parse_line("  Duration: 00:00:10.00, start: 0.000000"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("time=garbage frame=x"), None);
        assert_eq!(parse_line("lifetime=00:00:01.00"), None);
    }

    #[test]
    fn tracker_uses_duration_first() {
        let mut tracker = ProgressTracker::new(Some(10.0), Some(1000));
        let update = tracker.observe(&ProgressSample {
            elapsed_secs: Some(5.0),
            frame: Some(10),
            speed: Some(2.0),
            ..Default::default()
        });
        assert!((update.percent - 50.0).abs() < 1e-9);
        let live = update.live.unwrap();
        assert!((live.eta_secs.unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn tracker_falls_back_to_frames() {
        let mut tracker = ProgressTracker::new(None, Some(200));
        let update = tracker.observe(&ProgressSample {
            frame: Some(50),
            fps: Some(25.0),
            ..Default::default()
        });
        assert!((update.percent - 25.0).abs() < 1e-9);
        assert!((update.live.unwrap().eta_secs.unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn tracker_holds_last_value_without_reference() {
        let mut tracker = ProgressTracker::new(Some(10.0), None);
        tracker.observe(&ProgressSample {
            elapsed_secs: Some(3.0),
            ..Default::default()
        });
        let update = tracker.observe(&ProgressSample {
            frame: Some(99),
            ..Default::default()
        });
        assert!((update.percent - 30.0).abs() < 1e-9);

        let mut blind = ProgressTracker::new(None, None);
        let update = blind.observe(&ProgressSample {
            frame: Some(99),
            ..Default::default()
        });
        assert_eq!(update.percent, 0.0);
    }

    #[test]
    fn tracker_maps_into_span() {
        let mut pass2 = ProgressTracker::new(Some(10.0), None).with_span(50.0, 100.0);
        let update = pass2.observe(&ProgressSample {
            frame: Some(1),
            ..Default::default()
        });
        assert_eq!(update.percent, 50.0);
        let update = pass2.observe(&ProgressSample {
            elapsed_secs: Some(5.0),
            ..Default::default()
        });
        assert!((update.percent - 75.0).abs() < 1e-9);
        let update = pass2.observe(&ProgressSample {
            elapsed_secs: Some(12.0),
            ..Default::default()
        });
        assert_eq!(update.percent, 100.0);
    }
}
