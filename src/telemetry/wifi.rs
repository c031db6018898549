//! Parser for `nmcli -g in-use,bssid,ssid,signal dev wifi list` output.
//!
//! nmcli's terse mode escapes colons inside fields, so a line looks like
//! `*:88\:9C\:AD\:E1\:22\:6D:SIT-POLY:97`.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static SCAN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\*)?:((?:[0-9A-F]{2}\\:){5}[0-9A-F]{2}):(.*):(\d+)")
        .expect("wifi scan pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiReading {
    pub bssid: String,
    pub ssid: String,
    pub signal_strength: i32,
}

impl WifiReading {
    fn placeholder() -> Self {
        Self {
            bssid: String::new(),
            ssid: String::new(),
            signal_strength: 0,
        }
    }
}

/// How many access points a parse keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApSelection {
    /// Strongest `n`, zero-padded to exactly `n` entries.
    Top(usize),
    /// Every match, strongest first, no truncation or padding.
    All,
}

impl ApSelection {
    /// Negative values select every access point, matching the `-1` convention
    /// used by the offline tooling.
    pub fn from_signed(top_n: i64) -> Self {
        match usize::try_from(top_n) {
            Ok(n) => Self::Top(n),
            Err(_) => Self::All,
        }
    }
}

pub fn parse_wifi_scan(output: &str, selection: ApSelection) -> Vec<WifiReading> {
    parse_wifi_lines(output.lines(), selection)
}

pub fn parse_wifi_lines<I, S>(lines: I, selection: ApSelection) -> Vec<WifiReading>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut readings: Vec<WifiReading> = lines
        .into_iter()
        .filter_map(|line| parse_line(line.as_ref()))
        .collect();

    // sort_by is stable: equal strengths keep scan order
    readings.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));

    if let ApSelection::Top(n) = selection {
        readings.truncate(n);
        readings.resize_with(n, WifiReading::placeholder);
    }

    readings
}

/// Strength column of a parse, in the same order.
pub fn signal_strengths(readings: &[WifiReading]) -> Vec<i32> {
    readings.iter().map(|r| r.signal_strength).collect()
}

fn parse_line(line: &str) -> Option<WifiReading> {
    if line.trim().is_empty() {
        return None;
    }

    let Some(captures) = SCAN_LINE.captures(line) else {
        warn!(line = line, "Skipping unrecognised wifi scan line");
        return None;
    };

    let raw_strength = &captures[4];
    let signal_strength = match raw_strength.parse::<i32>() {
        Ok(value) => value,
        Err(err) => {
            warn!(line = line, error = %err, "Skipping wifi scan line with invalid signal");
            return None;
        }
    };

    Some(WifiReading {
        bssid: captures[2].replace("\\:", ":"),
        ssid: captures[3].to_string(),
        signal_strength,
    })
}
