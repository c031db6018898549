//! Parser for `bluetoothctl scan le` output.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static DEVICE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Device (\S+)").expect("bluetooth device pattern is valid"));

/// Distinct device tokens seen across the scan window. Matching is
/// case-sensitive; a device announced many times counts once.
pub fn unique_devices<I, S>(lines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut devices = BTreeSet::new();
    for line in lines {
        for captures in DEVICE_TOKEN.captures_iter(line.as_ref()) {
            devices.insert(captures[1].to_string());
        }
    }
    devices
}

pub fn parse_bt_lines<I, S>(lines: I) -> u32
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    u32::try_from(unique_devices(lines).len()).unwrap_or(u32::MAX)
}

pub fn parse_bt_scan(output: &str) -> u32 {
    parse_bt_lines(output.lines())
}
